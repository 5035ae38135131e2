use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One production day for a company. `lot_number` identifies the produced
/// module lot and is unique across all companies, not per company.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "production_records")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub company_id: i32,
    pub date: NaiveDate,
    pub lot_number: String,
    pub day_production: i32,
    pub night_production: i32,
    pub pdi: String,
    #[sea_orm(column_type = "Decimal(Some((5, 2)))")]
    pub cell_rejection_percent: rust_decimal::Decimal,
    #[sea_orm(column_type = "Decimal(Some((5, 2)))")]
    pub module_rejection_percent: rust_decimal::Decimal,
    pub allocation_status: String,
    pub is_closed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    pub fn total_production(&self) -> i64 {
        self.day_production as i64 + self.night_production as i64
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::company::Entity",
        from = "Column::CompanyId",
        to = "super::company::Column::Id"
    )]
    Company,
    #[sea_orm(has_many = "super::lot_allocation::Entity")]
    LotAllocations,
}

impl Related<super::company::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Company.def()
    }
}

impl Related<super::lot_allocation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LotAllocations.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Allocation lifecycle of a production record. Transitions are driven
/// only by ledger commit/amend/remove outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllocationStatus {
    Unallocated,
    PartiallyAllocated,
    FullyAllocated,
}

impl AllocationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AllocationStatus::Unallocated => "unallocated",
            AllocationStatus::PartiallyAllocated => "partially_allocated",
            AllocationStatus::FullyAllocated => "fully_allocated",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "unallocated" => Some(AllocationStatus::Unallocated),
            "partially_allocated" => Some(AllocationStatus::PartiallyAllocated),
            "fully_allocated" => Some(AllocationStatus::FullyAllocated),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_status_round_trips() {
        for status in [
            AllocationStatus::Unallocated,
            AllocationStatus::PartiallyAllocated,
            AllocationStatus::FullyAllocated,
        ] {
            assert_eq!(AllocationStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(AllocationStatus::from_str("open"), None);
    }
}
