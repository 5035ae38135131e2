use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Aggregate root owning daily production records and rejected-module
/// records for one customer/factory line.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "companies")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub company_name: String,
    pub module_wattage: i32,
    pub module_type: String,
    pub cells_per_module: i32,
    pub cells_received_qty: Option<i32>,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))", nullable)]
    pub cells_received_mw: Option<rust_decimal::Decimal>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::production_record::Entity")]
    ProductionRecords,
    #[sea_orm(has_many = "super::rejected_module::Entity")]
    RejectedModules,
}

impl Related<super::production_record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProductionRecords.def()
    }
}

impl Related<super::rejected_module::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RejectedModules.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
