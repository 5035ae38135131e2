use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One consumption-ledger row: a quantity reserved from a specific COC lot
/// for a specific material requirement of a production record. The set of
/// rows for a record is its persisted allocation map.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "lot_allocations")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub production_record_id: i32,
    pub material_name: String,
    pub lot_id: i64,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub quantity: rust_decimal::Decimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::production_record::Entity",
        from = "Column::ProductionRecordId",
        to = "super::production_record::Column::Id"
    )]
    ProductionRecord,
    #[sea_orm(
        belongs_to = "super::coc_lot::Entity",
        from = "Column::LotId",
        to = "super::coc_lot::Column::Id"
    )]
    CocLot,
}

impl Related<super::production_record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProductionRecord.def()
    }
}

impl Related<super::coc_lot::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CocLot.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
