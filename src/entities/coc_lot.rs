use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A COC (certificate of conformance) document: one trackable lot of raw
/// material. `received_quantity` is fixed at creation; `consumed_quantity`
/// is mutated only through the lot pool's reserve/release operations, so
/// `received_quantity - consumed_quantity` is the live available balance.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "coc_lots")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub external_id: Option<i64>,
    pub company_name: String,
    pub material_type: String,
    pub brand: Option<String>,
    pub product_type: Option<String>,
    pub lot_batch_number: String,
    pub invoice_number: String,
    pub invoice_date: NaiveDate,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub received_quantity: rust_decimal::Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub invoice_quantity: rust_decimal::Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub consumed_quantity: rust_decimal::Decimal,
    pub coc_document_url: Option<String>,
    pub iqc_document_url: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl Model {
    /// Remaining quantity that can still be reserved from this lot.
    pub fn available_quantity(&self) -> rust_decimal::Decimal {
        self.received_quantity - self.consumed_quantity
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::lot_allocation::Entity")]
    LotAllocations,
}

impl Related<super::lot_allocation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LotAllocations.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
