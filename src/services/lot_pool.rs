//! Lot Pool
//!
//! The shared pool of COC lots, grouped by material type. All consumption
//! accounting funnels through `reserve`/`release`, which are single
//! conditional UPDATE statements so concurrent callers cannot lose
//! updates: the loser of a race sees zero rows affected and fails without
//! mutating anything.

use chrono::{Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{instrument, warn};

use crate::entities::coc_lot::{self, Entity as CocLotEntity};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::requirements::STANDARD_MATERIAL_TYPES;

/// Atomically reserves `quantity` from a lot, inside the caller's
/// connection or transaction. The guard `consumed + q <= received` lives
/// in the UPDATE itself; zero rows affected means the lot is missing,
/// inactive, or short.
pub(crate) async fn reserve_on<C: ConnectionTrait>(
    conn: &C,
    lot_id: i64,
    quantity: Decimal,
) -> Result<(), ServiceError> {
    if quantity <= Decimal::ZERO {
        return Err(ServiceError::InvalidInput(format!(
            "reserve quantity must be positive, got {}",
            quantity
        )));
    }

    let result = CocLotEntity::update_many()
        .col_expr(
            coc_lot::Column::ConsumedQuantity,
            Expr::col(coc_lot::Column::ConsumedQuantity).add(quantity),
        )
        .filter(coc_lot::Column::Id.eq(lot_id))
        .filter(coc_lot::Column::IsActive.eq(true))
        .filter(
            Expr::col(coc_lot::Column::ReceivedQuantity)
                .gte(Expr::col(coc_lot::Column::ConsumedQuantity).add(quantity)),
        )
        .exec(conn)
        .await
        .map_err(ServiceError::db_error)?;

    if result.rows_affected == 0 {
        let lot = CocLotEntity::find_by_id(lot_id)
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Lot {} not found", lot_id)))?;
        return Err(ServiceError::InsufficientQuantity(format!(
            "lot {} ({}) has {} available, {} requested",
            lot_id,
            lot.lot_batch_number,
            lot.available_quantity(),
            quantity
        )));
    }

    Ok(())
}

/// Atomically returns `quantity` to a lot. Releasing more than is
/// currently consumed indicates a caller bug and is rejected without
/// mutating state.
pub(crate) async fn release_on<C: ConnectionTrait>(
    conn: &C,
    lot_id: i64,
    quantity: Decimal,
) -> Result<(), ServiceError> {
    if quantity <= Decimal::ZERO {
        return Err(ServiceError::InvalidInput(format!(
            "release quantity must be positive, got {}",
            quantity
        )));
    }

    let result = CocLotEntity::update_many()
        .col_expr(
            coc_lot::Column::ConsumedQuantity,
            Expr::col(coc_lot::Column::ConsumedQuantity).sub(quantity),
        )
        .filter(coc_lot::Column::Id.eq(lot_id))
        .filter(Expr::col(coc_lot::Column::ConsumedQuantity).gte(quantity))
        .exec(conn)
        .await
        .map_err(ServiceError::db_error)?;

    if result.rows_affected == 0 {
        let exists = CocLotEntity::find_by_id(lot_id)
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?;
        return match exists {
            None => Err(ServiceError::NotFound(format!("Lot {} not found", lot_id))),
            Some(lot) => Err(ServiceError::InvalidOperation(format!(
                "cannot release {} from lot {}: only {} consumed",
                quantity, lot_id, lot.consumed_quantity
            ))),
        };
    }

    Ok(())
}

/// Lots of one material type with available quantity, oldest invoice
/// first. Ties on invoice date break by lot id, so FIFO order is total.
pub(crate) async fn available_lots_on<C: ConnectionTrait>(
    conn: &C,
    material_type: &str,
) -> Result<Vec<coc_lot::Model>, ServiceError> {
    CocLotEntity::find()
        .filter(coc_lot::Column::MaterialType.eq(material_type))
        .filter(coc_lot::Column::IsActive.eq(true))
        .filter(
            Expr::col(coc_lot::Column::ReceivedQuantity)
                .gt(Expr::col(coc_lot::Column::ConsumedQuantity)),
        )
        .order_by_asc(coc_lot::Column::InvoiceDate)
        .order_by_asc(coc_lot::Column::Id)
        .all(conn)
        .await
        .map_err(ServiceError::db_error)
}

/// Filters for listing lots.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LotFilter {
    pub company: Option<String>,
    #[serde(alias = "type")]
    pub material: Option<String>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
}

/// Input for a manually entered lot.
#[derive(Debug, Clone, Deserialize)]
pub struct AddLotInput {
    pub company_name: String,
    pub material_type: String,
    pub brand: Option<String>,
    pub product_type: Option<String>,
    pub lot_batch_number: String,
    pub invoice_number: String,
    pub invoice_date: NaiveDate,
    pub received_quantity: Decimal,
    pub invoice_quantity: Option<Decimal>,
    pub coc_document_url: Option<String>,
    pub iqc_document_url: Option<String>,
}

/// One record of the upstream COC document feed. Quantities arrive as
/// decimal strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CocFeedRecord {
    pub id: Option<i64>,
    pub store_name: String,
    pub material_name: String,
    pub brand: Option<String>,
    pub product_type: Option<String>,
    pub lot_batch_no: String,
    pub coc_qty: Decimal,
    pub invoice_no: String,
    pub invoice_qty: Decimal,
    pub invoice_date: NaiveDate,
    pub coc_document_url: Option<String>,
    pub iqc_document_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CocFeedResponse {
    status: bool,
    #[serde(default)]
    data: Vec<CocFeedRecord>,
}

/// Result of a lot sync run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncOutcome {
    pub added: u64,
    pub updated: u64,
    pub errors: u64,
    pub total: u64,
}

/// Per-material stock totals across the shared pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterialStock {
    pub material: String,
    pub brands: String,
    pub total_received: Decimal,
    pub total_consumed: Decimal,
    pub available: Decimal,
    pub lot_count: u64,
}

/// Service owning the lot pool: listing, manual entry, deletion, upstream
/// sync, and the atomic reserve/release primitives.
#[derive(Clone)]
pub struct LotPoolService {
    db_pool: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    http: reqwest::Client,
    feed_url: Option<String>,
}

impl LotPoolService {
    pub fn new(
        db_pool: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        feed_url: Option<String>,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            http: reqwest::Client::new(),
            feed_url,
        }
    }

    fn connection(&self) -> &DatabaseConnection {
        self.db_pool.as_ref()
    }

    /// FIFO-ordered snapshot of lots with available quantity for one
    /// material type.
    #[instrument(skip(self))]
    pub async fn list_available(
        &self,
        material_type: &str,
    ) -> Result<Vec<coc_lot::Model>, ServiceError> {
        available_lots_on(self.connection(), material_type).await
    }

    /// Lists lots matching the filter, oldest invoice first.
    #[instrument(skip(self))]
    pub async fn list_lots(&self, filter: LotFilter) -> Result<Vec<coc_lot::Model>, ServiceError> {
        let mut query = CocLotEntity::find().filter(coc_lot::Column::IsActive.eq(true));

        if let Some(company) = filter.company {
            query = query.filter(coc_lot::Column::CompanyName.eq(company));
        }
        if let Some(material) = filter.material {
            query = query.filter(coc_lot::Column::MaterialType.eq(material));
        }
        if let Some(from) = filter.from_date {
            query = query.filter(coc_lot::Column::InvoiceDate.gte(from));
        }
        if let Some(to) = filter.to_date {
            query = query.filter(coc_lot::Column::InvoiceDate.lte(to));
        }

        query
            .order_by_asc(coc_lot::Column::InvoiceDate)
            .order_by_asc(coc_lot::Column::Id)
            .all(self.connection())
            .await
            .map_err(ServiceError::db_error)
    }

    pub async fn get_lot(&self, lot_id: i64) -> Result<Option<coc_lot::Model>, ServiceError> {
        CocLotEntity::find_by_id(lot_id)
            .one(self.connection())
            .await
            .map_err(ServiceError::db_error)
    }

    /// Reserves `quantity` from a lot on the pool connection. Ledger
    /// commits use the transaction-scoped `reserve_on` instead.
    #[instrument(skip(self))]
    pub async fn reserve(&self, lot_id: i64, quantity: Decimal) -> Result<(), ServiceError> {
        reserve_on(self.connection(), lot_id, quantity).await
    }

    /// Returns `quantity` to a lot.
    #[instrument(skip(self))]
    pub async fn release(&self, lot_id: i64, quantity: Decimal) -> Result<(), ServiceError> {
        release_on(self.connection(), lot_id, quantity).await
    }

    /// Inserts a manually entered lot with zero consumption. The sync key
    /// (material, lot/batch, invoice) must be unused.
    #[instrument(skip(self, input))]
    pub async fn add_lot(&self, input: AddLotInput) -> Result<coc_lot::Model, ServiceError> {
        if input.received_quantity < Decimal::ZERO {
            return Err(ServiceError::InvalidInput(format!(
                "received quantity must be non-negative, got {}",
                input.received_quantity
            )));
        }

        let existing = CocLotEntity::find()
            .filter(coc_lot::Column::MaterialType.eq(input.material_type.clone()))
            .filter(coc_lot::Column::LotBatchNumber.eq(input.lot_batch_number.clone()))
            .filter(coc_lot::Column::InvoiceNumber.eq(input.invoice_number.clone()))
            .one(self.connection())
            .await
            .map_err(ServiceError::db_error)?;

        if existing.is_some() {
            return Err(ServiceError::DuplicateLot(format!(
                "{} lot {} on invoice {} already exists",
                input.material_type, input.lot_batch_number, input.invoice_number
            )));
        }

        let now = Utc::now();
        let model = coc_lot::ActiveModel {
            id: Default::default(),
            external_id: Set(None),
            company_name: Set(input.company_name),
            material_type: Set(input.material_type.clone()),
            brand: Set(input.brand),
            product_type: Set(input.product_type),
            lot_batch_number: Set(input.lot_batch_number),
            invoice_number: Set(input.invoice_number),
            invoice_date: Set(input.invoice_date),
            received_quantity: Set(input.received_quantity),
            invoice_quantity: Set(input.invoice_quantity.unwrap_or(input.received_quantity)),
            consumed_quantity: Set(Decimal::ZERO),
            coc_document_url: Set(input.coc_document_url),
            iqc_document_url: Set(input.iqc_document_url),
            is_active: Set(true),
            created_at: Set(now),
            last_synced_at: Set(None),
        };

        let lot = model
            .insert(self.connection())
            .await
            .map_err(ServiceError::db_error)?;

        self.event_sender
            .send_or_log(Event::LotAdded {
                lot_id: lot.id,
                material_type: lot.material_type.clone(),
                received_quantity: lot.received_quantity,
            })
            .await;

        Ok(lot)
    }

    /// Deletes a lot. Lots with recorded consumption stay for the audit
    /// trail and cannot be removed.
    #[instrument(skip(self))]
    pub async fn delete_lot(&self, lot_id: i64) -> Result<(), ServiceError> {
        let lot = CocLotEntity::find_by_id(lot_id)
            .one(self.connection())
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Lot {} not found", lot_id)))?;

        if lot.consumed_quantity > Decimal::ZERO {
            return Err(ServiceError::InvalidOperation(format!(
                "lot {} has {} consumed and cannot be deleted",
                lot_id, lot.consumed_quantity
            )));
        }

        CocLotEntity::delete_by_id(lot_id)
            .exec(self.connection())
            .await
            .map_err(ServiceError::db_error)?;

        self.event_sender.send_or_log(Event::LotDeleted(lot_id)).await;

        Ok(())
    }

    /// Fetches the upstream COC document feed for a date window and
    /// upserts each record. Idempotent: records whose sync key is already
    /// present update metadata only, so a re-run adds nothing.
    #[instrument(skip(self))]
    pub async fn sync(
        &self,
        from_date: Option<NaiveDate>,
        to_date: Option<NaiveDate>,
    ) -> Result<SyncOutcome, ServiceError> {
        let feed_url = self.feed_url.clone().ok_or_else(|| {
            ServiceError::InvalidOperation("COC feed URL is not configured".to_string())
        })?;

        let today = Utc::now().date_naive();
        let from = from_date.unwrap_or(today - Duration::days(30));
        let to = to_date.unwrap_or(today);

        let response = self
            .http
            .post(&feed_url)
            .json(&serde_json::json!({
                "from": from.format("%Y-%m-%d").to_string(),
                "to": to.format("%Y-%m-%d").to_string(),
            }))
            .send()
            .await
            .map_err(|e| ServiceError::ExternalApiError(format!("COC feed request failed: {}", e)))?
            .error_for_status()
            .map_err(|e| ServiceError::ExternalApiError(format!("COC feed returned error: {}", e)))?;

        let feed: CocFeedResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::ExternalApiError(format!("COC feed body invalid: {}", e)))?;

        if !feed.status {
            return Err(ServiceError::ExternalApiError(
                "COC feed reported status=false".to_string(),
            ));
        }

        let outcome = self.upsert_feed_records(feed.data).await?;

        self.event_sender
            .send_or_log(Event::LotsSynced {
                added: outcome.added,
                updated: outcome.updated,
                errors: outcome.errors,
            })
            .await;

        Ok(outcome)
    }

    /// Upserts feed records keyed by (material, lot/batch, invoice).
    /// Individual failures are logged and counted, never fatal to the
    /// batch. `received_quantity` is immutable: updates refresh metadata
    /// and the sync timestamp only.
    pub async fn upsert_feed_records(
        &self,
        records: Vec<CocFeedRecord>,
    ) -> Result<SyncOutcome, ServiceError> {
        let total = records.len() as u64;
        let mut added = 0u64;
        let mut updated = 0u64;
        let mut errors = 0u64;

        for record in records {
            match self.upsert_one(&record).await {
                Ok(true) => added += 1,
                Ok(false) => updated += 1,
                Err(e) => {
                    warn!(
                        lot_batch = %record.lot_batch_no,
                        invoice = %record.invoice_no,
                        error = %e,
                        "Failed to sync COC record"
                    );
                    errors += 1;
                }
            }
        }

        Ok(SyncOutcome {
            added,
            updated,
            errors,
            total,
        })
    }

    /// Returns true if the record was inserted, false if an existing lot
    /// was refreshed.
    async fn upsert_one(&self, record: &CocFeedRecord) -> Result<bool, ServiceError> {
        if record.coc_qty < Decimal::ZERO {
            return Err(ServiceError::InvalidInput(format!(
                "COC quantity must be non-negative, got {}",
                record.coc_qty
            )));
        }

        let now = Utc::now();
        let existing = CocLotEntity::find()
            .filter(coc_lot::Column::MaterialType.eq(record.material_name.clone()))
            .filter(coc_lot::Column::LotBatchNumber.eq(record.lot_batch_no.clone()))
            .filter(coc_lot::Column::InvoiceNumber.eq(record.invoice_no.clone()))
            .one(self.connection())
            .await
            .map_err(ServiceError::db_error)?;

        match existing {
            Some(lot) => {
                let mut active: coc_lot::ActiveModel = lot.into();
                active.external_id = Set(record.id);
                active.brand = Set(record.brand.clone());
                active.product_type = Set(record.product_type.clone());
                active.invoice_date = Set(record.invoice_date);
                active.invoice_quantity = Set(record.invoice_qty);
                active.coc_document_url = Set(record.coc_document_url.clone());
                active.iqc_document_url = Set(record.iqc_document_url.clone());
                active.last_synced_at = Set(Some(now));
                active
                    .update(self.connection())
                    .await
                    .map_err(ServiceError::db_error)?;
                Ok(false)
            }
            None => {
                let model = coc_lot::ActiveModel {
                    id: Default::default(),
                    external_id: Set(record.id),
                    company_name: Set(record.store_name.clone()),
                    material_type: Set(record.material_name.clone()),
                    brand: Set(record.brand.clone()),
                    product_type: Set(record.product_type.clone()),
                    lot_batch_number: Set(record.lot_batch_no.clone()),
                    invoice_number: Set(record.invoice_no.clone()),
                    invoice_date: Set(record.invoice_date),
                    received_quantity: Set(record.coc_qty),
                    invoice_quantity: Set(record.invoice_qty),
                    consumed_quantity: Set(Decimal::ZERO),
                    coc_document_url: Set(record.coc_document_url.clone()),
                    iqc_document_url: Set(record.iqc_document_url.clone()),
                    is_active: Set(true),
                    created_at: Set(now),
                    last_synced_at: Set(Some(now)),
                };
                model
                    .insert(self.connection())
                    .await
                    .map_err(ServiceError::db_error)?;
                Ok(true)
            }
        }
    }

    /// Per-material totals across the shared pool, padded with the
    /// standard material list so the dashboard always shows every pool.
    #[instrument(skip(self))]
    pub async fn material_stock(
        &self,
        material: Option<String>,
    ) -> Result<Vec<MaterialStock>, ServiceError> {
        let mut query = CocLotEntity::find().filter(coc_lot::Column::IsActive.eq(true));
        if let Some(ref material) = material {
            query = query.filter(coc_lot::Column::MaterialType.eq(material.clone()));
        }
        let lots = query
            .all(self.connection())
            .await
            .map_err(ServiceError::db_error)?;

        let mut stock: BTreeMap<String, MaterialStock> = BTreeMap::new();
        for lot in lots {
            let entry = stock
                .entry(lot.material_type.clone())
                .or_insert_with(|| MaterialStock {
                    material: lot.material_type.clone(),
                    brands: String::new(),
                    total_received: Decimal::ZERO,
                    total_consumed: Decimal::ZERO,
                    available: Decimal::ZERO,
                    lot_count: 0,
                });
            entry.total_received += lot.received_quantity;
            entry.total_consumed += lot.consumed_quantity;
            entry.available += lot.available_quantity();
            entry.lot_count += 1;
            if let Some(brand) = lot.brand {
                if !brand.is_empty() && !entry.brands.split(", ").any(|b| b == brand) {
                    if !entry.brands.is_empty() {
                        entry.brands.push_str(", ");
                    }
                    entry.brands.push_str(&brand);
                }
            }
        }

        if material.is_none() {
            for name in STANDARD_MATERIAL_TYPES {
                stock
                    .entry((*name).to_string())
                    .or_insert_with(|| MaterialStock {
                        material: (*name).to_string(),
                        brands: String::new(),
                        total_received: Decimal::ZERO,
                        total_consumed: Decimal::ZERO,
                        available: Decimal::ZERO,
                        lot_count: 0,
                    });
            }
        }

        Ok(stock.into_values().collect())
    }
}
