//! Consumption Ledger
//!
//! Persists lot draws for production records and keeps lot consumption in
//! step with them. Every mutation runs in a single transaction: either
//! the full set of draws lands and every touched lot is debited, or
//! nothing changes.

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::instrument;

use crate::entities::coc_lot::{self, Entity as CocLotEntity};
use crate::entities::company::{self, Entity as CompanyEntity};
use crate::entities::lot_allocation::{self, Entity as LotAllocationEntity};
use crate::entities::production_record::{
    self, AllocationStatus, Entity as ProductionRecordEntity,
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::allocation::{build_plan_on, pooled_requirements};
use crate::services::lot_pool::{release_on, reserve_on};

/// Manual pick of a single lot for one material pool.
#[derive(Debug, Clone, Deserialize)]
pub struct ManualSelection {
    pub material: String,
    pub lot_id: i64,
}

/// Releases and deletes every allocation row of a record. Returns the
/// number of rows removed.
pub(crate) async fn release_allocations_on<C: ConnectionTrait>(
    conn: &C,
    record_id: i32,
) -> Result<u64, ServiceError> {
    let rows = LotAllocationEntity::find()
        .filter(lot_allocation::Column::ProductionRecordId.eq(record_id))
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?;

    for row in &rows {
        release_on(conn, row.lot_id, row.quantity).await?;
    }

    let removed = rows.len() as u64;
    if removed > 0 {
        LotAllocationEntity::delete_many()
            .filter(lot_allocation::Column::ProductionRecordId.eq(record_id))
            .exec(conn)
            .await
            .map_err(ServiceError::db_error)?;
    }

    Ok(removed)
}

async fn set_status_on<C: ConnectionTrait>(
    conn: &C,
    record: &production_record::Model,
    status: AllocationStatus,
) -> Result<(), ServiceError> {
    let mut active: production_record::ActiveModel = record.clone().into();
    active.allocation_status = Set(status.as_str().to_string());
    active.updated_at = Set(Utc::now());
    active.update(conn).await.map_err(ServiceError::db_error)?;
    Ok(())
}

/// Service recording material consumption against production records.
#[derive(Clone)]
pub struct ConsumptionLedgerService {
    db_pool: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl ConsumptionLedgerService {
    pub fn new(db_pool: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    fn connection(&self) -> &DatabaseConnection {
        self.db_pool.as_ref()
    }

    async fn load_record<C: ConnectionTrait>(
        &self,
        conn: &C,
        record_id: i32,
    ) -> Result<production_record::Model, ServiceError> {
        ProductionRecordEntity::find_by_id(record_id)
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Production record {} not found", record_id))
            })
    }

    fn guard_open(&self, record: &production_record::Model) -> Result<(), ServiceError> {
        if record.is_closed {
            return Err(ServiceError::RecordClosed(format!(
                "production record {} is closed",
                record.id
            )));
        }
        Ok(())
    }

    /// All ledger rows for a record, oldest invoice first per material.
    #[instrument(skip(self))]
    pub async fn allocations(
        &self,
        record_id: i32,
    ) -> Result<Vec<lot_allocation::Model>, ServiceError> {
        LotAllocationEntity::find()
            .filter(lot_allocation::Column::ProductionRecordId.eq(record_id))
            .order_by_asc(lot_allocation::Column::MaterialName)
            .order_by_asc(lot_allocation::Column::Id)
            .all(self.connection())
            .await
            .map_err(ServiceError::db_error)
    }

    /// FIFO-allocates materials for a record, replacing any existing
    /// allocation. Materials short in the pool are drawn down to what
    /// exists and the record is marked partially allocated. A lot that
    /// loses quantity between planning and reservation aborts the whole
    /// transaction.
    #[instrument(skip(self))]
    pub async fn commit(
        &self,
        record_id: i32,
    ) -> Result<Vec<lot_allocation::Model>, ServiceError> {
        let txn = self
            .connection()
            .begin()
            .await
            .map_err(ServiceError::db_error)?;

        let record = self.load_record(&txn, record_id).await?;
        self.guard_open(&record)?;

        let amended = release_allocations_on(&txn, record_id).await? > 0;

        let company: Option<company::Model> = CompanyEntity::find_by_id(record.company_id)
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        let cells = company.map(|c| c.cells_per_module);

        let plan = build_plan_on(&txn, record.total_production(), cells).await?;

        let mut inserted = Vec::new();
        let mut materials = Vec::new();
        for material in &plan.materials {
            for draw in &material.draws {
                reserve_on(&txn, draw.lot_id, draw.quantity)
                    .await
                    .map_err(|e| match e {
                        ServiceError::InsufficientQuantity(msg) => {
                            ServiceError::PartialAllocationFailure(format!(
                                "{}: lot changed during allocation: {}",
                                material.material, msg
                            ))
                        }
                        other => other,
                    })?;

                let row = lot_allocation::ActiveModel {
                    id: Default::default(),
                    production_record_id: Set(record_id),
                    material_name: Set(material.material.clone()),
                    lot_id: Set(draw.lot_id),
                    quantity: Set(draw.quantity),
                    created_at: Set(Utc::now()),
                };
                inserted.push(row.insert(&txn).await.map_err(ServiceError::db_error)?);
            }
            materials.push(material.material.clone());
        }

        let status = if inserted.is_empty() {
            AllocationStatus::Unallocated
        } else if plan.fully_planned {
            AllocationStatus::FullyAllocated
        } else {
            AllocationStatus::PartiallyAllocated
        };
        set_status_on(&txn, &record, status).await?;

        txn.commit().await.map_err(ServiceError::db_error)?;

        let event = if amended {
            Event::AllocationAmended { record_id }
        } else {
            Event::AllocationCommitted {
                record_id,
                materials: materials.len(),
                fully_allocated: plan.fully_planned,
            }
        };
        self.event_sender.send_or_log(event).await;

        Ok(inserted)
    }

    /// Allocates from operator-chosen lots, one lot per material pool.
    /// The chosen lot must cover the full requirement; draws are never
    /// split in manual mode. Materials without a selection are left
    /// unallocated.
    #[instrument(skip(self, selections))]
    pub async fn commit_manual(
        &self,
        record_id: i32,
        selections: Vec<ManualSelection>,
    ) -> Result<Vec<lot_allocation::Model>, ServiceError> {
        if selections.is_empty() {
            return Err(ServiceError::InvalidInput(
                "at least one lot selection is required".to_string(),
            ));
        }

        let txn = self
            .connection()
            .begin()
            .await
            .map_err(ServiceError::db_error)?;

        let record = self.load_record(&txn, record_id).await?;
        self.guard_open(&record)?;

        release_allocations_on(&txn, record_id).await?;

        let company: Option<company::Model> = CompanyEntity::find_by_id(record.company_id)
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        let cells = company.map(|c| c.cells_per_module);
        let pooled = pooled_requirements(record.total_production(), cells)?;

        let mut inserted = Vec::new();
        let mut materials = Vec::new();
        for selection in &selections {
            let required = pooled.get(&selection.material).copied().ok_or_else(|| {
                ServiceError::InvalidInput(format!(
                    "unknown material pool '{}'",
                    selection.material
                ))
            })?;
            if materials.contains(&selection.material) {
                return Err(ServiceError::InvalidInput(format!(
                    "material '{}' selected more than once",
                    selection.material
                )));
            }

            let lot: coc_lot::Model = CocLotEntity::find_by_id(selection.lot_id)
                .one(&txn)
                .await
                .map_err(ServiceError::db_error)?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Lot {} not found", selection.lot_id))
                })?;
            if lot.material_type != selection.material {
                return Err(ServiceError::InvalidInput(format!(
                    "lot {} holds {}, not {}",
                    lot.id, lot.material_type, selection.material
                )));
            }

            if required > Decimal::ZERO {
                reserve_on(&txn, selection.lot_id, required).await?;
                let row = lot_allocation::ActiveModel {
                    id: Default::default(),
                    production_record_id: Set(record_id),
                    material_name: Set(selection.material.clone()),
                    lot_id: Set(selection.lot_id),
                    quantity: Set(required),
                    created_at: Set(Utc::now()),
                };
                inserted.push(row.insert(&txn).await.map_err(ServiceError::db_error)?);
            }
            materials.push(selection.material.clone());
        }

        let fully = materials.len() == pooled.len();
        let status = if inserted.is_empty() {
            AllocationStatus::Unallocated
        } else if fully {
            AllocationStatus::FullyAllocated
        } else {
            AllocationStatus::PartiallyAllocated
        };
        set_status_on(&txn, &record, status).await?;

        txn.commit().await.map_err(ServiceError::db_error)?;

        self.event_sender
            .send_or_log(Event::AllocationCommitted {
                record_id,
                materials: materials.len(),
                fully_allocated: fully,
            })
            .await;

        Ok(inserted)
    }

    /// Releases every draw of a record back to its lots and clears the
    /// ledger rows.
    #[instrument(skip(self))]
    pub async fn remove(&self, record_id: i32) -> Result<u64, ServiceError> {
        let txn = self
            .connection()
            .begin()
            .await
            .map_err(ServiceError::db_error)?;

        let record = self.load_record(&txn, record_id).await?;
        self.guard_open(&record)?;

        let removed = release_allocations_on(&txn, record_id).await?;
        set_status_on(&txn, &record, AllocationStatus::Unallocated).await?;

        txn.commit().await.map_err(ServiceError::db_error)?;

        if removed > 0 {
            self.event_sender
                .send_or_log(Event::AllocationReleased { record_id })
                .await;
        }

        Ok(removed)
    }
}
