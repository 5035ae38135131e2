//! Companies, daily production records, and rejected-module tracking.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::instrument;
use validator::Validate;

use crate::entities::company::{self, Entity as CompanyEntity};
use crate::entities::production_record::{
    self, AllocationStatus, Entity as ProductionRecordEntity,
};
use crate::entities::rejected_module::{self, Entity as RejectedModuleEntity};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::ledger::release_allocations_on;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateCompanyInput {
    #[validate(length(min = 1, max = 200))]
    pub company_name: String,
    #[validate(range(min = 1))]
    pub module_wattage: i32,
    #[validate(length(min = 1, max = 100))]
    pub module_type: String,
    #[validate(range(min = 1))]
    pub cells_per_module: i32,
    pub cells_received_qty: Option<i32>,
    pub cells_received_mw: Option<Decimal>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateCompanyInput {
    #[validate(length(min = 1, max = 200))]
    pub company_name: Option<String>,
    #[validate(range(min = 1))]
    pub module_wattage: Option<i32>,
    #[validate(length(min = 1, max = 100))]
    pub module_type: Option<String>,
    #[validate(range(min = 1))]
    pub cells_per_module: Option<i32>,
    pub cells_received_qty: Option<i32>,
    pub cells_received_mw: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateRecordInput {
    pub company_id: i32,
    pub date: NaiveDate,
    #[validate(length(min = 1, max = 100))]
    pub lot_number: String,
    #[validate(range(min = 0))]
    pub day_production: i32,
    #[validate(range(min = 0))]
    pub night_production: i32,
    #[serde(default)]
    pub pdi: Option<String>,
    #[serde(default)]
    pub cell_rejection_percent: Option<Decimal>,
    #[serde(default)]
    pub module_rejection_percent: Option<Decimal>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateRecordInput {
    pub date: Option<NaiveDate>,
    #[validate(length(min = 1, max = 100))]
    pub lot_number: Option<String>,
    #[validate(range(min = 0))]
    pub day_production: Option<i32>,
    #[validate(range(min = 0))]
    pub night_production: Option<i32>,
    pub pdi: Option<String>,
    pub cell_rejection_percent: Option<Decimal>,
    pub module_rejection_percent: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateRejectionInput {
    pub company_id: i32,
    #[validate(length(min = 1, max = 100))]
    pub serial_number: String,
    pub rejection_date: NaiveDate,
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
    #[validate(length(min = 1, max = 100))]
    pub stage: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordFilter {
    pub company_id: Option<i32>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
}

fn percent_or_zero(value: Option<Decimal>, label: &str) -> Result<Decimal, ServiceError> {
    let value = value.unwrap_or(Decimal::ZERO);
    if value < Decimal::ZERO || value > Decimal::from(100) {
        return Err(ServiceError::InvalidInput(format!(
            "{} must be between 0 and 100, got {}",
            label, value
        )));
    }
    Ok(value)
}

/// Service for companies and their daily production and rejection
/// records.
#[derive(Clone)]
pub struct ProductionService {
    db_pool: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl ProductionService {
    pub fn new(db_pool: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    fn connection(&self) -> &DatabaseConnection {
        self.db_pool.as_ref()
    }

    // ----- companies -----

    #[instrument(skip(self, input))]
    pub async fn create_company(
        &self,
        input: CreateCompanyInput,
    ) -> Result<company::Model, ServiceError> {
        input
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let existing = CompanyEntity::find()
            .filter(company::Column::CompanyName.eq(input.company_name.clone()))
            .one(self.connection())
            .await
            .map_err(ServiceError::db_error)?;
        if existing.is_some() {
            return Err(ServiceError::InvalidOperation(format!(
                "company '{}' already exists",
                input.company_name
            )));
        }

        let model = company::ActiveModel {
            id: Default::default(),
            company_name: Set(input.company_name),
            module_wattage: Set(input.module_wattage),
            module_type: Set(input.module_type),
            cells_per_module: Set(input.cells_per_module),
            cells_received_qty: Set(input.cells_received_qty),
            cells_received_mw: Set(input.cells_received_mw),
            created_at: Set(Utc::now()),
        };
        let created = model
            .insert(self.connection())
            .await
            .map_err(ServiceError::db_error)?;

        self.event_sender
            .send_or_log(Event::CompanyCreated(created.id))
            .await;
        Ok(created)
    }

    pub async fn list_companies(&self) -> Result<Vec<company::Model>, ServiceError> {
        CompanyEntity::find()
            .order_by_asc(company::Column::CompanyName)
            .all(self.connection())
            .await
            .map_err(ServiceError::db_error)
    }

    pub async fn get_company(&self, company_id: i32) -> Result<company::Model, ServiceError> {
        CompanyEntity::find_by_id(company_id)
            .one(self.connection())
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Company {} not found", company_id)))
    }

    #[instrument(skip(self, input))]
    pub async fn update_company(
        &self,
        company_id: i32,
        input: UpdateCompanyInput,
    ) -> Result<company::Model, ServiceError> {
        input
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let existing = self.get_company(company_id).await?;
        let mut active: company::ActiveModel = existing.into();

        if let Some(name) = input.company_name {
            active.company_name = Set(name);
        }
        if let Some(wattage) = input.module_wattage {
            active.module_wattage = Set(wattage);
        }
        if let Some(module_type) = input.module_type {
            active.module_type = Set(module_type);
        }
        if let Some(cells) = input.cells_per_module {
            active.cells_per_module = Set(cells);
        }
        if input.cells_received_qty.is_some() {
            active.cells_received_qty = Set(input.cells_received_qty);
        }
        if input.cells_received_mw.is_some() {
            active.cells_received_mw = Set(input.cells_received_mw);
        }

        let updated = active
            .update(self.connection())
            .await
            .map_err(ServiceError::db_error)?;
        self.event_sender
            .send_or_log(Event::CompanyUpdated(company_id))
            .await;
        Ok(updated)
    }

    /// Deletes a company and its rejected modules. Companies with
    /// production history keep their records and cannot be removed.
    #[instrument(skip(self))]
    pub async fn delete_company(&self, company_id: i32) -> Result<(), ServiceError> {
        self.get_company(company_id).await?;

        let record_count = ProductionRecordEntity::find()
            .filter(production_record::Column::CompanyId.eq(company_id))
            .count(self.connection())
            .await
            .map_err(ServiceError::db_error)?;
        if record_count > 0 {
            return Err(ServiceError::InvalidOperation(format!(
                "company {} has {} production records and cannot be deleted",
                company_id, record_count
            )));
        }

        RejectedModuleEntity::delete_many()
            .filter(rejected_module::Column::CompanyId.eq(company_id))
            .exec(self.connection())
            .await
            .map_err(ServiceError::db_error)?;
        CompanyEntity::delete_by_id(company_id)
            .exec(self.connection())
            .await
            .map_err(ServiceError::db_error)?;

        self.event_sender
            .send_or_log(Event::CompanyDeleted(company_id))
            .await;
        Ok(())
    }

    // ----- production records -----

    async fn guard_date_unique<C: ConnectionTrait>(
        &self,
        conn: &C,
        company_id: i32,
        date: NaiveDate,
        exclude_record: Option<i32>,
    ) -> Result<(), ServiceError> {
        let mut query = ProductionRecordEntity::find()
            .filter(production_record::Column::CompanyId.eq(company_id))
            .filter(production_record::Column::Date.eq(date));
        if let Some(id) = exclude_record {
            query = query.filter(production_record::Column::Id.ne(id));
        }
        if query
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
            .is_some()
        {
            return Err(ServiceError::InvalidOperation(format!(
                "company {} already has a production record for {}",
                company_id, date
            )));
        }
        Ok(())
    }

    /// Lot numbers name produced module lots and must be unique across
    /// every company.
    async fn guard_lot_number_unique<C: ConnectionTrait>(
        &self,
        conn: &C,
        lot_number: &str,
        exclude_record: Option<i32>,
    ) -> Result<(), ServiceError> {
        let mut query = ProductionRecordEntity::find()
            .filter(production_record::Column::LotNumber.eq(lot_number));
        if let Some(id) = exclude_record {
            query = query.filter(production_record::Column::Id.ne(id));
        }
        if let Some(other) = query.one(conn).await.map_err(ServiceError::db_error)? {
            return Err(ServiceError::LotNumberConflict(format!(
                "lot number '{}' is already used by company {} on {}",
                lot_number, other.company_id, other.date
            )));
        }
        Ok(())
    }

    #[instrument(skip(self, input))]
    pub async fn create_record(
        &self,
        input: CreateRecordInput,
    ) -> Result<production_record::Model, ServiceError> {
        input
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        self.get_company(input.company_id).await?;
        self.guard_date_unique(self.connection(), input.company_id, input.date, None)
            .await?;
        self.guard_lot_number_unique(self.connection(), &input.lot_number, None)
            .await?;

        let cell_rejection =
            percent_or_zero(input.cell_rejection_percent, "cell rejection percent")?;
        let module_rejection =
            percent_or_zero(input.module_rejection_percent, "module rejection percent")?;

        let now = Utc::now();
        let model = production_record::ActiveModel {
            id: Default::default(),
            company_id: Set(input.company_id),
            date: Set(input.date),
            lot_number: Set(input.lot_number),
            day_production: Set(input.day_production),
            night_production: Set(input.night_production),
            pdi: Set(input.pdi.unwrap_or_default()),
            cell_rejection_percent: Set(cell_rejection),
            module_rejection_percent: Set(module_rejection),
            allocation_status: Set(AllocationStatus::Unallocated.as_str().to_string()),
            is_closed: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let created = model
            .insert(self.connection())
            .await
            .map_err(ServiceError::db_error)?;

        self.event_sender
            .send_or_log(Event::ProductionRecordCreated {
                record_id: created.id,
                company_id: created.company_id,
                date: created.date,
                lot_number: created.lot_number.clone(),
            })
            .await;
        Ok(created)
    }

    pub async fn list_records(
        &self,
        filter: RecordFilter,
    ) -> Result<Vec<production_record::Model>, ServiceError> {
        let mut query = ProductionRecordEntity::find();
        if let Some(company_id) = filter.company_id {
            query = query.filter(production_record::Column::CompanyId.eq(company_id));
        }
        if let Some(from) = filter.from_date {
            query = query.filter(production_record::Column::Date.gte(from));
        }
        if let Some(to) = filter.to_date {
            query = query.filter(production_record::Column::Date.lte(to));
        }
        query
            .order_by_desc(production_record::Column::Date)
            .order_by_desc(production_record::Column::Id)
            .all(self.connection())
            .await
            .map_err(ServiceError::db_error)
    }

    pub async fn get_record(
        &self,
        record_id: i32,
    ) -> Result<production_record::Model, ServiceError> {
        ProductionRecordEntity::find_by_id(record_id)
            .one(self.connection())
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Production record {} not found", record_id))
            })
    }

    #[instrument(skip(self, input))]
    pub async fn update_record(
        &self,
        record_id: i32,
        input: UpdateRecordInput,
    ) -> Result<production_record::Model, ServiceError> {
        input
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let existing = self.get_record(record_id).await?;
        if existing.is_closed {
            return Err(ServiceError::RecordClosed(format!(
                "production record {} is closed",
                record_id
            )));
        }

        if let Some(date) = input.date {
            if date != existing.date {
                self.guard_date_unique(
                    self.connection(),
                    existing.company_id,
                    date,
                    Some(record_id),
                )
                .await?;
            }
        }
        if let Some(ref lot_number) = input.lot_number {
            if *lot_number != existing.lot_number {
                self.guard_lot_number_unique(self.connection(), lot_number, Some(record_id))
                    .await?;
            }
        }

        let mut active: production_record::ActiveModel = existing.into();
        if let Some(date) = input.date {
            active.date = Set(date);
        }
        if let Some(lot_number) = input.lot_number {
            active.lot_number = Set(lot_number);
        }
        if let Some(day) = input.day_production {
            active.day_production = Set(day);
        }
        if let Some(night) = input.night_production {
            active.night_production = Set(night);
        }
        if let Some(pdi) = input.pdi {
            active.pdi = Set(pdi);
        }
        if let Some(cell) = input.cell_rejection_percent {
            active.cell_rejection_percent = Set(percent_or_zero(
                Some(cell),
                "cell rejection percent",
            )?);
        }
        if let Some(module) = input.module_rejection_percent {
            active.module_rejection_percent = Set(percent_or_zero(
                Some(module),
                "module rejection percent",
            )?);
        }
        active.updated_at = Set(Utc::now());

        let updated = active
            .update(self.connection())
            .await
            .map_err(ServiceError::db_error)?;
        self.event_sender
            .send_or_log(Event::ProductionRecordUpdated(record_id))
            .await;
        Ok(updated)
    }

    /// Deletes a record, first returning any allocated material to its
    /// lots in the same transaction.
    #[instrument(skip(self))]
    pub async fn delete_record(&self, record_id: i32) -> Result<(), ServiceError> {
        let record = self.get_record(record_id).await?;
        if record.is_closed {
            return Err(ServiceError::RecordClosed(format!(
                "production record {} is closed",
                record_id
            )));
        }

        let txn = self
            .connection()
            .begin()
            .await
            .map_err(ServiceError::db_error)?;
        let released = release_allocations_on(&txn, record_id).await?;
        ProductionRecordEntity::delete_by_id(record_id)
            .exec(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        txn.commit().await.map_err(ServiceError::db_error)?;

        if released > 0 {
            self.event_sender
                .send_or_log(Event::AllocationReleased { record_id })
                .await;
        }
        self.event_sender
            .send_or_log(Event::ProductionRecordDeleted(record_id))
            .await;
        Ok(())
    }

    /// Closes a record, freezing its values and allocation.
    #[instrument(skip(self))]
    pub async fn close_record(
        &self,
        record_id: i32,
    ) -> Result<production_record::Model, ServiceError> {
        let record = self.get_record(record_id).await?;
        if record.is_closed {
            return Ok(record);
        }
        let mut active: production_record::ActiveModel = record.into();
        active.is_closed = Set(true);
        active.updated_at = Set(Utc::now());
        let updated = active
            .update(self.connection())
            .await
            .map_err(ServiceError::db_error)?;
        self.event_sender
            .send_or_log(Event::ProductionRecordClosed(record_id))
            .await;
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn reopen_record(
        &self,
        record_id: i32,
    ) -> Result<production_record::Model, ServiceError> {
        let record = self.get_record(record_id).await?;
        if !record.is_closed {
            return Ok(record);
        }
        let mut active: production_record::ActiveModel = record.into();
        active.is_closed = Set(false);
        active.updated_at = Set(Utc::now());
        let updated = active
            .update(self.connection())
            .await
            .map_err(ServiceError::db_error)?;
        self.event_sender
            .send_or_log(Event::ProductionRecordReopened(record_id))
            .await;
        Ok(updated)
    }

    // ----- rejected modules -----

    #[instrument(skip(self, input))]
    pub async fn create_rejection(
        &self,
        input: CreateRejectionInput,
    ) -> Result<rejected_module::Model, ServiceError> {
        input
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
        self.get_company(input.company_id).await?;

        let model = rejected_module::ActiveModel {
            id: Default::default(),
            company_id: Set(input.company_id),
            serial_number: Set(input.serial_number),
            rejection_date: Set(input.rejection_date),
            reason: Set(input.reason),
            stage: Set(input.stage),
            created_at: Set(Utc::now()),
        };
        model
            .insert(self.connection())
            .await
            .map_err(ServiceError::db_error)
    }

    /// Inserts a batch of rejections. The whole batch is validated before
    /// any row is written.
    #[instrument(skip(self, inputs))]
    pub async fn create_rejections(
        &self,
        inputs: Vec<CreateRejectionInput>,
    ) -> Result<Vec<rejected_module::Model>, ServiceError> {
        if inputs.is_empty() {
            return Err(ServiceError::InvalidInput(
                "rejection batch is empty".to_string(),
            ));
        }
        for input in &inputs {
            input
                .validate()
                .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
        }

        let txn = self
            .connection()
            .begin()
            .await
            .map_err(ServiceError::db_error)?;
        let mut created = Vec::with_capacity(inputs.len());
        for input in inputs {
            if CompanyEntity::find_by_id(input.company_id)
                .one(&txn)
                .await
                .map_err(ServiceError::db_error)?
                .is_none()
            {
                return Err(ServiceError::NotFound(format!(
                    "Company {} not found",
                    input.company_id
                )));
            }
            let model = rejected_module::ActiveModel {
                id: Default::default(),
                company_id: Set(input.company_id),
                serial_number: Set(input.serial_number),
                rejection_date: Set(input.rejection_date),
                reason: Set(input.reason),
                stage: Set(input.stage),
                created_at: Set(Utc::now()),
            };
            created.push(model.insert(&txn).await.map_err(ServiceError::db_error)?);
        }
        txn.commit().await.map_err(ServiceError::db_error)?;
        Ok(created)
    }

    pub async fn list_rejections(
        &self,
        company_id: i32,
        date: Option<NaiveDate>,
    ) -> Result<Vec<rejected_module::Model>, ServiceError> {
        let mut query = RejectedModuleEntity::find()
            .filter(rejected_module::Column::CompanyId.eq(company_id));
        if let Some(date) = date {
            query = query.filter(rejected_module::Column::RejectionDate.eq(date));
        }
        query
            .order_by_desc(rejected_module::Column::RejectionDate)
            .order_by_asc(rejected_module::Column::SerialNumber)
            .all(self.connection())
            .await
            .map_err(ServiceError::db_error)
    }

    #[instrument(skip(self))]
    pub async fn delete_rejection(&self, rejection_id: i32) -> Result<(), ServiceError> {
        let result = RejectedModuleEntity::delete_by_id(rejection_id)
            .exec(self.connection())
            .await
            .map_err(ServiceError::db_error)?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "Rejected module {} not found",
                rejection_id
            )));
        }
        Ok(())
    }

    /// Clears a company's rejections for one day. Returns the number of
    /// rows removed.
    #[instrument(skip(self))]
    pub async fn delete_rejections_for_date(
        &self,
        company_id: i32,
        date: NaiveDate,
    ) -> Result<u64, ServiceError> {
        self.get_company(company_id).await?;
        let result = RejectedModuleEntity::delete_many()
            .filter(rejected_module::Column::CompanyId.eq(company_id))
            .filter(rejected_module::Column::RejectionDate.eq(date))
            .exec(self.connection())
            .await
            .map_err(ServiceError::db_error)?;
        Ok(result.rows_affected)
    }
}
