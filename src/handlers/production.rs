use super::common::{
    created_response, map_service_error, no_content_response, success_response, validate_input,
};
use crate::{
    entities::production_record,
    errors::ApiError,
    handlers::AppState,
    services::allocation::AllocationResult,
    services::ledger::ManualSelection,
    services::production::{CreateRecordInput, RecordFilter, UpdateRecordInput},
};
use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{delete, get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

/// Creates the router for production record endpoints
pub fn production_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_record))
        .route("/", get(list_records))
        .route("/validate", post(validate_allocation))
        .route("/:id", get(get_record))
        .route("/:id", put(update_record))
        .route("/:id", delete(delete_record))
        .route("/:id/close", post(close_record))
        .route("/:id/reopen", post(reopen_record))
        .route("/:id/allocate", post(allocate))
        .route("/:id/allocations", get(get_allocations))
        .route("/:id/allocations", delete(remove_allocations))
}

#[derive(Debug, Deserialize, Validate)]
struct ValidateRequest {
    company_id: i32,
    #[validate(range(min = 0))]
    day_production: i32,
    #[validate(range(min = 0))]
    night_production: i32,
}

#[derive(Debug, Default, Deserialize)]
struct AllocateRequest {
    /// Operator-chosen lots, one per material pool. Absent means FIFO.
    #[serde(default)]
    selections: Vec<ManualSelection>,
}

/// Updated record together with a fresh dry-run check against the pool.
#[derive(Debug, Serialize)]
struct RecordWithValidation {
    record: production_record::Model,
    validation: AllocationResult,
}

/// Create a production record
async fn create_record(
    State(state): State<AppState>,
    Json(payload): Json<CreateRecordInput>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let record = state
        .services
        .production
        .create_record(payload)
        .await
        .map_err(map_service_error)?;
    info!(
        record_id = record.id,
        company_id = record.company_id,
        lot_number = %record.lot_number,
        "Production record created"
    );
    Ok(created_response(record))
}

/// List production records, newest first
async fn list_records(
    State(state): State<AppState>,
    Query(filter): Query<RecordFilter>,
) -> Result<impl IntoResponse, ApiError> {
    let records = state
        .services
        .production
        .list_records(filter)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(records))
}

/// Dry-run material check for a proposed day's production
async fn validate_allocation(
    State(state): State<AppState>,
    Json(payload): Json<ValidateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let result = state
        .services
        .allocation
        .validate(
            payload.company_id,
            payload.day_production,
            payload.night_production,
        )
        .await
        .map_err(map_service_error)?;
    Ok(success_response(result))
}

/// Get a production record
async fn get_record(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state
        .services
        .production
        .get_record(id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(record))
}

/// Update a production record and re-check material cover for its new
/// quantities
async fn update_record(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateRecordInput>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let record = state
        .services
        .production
        .update_record(id, payload)
        .await
        .map_err(map_service_error)?;
    let validation = state
        .services
        .allocation
        .validate(
            record.company_id,
            record.day_production,
            record.night_production,
        )
        .await
        .map_err(map_service_error)?;
    Ok(success_response(RecordWithValidation { record, validation }))
}

/// Delete a production record, returning its material to the pool
async fn delete_record(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .production
        .delete_record(id)
        .await
        .map_err(map_service_error)?;
    Ok(no_content_response())
}

/// Close a record, freezing its allocation
async fn close_record(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state
        .services
        .production
        .close_record(id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(record))
}

/// Reopen a closed record
async fn reopen_record(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state
        .services
        .production
        .reopen_record(id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(record))
}

/// Allocate materials for a record: FIFO by default, or from explicit
/// lot selections
async fn allocate(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    payload: Option<Json<AllocateRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let request = payload.map(|Json(r)| r).unwrap_or_default();
    let allocations = if request.selections.is_empty() {
        state.services.ledger.commit(id).await
    } else {
        state
            .services
            .ledger
            .commit_manual(id, request.selections)
            .await
    }
    .map_err(map_service_error)?;
    info!(record_id = id, rows = allocations.len(), "Materials allocated");
    Ok(created_response(allocations))
}

/// List ledger rows for a record
async fn get_allocations(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let allocations = state
        .services
        .ledger
        .allocations(id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(allocations))
}

/// Release a record's allocation back to the pool
async fn remove_allocations(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .ledger
        .remove(id)
        .await
        .map_err(map_service_error)?;
    Ok(no_content_response())
}
