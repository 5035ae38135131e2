use super::common::{
    created_response, map_service_error, no_content_response, success_response,
};
use crate::{
    errors::ApiError,
    handlers::AppState,
    services::lot_pool::{AddLotInput, LotFilter},
};
use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{delete, get, post},
    Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::info;

/// Creates the router for COC lot endpoints
pub fn lot_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_lots))
        .route("/", post(add_lot))
        .route("/stock", get(material_stock))
        .route("/available", get(list_available))
        .route("/sync", post(sync_lots))
        .route("/:id", get(get_lot))
        .route("/:id", delete(delete_lot))
}

#[derive(Debug, Deserialize)]
struct AvailableQuery {
    material: String,
}

#[derive(Debug, Deserialize)]
struct StockQuery {
    material: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SyncRequest {
    from_date: Option<NaiveDate>,
    to_date: Option<NaiveDate>,
}

/// List lots, oldest invoice first
async fn list_lots(
    State(state): State<AppState>,
    Query(filter): Query<LotFilter>,
) -> Result<impl IntoResponse, ApiError> {
    let lots = state
        .services
        .lot_pool
        .list_lots(filter)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(lots))
}

/// FIFO snapshot of lots with available quantity for one material
async fn list_available(
    State(state): State<AppState>,
    Query(query): Query<AvailableQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let lots = state
        .services
        .lot_pool
        .list_available(&query.material)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(lots))
}

/// Per-material stock totals
async fn material_stock(
    State(state): State<AppState>,
    Query(query): Query<StockQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let stock = state
        .services
        .lot_pool
        .material_stock(query.material)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(stock))
}

/// Manually enter a lot
async fn add_lot(
    State(state): State<AppState>,
    Json(payload): Json<AddLotInput>,
) -> Result<impl IntoResponse, ApiError> {
    let lot = state
        .services
        .lot_pool
        .add_lot(payload)
        .await
        .map_err(map_service_error)?;
    info!(lot_id = lot.id, material = %lot.material_type, "Lot added manually");
    Ok(created_response(lot))
}

/// Pull the upstream COC feed for a date window
async fn sync_lots(
    State(state): State<AppState>,
    payload: Option<Json<SyncRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let request = payload.map(|Json(r)| r).unwrap_or_default();
    let outcome = state
        .services
        .lot_pool
        .sync(request.from_date, request.to_date)
        .await
        .map_err(map_service_error)?;
    info!(
        added = outcome.added,
        updated = outcome.updated,
        errors = outcome.errors,
        "COC lot sync finished"
    );
    Ok(success_response(outcome))
}

/// Get a lot by id
async fn get_lot(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let lot = state
        .services
        .lot_pool
        .get_lot(id)
        .await
        .map_err(map_service_error)?
        .ok_or_else(|| ApiError::NotFound(format!("Lot {} not found", id)))?;
    Ok(success_response(lot))
}

/// Delete a lot with no recorded consumption
async fn delete_lot(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .lot_pool
        .delete_lot(id)
        .await
        .map_err(map_service_error)?;
    Ok(no_content_response())
}
