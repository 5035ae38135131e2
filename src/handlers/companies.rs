use super::common::{
    created_response, map_service_error, no_content_response, success_response, validate_input,
};
use crate::{
    errors::ApiError,
    handlers::AppState,
    services::production::{CreateCompanyInput, CreateRejectionInput, UpdateCompanyInput},
};
use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{delete, get, post, put},
    Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::info;
use validator::Validate;

/// Creates the router for company and rejected-module endpoints
pub fn company_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_company))
        .route("/", get(list_companies))
        .route("/:id", get(get_company))
        .route("/:id", put(update_company))
        .route("/:id", delete(delete_company))
        .route("/:id/rejections", post(create_rejection))
        .route("/:id/rejections", get(list_rejections))
        .route("/:id/rejections", delete(delete_rejections_for_date))
        .route("/:id/rejections/bulk", post(create_rejections_bulk))
        .route("/:id/rejections/:rejection_id", delete(delete_rejection))
}

#[derive(Debug, Deserialize, Validate)]
struct RejectionRequest {
    #[validate(length(min = 1, max = 100))]
    serial_number: String,
    rejection_date: NaiveDate,
    #[validate(length(min = 1, max = 500))]
    reason: String,
    #[validate(length(min = 1, max = 100))]
    stage: String,
}

impl RejectionRequest {
    fn into_input(self, company_id: i32) -> CreateRejectionInput {
        CreateRejectionInput {
            company_id,
            serial_number: self.serial_number,
            rejection_date: self.rejection_date,
            reason: self.reason,
            stage: self.stage,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RejectionQuery {
    date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
struct RejectionDateQuery {
    date: NaiveDate,
}

/// Create a company
async fn create_company(
    State(state): State<AppState>,
    Json(payload): Json<CreateCompanyInput>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let company = state
        .services
        .production
        .create_company(payload)
        .await
        .map_err(map_service_error)?;
    info!(company_id = company.id, name = %company.company_name, "Company created");
    Ok(created_response(company))
}

/// List companies
async fn list_companies(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let companies = state
        .services
        .production
        .list_companies()
        .await
        .map_err(map_service_error)?;
    Ok(success_response(companies))
}

/// Get a company
async fn get_company(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let company = state
        .services
        .production
        .get_company(id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(company))
}

/// Update a company
async fn update_company(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateCompanyInput>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let company = state
        .services
        .production
        .update_company(id, payload)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(company))
}

/// Delete a company without production history
async fn delete_company(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .production
        .delete_company(id)
        .await
        .map_err(map_service_error)?;
    Ok(no_content_response())
}

/// Record one rejected module
async fn create_rejection(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<RejectionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let rejection = state
        .services
        .production
        .create_rejection(payload.into_input(id))
        .await
        .map_err(map_service_error)?;
    Ok(created_response(rejection))
}

/// Record a batch of rejected modules
async fn create_rejections_bulk(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<Vec<RejectionRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    for request in &payload {
        validate_input(request)?;
    }
    let inputs = payload.into_iter().map(|r| r.into_input(id)).collect();
    let rejections = state
        .services
        .production
        .create_rejections(inputs)
        .await
        .map_err(map_service_error)?;
    info!(company_id = id, count = rejections.len(), "Rejected modules recorded");
    Ok(created_response(rejections))
}

/// List a company's rejected modules, optionally for one day
async fn list_rejections(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Query(query): Query<RejectionQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let rejections = state
        .services
        .production
        .list_rejections(id, query.date)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(rejections))
}

/// Delete one rejected-module entry
async fn delete_rejection(
    State(state): State<AppState>,
    Path((_id, rejection_id)): Path<(i32, i32)>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .production
        .delete_rejection(rejection_id)
        .await
        .map_err(map_service_error)?;
    Ok(no_content_response())
}

/// Clear a company's rejections for one day
async fn delete_rejections_for_date(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Query(query): Query<RejectionDateQuery>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .production
        .delete_rejections_for_date(id, query.date)
        .await
        .map_err(map_service_error)?;
    Ok(no_content_response())
}
