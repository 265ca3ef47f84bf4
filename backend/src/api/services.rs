//! Service API handlers
//!
//! Contains HTTP request handlers for service CRUD operations.

use crate::api::extract::{IdParam, ValidatedJson, ValidatedPath};
use crate::error::AppError;
use crate::models::Service;
use crate::repository::UpdateService;
use crate::state::AppState;
use axum::{extract::State, http::StatusCode, response::Json};
use serde::Deserialize;
use tracing::info;
use validator::Validate;

/// Create service request
#[derive(Debug, Deserialize, Validate)]
pub struct AddServiceRequest {
    /// Name for the new service
    #[validate(length(min = 1))]
    pub name: String,
}

/// Rename service request
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateServiceRequest {
    /// New name for the service
    #[validate(length(min = 1))]
    pub name: String,
}

/// POST /api/v1/services - Create a new service
pub async fn add_service(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<AddServiceRequest>,
) -> Result<Json<Service>, AppError> {
    let service = state.repository.add_service(&request.name).await?;
    info!(service_id = service.service_id, name = %service.name, "Service created");
    Ok(Json(service))
}

/// GET /api/v1/services/:id - Get a specific service
pub async fn get_service(
    State(state): State<AppState>,
    ValidatedPath(IdParam { id }): ValidatedPath<IdParam>,
) -> Result<Json<Service>, AppError> {
    Ok(Json(state.repository.get_service(id).await?))
}

/// GET /api/v1/services - List all services
pub async fn list_services(State(state): State<AppState>) -> Result<Json<Vec<Service>>, AppError> {
    Ok(Json(state.repository.list_services().await?))
}

/// PUT /api/v1/services/:id - Rename a service
pub async fn update_service(
    State(state): State<AppState>,
    ValidatedPath(IdParam { id }): ValidatedPath<IdParam>,
    ValidatedJson(request): ValidatedJson<UpdateServiceRequest>,
) -> Result<StatusCode, AppError> {
    state
        .repository
        .update_service(&UpdateService {
            service_id: id,
            name: request.name,
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/v1/services/:id - Delete a service
pub async fn remove_service(
    State(state): State<AppState>,
    ValidatedPath(IdParam { id }): ValidatedPath<IdParam>,
) -> Result<StatusCode, AppError> {
    state.repository.remove_service(id).await?;
    info!(service_id = id, "Service deleted");
    Ok(StatusCode::NO_CONTENT)
}
