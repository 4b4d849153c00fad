//! # API Handlers
//!
//! This module contains the HTTP endpoint handlers for the WebHook receiver service.

use crate::models::ServiceInfo;
use axum::response::Json;

pub mod webhooks;

/// Health handler that returns basic service information
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service information", body = ServiceInfo)
    ),
    tag = "health"
)]
pub async fn health() -> Json<ServiceInfo> {
    Json(ServiceInfo::default())
}
