//! # Server Configuration
//!
//! This module contains the server setup and configuration for the WebHook receiver.

use std::sync::Arc;

use axum::{
    Json, Router, middleware,
    routing::{any, get},
};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;
use utoipa::OpenApi;

use crate::config::AppConfig;
use crate::handlers;
use crate::receivers::ReceiverRegistry;
use crate::telemetry::trace_context_middleware;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub registry: Arc<ReceiverRegistry>,
}

impl AppState {
    /// Builds state with the registry derived from `config`.
    pub fn from_config(config: AppConfig) -> Self {
        let registry = ReceiverRegistry::from_config(&config);
        Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
        }
    }
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    // Every method is routed so receivers can answer non-POST requests themselves.
    Router::new()
        .route(
            "/webhooks/incoming/{receiver_name}",
            any(handlers::webhooks::receive_default),
        )
        .route(
            "/webhooks/incoming/{receiver_name}/{id}",
            any(handlers::webhooks::receive_with_id),
        )
        .route("/health", get(handlers::health))
        .route("/openapi.json", get(openapi_json))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(trace_context_middleware))
        .with_state(state)
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Starts the server with the given configuration, stopping when `shutdown` is cancelled
pub async fn run_server(
    config: AppConfig,
    shutdown: CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
    // Resolve the configured bind address
    let addr = config
        .bind_addr()
        .map_err(|e| format!("Invalid server address: {}", e))?;
    let profile = config.profile.clone();

    let app = create_app(AppState::from_config(config));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, %profile, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("Server stopped");
    Ok(())
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::health,
        crate::handlers::webhooks::receive_default,
        crate::handlers::webhooks::receive_with_id,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::receivers::CrispRequestData,
        )
    ),
    info(
        title = "Crisp WebHooks Receiver",
        description = "Receives and admits WebHook notifications from Crisp",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_webhook_routes() {
        let doc = ApiDoc::openapi();

        assert!(doc.paths.paths.contains_key("/health"));
        assert!(doc.paths.paths.contains_key("/webhooks/incoming/{receiver_name}"));
        assert!(
            doc.paths
                .paths
                .contains_key("/webhooks/incoming/{receiver_name}/{id}")
        );
    }
}
