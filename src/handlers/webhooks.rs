//! # Webhook Handlers
//!
//! Public entry points for incoming webhook notifications. Every request runs
//! the same pipeline: receiver lookup, method check, key verification, body
//! read and binding, then the receiver's application handler.

use axum::{
    body::to_bytes,
    extract::{Path, Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use metrics::counter;
use serde::Deserialize;
use tracing::{debug, error, info, warn};
use utoipa::IntoParams;

use crate::error::{ApiError, not_found};
use crate::models::{IncomingRequest, ReceiverId};
use crate::receivers::DispatchError;
use crate::server::AppState;
use crate::telemetry::current_request_id;

const ACCEPTED_OUTCOME: &str = "accepted";
const UNKNOWN_RECEIVER: &str = "unknown";

/// Path parameters for the default receiver route
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Path)]
pub struct ReceiverPath {
    /// Receiver name (e.g., "crisp")
    #[param(min_length = 1, example = "crisp")]
    pub receiver_name: String,
}

/// Path parameters for the receiver route with an id
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Path)]
pub struct ReceiverIdPath {
    /// Receiver name (e.g., "crisp")
    #[param(min_length = 1, example = "crisp")]
    pub receiver_name: String,
    /// Receiver id selecting the secret configuration
    #[param(min_length = 1, example = "It")]
    pub id: String,
}

/// Query string carrying the shared secret
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct KeyQuery {
    /// Shared secret registered with the sender
    pub key: String,
}

/// Receive a webhook for the receiver's default configuration
#[utoipa::path(
    post,
    path = "/webhooks/incoming/{receiver_name}",
    params(ReceiverPath, KeyQuery),
    request_body(content = crate::receivers::CrispRequestData, content_type = "application/json"),
    responses(
        (status = 200, description = "Notification accepted"),
        (status = 400, description = "Missing or mismatched key, or invalid body", body = String, content_type = "text/plain"),
        (status = 403, description = "HTTPS required", body = String, content_type = "text/plain"),
        (status = 404, description = "Unknown receiver or unconfigured id"),
        (status = 405, description = "Method other than POST", body = String, content_type = "text/plain"),
        (status = 413, description = "Body too large", body = String, content_type = "text/plain"),
        (status = 415, description = "Unsupported content type", body = String, content_type = "text/plain"),
    ),
    tag = "webhooks"
)]
pub async fn receive_default(
    State(state): State<AppState>,
    Path(path): Path<ReceiverPath>,
    request: Request,
) -> Response {
    receive(&state, &path.receiver_name, ReceiverId::default_id(), request).await
}

/// Receive a webhook for a specific receiver id
#[utoipa::path(
    post,
    path = "/webhooks/incoming/{receiver_name}/{id}",
    params(ReceiverIdPath, KeyQuery),
    request_body(content = crate::receivers::CrispRequestData, content_type = "application/json"),
    responses(
        (status = 200, description = "Notification accepted"),
        (status = 400, description = "Missing or mismatched key, or invalid body", body = String, content_type = "text/plain"),
        (status = 403, description = "HTTPS required", body = String, content_type = "text/plain"),
        (status = 404, description = "Unknown receiver or unconfigured id"),
        (status = 405, description = "Method other than POST", body = String, content_type = "text/plain"),
        (status = 413, description = "Body too large", body = String, content_type = "text/plain"),
        (status = 415, description = "Unsupported content type", body = String, content_type = "text/plain"),
    ),
    tag = "webhooks"
)]
pub async fn receive_with_id(
    State(state): State<AppState>,
    Path(path): Path<ReceiverIdPath>,
    request: Request,
) -> Response {
    receive(&state, &path.receiver_name, ReceiverId::new(path.id), request).await
}

async fn receive(
    state: &AppState,
    receiver_name: &str,
    receiver_id: ReceiverId,
    request: Request,
) -> Response {
    let outcome = admit_and_dispatch(state, receiver_name, receiver_id, request).await;

    let label = match &outcome {
        Ok(()) => ACCEPTED_OUTCOME,
        Err(api_error) => api_error.code,
    };
    // Unregistered names share one series.
    let receiver_label = state
        .registry
        .get(receiver_name)
        .map_or(UNKNOWN_RECEIVER, |registered| registered.receiver.name());
    counter!(
        "webhook_requests_total",
        "receiver" => receiver_label,
        "outcome" => label
    )
    .increment(1);

    match outcome {
        Ok(()) => StatusCode::OK.into_response(),
        Err(api_error) => api_error.into_response(),
    }
}

async fn admit_and_dispatch(
    state: &AppState,
    receiver_name: &str,
    receiver_id: ReceiverId,
    request: Request,
) -> Result<(), ApiError> {
    let Some(registered) = state.registry.get(receiver_name) else {
        debug!(receiver = %receiver_name, "No WebHook receiver registered under this name");
        return Err(not_found());
    };
    let receiver = registered.receiver.as_ref();

    let (parts, body) = request.into_parts();
    let incoming = IncomingRequest::from_parts(&parts, receiver.name(), receiver_id);

    receiver
        .admit(&incoming)
        .inspect_err(|e| log_rejection(&incoming, e))?;

    let body = to_bytes(body, state.config.max_body_bytes())
        .await
        .map_err(|e| {
            let rejection = DispatchError::PayloadTooLarge {
                receiver_name: receiver.name().to_string(),
                max_kb: state.config.max_body_kb,
            };
            debug!(error = %e, "Failed to read WebHook request body");
            log_rejection(&incoming, &rejection);
            rejection
        })?;
    let incoming = incoming.with_body(body);

    let envelope = receiver
        .bind(&incoming)
        .inspect_err(|e| log_rejection(&incoming, e))?;

    info!(
        receiver = %incoming.receiver_name,
        receiver_id = %incoming.receiver_id,
        request_id = %current_request_id().unwrap_or_default(),
        event = envelope.event.as_deref().unwrap_or_default(),
        "Admitted WebHook request"
    );

    registered.handler.handle(envelope).await.map_err(|e| {
        error!(
            receiver = %incoming.receiver_name,
            receiver_id = %incoming.receiver_id,
            request_id = %current_request_id().unwrap_or_default(),
            error = %e,
            "WebHook handler failed"
        );
        ApiError::from(e)
    })
}

fn log_rejection(request: &IncomingRequest, error: &DispatchError) {
    warn!(
        receiver = %request.receiver_name,
        receiver_id = %request.receiver_id,
        method = %request.method,
        request_id = %current_request_id().unwrap_or_default(),
        outcome = error.outcome_label(),
        status = error.status_code().as_u16(),
        "Rejected WebHook request"
    );
}
