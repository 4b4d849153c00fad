//! WebHook receivers
//!
//! A receiver describes one webhook provider to the host: its name, the body
//! format it expects, where the event name lives in that body, and the checks
//! that must pass before the body is bound. Application code reacts to
//! admitted events through a [`WebHookHandler`].

use async_trait::async_trait;
use axum::http::{Method, StatusCode};
use serde_json::Value;

use crate::events::{EventFromBody, extract_event};
use crate::models::{EventEnvelope, IncomingRequest};
use crate::webhook_verification::{KeyVerifier, VerificationError};

pub mod crisp;
pub mod registry;

pub use crisp::{CrispEventLogger, CrispReceiver, CrispRequestData};
pub use registry::{ReceiverRegistry, RegisteredReceiver};

/// Body formats a receiver can accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyType {
    Json,
}

impl BodyType {
    /// Whether `content_type` (including any parameters) is acceptable.
    pub fn accepts(&self, content_type: &str) -> bool {
        let media_type = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match self {
            BodyType::Json => {
                media_type == "application/json"
                    || media_type == "text/json"
                    || media_type.ends_with("+json")
            }
        }
    }
}

/// Errors raised while admitting or binding a webhook request
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("The '{receiver_name}' WebHook receiver does not support the HTTP '{method}' method.")]
    MethodNotAllowed { receiver_name: String, method: String },

    #[error(transparent)]
    Verification(#[from] VerificationError),

    #[error("The '{receiver_name}' WebHook receiver does not support an empty request body.")]
    EmptyBody { receiver_name: String },

    #[error("The '{receiver_name}' WebHook request body exceeds the maximum size of {max_kb} KB.")]
    PayloadTooLarge { receiver_name: String, max_kb: usize },

    #[error("The '{receiver_name}' WebHook receiver does not support content type '{content_type}'.")]
    UnsupportedContentType {
        receiver_name: String,
        content_type: String,
    },

    #[error("The '{receiver_name}' WebHook receiver does not support an invalid request body.")]
    InvalidBody { receiver_name: String },

    #[error("The '{receiver_name}' WebHook request body could not be bound: {reason}")]
    Binding {
        receiver_name: String,
        reason: String,
    },

    #[error("The '{receiver_name}' WebHook receiver failed to process the request.")]
    HandlerFailed {
        receiver_name: String,
        reason: String,
    },
}

impl DispatchError {
    /// Returns the appropriate HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            DispatchError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            DispatchError::Verification(inner) => inner.status_code(),
            DispatchError::EmptyBody { .. } => StatusCode::BAD_REQUEST,
            DispatchError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            DispatchError::UnsupportedContentType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            DispatchError::InvalidBody { .. } => StatusCode::BAD_REQUEST,
            DispatchError::Binding { .. } => StatusCode::BAD_REQUEST,
            DispatchError::HandlerFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Text returned to the caller, `None` for an empty body.
    pub fn response_message(&self) -> Option<String> {
        match self {
            DispatchError::Verification(inner) => inner.response_message(),
            other => Some(other.to_string()),
        }
    }

    /// Stable label for logs and metrics
    pub fn outcome_label(&self) -> &'static str {
        match self {
            DispatchError::MethodNotAllowed { .. } => "rejected_method",
            DispatchError::Verification(inner) => inner.outcome().as_str(),
            DispatchError::EmptyBody { .. } => "rejected_empty_body",
            DispatchError::PayloadTooLarge { .. } => "rejected_payload_too_large",
            DispatchError::UnsupportedContentType { .. } => "rejected_content_type",
            DispatchError::InvalidBody { .. } => "rejected_invalid_body",
            DispatchError::Binding { .. } => "rejected_binding",
            DispatchError::HandlerFailed { .. } => "handler_failed",
        }
    }
}

/// Metadata and admission contract for one webhook provider.
pub trait WebHookReceiver: Send + Sync {
    /// Stable name used in routes and configuration keys
    fn name(&self) -> &'static str;

    fn body_type(&self) -> BodyType {
        BodyType::Json
    }

    /// Event name location, `None` when the receiver has no body event
    fn event_from_body(&self) -> Option<EventFromBody>;

    /// Key verification run before the body is bound
    fn key_verifier(&self) -> &KeyVerifier;

    fn is_applicable(&self, receiver_name: &str) -> bool {
        self.name().eq_ignore_ascii_case(receiver_name)
    }

    /// Checks that run on the request head: method first, then the key.
    fn admit(&self, request: &IncomingRequest) -> Result<(), DispatchError> {
        debug_assert!(self.is_applicable(&request.receiver_name));

        if request.method != Method::POST {
            return Err(DispatchError::MethodNotAllowed {
                receiver_name: self.name().to_string(),
                method: request.method.to_string(),
            });
        }

        self.key_verifier().verify(request)?;
        Ok(())
    }

    /// Validates the body and extracts the event for an admitted request.
    fn bind(&self, request: &IncomingRequest) -> Result<EventEnvelope, DispatchError> {
        bind_body(self.name(), self.body_type(), self.event_from_body(), request)
    }
}

/// Application code invoked with each admitted event.
#[async_trait]
pub trait WebHookHandler: Send + Sync {
    async fn handle(&self, envelope: EventEnvelope) -> Result<(), DispatchError>;
}

/// Shared body validation: non-empty, acceptable content type, JSON object,
/// and (unless allowed to be missing) an event name.
pub fn bind_body(
    receiver_name: &str,
    body_type: BodyType,
    event_from_body: Option<EventFromBody>,
    request: &IncomingRequest,
) -> Result<EventEnvelope, DispatchError> {
    let allow_missing = event_from_body.is_none_or(|metadata| metadata.allow_missing);

    if request.body.is_empty() {
        if !allow_missing {
            return Err(DispatchError::EmptyBody {
                receiver_name: receiver_name.to_string(),
            });
        }
        return Ok(EventEnvelope {
            receiver_name: receiver_name.to_string(),
            receiver_id: request.receiver_id.clone(),
            event: None,
            payload: Value::Null,
        });
    }

    if let Some(content_type) = request.content_type.as_deref()
        && !body_type.accepts(content_type)
    {
        return Err(DispatchError::UnsupportedContentType {
            receiver_name: receiver_name.to_string(),
            content_type: content_type.to_string(),
        });
    }

    let invalid_body = || DispatchError::InvalidBody {
        receiver_name: receiver_name.to_string(),
    };

    let payload: Value = serde_json::from_slice(&request.body).map_err(|_| invalid_body())?;
    if !payload.is_object() {
        return Err(invalid_body());
    }

    let event = event_from_body.and_then(|metadata| extract_event(&payload, metadata.body_property_path));
    if event.is_none() && !allow_missing {
        return Err(invalid_body());
    }

    Ok(EventEnvelope {
        receiver_name: receiver_name.to_string(),
        receiver_id: request.receiver_id.clone(),
        event,
        payload,
    })
}
