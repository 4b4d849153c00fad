//! # Error Handling
//!
//! This module converts admission and dispatch failures into HTTP responses.
//! WebHook senders get a plain-text message (or an empty body where the
//! message would reveal configuration) with a deterministic status code.

use axum::{
    http::{HeaderValue, StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};

use crate::receivers::DispatchError;
use crate::webhook_verification::VerificationError;

const TEXT_PLAIN_UTF8: &str = "text/plain; charset=utf-8";

/// Unified API error response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    /// HTTP status code for the response
    pub status: StatusCode,
    /// Stable label used in logs and metrics
    pub code: &'static str,
    /// Human-readable message, `None` for an empty body
    pub message: Option<Box<str>>,
}

impl ApiError {
    /// Create a new API error with the given status code and message
    pub fn new<S: Into<String>>(status: StatusCode, code: &'static str, message: S) -> Self {
        Self {
            status,
            code,
            message: Some(message.into().into_boxed_str()),
        }
    }

    /// Create an API error whose response body is empty
    pub fn empty(status: StatusCode, code: &'static str) -> Self {
        Self {
            status,
            code,
            message: None,
        }
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self.message {
            Some(message) => {
                let mut response = (self.status, String::from(message)).into_response();
                response
                    .headers_mut()
                    .insert(CONTENT_TYPE, HeaderValue::from_static(TEXT_PLAIN_UTF8));
                response
            }
            None => self.status.into_response(),
        }
    }
}

impl From<DispatchError> for ApiError {
    fn from(error: DispatchError) -> Self {
        Self {
            status: error.status_code(),
            code: error.outcome_label(),
            message: error.response_message().map(String::into_boxed_str),
        }
    }
}

impl From<VerificationError> for ApiError {
    fn from(error: VerificationError) -> Self {
        ApiError::from(DispatchError::from(error))
    }
}

/// 404 with an empty body, used for unknown receivers and ids
pub fn not_found() -> ApiError {
    ApiError::empty(StatusCode::NOT_FOUND, "not_found")
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_api_error_basic() {
        let error = ApiError::new(StatusCode::BAD_REQUEST, "bad_request", "Invalid input");

        assert_eq!(error.status, StatusCode::BAD_REQUEST);
        assert_eq!(error.code, "bad_request");
        assert_eq!(error.message(), Some("Invalid input"));
    }

    #[tokio::test]
    async fn test_plain_text_response() {
        let response = ApiError::new(StatusCode::BAD_REQUEST, "bad_request", "Nope").into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "text/plain; charset=utf-8"
        );
        assert_eq!(body_text(response).await, "Nope");
    }

    #[tokio::test]
    async fn test_not_found_has_empty_body() {
        let response = not_found().into_response();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(body_text(response).await.is_empty());
    }

    #[tokio::test]
    async fn test_from_verification_error() {
        let error = ApiError::from(VerificationError::KeyMismatch);
        assert_eq!(error.status, StatusCode::BAD_REQUEST);
        assert_eq!(error.code, "rejected_key_mismatch");

        let unknown = ApiError::from(VerificationError::UnknownReceiver {
            receiver_name: "crisp".to_string(),
            receiver_id: "missing".to_string(),
        });
        assert_eq!(unknown.status, StatusCode::NOT_FOUND);
        assert_eq!(unknown.message(), None);
        assert!(body_text(unknown.into_response()).await.is_empty());
    }

    #[test]
    fn test_from_dispatch_error() {
        let error = ApiError::from(DispatchError::MethodNotAllowed {
            receiver_name: "crisp".to_string(),
            method: "GET".to_string(),
        });

        assert_eq!(error.status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(
            error.message(),
            Some("The 'crisp' WebHook receiver does not support the HTTP 'GET' method.")
        );
    }
}
