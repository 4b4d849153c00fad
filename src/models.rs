//! # Data Models
//!
//! Request-scoped types shared by the admission pipeline and receivers.

use std::fmt;

use axum::{
    body::Bytes,
    http::{Method, header::CONTENT_TYPE, request::Parts},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use utoipa::ToSchema;

use crate::transport::request_scheme;

/// Configuration segment used when a route carries no receiver id.
pub const DEFAULT_RECEIVER_ID: &str = "default";

/// Sub-identifier selecting one of several secret configurations for a receiver.
///
/// Ids are compared case-insensitively. An empty id selects the default
/// configuration entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReceiverId(String);

impl ReceiverId {
    pub fn new(value: impl Into<String>) -> Self {
        ReceiverId(value.into())
    }

    /// The id used for routes without an `{id}` segment.
    pub fn default_id() -> Self {
        ReceiverId(String::new())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_default(&self) -> bool {
        self.0.is_empty()
    }

    /// Normalized configuration segment for this id.
    pub fn config_segment(&self) -> String {
        if self.0.is_empty() {
            DEFAULT_RECEIVER_ID.to_string()
        } else {
            self.0.to_lowercase()
        }
    }
}

impl PartialEq for ReceiverId {
    fn eq(&self, other: &Self) -> bool {
        self.config_segment() == other.config_segment()
    }
}

impl Eq for ReceiverId {}

impl fmt::Display for ReceiverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str(DEFAULT_RECEIVER_ID)
        } else {
            f.write_str(&self.0)
        }
    }
}

/// A webhook request as seen by the admission pipeline.
#[derive(Debug, Clone)]
pub struct IncomingRequest {
    pub receiver_name: String,
    pub receiver_id: ReceiverId,
    /// Lower-case scheme the client used (`http` or `https`)
    pub scheme: String,
    pub method: Method,
    /// Decoded query parameters in request order
    pub query: Vec<(String, String)>,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl IncomingRequest {
    /// Captures everything but the body from the request head.
    pub fn from_parts(parts: &Parts, receiver_name: &str, receiver_id: ReceiverId) -> Self {
        let query: Vec<(String, String)> = parts
            .uri
            .query()
            .map(|query| {
                url::form_urlencoded::parse(query.as_bytes())
                    .into_owned()
                    .collect()
            })
            .unwrap_or_default();

        let content_type = parts
            .headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        Self {
            receiver_name: receiver_name.to_string(),
            receiver_id,
            scheme: request_scheme(&parts.headers, &parts.uri),
            method: parts.method.clone(),
            query,
            content_type,
            body: Bytes::new(),
        }
    }

    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = body;
        self
    }

    /// First value of the query parameter `name`, matched case-insensitively.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// An admitted webhook notification handed to application code.
#[derive(Debug, Clone, Serialize)]
pub struct EventEnvelope {
    /// Receiver name from the matched route (e.g. "crisp")
    pub receiver_name: String,
    /// Receiver id from the matched route
    pub receiver_id: ReceiverId,
    /// Event name extracted from the body, if present
    pub event: Option<String>,
    /// Full parsed request body
    pub payload: serde_json::Value,
}

impl EventEnvelope {
    /// Binds the payload to a typed request model.
    pub fn bind<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.payload)
    }
}

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
    /// Health status
    pub status: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            status: "ok".to_string(),
        }
    }
}
