//! Crisp receiver
//!
//! Crisp signs nothing; it calls a registered URL of the form
//! `https://{host}/webhooks/incoming/crisp[/{id}]?key={secret}`. The secret for
//! each id comes from `WebHooks:Crisp:SecretKey:{id}` (or `:default`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use utoipa::ToSchema;

use crate::events::EventFromBody;
use crate::models::EventEnvelope;
use crate::receivers::{DispatchError, WebHookHandler, WebHookReceiver};
use crate::webhook_verification::KeyVerifier;

/// Name of the Crisp receiver in routes and configuration
pub const RECEIVER_NAME: &str = "crisp";

/// Body property containing the Crisp event name
pub const EVENT_BODY_PROPERTY_PATH: &str = "event";

/// Crisp receiver metadata: JSON body, `event` property required.
#[derive(Debug, Clone)]
pub struct CrispReceiver {
    verifier: KeyVerifier,
}

impl CrispReceiver {
    pub fn new(verifier: KeyVerifier) -> Self {
        Self { verifier }
    }
}

impl WebHookReceiver for CrispReceiver {
    fn name(&self) -> &'static str {
        RECEIVER_NAME
    }

    fn event_from_body(&self) -> Option<EventFromBody> {
        Some(EventFromBody {
            body_property_path: EVENT_BODY_PROPERTY_PATH,
            allow_missing: false,
        })
    }

    fn key_verifier(&self) -> &KeyVerifier {
        &self.verifier
    }
}

/// Notification body sent by Crisp
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct CrispRequestData {
    /// Website the event originated from
    #[serde(default)]
    #[schema(example = "8c842203-7ed8-4e29-a608-7cf78a7d2fcc")]
    pub website_id: Option<String>,
    /// Event name, e.g. `message:send`
    #[serde(default)]
    #[schema(example = "message:send")]
    pub event: Option<String>,
    /// Event-specific payload
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub data: Option<Value>,
    /// Unix timestamp (seconds) of the event
    #[serde(default)]
    pub timestamp: Option<i64>,
}

impl CrispRequestData {
    pub fn occurred_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp
            .and_then(|seconds| DateTime::from_timestamp(seconds, 0))
    }
}

/// Default application handler: logs each admitted Crisp event.
#[derive(Debug, Clone, Default)]
pub struct CrispEventLogger;

#[async_trait]
impl WebHookHandler for CrispEventLogger {
    async fn handle(&self, envelope: EventEnvelope) -> Result<(), DispatchError> {
        let data: CrispRequestData = envelope.bind().map_err(|e| DispatchError::Binding {
            receiver_name: envelope.receiver_name.clone(),
            reason: e.to_string(),
        })?;

        info!(
            receiver = %envelope.receiver_name,
            receiver_id = %envelope.receiver_id,
            event = envelope.event.as_deref().unwrap_or_default(),
            website_id = data.website_id.as_deref().unwrap_or_default(),
            occurred_at = ?data.occurred_at(),
            "Crisp WebHook '{}' received event",
            envelope.receiver_id
        );

        Ok(())
    }
}
