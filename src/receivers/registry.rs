//! Receiver registry
//!
//! Maps receiver names (case-insensitive) to their metadata and application
//! handler. Built once at startup and shared read-only through app state.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;

use crate::config::AppConfig;
use crate::receivers::{CrispEventLogger, CrispReceiver, WebHookHandler, WebHookReceiver};
use crate::webhook_verification::KeyVerifier;

/// A receiver paired with the handler for its admitted events
#[derive(Clone)]
pub struct RegisteredReceiver {
    pub receiver: Arc<dyn WebHookReceiver>,
    pub handler: Arc<dyn WebHookHandler>,
}

/// Registry of available webhook receivers
#[derive(Clone, Default)]
pub struct ReceiverRegistry {
    receivers: BTreeMap<String, RegisteredReceiver>,
}

impl ReceiverRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the registry for `config`: every built-in receiver shares the
    /// configured secrets and transport policy.
    pub fn from_config(config: &AppConfig) -> Self {
        let verifier = KeyVerifier::new(config.receiver_secrets(), config.transport_policy());

        let mut registry = Self::new();
        registry.register(
            Arc::new(CrispReceiver::new(verifier)),
            Arc::new(CrispEventLogger),
        );

        info!(
            receivers = ?registry.names().collect::<Vec<_>>(),
            "Registered WebHook receivers"
        );
        registry
    }

    /// Registers `receiver`, replacing any receiver with the same name.
    pub fn register(
        &mut self,
        receiver: Arc<dyn WebHookReceiver>,
        handler: Arc<dyn WebHookHandler>,
    ) {
        self.receivers.insert(
            receiver.name().to_lowercase(),
            RegisteredReceiver { receiver, handler },
        );
    }

    /// Looks up a receiver by name, ignoring case.
    pub fn get(&self, receiver_name: &str) -> Option<&RegisteredReceiver> {
        self.receivers.get(&receiver_name.to_lowercase())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.receivers.keys().map(String::as_str)
    }
}
