//! Receiver secret resolution
//!
//! Holds the `WebHooks:{receiver}:SecretKey:{id}` mapping loaded at startup
//! and resolves the expected secret for a request's receiver and id.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, error};

use crate::crypto::{MAX_SECRET_KEY_LENGTH, SecretKey};
use crate::models::ReceiverId;

const CONFIG_ROOT: &str = "webhooks";
const SECRET_KEY_SECTION: &str = "secretkey";

/// Immutable mapping of `{receiver}:{id}` to the configured secret.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct ReceiverSecrets {
    entries: BTreeMap<String, SecretKey>,
}

impl ReceiverSecrets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the mapping from raw configuration entries, keeping only keys of
    /// the form `WebHooks:{receiver}:SecretKey:{id}` (or the `__` separated
    /// environment variable spelling).
    pub fn from_config_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut secrets = Self::new();
        for (key, value) in entries {
            if let Some((receiver_name, receiver_id)) = parse_secret_key_path(key.as_ref()) {
                secrets.insert(&receiver_name, &ReceiverId::new(receiver_id), value);
            }
        }
        secrets
    }

    /// Adds or replaces a secret.
    pub fn insert(&mut self, receiver_name: &str, receiver_id: &ReceiverId, value: impl Into<String>) {
        self.entries
            .insert(entry_key(receiver_name, receiver_id), SecretKey::new(value));
    }

    /// Builder-style variant of [`ReceiverSecrets::insert`].
    pub fn with_secret(
        mut self,
        receiver_name: &str,
        receiver_id: &ReceiverId,
        value: impl Into<String>,
    ) -> Self {
        self.insert(receiver_name, receiver_id, value);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Configuration keys (never values) for startup logging.
    pub fn configured_keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Resolves the expected secret for `receiver_name` and `receiver_id`.
    ///
    /// A secret whose length falls outside `[min_length, 128]` is treated as
    /// absent so that a misconfigured short key cannot weaken verification.
    pub fn resolve_secret(
        &self,
        receiver_name: &str,
        receiver_id: &ReceiverId,
        min_length: usize,
    ) -> Option<&SecretKey> {
        debug_assert!(!receiver_name.is_empty(), "receiver name must not be empty");

        let key = entry_key(receiver_name, receiver_id);
        let Some(secret) = self.entries.get(&key) else {
            debug!(config_key = %key, "No secret key configured for receiver");
            return None;
        };

        let length = secret.char_len();
        if length < min_length || length > MAX_SECRET_KEY_LENGTH {
            error!(
                config_key = %key,
                min_length,
                max_length = MAX_SECRET_KEY_LENGTH,
                "Configured secret key has an invalid length; treating receiver as not configured"
            );
            return None;
        }

        Some(secret)
    }
}

fn entry_key(receiver_name: &str, receiver_id: &ReceiverId) -> String {
    format!(
        "{}:{}",
        receiver_name.to_lowercase(),
        receiver_id.config_segment()
    )
}

/// Splits `WebHooks:{receiver}:SecretKey:{id}` into `(receiver, id)`.
///
/// Segments may be separated by `:` or by `__`; matching is
/// case-insensitive.
pub fn parse_secret_key_path(key: &str) -> Option<(String, String)> {
    let segments: Vec<&str> = if key.contains(':') {
        key.split(':').collect()
    } else {
        key.split("__").collect()
    };

    match segments.as_slice() {
        [root, receiver, section, id]
            if root.eq_ignore_ascii_case(CONFIG_ROOT)
                && section.eq_ignore_ascii_case(SECRET_KEY_SECTION)
                && !receiver.is_empty()
                && !id.is_empty() =>
        {
            Some((receiver.to_lowercase(), id.to_lowercase()))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "01234567890123456789012345678901";

    #[test]
    fn test_parse_colon_path() {
        assert_eq!(
            parse_secret_key_path("WebHooks:Crisp:SecretKey:default"),
            Some(("crisp".to_string(), "default".to_string()))
        );
    }

    #[test]
    fn test_parse_env_path() {
        assert_eq!(
            parse_secret_key_path("WEBHOOKS__CRISP__SECRETKEY__SUPPORT_TEAM"),
            Some(("crisp".to_string(), "support_team".to_string()))
        );
    }

    #[test]
    fn test_parse_rejects_other_keys() {
        assert_eq!(parse_secret_key_path("WEBHOOKS__CRISP__TOKEN__DEFAULT"), None);
        assert_eq!(parse_secret_key_path("WebHooks:Crisp:SecretKey"), None);
        assert_eq!(parse_secret_key_path("Other:Crisp:SecretKey:default"), None);
        assert_eq!(parse_secret_key_path("WebHooks:Crisp:SecretKey:"), None);
    }

    #[test]
    fn test_resolve_default_entry() {
        let secrets = ReceiverSecrets::from_config_entries([(
            "WebHooks:Crisp:SecretKey:default",
            SECRET,
        )]);

        let secret = secrets
            .resolve_secret("crisp", &ReceiverId::default_id(), 32)
            .expect("default secret resolves");
        assert!(secret.matches(SECRET));
    }

    #[test]
    fn test_resolve_is_case_insensitive() {
        let secrets = ReceiverSecrets::from_config_entries([(
            "WEBHOOKS__CRISP__SECRETKEY__IT",
            SECRET,
        )]);

        assert!(secrets.resolve_secret("Crisp", &ReceiverId::new("it"), 32).is_some());
        assert!(secrets.resolve_secret("CRISP", &ReceiverId::new("It"), 32).is_some());
    }

    #[test]
    fn test_ids_do_not_fall_back_to_default() {
        let secrets = ReceiverSecrets::new().with_secret("crisp", &ReceiverId::default_id(), SECRET);

        assert!(secrets.resolve_secret("crisp", &ReceiverId::new("unknown"), 32).is_none());
    }

    #[test]
    fn test_receivers_do_not_share_secrets() {
        let secrets = ReceiverSecrets::new().with_secret("crisp", &ReceiverId::default_id(), SECRET);

        assert!(secrets.resolve_secret("other", &ReceiverId::default_id(), 32).is_none());
    }

    #[test]
    fn test_short_secret_fails_closed() {
        let secrets = ReceiverSecrets::new().with_secret("crisp", &ReceiverId::default_id(), "too-short");

        assert!(secrets.resolve_secret("crisp", &ReceiverId::default_id(), 32).is_none());
    }

    #[test]
    fn test_long_secret_fails_closed() {
        let long = "a".repeat(129);
        let secrets = ReceiverSecrets::new().with_secret("crisp", &ReceiverId::default_id(), long);

        assert!(secrets.resolve_secret("crisp", &ReceiverId::default_id(), 32).is_none());

        let max = "a".repeat(128);
        let secrets = ReceiverSecrets::new().with_secret("crisp", &ReceiverId::default_id(), max);
        assert!(secrets.resolve_secret("crisp", &ReceiverId::default_id(), 32).is_some());
    }

    #[test]
    fn test_serialization_redacts_values() {
        let secrets = ReceiverSecrets::new().with_secret("crisp", &ReceiverId::default_id(), SECRET);
        let json = serde_json::to_string(&secrets).unwrap();

        assert!(json.contains("crisp:default"));
        assert!(!json.contains(SECRET));
    }
}
