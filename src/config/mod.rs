//! Configuration loading for the WebHook receiver service.
//!
//! Loads layered `.env` files and environment variables, producing a typed
//! [`AppConfig`]. Service settings use the `HOOKS_` prefix; receiver secrets
//! use `WEBHOOKS__{RECEIVER}__SECRETKEY__{ID}` (the `__` separator stands for
//! `:` in `WebHooks:{Receiver}:SecretKey:{id}`).

use std::{collections::BTreeMap, env, net::SocketAddr, path::PathBuf, sync::Arc};

use serde::Serialize;
use thiserror::Error;

use crate::secrets::{ReceiverSecrets, parse_secret_key_path};
use crate::transport::TransportPolicy;

const SETTINGS_PREFIX: &str = "HOOKS_";
const MAX_BODY_KB_LIMIT: usize = 10 * 1024;

/// Application configuration derived from `HOOKS_*` and `WEBHOOKS__*` variables.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AppConfig {
    pub profile: String,
    pub api_bind_addr: String,
    pub log_level: String,
    pub log_format: String,
    /// Largest accepted webhook body in KiB
    pub max_body_kb: usize,
    /// Accept plain HTTP outside development profiles
    pub disable_https_check: bool,
    /// Receiver secrets, serialized with values redacted
    pub secrets: ReceiverSecrets,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            api_bind_addr: default_api_bind_addr(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            max_body_kb: default_max_body_kb(),
            disable_https_check: false,
            secrets: ReceiverSecrets::new(),
        }
    }
}

impl AppConfig {
    /// Returns the configured bind address as a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.api_bind_addr.parse()
    }

    /// Returns a JSON representation with secret values redacted.
    pub fn redacted_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn max_body_bytes(&self) -> usize {
        self.max_body_kb * 1024
    }

    /// Shared, immutable view of the receiver secrets.
    pub fn receiver_secrets(&self) -> Arc<ReceiverSecrets> {
        Arc::new(self.secrets.clone())
    }

    pub fn transport_policy(&self) -> TransportPolicy {
        TransportPolicy::from_profile(&self.profile, self.disable_https_check)
    }

    /// Validates the configuration bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_body_kb == 0 || self.max_body_kb > MAX_BODY_KB_LIMIT {
            return Err(ConfigError::InvalidMaxBodySize {
                value: self.max_body_kb,
                max: MAX_BODY_KB_LIMIT,
            });
        }

        if !matches!(self.log_format.as_str(), "json" | "pretty") {
            return Err(ConfigError::InvalidLogFormat {
                value: self.log_format.clone(),
            });
        }

        Ok(())
    }
}

/// Unset profiles require HTTPS; development profiles must be chosen explicitly.
fn default_profile() -> String {
    "production".to_string()
}

fn default_api_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_max_body_kb() -> usize {
    256
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load environment file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },
    #[error("invalid api bind address '{value}': {source}")]
    InvalidBindAddr {
        value: String,
        source: std::net::AddrParseError,
    },
    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: String, value: String },
    #[error("max body size must be between 1 and {max} KB, got {value}")]
    InvalidMaxBodySize { value: usize, max: usize },
    #[error("log format must be 'json' or 'pretty', got '{value}'")]
    InvalidLogFormat { value: String },
}

/// Values gathered from the env layers before typing.
#[derive(Debug, Default)]
struct LayeredValues {
    /// `HOOKS_*` settings with the prefix stripped
    settings: BTreeMap<String, String>,
    /// Secret entries keyed by their normalized configuration path
    secrets: BTreeMap<String, String>,
}

impl LayeredValues {
    fn absorb(&mut self, key: &str, value: String) {
        if let Some(stripped) = key.strip_prefix(SETTINGS_PREFIX) {
            self.settings.insert(stripped.to_string(), value);
        } else if let Some((receiver, id)) = parse_secret_key_path(key) {
            self.secrets
                .insert(format!("webhooks:{receiver}:secretkey:{id}"), value);
        }
    }
}

/// Loads configuration using layered `.env` files and process env vars.
pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    /// Creates a new loader rooted at the current working directory.
    pub fn new() -> Self {
        Self {
            base_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Creates a loader rooted at the provided directory (useful for tests).
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Loads and validates configuration. Later layers win: `.env`,
    /// `.env.local`, `.env.{profile}`, `.env.{profile}.local`, then the
    /// process environment.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let (mut layered, profile_hint) = self.collect_layered_env()?;

        // Overlay process environment last so it wins.
        for (key, value) in env::vars() {
            layered.absorb(&key, value);
        }

        let mut settings = layered.settings;
        let profile = settings
            .remove("PROFILE")
            .filter(|v| !v.is_empty())
            .unwrap_or(profile_hint);
        let api_bind_addr = settings
            .remove("API_BIND_ADDR")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_api_bind_addr);
        let log_level = settings
            .remove("LOG_LEVEL")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_log_level);
        let log_format = settings
            .remove("LOG_FORMAT")
            .filter(|v| !v.is_empty())
            .map(|v| v.to_ascii_lowercase())
            .unwrap_or_else(default_log_format);
        let max_body_kb = match settings.remove("MAX_BODY_KB").filter(|v| !v.is_empty()) {
            Some(value) => value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue {
                    key: "HOOKS_MAX_BODY_KB".to_string(),
                    value,
                })?,
            None => default_max_body_kb(),
        };
        let disable_https_check = match settings
            .remove("DISABLE_HTTPS_CHECK")
            .filter(|v| !v.is_empty())
        {
            Some(value) => parse_bool(&value).ok_or_else(|| ConfigError::InvalidValue {
                key: "HOOKS_DISABLE_HTTPS_CHECK".to_string(),
                value,
            })?,
            None => false,
        };

        let config = AppConfig {
            profile,
            api_bind_addr,
            log_level,
            log_format,
            max_body_kb,
            disable_https_check,
            secrets: ReceiverSecrets::from_config_entries(layered.secrets),
        };

        // Validate configuration
        config.validate()?;

        match config.bind_addr() {
            Ok(_) => Ok(config),
            Err(source) => Err(ConfigError::InvalidBindAddr {
                value: config.api_bind_addr.clone(),
                source,
            }),
        }
    }

    fn collect_layered_env(&self) -> Result<(LayeredValues, String), ConfigError> {
        let mut values = LayeredValues::default();

        self.merge_dotenv(self.base_dir.join(".env"), &mut values)?;
        self.merge_dotenv(self.base_dir.join(".env.local"), &mut values)?;

        let profile = env::var("HOOKS_PROFILE")
            .ok()
            .filter(|v| !v.is_empty())
            .or_else(|| values.settings.get("PROFILE").cloned())
            .unwrap_or_else(default_profile);

        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}", &profile)),
            &mut values,
        )?;
        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}.local", &profile)),
            &mut values,
        )?;

        Ok((values, profile))
    }

    fn merge_dotenv(&self, path: PathBuf, values: &mut LayeredValues) -> Result<(), ConfigError> {
        match dotenvy::from_path_iter(&path) {
            Ok(iter) => {
                for item in iter {
                    let (key, value) = item.map_err(|source| ConfigError::EnvFile {
                        path: path.clone(),
                        source,
                    })?;
                    values.absorb(&key, value);
                }
                Ok(())
            }
            Err(dotenvy::Error::Io(ref io_err))
                if io_err.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(())
            }
            Err(err) => Err(ConfigError::EnvFile { path, source: err }),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ReceiverId;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.bind_addr().is_ok());
        assert_eq!(config.max_body_bytes(), 256 * 1024);
    }

    #[test]
    fn test_invalid_max_body_size() {
        let config = AppConfig {
            max_body_kb: 0,
            ..AppConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidMaxBodySize { value: 0, .. })
        ));
    }

    #[test]
    fn test_invalid_log_format() {
        let config = AppConfig {
            log_format: "xml".to_string(),
            ..AppConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidLogFormat { .. })
        ));
    }

    #[test]
    fn test_transport_policy_follows_profile() {
        let unset = AppConfig::default();
        assert_eq!(unset.profile, "production");
        assert!(unset.transport_policy().requires_https());

        let local = AppConfig {
            profile: "local".to_string(),
            ..AppConfig::default()
        };
        assert!(!local.transport_policy().requires_https());

        let production = AppConfig {
            profile: "production".to_string(),
            ..AppConfig::default()
        };
        assert!(production.transport_policy().requires_https());

        let opted_out = AppConfig {
            profile: "production".to_string(),
            disable_https_check: true,
            ..AppConfig::default()
        };
        assert!(!opted_out.transport_policy().requires_https());
    }

    #[test]
    fn test_redacted_json_hides_secrets() {
        let secret = "01234567890123456789012345678901";
        let config = AppConfig {
            secrets: ReceiverSecrets::new().with_secret("crisp", &ReceiverId::default_id(), secret),
            ..AppConfig::default()
        };

        let json = config.redacted_json().unwrap();
        assert!(json.contains("[REDACTED]"));
        assert!(!json.contains(secret));
    }

    #[test]
    fn test_layered_values_routing() {
        let mut values = LayeredValues::default();
        values.absorb("HOOKS_PROFILE", "test".to_string());
        values.absorb("WEBHOOKS__CRISP__SECRETKEY__DEFAULT", "secret".to_string());
        values.absorb("UNRELATED", "ignored".to_string());

        assert_eq!(values.settings.get("PROFILE").map(String::as_str), Some("test"));
        assert_eq!(
            values
                .secrets
                .get("webhooks:crisp:secretkey:default")
                .map(String::as_str),
            Some("secret")
        );
        assert_eq!(values.settings.len(), 1);
        assert_eq!(values.secrets.len(), 1);
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool(" 0 "), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
