//! HTTPS enforcement for webhook receivers
//!
//! Receivers that authenticate with a query-string secret must only be
//! reachable over HTTPS. Development profiles and an explicit opt-out setting
//! skip the check.

use axum::http::{HeaderMap, Uri};
use tracing::warn;

/// Profiles where plain HTTP is accepted.
pub const DEVELOPMENT_PROFILES: &[&str] = &["local", "test", "development"];

const FORWARDED_PROTO_HEADER: &str = "x-forwarded-proto";
const HTTPS_SCHEME: &str = "https";

/// Transport requirement derived from configuration at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportPolicy {
    require_https: bool,
}

impl TransportPolicy {
    /// HTTPS is required unless `profile` is a development profile or the
    /// check is explicitly disabled.
    pub fn from_profile(profile: &str, disable_https_check: bool) -> Self {
        let is_development = DEVELOPMENT_PROFILES
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(profile));
        Self {
            require_https: !is_development && !disable_https_check,
        }
    }

    pub fn require_https() -> Self {
        Self {
            require_https: true,
        }
    }

    pub fn allow_insecure() -> Self {
        Self {
            require_https: false,
        }
    }

    pub fn requires_https(&self) -> bool {
        self.require_https
    }

    /// Rejects requests not made over HTTPS when the policy requires it.
    pub fn ensure_secure_connection(
        &self,
        receiver_name: &str,
        scheme: &str,
    ) -> Result<(), InsecureTransport> {
        if !self.require_https || scheme.eq_ignore_ascii_case(HTTPS_SCHEME) {
            return Ok(());
        }

        warn!(
            receiver = %receiver_name,
            scheme = %scheme,
            "Rejecting WebHook request not made over HTTPS"
        );
        Err(InsecureTransport {
            receiver_name: receiver_name.to_string(),
        })
    }
}

/// Rejection produced when a request arrives over plain HTTP.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "The WebHook receiver '{receiver_name}' requires HTTPS in order to be secure. Please register a WebHook URI of type 'https'."
)]
pub struct InsecureTransport {
    pub receiver_name: String,
}

/// Determines the scheme the client used.
///
/// Behind a reverse proxy the first `X-Forwarded-Proto` value wins; otherwise
/// the request URI's scheme is used, defaulting to `http`.
pub fn request_scheme(headers: &HeaderMap, uri: &Uri) -> String {
    headers
        .get(FORWARDED_PROTO_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_ascii_lowercase())
        .filter(|value| !value.is_empty())
        .or_else(|| uri.scheme_str().map(str::to_ascii_lowercase))
        .unwrap_or_else(|| "http".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_development_profiles_skip_check() {
        for profile in ["local", "test", "development", "Development"] {
            let policy = TransportPolicy::from_profile(profile, false);
            assert!(!policy.requires_https(), "profile {profile}");
            assert!(policy.ensure_secure_connection("crisp", "http").is_ok());
        }
    }

    #[test]
    fn test_production_requires_https() {
        let policy = TransportPolicy::from_profile("production", false);
        assert!(policy.requires_https());
        assert!(policy.ensure_secure_connection("crisp", "https").is_ok());

        let err = policy.ensure_secure_connection("crisp", "http").unwrap_err();
        assert_eq!(
            err.to_string(),
            "The WebHook receiver 'crisp' requires HTTPS in order to be secure. Please register a WebHook URI of type 'https'."
        );
    }

    #[test]
    fn test_disable_https_check_setting() {
        let policy = TransportPolicy::from_profile("production", true);
        assert!(policy.ensure_secure_connection("crisp", "http").is_ok());
    }

    #[test]
    fn test_scheme_from_forwarded_header() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Forwarded-Proto", "HTTPS, http".parse().unwrap());
        let uri: Uri = "/webhooks/incoming/crisp".parse().unwrap();

        assert_eq!(request_scheme(&headers, &uri), "https");
    }

    #[test]
    fn test_scheme_from_uri() {
        let headers = HeaderMap::new();
        let uri: Uri = "https://example.com/webhooks/incoming/crisp".parse().unwrap();
        assert_eq!(request_scheme(&headers, &uri), "https");

        let uri: Uri = "/webhooks/incoming/crisp".parse().unwrap();
        assert_eq!(request_scheme(&headers, &uri), "http");
    }
}
