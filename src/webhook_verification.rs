//! # Webhook Key Verification
//!
//! This module admits or rejects webhook requests that authenticate with a
//! shared secret in the `key` query parameter. Verification runs as an ordered
//! list of pure steps and stops at the first rejection:
//!
//! 1. the request must arrive over HTTPS (unless the transport policy allows HTTP)
//! 2. the `key` query parameter must be present and non-empty
//! 3. a secret must be configured for the receiver name and route id
//! 4. the supplied key must equal the configured secret (constant time)

use std::sync::Arc;

use axum::http::StatusCode;
use serde::Serialize;
use tracing::{debug, warn};

use crate::crypto::SecretKey;
use crate::models::IncomingRequest;
use crate::secrets::ReceiverSecrets;
use crate::transport::{InsecureTransport, TransportPolicy};

/// Query parameter carrying the shared secret.
pub const KEY_QUERY_PARAMETER: &str = "key";

/// Minimum accepted length of a configured secret key.
pub const KEY_MIN_LENGTH: usize = 32;

/// Result of running the admission pipeline on one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationOutcome {
    Admitted,
    RejectedInsecureTransport,
    RejectedMissingKey,
    RejectedUnknownReceiver,
    RejectedKeyMismatch,
}

impl VerificationOutcome {
    /// Stable label for logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationOutcome::Admitted => "admitted",
            VerificationOutcome::RejectedInsecureTransport => "rejected_insecure_transport",
            VerificationOutcome::RejectedMissingKey => "rejected_missing_key",
            VerificationOutcome::RejectedUnknownReceiver => "rejected_unknown_receiver",
            VerificationOutcome::RejectedKeyMismatch => "rejected_key_mismatch",
        }
    }
}

impl From<&VerificationResult<()>> for VerificationOutcome {
    fn from(result: &VerificationResult<()>) -> Self {
        match result {
            Ok(()) => VerificationOutcome::Admitted,
            Err(error) => error.outcome(),
        }
    }
}

/// Errors that can occur during webhook key verification
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerificationError {
    #[error(transparent)]
    InsecureTransport(#[from] InsecureTransport),

    #[error("A '{receiver_name}' WebHook request must contain a 'key' query parameter.")]
    MissingKey { receiver_name: String },

    #[error("No valid secret key is configured for WebHook receiver '{receiver_name}' and id '{receiver_id}'.")]
    UnknownReceiver {
        receiver_name: String,
        receiver_id: String,
    },

    #[error("The 'key' query parameter provided in the HTTP request did not match the expected value.")]
    KeyMismatch,
}

impl VerificationError {
    /// Returns the appropriate HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            VerificationError::InsecureTransport(_) => StatusCode::FORBIDDEN,
            VerificationError::MissingKey { .. } => StatusCode::BAD_REQUEST,
            VerificationError::UnknownReceiver { .. } => StatusCode::NOT_FOUND,
            VerificationError::KeyMismatch => StatusCode::BAD_REQUEST,
        }
    }

    pub fn outcome(&self) -> VerificationOutcome {
        match self {
            VerificationError::InsecureTransport(_) => {
                VerificationOutcome::RejectedInsecureTransport
            }
            VerificationError::MissingKey { .. } => VerificationOutcome::RejectedMissingKey,
            VerificationError::UnknownReceiver { .. } => {
                VerificationOutcome::RejectedUnknownReceiver
            }
            VerificationError::KeyMismatch => VerificationOutcome::RejectedKeyMismatch,
        }
    }

    /// Text returned to the caller, `None` (empty body) for unknown receivers.
    pub fn response_message(&self) -> Option<String> {
        match self {
            VerificationError::UnknownReceiver { .. } => None,
            other => Some(other.to_string()),
        }
    }
}

/// Result type for webhook verification
pub type VerificationResult<T> = Result<T, VerificationError>;

/// Values carried from one admission step to the next.
struct Admission<'a> {
    request: &'a IncomingRequest,
    /// Set once the `key` parameter is known to be present
    supplied_key: Option<&'a str>,
    /// Set once the configured secret has been resolved
    expected: Option<&'a SecretKey>,
}

type VerificationStep =
    for<'a, 'b> fn(&'a KeyVerifier, &'b mut Admission<'a>) -> VerificationResult<()>;

/// Admission steps in the order they run.
const VERIFICATION_STEPS: [(&str, VerificationStep); 4] = [
    ("secure_transport", KeyVerifier::check_transport),
    ("key_present", KeyVerifier::check_key_present),
    ("receiver_configured", KeyVerifier::check_receiver_configured),
    ("key_matches", KeyVerifier::check_key_matches),
];

/// Verifies the `key` query parameter against configured receiver secrets.
#[derive(Debug, Clone)]
pub struct KeyVerifier {
    secrets: Arc<ReceiverSecrets>,
    transport: TransportPolicy,
    min_key_length: usize,
}

impl KeyVerifier {
    pub fn new(secrets: Arc<ReceiverSecrets>, transport: TransportPolicy) -> Self {
        Self {
            secrets,
            transport,
            min_key_length: KEY_MIN_LENGTH,
        }
    }

    pub fn with_min_key_length(mut self, min_key_length: usize) -> Self {
        self.min_key_length = min_key_length;
        self
    }

    pub fn min_key_length(&self) -> usize {
        self.min_key_length
    }

    /// Runs every admission step in order, stopping at the first rejection.
    pub fn verify(&self, request: &IncomingRequest) -> VerificationResult<()> {
        let mut admission = Admission {
            request,
            supplied_key: None,
            expected: None,
        };
        for (step, check) in VERIFICATION_STEPS {
            if let Err(error) = check(self, &mut admission) {
                debug!(
                    receiver = %request.receiver_name,
                    receiver_id = %request.receiver_id,
                    step,
                    outcome = error.outcome().as_str(),
                    "WebHook key verification stopped"
                );
                return Err(error);
            }
        }
        Ok(())
    }

    /// Convenience wrapper returning only the outcome.
    pub fn outcome(&self, request: &IncomingRequest) -> VerificationOutcome {
        VerificationOutcome::from(&self.verify(request))
    }

    fn check_transport<'a>(&'a self, admission: &mut Admission<'a>) -> VerificationResult<()> {
        let request = admission.request;
        self.transport
            .ensure_secure_connection(&request.receiver_name, &request.scheme)?;
        Ok(())
    }

    fn check_key_present<'a>(&'a self, admission: &mut Admission<'a>) -> VerificationResult<()> {
        let request = admission.request;
        match request.query_param(KEY_QUERY_PARAMETER) {
            Some(key) if !key.is_empty() => {
                admission.supplied_key = Some(key);
                Ok(())
            }
            _ => {
                warn!(
                    receiver = %request.receiver_name,
                    "A '{}' WebHook verification request must contain a '{}' query parameter.",
                    request.receiver_name,
                    KEY_QUERY_PARAMETER
                );
                Err(VerificationError::MissingKey {
                    receiver_name: request.receiver_name.clone(),
                })
            }
        }
    }

    /// The only step that resolves the secret; an unresolved secret is the 404.
    fn check_receiver_configured<'a>(
        &'a self,
        admission: &mut Admission<'a>,
    ) -> VerificationResult<()> {
        let request = admission.request;
        let secret = self
            .secrets
            .resolve_secret(
                &request.receiver_name,
                &request.receiver_id,
                self.min_key_length,
            )
            .ok_or_else(|| VerificationError::UnknownReceiver {
                receiver_name: request.receiver_name.clone(),
                receiver_id: request.receiver_id.to_string(),
            })?;
        admission.expected = Some(secret);
        Ok(())
    }

    /// Compares against the secret resolved by the previous step. Runs that
    /// skipped resolution are rejected as a mismatch.
    fn check_key_matches<'a>(&'a self, admission: &mut Admission<'a>) -> VerificationResult<()> {
        let request = admission.request;
        let matched = match (admission.supplied_key, admission.expected) {
            (Some(supplied), Some(expected)) => expected.matches(supplied),
            _ => false,
        };

        if matched {
            Ok(())
        } else {
            warn!(
                receiver = %request.receiver_name,
                receiver_id = %request.receiver_id,
                "The '{}' query parameter provided in the HTTP request did not match the expected value.",
                KEY_QUERY_PARAMETER
            );
            Err(VerificationError::KeyMismatch)
        }
    }
}
