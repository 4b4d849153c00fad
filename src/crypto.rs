//! Secret key handling and constant-time comparison
//!
//! Shared receiver secrets are held in a zeroizing wrapper whose only
//! supported operation is a constant-time equality check against a
//! caller-supplied candidate.

use std::fmt;

use serde::{Serialize, Serializer};
use subtle::{Choice, ConstantTimeEq};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Largest accepted secret length, in characters.
pub const MAX_SECRET_KEY_LENGTH: usize = 128;

/// Secure wrapper for a receiver's shared secret with zeroization
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey(String);

impl SecretKey {
    /// Wrap a configured secret value
    pub fn new(value: impl Into<String>) -> Self {
        SecretKey(value.into())
    }

    /// Number of characters in the secret
    pub fn char_len(&self) -> usize {
        self.0.chars().count()
    }

    /// Compares `candidate` against this secret without short-circuiting
    pub fn matches(&self, candidate: &str) -> bool {
        secret_equal(candidate.as_bytes(), self.0.as_bytes())
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey([REDACTED])")
    }
}

impl Serialize for SecretKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("[REDACTED]")
    }
}

/// Compares two secrets in time proportional to the longer input.
///
/// Both inputs are walked to the longer length with zero padding, and the
/// length check is folded into the same [`Choice`] rather than returning
/// early. Only the lengths themselves influence the loop bound.
pub fn secret_equal(candidate: &[u8], expected: &[u8]) -> bool {
    let max_len = candidate.len().max(expected.len());

    let mut equal: Choice = (candidate.len() as u64).ct_eq(&(expected.len() as u64));
    for index in 0..max_len {
        let left = candidate.get(index).copied().unwrap_or(0);
        let right = expected.get(index).copied().unwrap_or(0);
        equal &= left.ct_eq(&right);
    }

    equal.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "01234567890123456789012345678901";

    #[test]
    fn test_equal_secrets_match() {
        assert!(secret_equal(SECRET.as_bytes(), SECRET.as_bytes()));
    }

    #[test]
    fn test_last_byte_difference_rejected() {
        assert!(!secret_equal(
            b"01234567890123456789012345678902",
            SECRET.as_bytes()
        ));
    }

    #[test]
    fn test_first_byte_difference_rejected() {
        assert!(!secret_equal(
            b"x1234567890123456789012345678901",
            SECRET.as_bytes()
        ));
    }

    #[test]
    fn test_length_mismatch_rejected() {
        // Prefix of the expected value
        assert!(!secret_equal(&SECRET.as_bytes()[..31], SECRET.as_bytes()));
        // Expected value followed by zero padding must not collide
        let mut padded = SECRET.as_bytes().to_vec();
        padded.push(0);
        assert!(!secret_equal(&padded, SECRET.as_bytes()));
        assert!(!secret_equal(b"", SECRET.as_bytes()));
    }

    #[test]
    fn test_empty_inputs_are_equal() {
        assert!(secret_equal(b"", b""));
    }

    #[test]
    fn test_secret_key_matches() {
        let key = SecretKey::new(SECRET);
        assert!(key.matches(SECRET));
        assert!(!key.matches("01234567890123456789012345678902"));
        assert_eq!(key.char_len(), 32);
    }

    #[test]
    fn test_secret_key_never_printed() {
        let key = SecretKey::new(SECRET);
        let debug = format!("{:?}", key);
        assert!(!debug.contains(SECRET));

        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"[REDACTED]\"");
    }

    /// Best-effort timing check: a mismatch in the first byte and one in the
    /// last byte should take comparable time. The bound is deliberately loose
    /// so scheduler noise does not make the test flaky.
    #[test]
    fn test_mismatch_position_does_not_dominate_timing() {
        use std::time::Instant;

        let expected = vec![b'a'; MAX_SECRET_KEY_LENGTH];
        let mut first = expected.clone();
        first[0] = b'b';
        let mut last = expected.clone();
        last[MAX_SECRET_KEY_LENGTH - 1] = b'b';

        let rounds = 20_000;
        let measure = |candidate: &[u8]| {
            let start = Instant::now();
            for _ in 0..rounds {
                std::hint::black_box(secret_equal(
                    std::hint::black_box(candidate),
                    std::hint::black_box(&expected),
                ));
            }
            start.elapsed().as_nanos().max(1)
        };

        // Warm up
        measure(&first);
        measure(&last);

        let early = measure(&first);
        let late = measure(&last);
        let ratio = early.max(late) as f64 / early.min(late) as f64;
        assert!(ratio < 5.0, "timing ratio {} too large", ratio);
    }
}
