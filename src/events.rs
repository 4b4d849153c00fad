//! Event name extraction from JSON request bodies.

use serde_json::Value;

/// Where a receiver finds the event name in its request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventFromBody {
    /// Dotted property path, e.g. `event` or `data.type`
    pub body_property_path: &'static str,
    /// Whether a request without an event name is still accepted
    pub allow_missing: bool,
}

/// Reads the event name at `path` from a parsed body.
///
/// Intermediate segments must match exactly; the final segment is matched
/// case-insensitively, preferring an exact match. Strings are returned as-is,
/// numbers and booleans are rendered; anything else counts as missing.
pub fn extract_event(body: &Value, path: &str) -> Option<String> {
    let mut segments = path.split('.').filter(|segment| !segment.is_empty());
    let mut last = segments.next()?;
    let mut current = body;

    for next in segments {
        current = current.as_object()?.get(last)?;
        last = next;
    }

    let object = current.as_object()?;
    let value = object.get(last).or_else(|| {
        object
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(last))
            .map(|(_, value)| value)
    })?;

    match value {
        Value::String(name) if !name.is_empty() => Some(name.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}
