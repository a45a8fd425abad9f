//! # Control messages and their validation.
//!
//! On the wire a message is one entry of the JSON array stored in the
//! shared file: `{"pid": <number>, "data": <string>, "sent": <ISO8601>}`.
//!
//! Validation is per message and non-fatal: a failing check records an
//! error tag on the message rather than discarding it, so consumers can
//! log precisely what was wrong. A message is consumed and validated
//! exactly once per reader.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;

/// Why a received message (or one of its fields) was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValidationError {
    /// `pid` is missing or not an integer.
    BadPid,
    /// `sent` is missing or does not parse as an ISO-8601 date.
    BadTimestamp,
    /// The message is older than the staleness window.
    Stale,
    /// The payload exceeds the size ceiling.
    Oversized,
    /// The payload is missing or not a string.
    NotAString,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ValidationError::BadPid => "bad pid",
            ValidationError::BadTimestamp => "bad timestamp",
            ValidationError::Stale => "stale",
            ValidationError::Oversized => "oversized",
            ValidationError::NotAString => "not a string",
        };
        f.write_str(label)
    }
}

/// One consumed control message, post-validation.
///
/// Lives only between the shared file being claimed and the consumer
/// acting on the batch. The payload is `None` whenever a validation error
/// concerns it (stale, oversized, wrong type).
#[derive(Clone, Debug)]
pub struct IpcMessage {
    /// Sender pid, when it validated.
    pub pid: Option<i64>,
    /// The opaque payload, when it validated.
    pub payload: Option<String>,
    /// Send timestamp, when it validated.
    pub sent_at: Option<DateTime<Utc>>,
    /// Validation errors recorded for this message.
    pub errors: Vec<ValidationError>,
}

impl IpcMessage {
    /// True when the message carried no validation errors.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Validates one raw array entry.
    pub(crate) fn validate(
        value: &Value,
        now: DateTime<Utc>,
        staleness: Duration,
        max_payload: usize,
    ) -> Self {
        let mut errors = Vec::new();

        let pid = value.get("pid").and_then(Value::as_i64);
        if pid.is_none() {
            errors.push(ValidationError::BadPid);
        }

        let sent_at = value
            .get("sent")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));
        match sent_at {
            Some(sent) => {
                let age = now.signed_duration_since(sent);
                if age.to_std().map(|age| age > staleness).unwrap_or(false) {
                    errors.push(ValidationError::Stale);
                }
            }
            None => errors.push(ValidationError::BadTimestamp),
        }

        let mut payload = match value.get("data") {
            Some(Value::String(s)) => {
                if s.len() > max_payload {
                    errors.push(ValidationError::Oversized);
                    None
                } else {
                    Some(s.clone())
                }
            }
            _ => {
                errors.push(ValidationError::NotAString);
                None
            }
        };
        if errors.contains(&ValidationError::Stale) {
            payload = None;
        }

        Self {
            pid,
            payload,
            sent_at,
            errors,
        }
    }
}

/// Builds the wire entry appended by `send`.
pub(crate) fn wire_entry(pid: u32, payload: &str, sent: DateTime<Utc>) -> Value {
    serde_json::json!({
        "pid": pid,
        "data": payload,
        "sent": sent.to_rfc3339(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(30);

    #[test]
    fn test_fresh_message_round_trips_with_no_errors() {
        let now = Utc::now();
        let entry = wire_entry(1234, "hello", now);
        let msg = IpcMessage::validate(&entry, now, WINDOW, 1024);
        assert!(msg.is_valid());
        assert_eq!(msg.pid, Some(1234));
        assert_eq!(msg.payload.as_deref(), Some("hello"));
    }

    #[test]
    fn test_stale_message_has_one_error_and_null_payload() {
        let now = Utc::now();
        let sent = now - chrono::Duration::seconds(120);
        let entry = wire_entry(1234, "old news", sent);
        let msg = IpcMessage::validate(&entry, now, WINDOW, 1024);
        assert_eq!(msg.errors, vec![ValidationError::Stale]);
        assert!(msg.payload.is_none());
    }

    #[test]
    fn test_oversized_payload_is_tagged_and_dropped() {
        let now = Utc::now();
        let entry = wire_entry(1, &"x".repeat(64), now);
        let msg = IpcMessage::validate(&entry, now, WINDOW, 16);
        assert_eq!(msg.errors, vec![ValidationError::Oversized]);
        assert!(msg.payload.is_none());
    }

    #[test]
    fn test_non_string_payload_and_bad_pid_accumulate() {
        let now = Utc::now();
        let entry = serde_json::json!({
            "pid": "not-a-number",
            "data": 42,
            "sent": now.to_rfc3339(),
        });
        let msg = IpcMessage::validate(&entry, now, WINDOW, 1024);
        assert!(msg.errors.contains(&ValidationError::BadPid));
        assert!(msg.errors.contains(&ValidationError::NotAString));
        assert!(msg.payload.is_none());
    }

    #[test]
    fn test_bad_timestamp_is_tagged() {
        let entry = serde_json::json!({ "pid": 1, "data": "x", "sent": "yesterday" });
        let msg = IpcMessage::validate(&entry, Utc::now(), WINDOW, 1024);
        assert_eq!(msg.errors, vec![ValidationError::BadTimestamp]);
        assert_eq!(msg.payload.as_deref(), Some("x"));
    }
}
