//! Inbound frame validation.
//!
//! Converts one raw text frame from the alert source into an [`Alert`], or
//! reports why the frame was rejected. Rejection is never a stream failure:
//! the caller logs it and moves on to the next frame.
//!
//! Accepted shapes:
//!
//! ```text
//! {"kind": "weapon", "location": "gate", "timestamp": 1718000000000}
//! {"type": "WEAPON: KNIFE", "location": "Main Gate", "time": "12:00:01", "severity": "high", "id": 1718000000}
//! {"event": "new_alert", "data": { ...either of the above... }}
//! ```
//!
//! Unknown fields are ignored so newer sources keep working. Only `kind` must
//! be a non-blank string; optional fields of an unexpected type are coerced or
//! dropped rather than rejecting the alert.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::alert::{Alert, Timestamp};
use crate::protocol_constants::{KEEPALIVE_REPLY_TEXT, KEEPALIVE_TEXT, NEW_ALERT_EVENT};

/// Reasons a frame could not be turned into an alert.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MalformedEvent {
    /// The frame is not JSON at all.
    #[error("frame is not valid JSON: {0}")]
    InvalidJson(String),

    /// The frame (or envelope payload) is JSON but not an object.
    #[error("frame is not a JSON object")]
    NotAnObject,

    /// The required `kind` field is absent, null, or blank.
    #[error("frame is missing the required `kind` field")]
    MissingKind,

    /// A known field has the wrong type.
    #[error("frame has an invalid field: {0}")]
    InvalidField(String),

    /// An envelope carried an event other than `new_alert`.
    #[error("unexpected envelope event `{0}`")]
    UnexpectedEvent(String),
}

/// Wire shape of an alert before validation.
///
/// Only `kind` is typed strictly. The optional fields take whatever the
/// source sends and are coerced below, so an odd `severity` or `timestamp`
/// never costs the alert itself.
#[derive(Deserialize)]
struct RawAlert {
    #[serde(default, alias = "type")]
    kind: Option<String>,
    #[serde(default, alias = "time")]
    timestamp: Option<Value>,
    #[serde(default)]
    location: Option<Value>,
    #[serde(default)]
    severity: Option<Value>,
    #[serde(default)]
    id: Option<Value>,
}

/// Integers are Unix milliseconds. Fractional numbers are Unix seconds, as
/// Python's `time.time()` produces. Strings are kept verbatim. Anything else
/// falls back to the receipt time.
fn timestamp_from(value: Option<Value>, received_at: u64) -> Timestamp {
    match value {
        None => Timestamp::EpochMillis(received_at),
        Some(Value::String(text)) => Timestamp::Text(text),
        Some(Value::Number(n)) => match (n.as_u64(), n.as_f64()) {
            (Some(ms), _) => Timestamp::EpochMillis(ms),
            (None, Some(secs)) if secs.is_finite() && secs >= 0.0 => {
                Timestamp::EpochMillis((secs * 1000.0).round() as u64)
            }
            _ => {
                log::debug!("[Normalizer] Ignoring timestamp {}", n);
                Timestamp::EpochMillis(received_at)
            }
        },
        Some(other) => {
            log::debug!("[Normalizer] Ignoring timestamp {}", other);
            Timestamp::EpochMillis(received_at)
        }
    }
}

/// Scalars become their text form; objects and arrays are ignored.
fn text_from(value: Option<Value>) -> Option<String> {
    match value? {
        Value::String(text) => Some(text),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => {
            log::debug!("[Normalizer] Ignoring non-scalar field {}", other);
            None
        }
    }
}

/// Returns true for the plain-text keepalive frames exchanged on connect.
#[must_use]
pub fn is_keepalive(frame: &str) -> bool {
    let frame = frame.trim();
    frame.eq_ignore_ascii_case(KEEPALIVE_TEXT) || frame.eq_ignore_ascii_case(KEEPALIVE_REPLY_TEXT)
}

/// Validates one inbound frame.
///
/// `received_at` (Unix ms) becomes the alert's receipt time and, when the
/// frame has no timestamp, its timestamp too.
///
/// # Errors
///
/// Returns a [`MalformedEvent`] describing why the frame was rejected.
pub fn normalize(frame: &str, received_at: u64) -> Result<Alert, MalformedEvent> {
    let value: Value =
        serde_json::from_str(frame).map_err(|e| MalformedEvent::InvalidJson(e.to_string()))?;
    let value = unwrap_envelope(value)?;
    if !value.is_object() {
        return Err(MalformedEvent::NotAnObject);
    }

    let raw: RawAlert =
        serde_json::from_value(value).map_err(|e| MalformedEvent::InvalidField(e.to_string()))?;

    let kind = raw
        .kind
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .ok_or(MalformedEvent::MissingKind)?;

    Ok(Alert {
        kind,
        timestamp: timestamp_from(raw.timestamp, received_at),
        location: text_from(raw.location).unwrap_or_default(),
        severity: text_from(raw.severity),
        id: text_from(raw.id),
        received_at,
    })
}

/// Strips a `{"event": ..., "data": ...}` envelope if present.
fn unwrap_envelope(value: Value) -> Result<Value, MalformedEvent> {
    let Value::Object(mut map) = value else {
        return Err(MalformedEvent::NotAnObject);
    };

    if let (Some(Value::String(event)), true) = (map.get("event"), map.contains_key("data")) {
        if event != NEW_ALERT_EVENT {
            return Err(MalformedEvent::UnexpectedEvent(event.clone()));
        }
        return Ok(map.remove("data").unwrap_or(Value::Null));
    }

    Ok(Value::Object(map))
}
