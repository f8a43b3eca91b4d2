//! The canonical alert record.
//!
//! An [`Alert`] is built once by the normalizer and then shared as
//! `Arc<Alert>` by every view (feed, tray, incident log, broadcast events).
//! Fields are private so a shared alert can never be mutated.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::normalizer::MalformedEvent;
use crate::utils::now_millis;

/// Point in time attached to an alert.
///
/// Sources either send a preformatted string (the detection server sends
/// wall-clock `HH:MM:SS`) or a Unix timestamp in milliseconds. When the source
/// sends nothing, the receipt time is used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    /// Unix timestamp in milliseconds.
    EpochMillis(u64),
    /// Source-formatted time, kept verbatim.
    Text(String),
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EpochMillis(ms) => write!(f, "{}", ms),
            Self::Text(text) => f.write_str(text),
        }
    }
}

/// One detected threat event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub(crate) kind: String,
    pub(crate) timestamp: Timestamp,
    pub(crate) location: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) severity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) id: Option<String>,
    pub(crate) received_at: u64,
}

impl Alert {
    /// Creates an alert received now.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedEvent::MissingKind`] if `kind` is empty or whitespace.
    pub fn new(kind: impl Into<String>, location: impl Into<String>) -> Result<Self, MalformedEvent> {
        let kind = kind.into().trim().to_string();
        if kind.is_empty() {
            return Err(MalformedEvent::MissingKind);
        }
        let received_at = now_millis();
        Ok(Self {
            kind,
            timestamp: Timestamp::EpochMillis(received_at),
            location: location.into(),
            severity: None,
            id: None,
            received_at,
        })
    }

    /// Replaces the timestamp (source-assigned time).
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Sets the severity label.
    #[must_use]
    pub fn with_severity(mut self, severity: impl Into<String>) -> Self {
        self.severity = Some(severity.into());
        self
    }

    /// Sets the source identifier.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Threat category, e.g. `weapon` or `crowd-surge`. Never empty.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn timestamp(&self) -> &Timestamp {
        &self.timestamp
    }

    /// Camera or zone identifier. May be empty.
    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn severity(&self) -> Option<&str> {
        self.severity.as_deref()
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Unix timestamp in milliseconds at which the controller accepted the alert.
    pub fn received_at(&self) -> u64 {
        self.received_at
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.location.is_empty() {
            f.write_str(&self.kind)
        } else {
            write!(f, "{}/{}", self.kind, self.location)
        }
    }
}
