//! Lifecycle and activity notifications for presentation code.
//!
//! This module provides:
//! - [`EventEmitter`] trait for the controller to emit events
//! - [`BroadcastEventBridge`] fanning events into a `tokio::sync::broadcast` channel
//! - Event types for the connection, alert, and command domains
//!
//! Emission never blocks: when nobody is listening the event is discarded.

mod bridge;
mod emitter;

pub use bridge::BroadcastEventBridge;
pub use emitter::{EventEmitter, LoggingEventEmitter, NoopEventEmitter};

use std::sync::Arc;

use serde::Serialize;

use crate::alert::Alert;

/// Events broadcast to observers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "category", rename_all = "camelCase")]
pub enum BroadcastEvent {
    /// Connection lifecycle changes.
    Connection(ConnectionEvent),

    /// Alerts accepted or frames rejected.
    Alert(AlertEvent),

    /// Operator commands sent or dropped.
    Command(CommandEvent),
}

/// Connection lifecycle notifications.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ConnectionEvent {
    /// A connection attempt is starting.
    Connecting {
        url: String,
        /// 1-based attempt number since the last successful handshake.
        attempt: u32,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// Handshake succeeded; a new epoch begins.
    Connected {
        url: String,
        epoch: u64,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// An established connection was lost.
    Disconnected {
        epoch: u64,
        /// Human-readable reason.
        reason: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
}

/// Alert stream notifications.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AlertEvent {
    /// A frame was accepted and fanned out.
    Received {
        alert: Arc<Alert>,
        epoch: u64,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// A frame was rejected by the normalizer.
    Malformed {
        reason: String,
        epoch: u64,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
}

/// Command channel notifications.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CommandEvent {
    /// The command was queued on the live connection.
    Sent {
        name: String,
        payload: serde_json::Value,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// The command was dropped; the operator may retry.
    Dropped {
        name: String,
        reason: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
}

impl From<ConnectionEvent> for BroadcastEvent {
    fn from(event: ConnectionEvent) -> Self {
        BroadcastEvent::Connection(event)
    }
}

impl From<AlertEvent> for BroadcastEvent {
    fn from(event: AlertEvent) -> Self {
        BroadcastEvent::Alert(event)
    }
}

impl From<CommandEvent> for BroadcastEvent {
    fn from(event: CommandEvent) -> Self {
        BroadcastEvent::Command(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_category_and_type_tags() {
        let event: BroadcastEvent = ConnectionEvent::Disconnected {
            epoch: 2,
            reason: "idle timeout".into(),
            timestamp: 10,
        }
        .into();

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["category"], "connection");
        assert_eq!(json["type"], "disconnected");
        assert_eq!(json["epoch"], 2);
    }

    #[test]
    fn received_alert_embeds_the_alert() {
        let alert = Arc::new(Alert::new("weapon", "gate").unwrap());
        let event: BroadcastEvent = AlertEvent::Received {
            alert,
            epoch: 1,
            timestamp: 10,
        }
        .into();

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["category"], "alert");
        assert_eq!(json["alert"]["location"], "gate");
    }
}
