//! The persistent link to the alert source.
//!
//! - [`ConnectionManager`]: owns the WebSocket, reconnects with [`Backoff`]
//! - [`CommandChannel`]: outbound operator commands on the live connection
//! - [`ConnectionState`]: lifecycle state with an enforced transition table

mod backoff;
mod command;
mod manager;

pub use backoff::Backoff;
pub use command::{Command, CommandChannel, CommandDropped};
pub use manager::{ConnectionManager, ConnectionSettings};

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// Lifecycle state of the alert source connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

impl ConnectionState {
    /// Whether the state machine allows moving from `self` to `next`.
    ///
    /// Staying in the same state is always allowed (a retry while
    /// `Connecting` stays `Connecting`). There is no shortcut from
    /// `Disconnected` straight to `Connected`.
    #[must_use]
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        if self == next {
            return true;
        }
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Connected)
                | (Connected, Connecting)
                | (Disconnected | Connecting | Connected, Closing)
                | (Closing, Disconnected)
        )
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Closing => "closing",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a connection attempt or an established connection failed.
///
/// Every variant is recoverable: the manager backs off and reconnects.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    #[error("receive failed: {0}")]
    Receive(String),

    #[error("send failed: {0}")]
    Send(String),

    #[error("no frame received for {0:?}")]
    IdleTimeout(Duration),

    #[error("closed by peer{}", close_suffix(.0))]
    ClosedByPeer(Option<String>),

    #[error("stream ended")]
    StreamEnded,
}

fn close_suffix(reason: &Option<String>) -> String {
    match reason {
        Some(reason) if !reason.is_empty() => format!(": {}", reason),
        _ => String::new(),
    }
}

/// Receives every non-keepalive text frame, in arrival order.
///
/// `epoch` identifies the connection the frame arrived on.
#[async_trait]
pub trait FrameHandler: Send + Sync {
    async fn handle_frame(&self, frame: &str, epoch: u64);
}

#[cfg(test)]
mod tests {
    use super::ConnectionState::*;
    use super::*;

    #[test]
    fn legal_transitions() {
        assert!(Disconnected.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Connected));
        assert!(Connecting.can_transition_to(Connecting));
        assert!(Connected.can_transition_to(Connecting));
        assert!(Connected.can_transition_to(Closing));
        assert!(Connecting.can_transition_to(Closing));
        assert!(Closing.can_transition_to(Disconnected));
    }

    #[test]
    fn illegal_transitions() {
        assert!(!Disconnected.can_transition_to(Connected));
        assert!(!Connected.can_transition_to(Disconnected));
        assert!(!Closing.can_transition_to(Connecting));
        assert!(!Closing.can_transition_to(Connected));
    }

    #[test]
    fn close_reason_is_rendered() {
        assert_eq!(
            ConnectionError::ClosedByPeer(Some("going away".into())).to_string(),
            "closed by peer: going away"
        );
        assert_eq!(
            ConnectionError::ClosedByPeer(None).to_string(),
            "closed by peer"
        );
    }

    #[test]
    fn state_serializes_camel_case() {
        assert_eq!(
            serde_json::to_string(&Connected).unwrap(),
            "\"connected\""
        );
    }
}
