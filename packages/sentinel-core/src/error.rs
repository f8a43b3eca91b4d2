//! Centralized error types for the alert stream controller.
//!
//! Each concern has its own `thiserror` enum next to the code that raises it:
//!
//! - [`MalformedEvent`]: frame rejected by the normalizer, dropped and logged
//! - [`ConnectionError`]: connection lost or handshake failed, triggers backoff
//! - [`CommandDropped`]: returned synchronously to the command caller
//! - [`PlaybackError`]: alarm playback failed, swallowed and logged
//! - [`SubscriberError`]: one subscriber failed on one alert, isolated
//! - [`ConfigError`]: invalid configuration, prevents start
//!
//! [`SentinelError`] is the API-facing error with machine-readable codes and
//! an `IntoResponse` impl for JSON error bodies.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

pub use crate::connection::{CommandDropped, ConnectionError};
pub use crate::fanout::SubscriberError;
pub use crate::normalizer::MalformedEvent;
pub use crate::services::PlaybackError;
pub use crate::state::ConfigError;

/// Trait for error types that provide machine-readable error codes.
pub trait ErrorCode {
    /// Returns a machine-readable error code for logs and API responses.
    fn code(&self) -> &'static str;
}

impl ErrorCode for MalformedEvent {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidJson(_) => "invalid_json",
            Self::NotAnObject => "not_an_object",
            Self::MissingKind => "missing_kind",
            Self::InvalidField(_) => "invalid_field",
            Self::UnexpectedEvent(_) => "unexpected_event",
        }
    }
}

impl ErrorCode for ConnectionError {
    fn code(&self) -> &'static str {
        match self {
            Self::HandshakeFailed(_) => "handshake_failed",
            Self::HandshakeTimeout(_) => "handshake_timeout",
            Self::Receive(_) => "receive_failed",
            Self::Send(_) => "send_failed",
            Self::IdleTimeout(_) => "idle_timeout",
            Self::ClosedByPeer(_) => "closed_by_peer",
            Self::StreamEnded => "stream_ended",
        }
    }
}

impl ErrorCode for CommandDropped {
    fn code(&self) -> &'static str {
        match self {
            Self::NotConnected { .. } => "not_connected",
            Self::QueueFull { .. } => "command_queue_full",
            Self::ConnectionClosed { .. } => "connection_closed",
            Self::InvalidCommand { .. } => "invalid_command",
            Self::Serialization { .. } => "command_serialization_failed",
        }
    }
}

impl ErrorCode for PlaybackError {
    fn code(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "player_unavailable",
            Self::Spawn(_) => "player_spawn_failed",
            Self::ExitStatus(_) => "player_exit_status",
            Self::TimedOut(_) => "playback_timed_out",
        }
    }
}

impl ErrorCode for SubscriberError {
    fn code(&self) -> &'static str {
        match self {
            Self::Io(_) => "subscriber_io_error",
            Self::Serialization(_) => "subscriber_serialization_error",
            Self::Other(_) => "subscriber_error",
        }
    }
}

impl ErrorCode for ConfigError {
    fn code(&self) -> &'static str {
        match self {
            Self::Invalid { .. } => "invalid_config",
            Self::InvalidEndpoint(_) => "invalid_endpoint",
        }
    }
}

/// Application-wide error type for the controller's API surface.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum SentinelError {
    /// An operator command was not transmitted.
    ///
    /// Carries the [`CommandDropped`] code so clients can tell "not connected"
    /// apart from "queue full".
    #[error("Command dropped: {message}")]
    CommandDropped { reason: &'static str, message: String },

    /// Client sent an invalid or malformed request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SentinelError {
    /// Returns a machine-readable error code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::CommandDropped { reason, .. } => *reason,
            Self::InvalidRequest(_) => "invalid_request",
            Self::Configuration(_) => "configuration_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Maps the error to an appropriate HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::CommandDropped { reason, .. } if *reason == "invalid_command" => {
                StatusCode::BAD_REQUEST
            }
            Self::CommandDropped { .. } => StatusCode::CONFLICT,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Convenient Result alias for API-level operations.
pub type SentinelResult<T> = Result<T, SentinelError>;

/// JSON response body for error responses.
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    status: u16,
}

impl IntoResponse for SentinelError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.code(),
            message: self.to_string(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<CommandDropped> for SentinelError {
    fn from(err: CommandDropped) -> Self {
        Self::CommandDropped {
            reason: err.code(),
            message: err.to_string(),
        }
    }
}

impl From<ConfigError> for SentinelError {
    fn from(err: ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}
