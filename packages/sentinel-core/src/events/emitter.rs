//! Event emitter abstraction for decoupling the controller from transport.
//!
//! The controller depends on the [`EventEmitter`] trait rather than a concrete
//! channel, so observers (HTTP event stream, logs, tests) can be swapped.

use super::{AlertEvent, CommandEvent, ConnectionEvent};

/// Trait for emitting controller events without knowledge of transport.
///
/// Implementations must return quickly; they are called from the ingestion path.
pub trait EventEmitter: Send + Sync {
    /// Emits a connection lifecycle event.
    fn emit_connection(&self, event: ConnectionEvent);

    /// Emits an alert stream event.
    fn emit_alert(&self, event: AlertEvent);

    /// Emits a command channel event.
    fn emit_command(&self, event: CommandEvent);
}

/// No-op emitter for embedding or tests.
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit_connection(&self, _event: ConnectionEvent) {}

    fn emit_alert(&self, _event: AlertEvent) {}

    fn emit_command(&self, _event: CommandEvent) {}
}

/// Logs all events at debug level.
pub struct LoggingEventEmitter;

impl EventEmitter for LoggingEventEmitter {
    fn emit_connection(&self, event: ConnectionEvent) {
        tracing::debug!(?event, "connection_event");
    }

    fn emit_alert(&self, event: AlertEvent) {
        tracing::debug!(?event, "alert_event");
    }

    fn emit_command(&self, event: CommandEvent) {
        tracing::debug!(?event, "command_event");
    }
}
