//! Outbound operator commands.
//!
//! A command is sent only on the connection that is live at the moment of the
//! call. There is no buffering across reconnects: when nothing is connected
//! the caller gets [`CommandDropped`] back immediately and may retry.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, watch};

use super::ConnectionState;
use crate::protocol_constants::TOGGLE_AI_COMMAND;

/// An operator command, serialized as `{"command": <name>, "payload": <value>}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Command {
    #[serde(rename = "command")]
    name: String,
    payload: Value,
}

impl Command {
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }

    /// Switches the detection engine on or off.
    pub fn toggle_ai(enabled: bool) -> Self {
        Self::new(TOGGLE_AI_COMMAND, Value::Bool(enabled))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Serializes the command into one text frame.
    ///
    /// # Errors
    ///
    /// Returns [`CommandDropped::InvalidCommand`] for a blank name.
    pub fn to_frame(&self) -> Result<String, CommandDropped> {
        if self.name.trim().is_empty() {
            return Err(CommandDropped::InvalidCommand {
                reason: "command name is empty".into(),
            });
        }
        serde_json::to_string(self).map_err(|e| CommandDropped::Serialization {
            command: self.name.clone(),
            message: e.to_string(),
        })
    }
}

/// Reasons a command was not transmitted.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommandDropped {
    #[error("command '{command}' dropped: connection is {state}")]
    NotConnected {
        command: String,
        state: ConnectionState,
    },

    #[error("command '{command}' dropped: outbound queue is full")]
    QueueFull { command: String },

    #[error("command '{command}' dropped: connection closed while sending")]
    ConnectionClosed { command: String },

    #[error("invalid command: {reason}")]
    InvalidCommand { reason: String },

    #[error("command '{command}' could not be serialized: {message}")]
    Serialization { command: String, message: String },
}

/// Entry point for sending commands over the live connection.
///
/// The connection manager attaches the outbound queue of each epoch before
/// reporting `Connected` and detaches it before leaving that state.
pub struct CommandChannel {
    outbound: Mutex<Option<mpsc::Sender<String>>>,
    state_rx: watch::Receiver<ConnectionState>,
    sent: AtomicU64,
    dropped: AtomicU64,
}

impl CommandChannel {
    pub(crate) fn new(state_rx: watch::Receiver<ConnectionState>) -> Self {
        Self {
            outbound: Mutex::new(None),
            state_rx,
            sent: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub(crate) fn attach(&self, tx: mpsc::Sender<String>) {
        *self.outbound.lock() = Some(tx);
    }

    pub(crate) fn detach(&self) {
        self.outbound.lock().take();
    }

    /// Queues exactly one frame on the live connection, or reports why not.
    ///
    /// Never waits: a full outbound queue drops the command. A frame still
    /// queued when the connection fails is never written and is counted in
    /// [`CommandChannel::dropped_count`].
    ///
    /// # Errors
    ///
    /// Returns [`CommandDropped`] when not connected, the queue is full or
    /// closed, or the command is invalid.
    pub fn send(&self, command: &Command) -> Result<(), CommandDropped> {
        let result = self.try_send(command);
        match &result {
            Ok(()) => {
                self.sent.fetch_add(1, Ordering::Relaxed);
                log::info!("[Commands] Sent '{}'", command.name());
            }
            Err(e) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                log::warn!("[Commands] {}", e);
            }
        }
        result
    }

    fn try_send(&self, command: &Command) -> Result<(), CommandDropped> {
        let frame = command.to_frame()?;

        let state = *self.state_rx.borrow();
        if state != ConnectionState::Connected {
            return Err(CommandDropped::NotConnected {
                command: command.name().to_string(),
                state,
            });
        }

        let outbound = self.outbound.lock();
        let Some(tx) = outbound.as_ref() else {
            return Err(CommandDropped::NotConnected {
                command: command.name().to_string(),
                state,
            });
        };

        tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => CommandDropped::QueueFull {
                command: command.name().to_string(),
            },
            mpsc::error::TrySendError::Closed(_) => CommandDropped::ConnectionClosed {
                command: command.name().to_string(),
            },
        })
    }

    /// Counts commands that were queued but never written because the
    /// connection ended first.
    pub(crate) fn record_lost(&self, lost: u64) {
        self.dropped.fetch_add(lost, Ordering::Relaxed);
        log::warn!(
            "[Commands] {} queued command(s) lost when the connection ended",
            lost
        );
    }

    /// Commands queued on a connection so far.
    #[must_use]
    pub fn sent_count(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Commands dropped so far.
    #[must_use]
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(state: ConnectionState) -> (CommandChannel, watch::Sender<ConnectionState>) {
        let (state_tx, state_rx) = watch::channel(state);
        (CommandChannel::new(state_rx), state_tx)
    }

    #[test]
    fn toggle_ai_frame_matches_wire_format() {
        let frame = Command::toggle_ai(true).to_frame().unwrap();
        let json: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(json, serde_json::json!({"command": "toggle_ai", "payload": true}));
    }

    #[test]
    fn blank_name_is_invalid() {
        let (commands, _state) = channel(ConnectionState::Connected);
        assert!(matches!(
            commands.send(&Command::new(" ", Value::Null)),
            Err(CommandDropped::InvalidCommand { .. })
        ));
    }

    #[test]
    fn disconnected_send_is_dropped_and_nothing_is_queued() {
        let (commands, _state) = channel(ConnectionState::Disconnected);
        let (tx, mut rx) = mpsc::channel(4);
        commands.attach(tx);

        let result = commands.send(&Command::toggle_ai(false));
        assert_eq!(
            result,
            Err(CommandDropped::NotConnected {
                command: "toggle_ai".into(),
                state: ConnectionState::Disconnected,
            })
        );
        assert!(rx.try_recv().is_err());
        assert_eq!(commands.dropped_count(), 1);
    }

    #[test]
    fn connected_send_queues_exactly_one_frame() {
        let (commands, _state) = channel(ConnectionState::Connected);
        let (tx, mut rx) = mpsc::channel(4);
        commands.attach(tx);

        commands.send(&Command::toggle_ai(false)).unwrap();

        let frame = rx.try_recv().unwrap();
        assert_eq!(frame, r#"{"command":"toggle_ai","payload":false}"#);
        assert!(rx.try_recv().is_err());
        assert_eq!(commands.sent_count(), 1);
    }

    #[test]
    fn full_queue_drops_the_command() {
        let (commands, _state) = channel(ConnectionState::Connected);
        let (tx, _rx) = mpsc::channel(1);
        commands.attach(tx);

        commands.send(&Command::toggle_ai(true)).unwrap();
        assert_eq!(
            commands.send(&Command::toggle_ai(true)),
            Err(CommandDropped::QueueFull {
                command: "toggle_ai".into()
            })
        );
    }

    #[test]
    fn detached_channel_drops_even_if_state_lags() {
        let (commands, _state) = channel(ConnectionState::Connected);
        let (tx, _rx) = mpsc::channel(1);
        commands.attach(tx);
        commands.detach();

        assert!(matches!(
            commands.send(&Command::toggle_ai(true)),
            Err(CommandDropped::NotConnected { .. })
        ));
    }

    #[test]
    fn lost_frames_count_as_dropped() {
        let (commands, _state) = channel(ConnectionState::Connected);
        let (tx, _rx) = mpsc::channel(4);
        commands.attach(tx);
        commands.send(&Command::toggle_ai(true)).unwrap();
        commands.send(&Command::toggle_ai(false)).unwrap();

        commands.detach();
        commands.record_lost(2);

        assert_eq!(commands.sent_count(), 2);
        assert_eq!(commands.dropped_count(), 2);
    }
}
