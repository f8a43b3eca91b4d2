//! Controller configuration.
//!
//! [`Config`] deserializes from any serde format with every field optional;
//! missing fields take the defaults from [`crate::protocol_constants`].
//! Call [`Config::validate`] before use (the controller builder does).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol_constants::*;

/// Invalid configuration. The only error that prevents the controller from starting.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("invalid endpoint '{0}': expected ws://host[:port]/path")]
    InvalidEndpoint(String),
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

/// Address of the alert source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Use `wss://` instead of `ws://`.
    pub secure: bool,
    pub host: String,
    pub port: u16,
    /// Request path, always starting with `/`.
    pub path: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            secure: false,
            host: "localhost".to_string(),
            port: 8000,
            path: "/ws/alerts".to_string(),
        }
    }
}

impl EndpointConfig {
    #[must_use]
    pub fn url(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{}://{}:{}{}", scheme, self.host, self.port, self.path)
    }

    /// Parses `ws://host[:port][/path]` (or `wss://`).
    ///
    /// The port defaults to 80/443 and the path to `/`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEndpoint`] for other schemes, a missing
    /// host, or a non-numeric port.
    pub fn parse(url: &str) -> Result<Self, ConfigError> {
        let err = || ConfigError::InvalidEndpoint(url.to_string());

        let (secure, rest) = if let Some(rest) = url.strip_prefix("ws://") {
            (false, rest)
        } else if let Some(rest) = url.strip_prefix("wss://") {
            (true, rest)
        } else {
            return Err(err());
        };

        let (authority, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, "/"),
        };
        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => (host, port.parse::<u16>().map_err(|_| err())?),
            None => (authority, if secure { 443 } else { 80 }),
        };
        if host.is_empty() {
            return Err(err());
        }

        Ok(Self {
            secure,
            host: host.to_string(),
            port,
            path: path.to_string(),
        })
    }
}

/// Configuration for the alert stream controller.
///
/// All fields have sensible defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // Source
    pub endpoint: EndpointConfig,

    // Reconnect
    /// First reconnect delay (milliseconds).
    pub initial_backoff_ms: u64,

    /// Reconnect delay cap (milliseconds).
    pub max_backoff_ms: u64,

    /// Handshake timeout (seconds).
    pub connect_timeout_secs: u64,

    // Liveness
    /// Interval between WebSocket pings (seconds).
    pub heartbeat_interval_secs: u64,

    /// Silence after which the connection is considered lost (seconds).
    pub idle_timeout_secs: u64,

    // Buffers
    /// Capacity of the recent-alerts feed.
    pub recent_capacity: usize,

    /// Capacity of the notification tray.
    pub notification_capacity: usize,

    /// Per-subscriber delivery queue capacity.
    pub subscriber_queue_capacity: usize,

    /// Outbound command queue capacity per connection.
    pub command_queue_capacity: usize,

    /// Capacity of the lifecycle event broadcast channel.
    pub event_channel_capacity: usize,

    // Alarm
    /// Initial value of the sound-enabled preference.
    pub sound_enabled: bool,

    /// Upper bound on one alarm playback (milliseconds).
    pub playback_timeout_ms: u64,

    // Persistence
    /// JSON-lines incident log. Disabled when unset.
    pub incident_log_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: EndpointConfig::default(),
            initial_backoff_ms: DEFAULT_INITIAL_BACKOFF_MS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            heartbeat_interval_secs: DEFAULT_HEARTBEAT_INTERVAL_SECS,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
            recent_capacity: DEFAULT_RECENT_CAPACITY,
            notification_capacity: DEFAULT_NOTIFICATION_CAPACITY,
            subscriber_queue_capacity: DEFAULT_SUBSCRIBER_QUEUE_CAPACITY,
            command_queue_capacity: DEFAULT_COMMAND_QUEUE_CAPACITY,
            event_channel_capacity: EVENT_CHANNEL_CAPACITY,
            sound_enabled: true,
            playback_timeout_ms: DEFAULT_PLAYBACK_TIMEOUT_MS,
            incident_log_path: None,
        }
    }
}

impl Config {
    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns the first invalid field found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let endpoint = &self.endpoint;
        if endpoint.host.trim().is_empty() {
            return Err(invalid("endpoint.host", "must not be empty"));
        }
        if endpoint.port == 0 {
            return Err(invalid("endpoint.port", "must be >= 1"));
        }
        if !endpoint.path.starts_with('/') {
            return Err(invalid("endpoint.path", "must start with '/'"));
        }

        if self.initial_backoff_ms == 0 {
            return Err(invalid("initial_backoff_ms", "must be >= 1"));
        }
        if self.max_backoff_ms < self.initial_backoff_ms {
            return Err(invalid("max_backoff_ms", "must be >= initial_backoff_ms"));
        }
        if self.connect_timeout_secs == 0 {
            return Err(invalid("connect_timeout_secs", "must be >= 1"));
        }
        if self.heartbeat_interval_secs == 0 {
            return Err(invalid("heartbeat_interval_secs", "must be >= 1"));
        }
        if self.idle_timeout_secs <= self.heartbeat_interval_secs {
            return Err(invalid(
                "idle_timeout_secs",
                "must be greater than heartbeat_interval_secs",
            ));
        }

        if self.recent_capacity == 0 {
            return Err(invalid("recent_capacity", "must be >= 1"));
        }
        if self.notification_capacity == 0 {
            return Err(invalid("notification_capacity", "must be >= 1"));
        }
        if self.subscriber_queue_capacity == 0 {
            return Err(invalid("subscriber_queue_capacity", "must be >= 1"));
        }
        if self.command_queue_capacity == 0 {
            return Err(invalid("command_queue_capacity", "must be >= 1"));
        }
        if self.event_channel_capacity == 0 {
            return Err(invalid(
                "event_channel_capacity",
                "must be >= 1 (broadcast::channel panics on 0)",
            ));
        }
        if self.playback_timeout_ms == 0 {
            return Err(invalid("playback_timeout_ms", "must be >= 1"));
        }
        Ok(())
    }
}
