//! Fixed protocol constants and tunable defaults.
//!
//! The wire names in the first section are shared with the alert source and
//! must not change. The defaults below them seed [`crate::state::Config`].

// ─────────────────────────────────────────────────────────────────────────────
// Alert Source Protocol
// ─────────────────────────────────────────────────────────────────────────────

/// Envelope event name used by the detection server for new alerts.
pub const NEW_ALERT_EVENT: &str = "new_alert";

/// Text frame sent by the client right after the handshake.
pub const KEEPALIVE_TEXT: &str = "ping";

/// Reply text some sources send back for [`KEEPALIVE_TEXT`].
pub const KEEPALIVE_REPLY_TEXT: &str = "pong";

/// Command name that switches the detection engine on or off.
pub const TOGGLE_AI_COMMAND: &str = "toggle_ai";

// ─────────────────────────────────────────────────────────────────────────────
// Counter Names
// ─────────────────────────────────────────────────────────────────────────────

/// Counter incremented once for every accepted alert.
pub const CRITICAL_COUNTER: &str = "critical";

/// Prefix of the per-kind counters (`kind:weapon`, `kind:crowd-surge`, ...).
pub const KIND_COUNTER_PREFIX: &str = "kind:";

// ─────────────────────────────────────────────────────────────────────────────
// Application Identity
// ─────────────────────────────────────────────────────────────────────────────

/// Service identifier reported by the health endpoint.
pub const SERVICE_ID: &str = "sentinel";

// ─────────────────────────────────────────────────────────────────────────────
// Defaults
// ─────────────────────────────────────────────────────────────────────────────

/// Capacity of the recent-alerts feed.
pub const DEFAULT_RECENT_CAPACITY: usize = 100;

/// Capacity of the notification tray.
pub const DEFAULT_NOTIFICATION_CAPACITY: usize = 10;

/// First reconnect delay (ms).
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 500;

/// Upper bound for the reconnect delay (ms).
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 30_000;

/// Timeout for a single WebSocket handshake (seconds).
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Interval between WebSocket pings (seconds).
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 10;

/// Connection is considered lost after this long without any inbound frame (seconds).
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 30;

/// How often the connection loop checks for an idle source (ms).
pub const IDLE_CHECK_INTERVAL_MS: u64 = 1_000;

/// Per-subscriber delivery queue capacity.
pub const DEFAULT_SUBSCRIBER_QUEUE_CAPACITY: usize = 256;

/// Outbound command queue capacity for one connection epoch.
pub const DEFAULT_COMMAND_QUEUE_CAPACITY: usize = 32;

/// Capacity of the lifecycle event broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Upper bound on a single alarm playback (ms).
pub const DEFAULT_PLAYBACK_TIMEOUT_MS: u64 = 5_000;

/// Characters of a malformed frame kept in log output.
pub const MAX_FRAME_PREVIEW_CHARS: usize = 120;
