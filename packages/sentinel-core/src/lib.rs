//! Sentinel Core - live alert stream controller.
//!
//! This crate keeps a client-side view of a security alert feed. A detection
//! backend pushes "threat detected" events over a persistent WebSocket; the
//! controller receives them, keeps bounded in-memory views of the history,
//! rings an alarm, records an incident log, and relays operator commands back
//! to the source.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`connection`]: WebSocket lifecycle, reconnect backoff, command channel
//! - [`normalizer`]: Raw frame validation into [`Alert`]s
//! - [`history`]: Bounded, most-recent-first alert stores
//! - [`counters`]: Monotonic aggregate counters
//! - [`fanout`]: Ordered, failure-isolated delivery to subscribers
//! - [`services`]: Side-effect subscribers (alarm, incident log)
//! - [`controller`]: Composition root and public surface
//! - [`events`]: Event system for observers
//! - [`api`]: Headless HTTP surface
//! - [`state`]: Configuration
//! - [`error`]: Centralized error types
//!
//! # Abstraction Traits
//!
//! - [`AlertSubscriber`](fanout::AlertSubscriber): Consuming the alert stream
//! - [`AlarmPlayer`](services::AlarmPlayer): Playing the alarm sound
//! - [`EventEmitter`](events::EventEmitter): Emitting lifecycle events
//! - [`FrameHandler`](connection::FrameHandler): Receiving raw frames
//! - [`TaskSpawner`](runtime::TaskSpawner): Spawning background tasks

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod alert;
pub mod api;
pub mod connection;
pub mod controller;
pub mod counters;
pub mod error;
pub mod events;
pub mod fanout;
pub mod history;
pub mod normalizer;
pub mod protocol_constants;
pub mod runtime;
pub mod services;
pub mod state;
pub mod utils;

// Re-export commonly used types at the crate root
pub use alert::{Alert, Timestamp};
pub use connection::{
    Backoff, Command, CommandChannel, CommandDropped, ConnectionError, ConnectionManager,
    ConnectionSettings, ConnectionState, FrameHandler,
};
pub use controller::{AlertController, AlertControllerBuilder, ControllerStats};
pub use counters::AggregateCounters;
pub use error::{ErrorCode, SentinelError, SentinelResult};
pub use events::{
    AlertEvent, BroadcastEvent, BroadcastEventBridge, CommandEvent, ConnectionEvent,
    EventEmitter, LoggingEventEmitter, NoopEventEmitter,
};
pub use fanout::{AlertSubscriber, FanOut, SubscriberError, SubscriberStats};
pub use history::BoundedHistory;
pub use normalizer::{is_keepalive, normalize, MalformedEvent};
pub use runtime::{TaskSpawner, TokioSpawner};
pub use services::{
    AlarmDispatcher, AlarmPlayer, AlarmStats, CommandAlarmPlayer, IncidentLog,
    LoggingAlarmPlayer, NoopAlarmPlayer, PlaybackError,
};
pub use state::{Config, ConfigError, EndpointConfig};
pub use utils::now_millis;

// Re-export API types
pub use api::{start_server, AppState, ServerError};
