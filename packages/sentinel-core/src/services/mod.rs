//! Side-effect subscribers.
//!
//! These consume the alert stream like the in-memory views do, but act on the
//! outside world: ringing the alarm and appending to the incident log.

pub mod alarm_dispatcher;
pub mod incident_log;

pub use alarm_dispatcher::{
    AlarmDispatcher, AlarmPlayer, AlarmStats, CommandAlarmPlayer, LoggingAlarmPlayer,
    NoopAlarmPlayer, PlaybackError,
};
pub use incident_log::IncidentLog;
