//! Composition root and public surface of the alert stream controller.
//!
//! [`AlertController`] wires the pipeline together:
//!
//! ```text
//! ConnectionManager ─frame─▶ AlertIngest ─normalize─▶ FanOut ─┬▶ recent feed (100)
//!        ▲                        │                           ├▶ notification tray (10)
//!        │                        ▼                           ├▶ counters
//!  CommandChannel          BroadcastEventBridge               ├▶ alarm dispatcher
//!                                                             └▶ incident log (optional)
//! ```
//!
//! Presentation code only reads snapshots and sends commands; it never
//! mutates the stores directly.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, watch};

use crate::alert::Alert;
use crate::connection::{
    Command, CommandDropped, ConnectionManager, ConnectionSettings, ConnectionState, FrameHandler,
};
use crate::counters::AggregateCounters;
use crate::error::{ErrorCode, SentinelError, SentinelResult};
use crate::events::{
    AlertEvent, BroadcastEvent, BroadcastEventBridge, CommandEvent, EventEmitter,
};
use crate::fanout::{AlertSubscriber, FanOut, SubscriberStats};
use crate::history::BoundedHistory;
use crate::normalizer::normalize;
use crate::services::{AlarmDispatcher, AlarmPlayer, AlarmStats, IncidentLog, LoggingAlarmPlayer};
use crate::state::{Config, ConfigError};
use crate::utils::{frame_preview, now_millis};

/// Turns raw frames into alerts and hands them to the fan-out.
struct AlertIngest {
    fanout: FanOut,
    emitter: Arc<dyn EventEmitter>,
    accepted: AtomicU64,
    malformed: AtomicU64,
}

#[async_trait]
impl FrameHandler for AlertIngest {
    async fn handle_frame(&self, frame: &str, epoch: u64) {
        let received_at = now_millis();
        match normalize(frame, received_at) {
            Ok(alert) => {
                let alert = Arc::new(alert);
                self.accepted.fetch_add(1, Ordering::Relaxed);
                log::info!("[Ingest] Alert {} (epoch {})", alert, epoch);
                self.fanout.deliver(Arc::clone(&alert));
                self.emitter.emit_alert(AlertEvent::Received {
                    alert,
                    epoch,
                    timestamp: received_at,
                });
            }
            Err(e) => {
                self.malformed.fetch_add(1, Ordering::Relaxed);
                log::warn!(
                    "[Ingest] Dropped malformed frame ({}): {}",
                    e.code(),
                    frame_preview(frame)
                );
                self.emitter.emit_alert(AlertEvent::Malformed {
                    reason: e.to_string(),
                    epoch,
                    timestamp: received_at,
                });
            }
        }
    }
}

/// Point-in-time controller statistics.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerStats {
    pub state: ConnectionState,
    pub url: String,
    pub epoch: u64,
    pub accepted_alerts: u64,
    pub dropped_frames: u64,
    pub commands_sent: u64,
    pub commands_dropped: u64,
    pub recent_len: usize,
    pub notification_len: usize,
    pub sound_enabled: bool,
    pub alarm: AlarmStats,
    pub subscribers: Vec<SubscriberStats>,
}

/// Builder for constructing an [`AlertController`].
#[derive(Default)]
pub struct AlertControllerBuilder {
    config: Config,
    alarm_player: Option<Arc<dyn AlarmPlayer>>,
    extra_subscribers: Vec<Arc<dyn AlertSubscriber>>,
    external_emitter: Option<Arc<dyn EventEmitter>>,
}

impl AlertControllerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the configuration.
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Sets the alarm player. Defaults to [`LoggingAlarmPlayer`].
    pub fn alarm_player(mut self, player: Arc<dyn AlarmPlayer>) -> Self {
        self.alarm_player = Some(player);
        self
    }

    /// Registers an additional subscriber after the built-in ones.
    pub fn subscriber(mut self, subscriber: Arc<dyn AlertSubscriber>) -> Self {
        self.extra_subscribers.push(subscriber);
        self
    }

    /// Sets an emitter that sees every event before the broadcast channel.
    pub fn external_emitter(mut self, emitter: Arc<dyn EventEmitter>) -> Self {
        self.external_emitter = Some(emitter);
        self
    }

    /// Validates the configuration and wires the pipeline.
    ///
    /// Does not connect; call [`AlertController::start`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration is invalid.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime context.
    pub fn build(self) -> Result<AlertController, ConfigError> {
        let config = self.config;
        config.validate()?;

        let bridge = Arc::new(BroadcastEventBridge::new(config.event_channel_capacity));
        if let Some(emitter) = self.external_emitter {
            bridge.set_external_emitter(emitter);
        }

        let recent = Arc::new(BoundedHistory::new("recent", config.recent_capacity));
        let notifications = Arc::new(BoundedHistory::new(
            "notifications",
            config.notification_capacity,
        ));
        let counters = Arc::new(AggregateCounters::new());
        let sound_enabled = Arc::new(AtomicBool::new(config.sound_enabled));
        let player: Arc<dyn AlarmPlayer> = match self.alarm_player {
            Some(player) => player,
            None => Arc::new(LoggingAlarmPlayer),
        };
        let alarm = Arc::new(AlarmDispatcher::new(
            player,
            Arc::clone(&sound_enabled),
            Duration::from_millis(config.playback_timeout_ms),
        ));
        let incident_log = config
            .incident_log_path
            .as_ref()
            .map(|path| Arc::new(IncidentLog::new(path)));

        let mut subscribers: Vec<Arc<dyn AlertSubscriber>> = Vec::new();
        subscribers.push(recent.clone());
        subscribers.push(notifications.clone());
        subscribers.push(counters.clone());
        subscribers.push(alarm.clone());
        if let Some(log) = &incident_log {
            subscribers.push(log.clone());
        }
        subscribers.extend(self.extra_subscribers);

        let emitter: Arc<dyn EventEmitter> = bridge.clone();
        let ingest = Arc::new(AlertIngest {
            fanout: FanOut::new(subscribers, config.subscriber_queue_capacity),
            emitter: Arc::clone(&emitter),
            accepted: AtomicU64::new(0),
            malformed: AtomicU64::new(0),
        });
        let connection = ConnectionManager::new(
            ConnectionSettings::from_config(&config),
            ingest.clone(),
            Arc::clone(&emitter),
        );

        log::info!(
            "[Controller] Ready for {} (feed {}, tray {})",
            connection.url(),
            config.recent_capacity,
            config.notification_capacity
        );

        Ok(AlertController {
            recent,
            notifications,
            counters,
            alarm,
            incident_log,
            sound_enabled,
            ingest,
            connection,
            bridge,
            emitter,
        })
    }
}

/// The live alert stream controller.
pub struct AlertController {
    recent: Arc<BoundedHistory>,
    notifications: Arc<BoundedHistory>,
    counters: Arc<AggregateCounters>,
    alarm: Arc<AlarmDispatcher>,
    incident_log: Option<Arc<IncidentLog>>,
    sound_enabled: Arc<AtomicBool>,
    ingest: Arc<AlertIngest>,
    connection: ConnectionManager,
    bridge: Arc<BroadcastEventBridge>,
    emitter: Arc<dyn EventEmitter>,
}

impl AlertController {
    pub fn builder() -> AlertControllerBuilder {
        AlertControllerBuilder::new()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Starts connecting. Returns `false` if already running.
    pub fn start(&self) -> bool {
        self.connection.start()
    }

    /// Closes the connection and stops reconnecting. Stored alerts are kept.
    pub async fn stop(&self) {
        self.connection.stop().await;
    }

    /// Stops the connection, then drains and stops every subscriber.
    pub async fn shutdown(&self) {
        self.connection.stop().await;
        self.ingest.fanout.shutdown().await;
        log::info!("[Controller] Shut down");
    }

    /// Waits until every subscriber has handled all alerts accepted so far.
    pub async fn flush(&self) {
        self.ingest.fanout.flush().await;
    }

    /// Clears both histories and all counters.
    ///
    /// The reset is queued behind the alerts accepted so far, so every view
    /// drops exactly those alerts and keeps everything accepted afterwards.
    pub async fn reset_session(&self) {
        self.ingest.fanout.reset().await;
        log::info!("[Controller] Session reset");
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Read Side
    // ─────────────────────────────────────────────────────────────────────────

    /// Recent-alerts feed, most recent first.
    #[must_use]
    pub fn recent_alerts(&self) -> Vec<Arc<Alert>> {
        self.recent.snapshot()
    }

    /// Notification tray, most recent first.
    #[must_use]
    pub fn notifications(&self) -> Vec<Arc<Alert>> {
        self.notifications.snapshot()
    }

    #[must_use]
    pub fn read_counter(&self, name: &str) -> u64 {
        self.counters.read(name)
    }

    #[must_use]
    pub fn counters(&self) -> BTreeMap<String, u64> {
        self.counters.snapshot()
    }

    /// Logged alerts, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`SentinelError::Configuration`] when no incident log is
    /// configured, or [`SentinelError::Internal`] if it cannot be read.
    pub async fn incidents(&self, limit: usize) -> SentinelResult<Vec<Value>> {
        let Some(log) = &self.incident_log else {
            return Err(SentinelError::Configuration(
                "incident log is disabled".into(),
            ));
        };
        log.read_recent(limit)
            .await
            .map_err(|e| SentinelError::Internal(e.to_string()))
    }

    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn watch_connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.connection.watch_state()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<BroadcastEvent> {
        self.bridge.subscribe()
    }

    pub fn event_bridge(&self) -> &Arc<BroadcastEventBridge> {
        &self.bridge
    }

    #[must_use]
    pub fn stats(&self) -> ControllerStats {
        let commands = self.connection.commands();
        ControllerStats {
            state: self.connection.state(),
            url: self.connection.url().to_string(),
            epoch: self.connection.epoch(),
            accepted_alerts: self.ingest.accepted.load(Ordering::Relaxed),
            dropped_frames: self.ingest.malformed.load(Ordering::Relaxed),
            commands_sent: commands.sent_count(),
            commands_dropped: commands.dropped_count(),
            recent_len: self.recent.len(),
            notification_len: self.notifications.len(),
            sound_enabled: self.sound_enabled(),
            alarm: self.alarm.stats(),
            subscribers: self.ingest.fanout.stats(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Operator Actions
    // ─────────────────────────────────────────────────────────────────────────

    /// Takes effect from the next alert dispatched.
    pub fn set_sound_enabled(&self, enabled: bool) {
        self.sound_enabled.store(enabled, Ordering::SeqCst);
        log::info!(
            "[Controller] Sound {}",
            if enabled { "enabled" } else { "disabled" }
        );
    }

    #[must_use]
    pub fn sound_enabled(&self) -> bool {
        self.sound_enabled.load(Ordering::SeqCst)
    }

    /// Sends `command` on the live connection.
    ///
    /// # Errors
    ///
    /// Returns [`CommandDropped`] when the command was not transmitted.
    pub fn send_command(&self, command: Command) -> Result<(), CommandDropped> {
        let result = self.connection.commands().send(&command);
        let timestamp = now_millis();
        match &result {
            Ok(()) => self.emitter.emit_command(CommandEvent::Sent {
                name: command.name().to_string(),
                payload: command.payload().clone(),
                timestamp,
            }),
            Err(e) => self.emitter.emit_command(CommandEvent::Dropped {
                name: command.name().to_string(),
                reason: e.to_string(),
                timestamp,
            }),
        }
        result
    }

    /// Switches the detection engine on or off.
    ///
    /// # Errors
    ///
    /// Returns [`CommandDropped`] when not connected.
    pub fn toggle_ai(&self, enabled: bool) -> Result<(), CommandDropped> {
        self.send_command(Command::toggle_ai(enabled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{NoopAlarmPlayer, PlaybackError};
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingPlayer {
        plays: AtomicUsize,
    }

    #[async_trait]
    impl AlarmPlayer for CountingPlayer {
        async fn play(&self, _alert: &Alert) -> Result<(), PlaybackError> {
            self.plays.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn controller() -> AlertController {
        AlertController::builder()
            .alarm_player(Arc::new(NoopAlarmPlayer))
            .build()
            .unwrap()
    }

    async fn feed(controller: &AlertController, frames: &[&str]) {
        for frame in frames {
            controller.ingest.handle_frame(frame, 1).await;
        }
        controller.flush().await;
    }

    fn labels(alerts: &[Arc<Alert>]) -> Vec<String> {
        alerts.iter().map(|a| a.to_string()).collect()
    }

    #[tokio::test]
    async fn alerts_reach_every_view() {
        let controller = controller();
        feed(
            &controller,
            &[
                r#"{"kind":"weapon","location":"gate"}"#,
                r#"{"kind":"crowd-surge","location":"lobby"}"#,
                r#"{"kind":"weapon","location":"gate"}"#,
            ],
        )
        .await;

        assert_eq!(controller.read_counter("critical"), 3);
        assert_eq!(
            labels(&controller.recent_alerts()),
            vec!["weapon/gate", "crowd-surge/lobby", "weapon/gate"]
        );
        assert_eq!(controller.notifications().len(), 3);
        assert!(Arc::ptr_eq(
            &controller.recent_alerts()[0],
            &controller.notifications()[0]
        ));
    }

    #[tokio::test]
    async fn malformed_frames_are_not_stored_or_counted() {
        let controller = controller();
        feed(
            &controller,
            &[
                "garbage",
                r#"{"location":"gate"}"#,
                r#"{"event":"status","data":{}}"#,
            ],
        )
        .await;

        assert!(controller.recent_alerts().is_empty());
        assert!(controller.notifications().is_empty());
        assert_eq!(controller.read_counter("critical"), 0);

        let stats = controller.stats();
        assert_eq!(stats.dropped_frames, 3);
        assert_eq!(stats.accepted_alerts, 0);
    }

    #[tokio::test]
    async fn tray_keeps_last_ten_of_fifteen() {
        let controller = controller();
        let frames: Vec<String> = (1..=15)
            .map(|n| format!(r#"{{"kind":"weapon","location":"cam-{}"}}"#, n))
            .collect();
        let frames: Vec<&str> = frames.iter().map(String::as_str).collect();
        feed(&controller, &frames).await;

        let tray: Vec<String> = controller
            .notifications()
            .iter()
            .map(|a| a.location().to_string())
            .collect();
        let expected: Vec<String> = (6..=15).rev().map(|n| format!("cam-{}", n)).collect();
        assert_eq!(tray, expected);
        assert_eq!(controller.recent_alerts().len(), 15);
    }

    #[tokio::test]
    async fn sound_toggle_gates_the_alarm() {
        let player = Arc::new(CountingPlayer::default());
        let controller = AlertController::builder()
            .alarm_player(player.clone())
            .build()
            .unwrap();

        feed(&controller, &[r#"{"kind":"weapon","location":"gate"}"#]).await;
        controller.set_sound_enabled(false);
        feed(&controller, &[r#"{"kind":"weapon","location":"dock"}"#]).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(player.plays.load(Ordering::SeqCst), 1);
        let alarm = controller.stats().alarm;
        assert_eq!(alarm.triggered, 1);
        assert_eq!(alarm.muted, 1);
    }

    #[tokio::test]
    async fn commands_are_dropped_while_disconnected() {
        let controller = controller();
        let mut events = controller.subscribe_events();

        let result = controller.toggle_ai(true);
        assert!(matches!(result, Err(CommandDropped::NotConnected { .. })));

        match events.recv().await.unwrap() {
            BroadcastEvent::Command(CommandEvent::Dropped { name, .. }) => {
                assert_eq!(name, "toggle_ai")
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(controller.stats().commands_dropped, 1);
    }

    #[tokio::test]
    async fn accepted_alert_is_broadcast() {
        let controller = controller();
        let mut events = controller.subscribe_events();
        feed(&controller, &[r#"{"type":"WEAPON: KNIFE","location":"Main Gate"}"#]).await;

        match events.recv().await.unwrap() {
            BroadcastEvent::Alert(AlertEvent::Received { alert, epoch, .. }) => {
                assert_eq!(alert.kind(), "WEAPON: KNIFE");
                assert_eq!(epoch, 1);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn reset_session_clears_views_and_counters() {
        let controller = controller();
        feed(&controller, &[r#"{"kind":"weapon","location":"gate"}"#]).await;

        controller.reset_session().await;

        assert!(controller.recent_alerts().is_empty());
        assert!(controller.notifications().is_empty());
        assert_eq!(controller.read_counter("critical"), 0);
        assert!(controller.counters().is_empty());
    }

    #[tokio::test]
    async fn alerts_after_a_reset_land_in_every_view() {
        let controller = controller();
        for frame in [
            r#"{"kind":"weapon","location":"gate"}"#,
            r#"{"kind":"weapon","location":"dock"}"#,
        ] {
            controller.ingest.handle_frame(frame, 1).await;
        }
        controller.reset_session().await;
        controller
            .ingest
            .handle_frame(r#"{"kind":"crowd-surge","location":"lobby"}"#, 1)
            .await;
        controller.flush().await;

        assert_eq!(labels(&controller.recent_alerts()), vec!["crowd-surge/lobby"]);
        assert_eq!(labels(&controller.notifications()), vec!["crowd-surge/lobby"]);
        assert_eq!(controller.read_counter("critical"), 1);
        assert_eq!(controller.read_counter("kind:weapon"), 0);
    }

    #[tokio::test]
    async fn incident_log_records_alerts_when_configured() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            incident_log_path: Some(dir.path().join("incidents.jsonl")),
            ..Config::default()
        };
        let controller = AlertController::builder()
            .config(config)
            .alarm_player(Arc::new(NoopAlarmPlayer))
            .build()
            .unwrap();

        feed(
            &controller,
            &[
                r#"{"kind":"weapon","location":"gate"}"#,
                r#"{"kind":"crowd-surge","location":"lobby"}"#,
            ],
        )
        .await;

        let incidents = controller.incidents(10).await.unwrap();
        assert_eq!(incidents.len(), 2);
        assert_eq!(incidents[0]["kind"], "crowd-surge");

        let names: Vec<String> = controller
            .stats()
            .subscribers
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(
            names,
            vec!["recent", "notifications", "counters", "alarm", "incident-log"]
        );
    }

    #[tokio::test]
    async fn incidents_without_log_is_a_configuration_error() {
        let controller = controller();
        assert!(matches!(
            controller.incidents(5).await,
            Err(SentinelError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn invalid_config_is_rejected_at_build() {
        let config = Config {
            recent_capacity: 0,
            ..Config::default()
        };
        assert!(AlertController::builder().config(config).build().is_err());
    }

    #[tokio::test]
    async fn starts_disconnected() {
        let controller = controller();
        assert_eq!(controller.connection_state(), ConnectionState::Disconnected);
        assert!(controller.sound_enabled());
    }
}
