//! Audible alarm on every alert while sound is enabled.
//!
//! The preference is read when each alert is dispatched, never cached, so a
//! toggle takes effect from the very next alert. Playback is fire-and-forget:
//! the dispatcher returns before the sound finishes, and a failed or hung
//! playback is logged and forgotten once the timeout elapses.

use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::alert::Alert;
use crate::fanout::{AlertSubscriber, SubscriberError};
use crate::runtime::{TaskSpawner, TokioSpawner};

/// Why one playback attempt failed.
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("alarm player unavailable: {0}")]
    Unavailable(String),

    #[error("failed to start alarm player: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("alarm player exited with {0}")]
    ExitStatus(ExitStatus),

    #[error("playback did not finish within {0:?}")]
    TimedOut(Duration),
}

/// Plays the alarm sound for one alert.
#[async_trait]
pub trait AlarmPlayer: Send + Sync {
    async fn play(&self, alert: &Alert) -> Result<(), PlaybackError>;
}

/// Player that does nothing; for headless runs and tests.
pub struct NoopAlarmPlayer;

#[async_trait]
impl AlarmPlayer for NoopAlarmPlayer {
    async fn play(&self, _alert: &Alert) -> Result<(), PlaybackError> {
        Ok(())
    }
}

/// Player that only logs the alarm.
pub struct LoggingAlarmPlayer;

#[async_trait]
impl AlarmPlayer for LoggingAlarmPlayer {
    async fn play(&self, alert: &Alert) -> Result<(), PlaybackError> {
        log::info!("[Alarm] ALERT {} at {}", alert, alert.timestamp());
        Ok(())
    }
}

/// Runs an external program per alert, e.g. `paplay /usr/share/sounds/siren.wav`.
///
/// The alert is passed in the `SENTINEL_ALERT_KIND` and
/// `SENTINEL_ALERT_LOCATION` environment variables. The child is killed if
/// the playback is abandoned.
#[derive(Debug, Clone)]
pub struct CommandAlarmPlayer {
    program: String,
    args: Vec<String>,
}

impl CommandAlarmPlayer {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Builds a player from `[program, args...]`; `None` when empty.
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        if program.trim().is_empty() {
            return None;
        }
        Some(Self::new(program.clone(), args.to_vec()))
    }
}

#[async_trait]
impl AlarmPlayer for CommandAlarmPlayer {
    async fn play(&self, alert: &Alert) -> Result<(), PlaybackError> {
        let status = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .env("SENTINEL_ALERT_KIND", alert.kind())
            .env("SENTINEL_ALERT_LOCATION", alert.location())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await?;

        if status.success() {
            Ok(())
        } else {
            Err(PlaybackError::ExitStatus(status))
        }
    }
}

/// Alarm counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlarmStats {
    /// Playbacks started.
    pub triggered: u64,
    /// Alerts that arrived while sound was disabled.
    pub muted: u64,
    /// Playbacks that failed or timed out.
    pub failed: u64,
    /// Playbacks still running.
    pub in_flight: usize,
}

/// Triggers one playback per alert while the sound preference is on.
pub struct AlarmDispatcher {
    player: Arc<dyn AlarmPlayer>,
    sound_enabled: Arc<AtomicBool>,
    playback_timeout: Duration,
    spawner: TokioSpawner,
    triggered: AtomicU64,
    muted: AtomicU64,
    failed: Arc<AtomicU64>,
}

impl AlarmDispatcher {
    /// `sound_enabled` is shared with whoever toggles the preference.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime context.
    pub fn new(
        player: Arc<dyn AlarmPlayer>,
        sound_enabled: Arc<AtomicBool>,
        playback_timeout: Duration,
    ) -> Self {
        Self {
            player,
            sound_enabled,
            playback_timeout,
            spawner: TokioSpawner::current(),
            triggered: AtomicU64::new(0),
            muted: AtomicU64::new(0),
            failed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Starts a playback for `alert` if sound is enabled right now.
    ///
    /// Returns whether a playback was started. Never waits for it.
    pub fn on_event(&self, alert: Arc<Alert>) -> bool {
        if !self.sound_enabled.load(Ordering::SeqCst) {
            self.muted.fetch_add(1, Ordering::Relaxed);
            log::debug!("[Alarm] Sound disabled, not ringing for {}", alert);
            return false;
        }

        self.triggered.fetch_add(1, Ordering::Relaxed);
        let player = Arc::clone(&self.player);
        let failed = Arc::clone(&self.failed);
        let limit = self.playback_timeout;

        self.spawner.spawn(async move {
            let outcome = match tokio::time::timeout(limit, player.play(&alert)).await {
                Ok(result) => result,
                Err(_) => Err(PlaybackError::TimedOut(limit)),
            };
            if let Err(e) = outcome {
                failed.fetch_add(1, Ordering::Relaxed);
                log::warn!("[Alarm] Playback for {} failed: {}", alert, e);
            }
        });
        true
    }

    #[must_use]
    pub fn triggered(&self) -> u64 {
        self.triggered.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn stats(&self) -> AlarmStats {
        AlarmStats {
            triggered: self.triggered(),
            muted: self.muted.load(Ordering::Relaxed),
            failed: self.failed(),
            in_flight: self.spawner.in_flight(),
        }
    }
}

#[async_trait]
impl AlertSubscriber for AlarmDispatcher {
    fn name(&self) -> &str {
        "alarm"
    }

    async fn on_alert(&self, alert: Arc<Alert>) -> Result<(), SubscriberError> {
        self.on_event(alert);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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

    struct BrokenPlayer;

    #[async_trait]
    impl AlarmPlayer for BrokenPlayer {
        async fn play(&self, _alert: &Alert) -> Result<(), PlaybackError> {
            Err(PlaybackError::Unavailable("no audio device".into()))
        }
    }

    struct HangingPlayer;

    #[async_trait]
    impl AlarmPlayer for HangingPlayer {
        async fn play(&self, _alert: &Alert) -> Result<(), PlaybackError> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    fn alert() -> Arc<Alert> {
        Arc::new(Alert::new("weapon", "gate").unwrap())
    }

    #[tokio::test]
    async fn toggling_sound_off_between_two_alerts_rings_once() {
        let player = Arc::new(CountingPlayer::default());
        let sound = Arc::new(AtomicBool::new(true));
        let dispatcher = AlarmDispatcher::new(
            player.clone(),
            Arc::clone(&sound),
            Duration::from_secs(5),
        );

        assert!(dispatcher.on_event(alert()));
        sound.store(false, Ordering::SeqCst);
        assert!(!dispatcher.on_event(alert()));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(player.plays.load(Ordering::SeqCst), 1);

        let stats = dispatcher.stats();
        assert_eq!(stats.triggered, 1);
        assert_eq!(stats.muted, 1);
        assert_eq!(stats.in_flight, 0);
    }

    #[tokio::test]
    async fn player_failure_is_counted_not_propagated() {
        let dispatcher = AlarmDispatcher::new(
            Arc::new(BrokenPlayer),
            Arc::new(AtomicBool::new(true)),
            Duration::from_secs(5),
        );

        dispatcher.on_alert(alert()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(dispatcher.triggered(), 1);
        assert_eq!(dispatcher.failed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_playback_is_abandoned_after_timeout() {
        let dispatcher = AlarmDispatcher::new(
            Arc::new(HangingPlayer),
            Arc::new(AtomicBool::new(true)),
            Duration::from_millis(5_000),
        );

        dispatcher.on_event(alert());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(dispatcher.stats().in_flight, 1);

        tokio::time::sleep(Duration::from_millis(5_000)).await;
        assert_eq!(dispatcher.failed(), 1);
        assert_eq!(dispatcher.stats().in_flight, 0);
    }

    #[test]
    fn command_player_needs_a_program() {
        assert!(CommandAlarmPlayer::from_argv(&[]).is_none());
        assert!(CommandAlarmPlayer::from_argv(&[" ".to_string()]).is_none());
        assert!(CommandAlarmPlayer::from_argv(&["paplay".into(), "siren.wav".into()]).is_some());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_player_reports_exit_status() {
        let ok = CommandAlarmPlayer::new("sh", vec!["-c".into(), "exit 0".into()]);
        ok.play(&alert()).await.unwrap();

        let failing = CommandAlarmPlayer::new("sh", vec!["-c".into(), "exit 3".into()]);
        assert!(matches!(
            failing.play(&alert()).await,
            Err(PlaybackError::ExitStatus(_))
        ));

        let missing = CommandAlarmPlayer::new("/nonexistent/alarm-player", Vec::new());
        assert!(matches!(
            missing.play(&alert()).await,
            Err(PlaybackError::Spawn(_))
        ));
    }
}
