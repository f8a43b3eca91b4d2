//! Console configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sentinel_core::EndpointConfig;
use serde::Deserialize;

/// Console configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Alert source URL.
    /// Override: `SENTINEL_ENDPOINT`
    pub endpoint: String,

    /// Port for the status/command HTTP API.
    /// Override: `SENTINEL_HTTP_PORT`
    pub http_port: u16,

    /// Whether the alarm rings at startup.
    /// Override: `SENTINEL_SOUND_ENABLED`
    pub sound_enabled: bool,

    /// External program (and arguments) run once per alert to play the alarm.
    /// Alarms are only logged when empty.
    pub alarm_command: Vec<String>,

    /// Upper bound on one alarm playback (milliseconds).
    pub playback_timeout_ms: u64,

    /// JSON-lines incident log. Disabled when unset.
    /// Override: `SENTINEL_INCIDENT_LOG`
    pub incident_log: Option<PathBuf>,

    /// First reconnect delay (milliseconds).
    pub initial_backoff_ms: u64,

    /// Reconnect delay cap (milliseconds).
    pub max_backoff_ms: u64,

    /// Interval between WebSocket pings (seconds).
    pub heartbeat_interval_secs: u64,

    /// Silence after which the connection is considered lost (seconds).
    pub idle_timeout_secs: u64,

    /// Capacity of the recent-alerts feed.
    pub recent_capacity: usize,

    /// Capacity of the notification tray.
    pub notification_capacity: usize,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        let core = sentinel_core::Config::default();
        Self {
            endpoint: core.endpoint.url(),
            http_port: 8090,
            sound_enabled: core.sound_enabled,
            alarm_command: Vec::new(),
            playback_timeout_ms: core.playback_timeout_ms,
            incident_log: None,
            initial_backoff_ms: core.initial_backoff_ms,
            max_backoff_ms: core.max_backoff_ms,
            heartbeat_interval_secs: core.heartbeat_interval_secs,
            idle_timeout_secs: core.idle_timeout_secs,
            recent_capacity: core.recent_capacity,
            notification_capacity: core.notification_capacity,
        }
    }
}

impl ConsoleConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::from_yaml(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Applies overrides from `lookup` (the process environment in production).
    ///
    /// Values that do not parse are ignored with a warning.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("SENTINEL_ENDPOINT") {
            self.endpoint = val;
        }

        if let Some(val) = lookup("SENTINEL_HTTP_PORT") {
            match val.parse() {
                Ok(port) => self.http_port = port,
                Err(_) => log::warn!("Ignoring invalid SENTINEL_HTTP_PORT: {}", val),
            }
        }

        if let Some(val) = lookup("SENTINEL_SOUND_ENABLED") {
            match val.parse() {
                Ok(enabled) => self.sound_enabled = enabled,
                Err(_) => log::warn!("Ignoring invalid SENTINEL_SOUND_ENABLED: {}", val),
            }
        }

        if let Some(val) = lookup("SENTINEL_INCIDENT_LOG") {
            self.incident_log = (!val.is_empty()).then(|| PathBuf::from(val));
        }
    }

    /// Converts to sentinel-core's Config type.
    pub fn to_core_config(&self) -> Result<sentinel_core::Config> {
        let endpoint = EndpointConfig::parse(&self.endpoint)?;
        Ok(sentinel_core::Config {
            endpoint,
            initial_backoff_ms: self.initial_backoff_ms,
            max_backoff_ms: self.max_backoff_ms,
            heartbeat_interval_secs: self.heartbeat_interval_secs,
            idle_timeout_secs: self.idle_timeout_secs,
            recent_capacity: self.recent_capacity,
            notification_capacity: self.notification_capacity,
            sound_enabled: self.sound_enabled,
            playback_timeout_ms: self.playback_timeout_ms,
            incident_log_path: self.incident_log.clone(),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_the_local_alert_source() {
        let config = ConsoleConfig::default();
        assert_eq!(config.endpoint, "ws://localhost:8000/ws/alerts");
        assert_eq!(config.http_port, 8090);

        let core = config.to_core_config().unwrap();
        core.validate().unwrap();
        assert_eq!(core.recent_capacity, 100);
        assert_eq!(core.notification_capacity, 10);
    }

    #[test]
    fn yaml_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sentinel.yaml");
        std::fs::write(
            &path,
            "endpoint: ws://10.0.0.5:9000/ws/alerts\n\
             alarm_command: [paplay, /usr/share/sounds/siren.wav]\n\
             sound_enabled: false\n",
        )
        .unwrap();

        let config = ConsoleConfig::from_yaml(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(config.alarm_command, vec!["paplay", "/usr/share/sounds/siren.wav"]);
        assert!(!config.sound_enabled);

        let core = config.to_core_config().unwrap();
        assert_eq!(core.endpoint.host, "10.0.0.5");
        assert_eq!(core.endpoint.port, 9000);
        assert_eq!(core.max_backoff_ms, 30_000);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ConsoleConfig::load(Some(&dir.path().join("absent.yaml"))).is_err());
    }

    #[test]
    fn env_overrides_apply_and_bad_values_are_ignored() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("SENTINEL_ENDPOINT", "ws://alerts.local:8000/ws/alerts"),
            ("SENTINEL_HTTP_PORT", "not-a-port"),
            ("SENTINEL_SOUND_ENABLED", "false"),
            ("SENTINEL_INCIDENT_LOG", "/var/log/sentinel/incidents.jsonl"),
        ]);

        let mut config = ConsoleConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.endpoint, "ws://alerts.local:8000/ws/alerts");
        assert_eq!(config.http_port, 8090);
        assert!(!config.sound_enabled);
        assert_eq!(
            config.incident_log,
            Some(PathBuf::from("/var/log/sentinel/incidents.jsonl"))
        );
    }

    #[test]
    fn bad_endpoint_fails_conversion() {
        let config = ConsoleConfig {
            endpoint: "http://localhost:8000".into(),
            ..ConsoleConfig::default()
        };
        assert!(config.to_core_config().is_err());
    }
}
