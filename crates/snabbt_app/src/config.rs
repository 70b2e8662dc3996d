//! `snabbt.ron` loading and the environment overrides applied on top of it.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use snabbt_core::PollSettings;
use snabbt_engine::{
    BridgeSettings, ConfigError, HealthSettings, RequestTimeouts, SyncSettings,
};
use thiserror::Error;

pub const ENV_BASE_URL: &str = "SNABBT_BASE_URL";
pub const ENV_PUSH_URL: &str = "SNABBT_PUSH_URL";

#[derive(Debug, Error)]
pub enum ConfigFileError {
    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path:?}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error(transparent)]
    Invalid(#[from] ConfigError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub base_url: String,
    /// Push channel base; no push subscription when absent.
    pub push_url: Option<String>,
    /// Directory holding the session-resume file.
    pub state_dir: PathBuf,
    pub log_file: PathBuf,
    pub poll: PollConfig,
    pub timeouts: TimeoutConfig,
    pub health_interval_ms: u64,
    pub reconnect_delay_ms: u64,
    pub push_connect_timeout_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            push_url: None,
            state_dir: PathBuf::from("."),
            log_file: PathBuf::from("snabbt.log"),
            poll: PollConfig::default(),
            timeouts: TimeoutConfig::default(),
            health_interval_ms: 30_000,
            reconnect_delay_ms: millis(BridgeSettings::default().reconnect_delay),
            push_connect_timeout_ms: millis(BridgeSettings::default().connect_timeout),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub status_interval_ms: u64,
    pub qr_interval_ms: u64,
    pub fast_qr_interval_ms: u64,
    pub max_ready_attempts: u32,
    pub failure_warning_threshold: u32,
    pub log_capacity: usize,
}

impl Default for PollConfig {
    fn default() -> Self {
        let defaults = PollSettings::default();
        Self {
            status_interval_ms: millis(defaults.status_interval),
            qr_interval_ms: millis(defaults.qr_interval),
            fast_qr_interval_ms: millis(defaults.fast_qr_interval),
            max_ready_attempts: defaults.max_ready_attempts,
            failure_warning_threshold: defaults.failure_warning_threshold,
            log_capacity: defaults.log_capacity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub connect_ms: u64,
    pub status_ms: u64,
    pub qr_ms: u64,
    pub health_ms: u64,
    pub control_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        let defaults = RequestTimeouts::default();
        Self {
            connect_ms: millis(defaults.connect),
            status_ms: millis(defaults.status),
            qr_ms: millis(defaults.qr),
            health_ms: millis(defaults.health),
            control_ms: millis(defaults.control),
        }
    }
}

impl AppConfig {
    /// Reads `path`; `None` when the file does not exist.
    pub fn load(path: &Path) -> Result<Option<Self>, ConfigFileError> {
        let content = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(ConfigFileError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        Self::parse(&content)
            .map(Some)
            .map_err(|message| ConfigFileError::Parse {
                path: path.to_path_buf(),
                message,
            })
    }

    pub fn parse(content: &str) -> Result<Self, String> {
        ron::from_str(content).map_err(|err| err.to_string())
    }

    /// Applies overrides from `lookup` (normally `std::env::var`). Blank values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let present = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        if let Some(base_url) = present(ENV_BASE_URL) {
            self.base_url = base_url;
        }
        if let Some(push_url) = present(ENV_PUSH_URL) {
            self.push_url = Some(push_url);
        }
    }

    pub fn sync_settings(&self) -> Result<SyncSettings, ConfigError> {
        let settings = SyncSettings {
            poll: PollSettings {
                status_interval: Duration::from_millis(self.poll.status_interval_ms),
                qr_interval: Duration::from_millis(self.poll.qr_interval_ms),
                fast_qr_interval: Duration::from_millis(self.poll.fast_qr_interval_ms),
                max_ready_attempts: self.poll.max_ready_attempts,
                failure_warning_threshold: self.poll.failure_warning_threshold,
                log_capacity: self.poll.log_capacity,
            },
            timeouts: RequestTimeouts {
                connect: Duration::from_millis(self.timeouts.connect_ms),
                status: Duration::from_millis(self.timeouts.status_ms),
                qr: Duration::from_millis(self.timeouts.qr_ms),
                health: Duration::from_millis(self.timeouts.health_ms),
                control: Duration::from_millis(self.timeouts.control_ms),
            },
            health: HealthSettings {
                interval: Duration::from_millis(self.health_interval_ms),
            },
            bridge: BridgeSettings {
                reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
                connect_timeout: Duration::from_millis(self.push_connect_timeout_ms),
            },
        };
        settings.validate()?;
        Ok(settings)
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use snabbt_engine::{ConfigError, SyncSettings};

    use super::{AppConfig, ConfigFileError, ENV_BASE_URL, ENV_PUSH_URL};

    #[test]
    fn defaults_match_the_library_settings() {
        let settings = AppConfig::default().sync_settings().unwrap();
        assert_eq!(settings, SyncSettings::default());
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let config = AppConfig::parse(
            r#"(
                base_url: "https://worker.example.se",
                push_url: Some("wss://push.example.se"),
                poll: (status_interval_ms: 5000),
            )"#,
        )
        .unwrap();
        assert_eq!(config.base_url, "https://worker.example.se");
        assert_eq!(config.push_url.as_deref(), Some("wss://push.example.se"));
        let settings = config.sync_settings().unwrap();
        assert_eq!(settings.poll.status_interval, Duration::from_secs(5));
        assert_eq!(settings.poll.qr_interval, Duration::from_secs(1));
        assert_eq!(settings.poll.max_ready_attempts, 40);
    }

    #[test]
    fn timeout_at_or_above_its_interval_is_rejected() {
        let mut config = AppConfig::default();
        config.timeouts.status_ms = 3_000;
        assert!(matches!(
            config.sync_settings(),
            Err(ConfigError::TimeoutNotBelowInterval { name: "status", .. })
        ));
    }

    #[test]
    fn env_overrides_replace_urls_and_skip_blank_values() {
        let env: HashMap<&str, &str> = [(ENV_BASE_URL, "http://10.0.0.5:8000"), (ENV_PUSH_URL, " ")]
            .into_iter()
            .collect();
        let mut config = AppConfig::default();
        config.apply_env(|name| env.get(name).map(|value| value.to_string()));
        assert_eq!(config.base_url, "http://10.0.0.5:8000");
        assert_eq!(config.push_url, None);
    }

    #[test]
    fn missing_file_means_defaults_and_garbage_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = AppConfig::load(&dir.path().join("none.ron")).unwrap();
        assert_eq!(missing, None);

        let path = dir.path().join("push.ron");
        std::fs::write(&path, "(push_connect_timeout_ms: 2500)").unwrap();
        let loaded = AppConfig::load(&path).unwrap().unwrap();
        assert_eq!(
            loaded.sync_settings().unwrap().bridge.connect_timeout,
            Duration::from_millis(2_500)
        );

        let path = dir.path().join("bad.ron");
        std::fs::write(&path, "(base_url: 42").unwrap();
        assert!(matches!(
            AppConfig::load(&path),
            Err(ConfigFileError::Parse { .. })
        ));
    }
}
