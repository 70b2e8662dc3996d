use std::time::Duration;

use snabbt_core::{PollSettings, SettingsError};
use thiserror::Error;

/// Per-call timeouts. Each must stay below the interval of the loop that issues it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTimeouts {
    pub connect: Duration,
    pub status: Duration,
    pub qr: Duration,
    pub health: Duration,
    /// Start and stop calls; not issued from a polling loop.
    pub control: Duration,
}

impl Default for RequestTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_millis(800),
            status: Duration::from_millis(2_500),
            qr: Duration::from_millis(900),
            health: Duration::from_secs(5),
            control: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthSettings {
    pub interval: Duration,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeSettings {
    /// Wait between a dropped push connection and the next attempt.
    pub reconnect_delay: Duration,
    /// Upper bound on one connect attempt, handshake included.
    pub connect_timeout: Duration,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SyncSettings {
    pub poll: PollSettings,
    pub timeouts: RequestTimeouts,
    pub health: HealthSettings,
    pub bridge: BridgeSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Poll(#[from] SettingsError),
    #[error("{name} timeout ({timeout:?}) must be shorter than its interval ({interval:?})")]
    TimeoutNotBelowInterval {
        name: &'static str,
        timeout: Duration,
        interval: Duration,
    },
    #[error("{name} must be greater than zero")]
    Zero { name: &'static str },
}

impl SyncSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.poll.validate()?;
        let fastest_qr = self.poll.qr_interval.min(self.poll.fast_qr_interval);
        for (name, timeout, interval) in [
            ("status", self.timeouts.status, self.poll.status_interval),
            ("qr", self.timeouts.qr, fastest_qr),
            ("health", self.timeouts.health, self.health.interval),
        ] {
            if timeout.is_zero() {
                return Err(ConfigError::Zero { name });
            }
            if timeout >= interval {
                return Err(ConfigError::TimeoutNotBelowInterval {
                    name,
                    timeout,
                    interval,
                });
            }
        }
        if self.timeouts.control.is_zero() {
            return Err(ConfigError::Zero { name: "control" });
        }
        if self.bridge.reconnect_delay.is_zero() {
            return Err(ConfigError::Zero {
                name: "reconnect_delay",
            });
        }
        if self.bridge.connect_timeout.is_zero() {
            return Err(ConfigError::Zero {
                name: "push connect",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{ConfigError, SyncSettings};

    #[test]
    fn defaults_are_valid() {
        assert_eq!(SyncSettings::default().validate(), Ok(()));
    }

    #[test]
    fn qr_timeout_must_beat_the_fast_interval() {
        let mut settings = SyncSettings::default();
        settings.poll.fast_qr_interval = Duration::from_millis(500);
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::TimeoutNotBelowInterval { name: "qr", .. })
        ));
    }

    #[test]
    fn zero_push_connect_timeout_is_rejected() {
        let mut settings = SyncSettings::default();
        settings.bridge.connect_timeout = Duration::ZERO;
        assert_eq!(
            settings.validate(),
            Err(ConfigError::Zero {
                name: "push connect"
            })
        );
    }

    #[test]
    fn zero_status_interval_is_rejected() {
        let mut settings = SyncSettings::default();
        settings.poll.status_interval = Duration::ZERO;
        assert!(matches!(settings.validate(), Err(ConfigError::Poll(_))));
    }
}
