use std::time::Duration;

use thiserror::Error;

use crate::view_model::PollerView;
use crate::{JobId, SyncLedger, DEFAULT_LOG_CAPACITY};

/// Cadence and thresholds for one poller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSettings {
    pub status_interval: Duration,
    pub qr_interval: Duration,
    /// Interval requested by the "refresh faster" affordance.
    pub fast_qr_interval: Duration,
    /// Status attempts in `AwaitingReady` before escalating anyway.
    pub max_ready_attempts: u32,
    /// Consecutive failures that raise the "backend may be down" warning.
    pub failure_warning_threshold: u32,
    pub log_capacity: usize,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            status_interval: Duration::from_secs(3),
            qr_interval: Duration::from_secs(1),
            fast_qr_interval: Duration::from_secs(1),
            max_ready_attempts: 40,
            failure_warning_threshold: 5,
            log_capacity: DEFAULT_LOG_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    #[error("{name} must be greater than zero")]
    ZeroInterval { name: &'static str },
    #[error("{name} must be at least 1")]
    ZeroThreshold { name: &'static str },
}

impl PollSettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        for (name, interval) in [
            ("status_interval", self.status_interval),
            ("qr_interval", self.qr_interval),
            ("fast_qr_interval", self.fast_qr_interval),
        ] {
            if interval.is_zero() {
                return Err(SettingsError::ZeroInterval { name });
            }
        }
        if self.max_ready_attempts == 0 {
            return Err(SettingsError::ZeroThreshold {
                name: "max_ready_attempts",
            });
        }
        if self.failure_warning_threshold == 0 {
            return Err(SettingsError::ZeroThreshold {
                name: "failure_warning_threshold",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PollingPhase {
    #[default]
    Idle,
    /// Slow status polling until the worker shows a QR code.
    AwaitingReady { attempts: u32 },
    FastQrPolling,
    Terminal,
}

impl PollingPhase {
    pub fn is_active(self) -> bool {
        matches!(
            self,
            PollingPhase::AwaitingReady { .. } | PollingPhase::FastQrPolling
        )
    }
}

/// Everything the poller knows about its job. Mutated only by [`crate::update`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollerState {
    settings: PollSettings,
    job_id: Option<JobId>,
    phase: PollingPhase,
    ledger: SyncLedger,
    qr_interval: Duration,
    consecutive_failures: u32,
    backend_warning_raised: bool,
}

impl Default for PollerState {
    fn default() -> Self {
        Self::new(PollSettings::default())
    }
}

impl PollerState {
    pub fn new(settings: PollSettings) -> Self {
        Self {
            ledger: SyncLedger::with_log_capacity(settings.log_capacity),
            qr_interval: settings.qr_interval,
            settings,
            job_id: None,
            phase: PollingPhase::Idle,
            consecutive_failures: 0,
            backend_warning_raised: false,
        }
    }

    pub fn settings(&self) -> &PollSettings {
        &self.settings
    }

    pub fn job_id(&self) -> Option<&JobId> {
        self.job_id.as_ref()
    }

    pub fn phase(&self) -> PollingPhase {
        self.phase
    }

    pub fn ledger(&self) -> &SyncLedger {
        &self.ledger
    }

    pub fn qr_interval(&self) -> Duration {
        self.qr_interval
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn backend_warning_raised(&self) -> bool {
        self.backend_warning_raised
    }

    pub fn view(&self) -> PollerView {
        PollerView {
            job_id: self.job_id.clone(),
            phase: self.phase,
            latest_status: self.ledger.latest_status().cloned(),
            qr_update_count: self.ledger.qr_update_count(),
            last_qr_hash: self.ledger.last_qr_hash(),
            qr_last_seen: self.ledger.qr_last_seen(),
            log_lines: self.ledger.log_lines().map(ToOwned::to_owned).collect(),
            consecutive_failures: self.consecutive_failures,
        }
    }

    pub(crate) fn begin(&mut self, job_id: JobId) {
        *self = Self::new(self.settings.clone());
        self.job_id = Some(job_id);
        self.phase = PollingPhase::AwaitingReady { attempts: 0 };
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::new(self.settings.clone());
    }

    pub(crate) fn set_phase(&mut self, phase: PollingPhase) {
        self.phase = phase;
    }

    pub(crate) fn ledger_mut(&mut self) -> &mut SyncLedger {
        &mut self.ledger
    }

    pub(crate) fn set_qr_interval(&mut self, interval: Duration) {
        self.qr_interval = interval;
    }

    /// Returns true exactly once per failure streak, when the threshold is crossed.
    pub(crate) fn record_failure(&mut self) -> bool {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if !self.backend_warning_raised
            && self.consecutive_failures >= self.settings.failure_warning_threshold
        {
            self.backend_warning_raised = true;
            return true;
        }
        false
    }

    /// Returns true if a previously raised warning was cleared.
    pub(crate) fn record_success(&mut self) -> bool {
        self.consecutive_failures = 0;
        std::mem::replace(&mut self.backend_warning_raised, false)
    }
}
