use std::fmt;

/// Reachability of the remote worker, independent of any job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Checking,
    Connected,
    /// Reachable, but job polling reports sustained failures.
    Degraded,
    Disconnected,
    /// Classified fully offline; new jobs start locally without polling.
    Fallback,
}

impl ConnectionState {
    pub fn label(self) -> &'static str {
        match self {
            ConnectionState::Checking => "checking",
            ConnectionState::Connected => "connected",
            ConnectionState::Degraded => "degraded",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Fallback => "fallback",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How a failed probe is classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeFailure {
    /// Timeout or server error; the worker may answer next time.
    Transient,
    /// Connection refused, DNS failure or similar.
    Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeTrigger {
    Scheduled,
    /// Manual probe, e.g. before starting a job. Only these may enter `Fallback`.
    Forced,
}

/// Pure transition table for [`ConnectionState`].
///
/// Every method returns `Some(new_state)` only when the state changed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectionTracker {
    state: ConnectionState,
    consecutive_probe_failures: u32,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn consecutive_probe_failures(&self) -> u32 {
        self.consecutive_probe_failures
    }

    pub fn probe_succeeded(&mut self) -> Option<ConnectionState> {
        self.consecutive_probe_failures = 0;
        match self.state {
            // Job polling still reports trouble; only a recovery report clears it.
            ConnectionState::Degraded => None,
            _ => self.transition(ConnectionState::Connected),
        }
    }

    pub fn probe_failed(
        &mut self,
        failure: ProbeFailure,
        trigger: ProbeTrigger,
    ) -> Option<ConnectionState> {
        self.consecutive_probe_failures = self.consecutive_probe_failures.saturating_add(1);
        match (failure, trigger) {
            (ProbeFailure::Offline, ProbeTrigger::Forced) => {
                self.transition(ConnectionState::Fallback)
            }
            _ => match self.state {
                ConnectionState::Fallback => None,
                _ => self.transition(ConnectionState::Disconnected),
            },
        }
    }

    /// Job polling crossed its consecutive-failure threshold.
    pub fn report_sustained_failures(&mut self) -> Option<ConnectionState> {
        match self.state {
            ConnectionState::Checking | ConnectionState::Connected => {
                self.transition(ConnectionState::Degraded)
            }
            _ => None,
        }
    }

    /// Job polling succeeded again after a sustained-failure report.
    pub fn report_recovered(&mut self) -> Option<ConnectionState> {
        match self.state {
            ConnectionState::Degraded => self.transition(ConnectionState::Connected),
            _ => None,
        }
    }

    fn transition(&mut self, next: ConnectionState) -> Option<ConnectionState> {
        if self.state == next {
            return None;
        }
        self.state = next;
        Some(next)
    }
}
