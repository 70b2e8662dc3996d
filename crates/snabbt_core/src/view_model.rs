use chrono::{DateTime, Utc};

use crate::{ContentHash, JobId, JobStatusSnapshot, PollingPhase};

/// Read-only projection of a poller for display and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PollerView {
    pub job_id: Option<JobId>,
    pub phase: PollingPhase,
    pub latest_status: Option<JobStatusSnapshot>,
    pub qr_update_count: u64,
    pub last_qr_hash: Option<ContentHash>,
    /// Last time any QR response arrived, including heartbeats.
    pub qr_last_seen: Option<DateTime<Utc>>,
    pub log_lines: Vec<String>,
    pub consecutive_failures: u32,
}
