//! Snabbt core: pure job-sync state machines, freshness rules and formatting helpers.
mod connection;
mod effect;
mod format;
mod freshness;
mod job;
mod msg;
mod qr;
mod ready;
mod state;
mod update;
mod view_model;

pub use connection::{ConnectionState, ConnectionTracker, ProbeFailure, ProbeTrigger};
pub use effect::{DisplayEvent, Effect};
pub use format::{format_log_line, progress_bar};
pub use freshness::{
    is_newer, Freshness, QrAcceptance, SyncLedger, DEFAULT_LOG_CAPACITY, RECENT_QR_CAPACITY,
};
pub use job::{JobId, JobStatus, JobStatusSnapshot, LOCAL_JOB_PREFIX};
pub use msg::{Msg, PollKind, QrOrigin, QrPollOutcome};
pub use qr::{ContentHash, QrFrame, QrPayload};
pub use ready::{is_qr_ready, READY_MESSAGE_KEYWORDS, READY_SIGNALS};
pub use state::{PollSettings, PollerState, PollingPhase, SettingsError};
pub use update::update;
pub use view_model::PollerView;
