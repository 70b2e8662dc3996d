use std::time::Duration;

use crate::{ConnectionState, JobStatus, JobStatusSnapshot, QrFrame};

/// Typed payload delivered to the display adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayEvent {
    Status(JobStatusSnapshot),
    Qr(QrFrame),
    Connection(ConnectionState),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    FetchStatus,
    /// Replace any status timer with one firing every `every`.
    ScheduleStatusPolling { every: Duration },
    CancelStatusPolling,
    FetchQr,
    /// Replace any QR timer with one firing every `every`.
    ScheduleQrPolling { every: Duration },
    CancelQrPolling,
    Emit(DisplayEvent),
    /// No ready signal within the attempt budget; escalated anyway.
    ReadyTimedOut { attempts: u32 },
    BackendUnresponsive { consecutive_failures: u32 },
    /// A previously raised backend warning no longer applies.
    BackendWarningCleared,
    Finished { status: JobStatus },
}
