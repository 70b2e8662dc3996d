use crate::{JobId, JobStatusSnapshot, QrFrame};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollKind {
    Status,
    Qr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QrOrigin {
    /// Fetched by the QR polling timer.
    Scheduled,
    /// One-shot refresh requested by the user.
    Manual,
}

/// Result of one QR endpoint call that reached the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QrPollOutcome {
    Frame(QrFrame),
    /// No QR published yet; a normal outcome while the worker starts up.
    NotReady { reason: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    /// Begin polling a job.
    Start(JobId),
    /// Status endpoint answered.
    StatusPolled(JobStatusSnapshot),
    /// Push channel delivered a status update.
    StatusPushed(JobStatusSnapshot),
    /// QR endpoint answered, possibly with a status piggybacked on the response.
    QrPolled {
        origin: QrOrigin,
        outcome: QrPollOutcome,
        status: Option<JobStatusSnapshot>,
    },
    /// Push channel delivered a QR frame.
    QrPushed(QrFrame),
    /// A scheduled poll failed (transport, HTTP status, timeout or malformed body).
    PollFailed { kind: PollKind, reason: String },
    /// User asked for faster QR refresh while scanning.
    RefreshFaster,
    Stop,
}
