//! Live status/QR poller: performs the effects of the pure escalation state machine.
//!
//! All state for one job lives behind a single lock. Every request result is
//! tagged with the generation it was issued under; `stop` bumps the generation,
//! so results that land afterwards are dropped before they reach `update`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use snabbt_core::{
    update, Effect, JobId, JobStatusSnapshot, Msg, PollKind, PollSettings, PollerState,
    PollerView, PollingPhase, QrFrame, QrOrigin,
};
use sync_logging::{sync_debug, sync_info, sync_warn};
use thiserror::Error;

use crate::display::{deliver, DisplayAdapter};
use crate::{HealthHandle, RequestTimeouts, ScheduledTask, WorkerApi};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PollerError {
    #[error("poller is already tracking job {0}; stop it first")]
    AlreadyActive(JobId),
    #[error("poller finished job {0}; create a new poller")]
    Finished(JobId),
}

/// Polls one job at a time and forwards de-duplicated updates to a display adapter.
pub struct Poller {
    shared: Arc<Shared>,
}

struct Shared {
    api: Arc<dyn WorkerApi>,
    display: Arc<dyn DisplayAdapter>,
    health: Option<HealthHandle>,
    timeouts: RequestTimeouts,
    inner: Mutex<Inner>,
}

struct Inner {
    state: PollerState,
    generation: u64,
    status_task: Option<ScheduledTask>,
    qr_task: Option<ScheduledTask>,
}

impl Poller {
    pub fn new(
        api: Arc<dyn WorkerApi>,
        display: Arc<dyn DisplayAdapter>,
        health: Option<HealthHandle>,
        settings: PollSettings,
        timeouts: RequestTimeouts,
    ) -> Self {
        let shared = Arc::new(Shared {
            api,
            display,
            health,
            timeouts,
            inner: Mutex::new(Inner {
                state: PollerState::new(settings),
                generation: 0,
                status_task: None,
                qr_task: None,
            }),
        });
        Self { shared }
    }

    /// Starts polling `job_id`: one immediate status check, then the status timer.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self, job_id: JobId) -> Result<(), PollerError> {
        let mut inner = self.shared.lock();
        match inner.state.phase() {
            PollingPhase::Idle => {}
            PollingPhase::Terminal => {
                let current = inner.state.job_id().cloned().unwrap_or(job_id);
                return Err(PollerError::Finished(current));
            }
            PollingPhase::AwaitingReady { .. } | PollingPhase::FastQrPolling => {
                let current = inner.state.job_id().cloned().unwrap_or(job_id);
                return Err(PollerError::AlreadyActive(current));
            }
        }
        inner.generation = inner.generation.wrapping_add(1);
        sync_info!("Poller start job_id={}", job_id);
        self.shared.apply(&mut inner, Msg::Start(job_id));
        Ok(())
    }

    /// Cancels every timer and silences in-flight requests. Idempotent.
    pub fn stop(&self) {
        let mut inner = self.shared.lock();
        inner.generation = inner.generation.wrapping_add(1);
        if let Some(job_id) = inner.state.job_id() {
            sync_info!("Poller stop job_id={}", job_id);
        }
        self.shared.apply(&mut inner, Msg::Stop);
        dispose(&mut inner.status_task);
        dispose(&mut inner.qr_task);
    }

    /// One out-of-band QR fetch through the normal de-dup path. Returns false when idle.
    pub fn refresh_once(&self) -> bool {
        let inner = self.shared.lock();
        if !inner.state.phase().is_active() {
            return false;
        }
        let Some(job_id) = inner.state.job_id().cloned() else {
            return false;
        };
        self.shared
            .spawn_qr_fetch(inner.generation, job_id, QrOrigin::Manual);
        true
    }

    /// Asks for the fast QR cadence while the user is scanning.
    pub fn refresh_faster(&self) {
        let mut inner = self.shared.lock();
        self.shared.apply(&mut inner, Msg::RefreshFaster);
    }

    pub fn phase(&self) -> PollingPhase {
        self.shared.lock().state.phase()
    }

    pub fn job_id(&self) -> Option<JobId> {
        self.shared.lock().state.job_id().cloned()
    }

    pub fn view(&self) -> PollerView {
        self.shared.lock().state.view()
    }

    /// Entry point for pushed updates, bound to the current job.
    pub fn inbox(&self) -> PollerInbox {
        let inner = self.shared.lock();
        PollerInbox {
            shared: Arc::downgrade(&self.shared),
            generation: inner.generation,
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Feeds pushed updates into a poller's de-dup path.
///
/// Becomes inert once the poller is stopped, restarted or dropped.
#[derive(Clone)]
pub struct PollerInbox {
    shared: Weak<Shared>,
    generation: u64,
}

impl PollerInbox {
    pub fn deliver_status(&self, snapshot: JobStatusSnapshot) {
        self.deliver(Msg::StatusPushed(snapshot));
    }

    pub fn deliver_qr(&self, frame: QrFrame) {
        self.deliver(Msg::QrPushed(frame));
    }

    pub fn is_live(&self) -> bool {
        self.shared.upgrade().is_some_and(|shared| {
            let inner = shared.lock();
            inner.generation == self.generation && inner.state.phase().is_active()
        })
    }

    fn deliver(&self, msg: Msg) {
        if let Some(shared) = self.shared.upgrade() {
            shared.dispatch(self.generation, msg);
        }
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dispatch(self: &Arc<Self>, generation: u64, msg: Msg) {
        let mut inner = self.lock();
        if inner.generation != generation {
            sync_debug!("Poller dropped result from stale generation {}", generation);
            return;
        }
        self.apply(&mut inner, msg);
    }

    fn apply(self: &Arc<Self>, inner: &mut Inner, msg: Msg) {
        let state = std::mem::take(&mut inner.state);
        let (state, effects) = update(state, msg);
        inner.state = state;
        for effect in effects {
            self.perform(inner, effect);
        }
    }

    fn perform(self: &Arc<Self>, inner: &mut Inner, effect: Effect) {
        let generation = inner.generation;
        let job_id = inner.state.job_id().cloned();
        match effect {
            Effect::FetchStatus => {
                if let Some(job_id) = job_id {
                    self.spawn_status_fetch(generation, job_id);
                }
            }
            Effect::ScheduleStatusPolling { every } => {
                if let Some(job_id) = job_id {
                    inner.status_task = Some(self.schedule(every, generation, job_id, PollKind::Status));
                }
            }
            Effect::CancelStatusPolling => dispose(&mut inner.status_task),
            Effect::FetchQr => {
                if let Some(job_id) = job_id {
                    self.spawn_qr_fetch(generation, job_id, QrOrigin::Scheduled);
                }
            }
            Effect::ScheduleQrPolling { every } => {
                if let Some(job_id) = job_id {
                    inner.qr_task = Some(self.schedule(every, generation, job_id, PollKind::Qr));
                }
            }
            Effect::CancelQrPolling => dispose(&mut inner.qr_task),
            Effect::Emit(event) => deliver(self.display.as_ref(), &event),
            Effect::ReadyTimedOut { attempts } => {
                sync_warn!(
                    "No QR-ready signal after {} status checks; switching to QR polling anyway",
                    attempts
                );
            }
            Effect::BackendUnresponsive {
                consecutive_failures,
            } => {
                sync_warn!(
                    "Backend may be down: {} consecutive poll failures",
                    consecutive_failures
                );
                if let Some(health) = &self.health {
                    health.report_sustained_failures();
                }
            }
            Effect::BackendWarningCleared => {
                sync_info!("Backend polling recovered");
                if let Some(health) = &self.health {
                    health.report_recovered();
                }
            }
            Effect::Finished { status } => {
                sync_info!(
                    "Job {} finished with status {}",
                    job_id.as_ref().map_or("?", JobId::as_str),
                    status
                );
            }
        }
    }

    /// The timer holds only a weak reference, so dropping the poller frees it.
    fn schedule(
        self: &Arc<Self>,
        every: Duration,
        generation: u64,
        job_id: JobId,
        kind: PollKind,
    ) -> ScheduledTask {
        let weak = Arc::downgrade(self);
        ScheduledTask::repeating(every, move || {
            let Some(shared) = weak.upgrade() else {
                return;
            };
            match kind {
                PollKind::Status => shared.spawn_status_fetch(generation, job_id.clone()),
                PollKind::Qr => {
                    shared.spawn_qr_fetch(generation, job_id.clone(), QrOrigin::Scheduled)
                }
            }
        })
    }

    fn spawn_status_fetch(self: &Arc<Self>, generation: u64, job_id: JobId) {
        let shared = Arc::clone(self);
        tokio::spawn(async move {
            let timeout = shared.timeouts.status;
            let msg = match tokio::time::timeout(timeout, shared.api.fetch_status(&job_id)).await
            {
                Ok(Ok(snapshot)) => Msg::StatusPolled(snapshot),
                Ok(Err(err)) => {
                    sync_debug!("Status poll failed job_id={}: {}", job_id, err);
                    Msg::PollFailed {
                        kind: PollKind::Status,
                        reason: err.to_string(),
                    }
                }
                Err(_) => {
                    sync_debug!("Status poll timed out job_id={}", job_id);
                    Msg::PollFailed {
                        kind: PollKind::Status,
                        reason: format!("timed out after {timeout:?}"),
                    }
                }
            };
            shared.dispatch(generation, msg);
        });
    }

    fn spawn_qr_fetch(self: &Arc<Self>, generation: u64, job_id: JobId, origin: QrOrigin) {
        let shared = Arc::clone(self);
        tokio::spawn(async move {
            let timeout = shared.timeouts.qr;
            let result = tokio::time::timeout(timeout, shared.api.fetch_qr(&job_id)).await;
            let msg = match (result, origin) {
                (Ok(Ok(poll)), _) => Msg::QrPolled {
                    origin,
                    outcome: poll.outcome,
                    status: poll.status,
                },
                (Ok(Err(err)), QrOrigin::Scheduled) => {
                    sync_debug!("QR poll failed job_id={}: {}", job_id, err);
                    Msg::PollFailed {
                        kind: PollKind::Qr,
                        reason: err.to_string(),
                    }
                }
                (Err(_), QrOrigin::Scheduled) => {
                    sync_debug!("QR poll timed out job_id={}", job_id);
                    Msg::PollFailed {
                        kind: PollKind::Qr,
                        reason: format!("timed out after {timeout:?}"),
                    }
                }
                (Ok(Err(err)), QrOrigin::Manual) => {
                    sync_debug!("Manual QR refresh failed job_id={}: {}", job_id, err);
                    return;
                }
                (Err(_), QrOrigin::Manual) => {
                    sync_debug!("Manual QR refresh timed out job_id={}", job_id);
                    return;
                }
            };
            shared.dispatch(generation, msg);
        });
    }
}

fn dispose(task: &mut Option<ScheduledTask>) {
    if let Some(mut task) = task.take() {
        task.dispose();
    }
}
