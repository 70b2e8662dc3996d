//! Worker reachability probing and the fallback start path.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use snabbt_core::{ConnectionState, ConnectionTracker, JobId, ProbeTrigger, LOCAL_JOB_PREFIX};
use sync_logging::{sync_debug, sync_info, sync_warn};
use tokio::sync::watch;

use crate::{FailureKind, HealthSettings, RequestError, ScheduledTask, WorkerApi};

/// Shared view of the connection state; cheap to clone.
///
/// The poller holds one of these to report sustained failures and recovery.
#[derive(Clone)]
pub struct HealthHandle {
    inner: Arc<HealthInner>,
}

struct HealthInner {
    api: Arc<dyn WorkerApi>,
    probe_timeout: Duration,
    tracker: Mutex<ConnectionTracker>,
    tx: watch::Sender<ConnectionState>,
}

impl HealthHandle {
    fn new(api: Arc<dyn WorkerApi>, probe_timeout: Duration) -> Self {
        let (tx, _) = watch::channel(ConnectionState::Checking);
        Self {
            inner: Arc::new(HealthInner {
                api,
                probe_timeout,
                tracker: Mutex::new(ConnectionTracker::new()),
                tx,
            }),
        }
    }

    /// Runs one probe and returns the state afterwards.
    pub async fn probe(&self, trigger: ProbeTrigger) -> ConnectionState {
        let result =
            match tokio::time::timeout(self.inner.probe_timeout, self.inner.api.probe_health())
                .await
            {
                Ok(result) => result,
                Err(_) => Err(RequestError::new(
                    FailureKind::Timeout,
                    format!("health probe exceeded {:?}", self.inner.probe_timeout),
                )),
            };

        let mut tracker = self.lock();
        let changed = match &result {
            Ok(()) => tracker.probe_succeeded(),
            Err(err) => {
                sync_debug!("Health probe failed ({:?}): {}", trigger, err);
                tracker.probe_failed(err.probe_failure(), trigger)
            }
        };
        self.publish(changed);
        tracker.state()
    }

    pub fn report_sustained_failures(&self) {
        let changed = self.lock().report_sustained_failures();
        self.publish(changed);
    }

    pub fn report_recovered(&self) {
        let changed = self.lock().report_recovered();
        self.publish(changed);
    }

    pub fn state(&self) -> ConnectionState {
        self.lock().state()
    }

    /// Observers detach by dropping the receiver.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.inner.tx.subscribe()
    }

    fn lock(&self) -> MutexGuard<'_, ConnectionTracker> {
        self.inner
            .tracker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, changed: Option<ConnectionState>) {
        let Some(state) = changed else {
            return;
        };
        match state {
            ConnectionState::Degraded
            | ConnectionState::Disconnected
            | ConnectionState::Fallback => sync_warn!("Worker connection: {}", state),
            _ => sync_info!("Worker connection: {}", state),
        }
        self.inner.tx.send_replace(state);
    }
}

/// Periodic reachability probe: once on start, then every `interval`.
pub struct HealthMonitor {
    handle: HealthHandle,
    interval: Duration,
    task: Option<ScheduledTask>,
}

impl HealthMonitor {
    pub fn new(api: Arc<dyn WorkerApi>, settings: &HealthSettings, probe_timeout: Duration) -> Self {
        Self {
            handle: HealthHandle::new(api, probe_timeout),
            interval: settings.interval,
            task: None,
        }
    }

    /// Must be called from within a Tokio runtime. Restarting replaces the timer.
    pub fn start(&mut self) {
        self.stop();
        spawn_probe(self.handle.clone());
        let handle = self.handle.clone();
        self.task = Some(ScheduledTask::repeating(self.interval, move || {
            spawn_probe(handle.clone());
        }));
    }

    pub fn stop(&mut self) {
        if let Some(mut task) = self.task.take() {
            task.dispose();
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_disposed())
    }

    pub fn handle(&self) -> HealthHandle {
        self.handle.clone()
    }

    /// Probe now, outside the schedule. An offline result here enters fallback.
    pub async fn force_probe(&self) -> ConnectionState {
        self.handle.probe(ProbeTrigger::Forced).await
    }

    pub fn state(&self) -> ConnectionState {
        self.handle.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.handle.subscribe()
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn spawn_probe(handle: HealthHandle) {
    tokio::spawn(async move {
        handle.probe(ProbeTrigger::Scheduled).await;
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobMode {
    /// Started on the worker; poll and subscribe as usual.
    Live,
    /// Worker offline; the id is local and nothing will be polled.
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedJob {
    pub job_id: JobId,
    pub mode: JobMode,
}

impl StartedJob {
    pub fn live(job_id: JobId) -> Self {
        Self {
            job_id,
            mode: JobMode::Live,
        }
    }

    fn local() -> Self {
        Self {
            job_id: JobId::new(format!("{LOCAL_JOB_PREFIX}{}", uuid::Uuid::new_v4())),
            mode: JobMode::Fallback,
        }
    }
}

/// Starts a job on the worker, or synthesizes a local one when the worker is offline.
///
/// A start that fails as unreachable triggers a forced probe; only if that
/// probe confirms fallback is a local job returned. Other failures propagate.
pub async fn start_job_or_fallback(
    api: &dyn WorkerApi,
    health: &HealthHandle,
    booking: &serde_json::Value,
) -> Result<StartedJob, RequestError> {
    if health.state() == ConnectionState::Fallback {
        let started = StartedJob::local();
        sync_warn!("Worker offline; starting local job {}", started.job_id);
        return Ok(started);
    }

    match api.start_job(booking).await {
        Ok(job_id) => {
            sync_info!("Worker accepted job {}", job_id);
            Ok(StartedJob::live(job_id))
        }
        Err(err) if err.kind == FailureKind::Offline => {
            if health.probe(ProbeTrigger::Forced).await == ConnectionState::Fallback {
                let started = StartedJob::local();
                sync_warn!("Worker offline ({}); starting local job {}", err, started.job_id);
                Ok(started)
            } else {
                Err(err)
            }
        }
        Err(err) => Err(err),
    }
}
