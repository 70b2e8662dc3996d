//! One user session: a poller, an optional push bridge and connection forwarding.

use std::sync::Arc;

use chrono::Utc;
use snabbt_core::{JobId, JobStatus, JobStatusSnapshot, PollerView, PollingPhase};
use sync_logging::{sync_info, sync_warn};
use tokio::task::JoinHandle;

use crate::display::DisplayAdapter;
use crate::{
    ChannelKey, EventBridge, HealthHandle, JobMode, Poller, PollerError, PushChannel, StartedJob,
    SyncSettings, WorkerApi,
};

/// Message shown for a job started while the worker is unreachable.
const FALLBACK_MESSAGE: &str = "Worker offline; live status and QR are unavailable";

pub struct SyncSession {
    poller: Poller,
    bridge: Option<EventBridge>,
    display: Arc<dyn DisplayAdapter>,
    current: Option<StartedJob>,
    connection_forwarder: JoinHandle<()>,
}

impl SyncSession {
    /// Must be called from within a Tokio runtime.
    pub fn new(
        api: Arc<dyn WorkerApi>,
        push: Option<Arc<dyn PushChannel>>,
        display: Arc<dyn DisplayAdapter>,
        health: HealthHandle,
        settings: &SyncSettings,
    ) -> Self {
        let poller = Poller::new(
            api,
            Arc::clone(&display),
            Some(health.clone()),
            settings.poll.clone(),
            settings.timeouts.clone(),
        );
        let bridge = push.map(|channel| EventBridge::new(channel, settings.bridge.clone()));
        let connection_forwarder = spawn_connection_forwarder(health, Arc::clone(&display));
        Self {
            poller,
            bridge,
            display,
            current: None,
            connection_forwarder,
        }
    }

    /// Tracks `started`, tearing down whatever job the session followed before.
    pub fn begin(
        &mut self,
        started: &StartedJob,
        push_key: Option<ChannelKey>,
    ) -> Result<(), PollerError> {
        self.end();
        match started.mode {
            JobMode::Live => {
                self.poller.start(started.job_id.clone())?;
                if let Some(bridge) = self.bridge.as_mut() {
                    let key = push_key.unwrap_or_else(|| ChannelKey::Job(started.job_id.clone()));
                    bridge.subscribe(key, started.job_id.clone(), self.poller.inbox());
                }
            }
            JobMode::Fallback => {
                sync_warn!("Job {} runs in fallback mode", started.job_id);
                self.display
                    .on_status(&fallback_snapshot(started.job_id.clone()));
            }
        }
        self.current = Some(started.clone());
        Ok(())
    }

    /// Stops polling and push delivery for the current job. Idempotent.
    pub fn end(&mut self) {
        if let Some(bridge) = self.bridge.as_mut() {
            bridge.dispose();
        }
        self.poller.stop();
        if let Some(started) = self.current.take() {
            sync_info!("Session ended job {}", started.job_id);
        }
    }

    pub fn refresh_once(&self) -> bool {
        self.poller.refresh_once()
    }

    pub fn refresh_faster(&self) {
        self.poller.refresh_faster();
    }

    pub fn current_job(&self) -> Option<&StartedJob> {
        self.current.as_ref()
    }

    pub fn phase(&self) -> PollingPhase {
        self.poller.phase()
    }

    pub fn view(&self) -> PollerView {
        self.poller.view()
    }
}

impl Drop for SyncSession {
    fn drop(&mut self) {
        self.end();
        self.connection_forwarder.abort();
    }
}

fn fallback_snapshot(job_id: JobId) -> JobStatusSnapshot {
    JobStatusSnapshot::new(job_id, JobStatus::Queued, Utc::now())
        .with_stage("fallback")
        .with_message(FALLBACK_MESSAGE)
}

/// Replays the current connection state, then every change, to the display.
fn spawn_connection_forwarder(
    health: HealthHandle,
    display: Arc<dyn DisplayAdapter>,
) -> JoinHandle<()> {
    let mut rx = health.subscribe();
    tokio::spawn(async move {
        loop {
            let state = *rx.borrow_and_update();
            display.on_connection(state);
            if rx.changed().await.is_err() {
                break;
            }
        }
    })
}
