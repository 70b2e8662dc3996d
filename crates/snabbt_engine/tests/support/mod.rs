//! Scripted worker, push channel and display doubles shared by the runtime tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use snabbt_core::{
    ConnectionState, DisplayEvent, JobId, JobStatus, JobStatusSnapshot, QrFrame, QrPayload,
    QrPollOutcome,
};
use snabbt_engine::{
    ChannelKey, DisplayAdapter, FailureKind, PushChannel, PushStream, QrPoll, RequestError,
    WorkerApi,
};
use tokio::sync::mpsc;

pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(sync_logging::initialize_for_tests);
}

pub struct Reply<T> {
    pub result: Result<T, RequestError>,
    pub delay: Duration,
}

impl<T> Reply<T> {
    pub fn ok(value: T) -> Self {
        Self {
            result: Ok(value),
            delay: Duration::ZERO,
        }
    }

    pub fn err(kind: FailureKind) -> Self {
        Self {
            result: Err(RequestError::new(kind, "scripted failure")),
            delay: Duration::ZERO,
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

type Script<T> = Box<dyn FnMut(u32) -> Reply<T> + Send>;

/// Worker double. Each script receives the 1-based call number.
pub struct FakeApi {
    status: Mutex<Script<JobStatusSnapshot>>,
    qr: Mutex<Script<QrPoll>>,
    health: Mutex<Script<()>>,
    start: Mutex<Script<JobId>>,
    status_calls: AtomicU32,
    qr_calls: AtomicU32,
    health_calls: AtomicU32,
    start_calls: AtomicU32,
}

impl FakeApi {
    pub fn new() -> Self {
        Self {
            status: Mutex::new(Box::new(|n| Reply::ok(snapshot("job-42", "initializing", n)))),
            qr: Mutex::new(Box::new(|_| Reply::ok(not_ready()))),
            health: Mutex::new(Box::new(|_| Reply::ok(()))),
            start: Mutex::new(Box::new(|_| Reply::ok(JobId::new("job-42")))),
            status_calls: AtomicU32::new(0),
            qr_calls: AtomicU32::new(0),
            health_calls: AtomicU32::new(0),
            start_calls: AtomicU32::new(0),
        }
    }

    pub fn with_status(self, script: impl FnMut(u32) -> Reply<JobStatusSnapshot> + Send + 'static) -> Self {
        *self.status.lock().unwrap() = Box::new(script);
        self
    }

    pub fn with_qr(self, script: impl FnMut(u32) -> Reply<QrPoll> + Send + 'static) -> Self {
        *self.qr.lock().unwrap() = Box::new(script);
        self
    }

    pub fn with_health(self, script: impl FnMut(u32) -> Reply<()> + Send + 'static) -> Self {
        *self.health.lock().unwrap() = Box::new(script);
        self
    }

    pub fn with_start(self, script: impl FnMut(u32) -> Reply<JobId> + Send + 'static) -> Self {
        *self.start.lock().unwrap() = Box::new(script);
        self
    }

    pub fn status_calls(&self) -> u32 {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn qr_calls(&self) -> u32 {
        self.qr_calls.load(Ordering::SeqCst)
    }

    pub fn health_calls(&self) -> u32 {
        self.health_calls.load(Ordering::SeqCst)
    }

    pub fn start_calls(&self) -> u32 {
        self.start_calls.load(Ordering::SeqCst)
    }
}

async fn play<T>(counter: &AtomicU32, script: &Mutex<Script<T>>) -> Result<T, RequestError> {
    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
    let reply = {
        let mut script = script.lock().unwrap();
        (&mut **script)(n)
    };
    if !reply.delay.is_zero() {
        tokio::time::sleep(reply.delay).await;
    }
    reply.result
}

#[async_trait::async_trait]
impl WorkerApi for FakeApi {
    async fn fetch_status(&self, _job_id: &JobId) -> Result<JobStatusSnapshot, RequestError> {
        play(&self.status_calls, &self.status).await
    }

    async fn fetch_qr(&self, _job_id: &JobId) -> Result<QrPoll, RequestError> {
        play(&self.qr_calls, &self.qr).await
    }

    async fn probe_health(&self) -> Result<(), RequestError> {
        play(&self.health_calls, &self.health).await
    }

    async fn start_job(&self, _booking: &serde_json::Value) -> Result<JobId, RequestError> {
        play(&self.start_calls, &self.start).await
    }

    async fn stop_job(&self, _job_id: &JobId) -> Result<(), RequestError> {
        Ok(())
    }
}

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 4, 9, 0, 0).unwrap()
}

/// Snapshot whose timestamp advances one second per call number.
pub fn snapshot(job: &str, status: &str, n: u32) -> JobStatusSnapshot {
    JobStatusSnapshot::new(
        JobId::new(job),
        JobStatus::from_wire(status),
        base_time() + chrono::Duration::seconds(i64::from(n)),
    )
}

pub fn frame(url: &str) -> QrFrame {
    QrFrame::new(QrPayload::Url(url.to_string()), Utc::now())
}

pub fn qr_frame(url: &str) -> QrPoll {
    QrPoll {
        outcome: QrPollOutcome::Frame(frame(url)),
        status: None,
    }
}

pub fn not_ready() -> QrPoll {
    QrPoll {
        outcome: QrPollOutcome::NotReady { reason: None },
        status: None,
    }
}

/// Display double that records every callback in order.
#[derive(Default)]
pub struct RecordingDisplay {
    events: Mutex<Vec<DisplayEvent>>,
}

impl RecordingDisplay {
    pub fn events(&self) -> Vec<DisplayEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn qr_frames(&self) -> Vec<QrFrame> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                DisplayEvent::Qr(frame) => Some(frame),
                _ => None,
            })
            .collect()
    }

    pub fn statuses(&self) -> Vec<JobStatusSnapshot> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                DisplayEvent::Status(snapshot) => Some(snapshot),
                _ => None,
            })
            .collect()
    }

    pub fn connections(&self) -> Vec<ConnectionState> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                DisplayEvent::Connection(state) => Some(state),
                _ => None,
            })
            .collect()
    }

    pub fn job_events(&self) -> usize {
        self.statuses().len() + self.qr_frames().len()
    }
}

impl DisplayAdapter for RecordingDisplay {
    fn on_status(&self, snapshot: &JobStatusSnapshot) {
        self.events
            .lock()
            .unwrap()
            .push(DisplayEvent::Status(snapshot.clone()));
    }

    fn on_qr(&self, frame: &QrFrame) {
        self.events.lock().unwrap().push(DisplayEvent::Qr(frame.clone()));
    }

    fn on_connection(&self, state: ConnectionState) {
        self.events
            .lock()
            .unwrap()
            .push(DisplayEvent::Connection(state));
    }
}

/// Push channel double: each `connect` hands out the next scripted connection.
///
/// Tests feed frames through the returned senders; dropping a sender closes
/// that connection.
pub struct FakePushChannel {
    connections: Mutex<Vec<mpsc::UnboundedReceiver<Result<String, RequestError>>>>,
    connects: AtomicU32,
    stalls: AtomicU32,
    keys: Mutex<Vec<ChannelKey>>,
}

impl FakePushChannel {
    pub fn new(
        count: usize,
    ) -> (
        Arc<Self>,
        Vec<mpsc::UnboundedSender<Result<String, RequestError>>>,
    ) {
        Self::stalling(0, count)
    }

    /// The first `stalls` connect attempts never complete.
    pub fn stalling(
        stalls: u32,
        count: usize,
    ) -> (
        Arc<Self>,
        Vec<mpsc::UnboundedSender<Result<String, RequestError>>>,
    ) {
        let mut senders = Vec::new();
        let mut receivers = Vec::new();
        for _ in 0..count {
            let (tx, rx) = mpsc::unbounded_channel();
            senders.push(tx);
            receivers.push(rx);
        }
        receivers.reverse();
        let channel = Arc::new(Self {
            connections: Mutex::new(receivers),
            connects: AtomicU32::new(0),
            stalls: AtomicU32::new(stalls),
            keys: Mutex::new(Vec::new()),
        });
        (channel, senders)
    }

    pub fn connects(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn keys(&self) -> Vec<ChannelKey> {
        self.keys.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl PushChannel for FakePushChannel {
    async fn connect(&self, key: &ChannelKey) -> Result<PushStream, RequestError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.keys.lock().unwrap().push(key.clone());
        if self.stalls.load(Ordering::SeqCst) > 0 {
            self.stalls.fetch_sub(1, Ordering::SeqCst);
            std::future::pending::<()>().await;
        }
        let next = self.connections.lock().unwrap().pop();
        match next {
            Some(rx) => Ok(Box::pin(futures_util::stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|item| (item, rx))
            }))),
            None => Err(RequestError::new(FailureKind::Offline, "no scripted connection")),
        }
    }
}

pub async fn settle(duration: Duration) {
    tokio::time::sleep(duration).await;
}
