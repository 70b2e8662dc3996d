//! Snabbt engine: worker IO, timers and the live sync runtime around the pure core.
mod api;
mod bridge;
mod display;
mod health;
mod poller;
mod schedule;
mod session;
mod settings;
mod types;
mod wire;

pub use api::{QrPoll, ReqwestWorkerApi, WorkerApi};
pub use bridge::{ChannelKey, EventBridge, PushChannel, PushStream, WebSocketChannel};
pub use display::{ChannelDisplay, DisplayAdapter};
pub use health::{start_job_or_fallback, HealthHandle, HealthMonitor, JobMode, StartedJob};
pub use poller::{Poller, PollerError, PollerInbox};
pub use schedule::ScheduledTask;
pub use session::SyncSession;
pub use settings::{BridgeSettings, ConfigError, HealthSettings, RequestTimeouts, SyncSettings};
pub use types::{FailureKind, RequestError};
pub use wire::{decode_push, PushUpdate};
