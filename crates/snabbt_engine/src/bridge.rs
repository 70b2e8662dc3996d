//! Push-channel subscription feeding the poller's de-dup path.
//!
//! The bridge is best-effort: a dropped connection is retried after a fixed
//! delay, and the poller stays correct without it.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use snabbt_core::JobId;
use sync_logging::{sync_debug, sync_info, sync_trace, sync_warn};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::{decode_push, BridgeSettings, FailureKind, PollerInbox, PushUpdate, RequestError};

/// Which push topic to subscribe to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChannelKey {
    Job(JobId),
    User(String),
}

impl ChannelKey {
    pub fn topic(&self) -> String {
        match self {
            ChannelKey::Job(job_id) => format!("job:{job_id}"),
            ChannelKey::User(user) => format!("user:{user}"),
        }
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.topic())
    }
}

/// Text frames from one push connection. The stream ends when the connection closes.
pub type PushStream = BoxStream<'static, Result<String, RequestError>>;

#[async_trait::async_trait]
pub trait PushChannel: Send + Sync {
    async fn connect(&self, key: &ChannelKey) -> Result<PushStream, RequestError>;
}

/// Websocket transport: `{base}/ws?channel=<topic>`.
#[derive(Debug, Clone)]
pub struct WebSocketChannel {
    base: Url,
}

impl WebSocketChannel {
    /// Accepts `ws(s)://` or `http(s)://` bases; the latter are mapped to websocket schemes.
    pub fn new(base_url: &str) -> Result<Self, RequestError> {
        let mut base = Url::parse(base_url)
            .map_err(|err| RequestError::new(FailureKind::InvalidUrl, err.to_string()))?;
        let scheme = match base.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(RequestError::new(
                    FailureKind::InvalidUrl,
                    format!("unsupported push scheme {other}"),
                ))
            }
        };
        base.set_scheme(scheme)
            .map_err(|_| RequestError::new(FailureKind::InvalidUrl, "cannot set websocket scheme"))?;
        if base.cannot_be_a_base() {
            return Err(RequestError::new(
                FailureKind::InvalidUrl,
                format!("{base_url} cannot be used as a base url"),
            ));
        }
        Ok(Self { base })
    }

    pub fn url_for(&self, key: &ChannelKey) -> Result<Url, RequestError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| RequestError::new(FailureKind::InvalidUrl, "base url cannot have a path"))?
            .pop_if_empty()
            .push("ws");
        url.query_pairs_mut()
            .clear()
            .append_pair("channel", &key.topic());
        Ok(url)
    }
}

#[async_trait::async_trait]
impl PushChannel for WebSocketChannel {
    async fn connect(&self, key: &ChannelKey) -> Result<PushStream, RequestError> {
        let url = self.url_for(key)?;
        let (socket, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|err| RequestError::new(FailureKind::Offline, err.to_string()))?;
        let frames = socket.filter_map(|message| {
            futures_util::future::ready(match message {
                Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                Ok(_) => None,
                Err(err) => Some(Err(RequestError::new(FailureKind::Network, err.to_string()))),
            })
        });
        Ok(frames.boxed())
    }
}

/// Owns at most one push subscription at a time.
pub struct EventBridge {
    channel: Arc<dyn PushChannel>,
    settings: BridgeSettings,
    active: Option<Subscription>,
}

struct Subscription {
    key: ChannelKey,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl EventBridge {
    pub fn new(channel: Arc<dyn PushChannel>, settings: BridgeSettings) -> Self {
        Self {
            channel,
            settings,
            active: None,
        }
    }

    /// Subscribes to `key`, delivering frames for `job_id` into `inbox`.
    ///
    /// Any previous subscription is torn down first. Must be called from within
    /// a Tokio runtime.
    pub fn subscribe(&mut self, key: ChannelKey, job_id: JobId, inbox: PollerInbox) {
        self.dispose();
        let token = CancellationToken::new();
        let handle = tokio::spawn(run_subscription(
            Arc::clone(&self.channel),
            key.clone(),
            job_id,
            inbox,
            self.settings.clone(),
            token.clone(),
        ));
        self.active = Some(Subscription { key, token, handle });
    }

    /// Unsubscribes. Idempotent.
    pub fn dispose(&mut self) {
        if let Some(subscription) = self.active.take() {
            sync_debug!("Push subscription {} disposed", subscription.key);
            subscription.token.cancel();
            subscription.handle.abort();
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|subscription| !subscription.handle.is_finished())
    }

    pub fn key(&self) -> Option<&ChannelKey> {
        self.active.as_ref().map(|subscription| &subscription.key)
    }
}

impl Drop for EventBridge {
    fn drop(&mut self) {
        self.dispose();
    }
}

async fn run_subscription(
    channel: Arc<dyn PushChannel>,
    key: ChannelKey,
    job_id: JobId,
    inbox: PollerInbox,
    settings: BridgeSettings,
    token: CancellationToken,
) {
    loop {
        let connected = tokio::select! {
            biased;
            _ = token.cancelled() => return,
            connected = tokio::time::timeout(settings.connect_timeout, channel.connect(&key)) => {
                connected.unwrap_or_else(|_| {
                    Err(RequestError::new(
                        FailureKind::Timeout,
                        format!("no connection within {:?}", settings.connect_timeout),
                    ))
                })
            }
        };

        match connected {
            Ok(mut frames) => {
                sync_info!("Push channel {} connected", key);
                loop {
                    let next = tokio::select! {
                        biased;
                        _ = token.cancelled() => return,
                        next = frames.next() => next,
                    };
                    match next {
                        Some(Ok(text)) => {
                            forward(&text, &job_id, &inbox);
                            if !inbox.is_live() {
                                sync_debug!("Push channel {} closing; job is over", key);
                                return;
                            }
                        }
                        Some(Err(err)) => {
                            sync_warn!("Push channel {} failed: {}", key, err);
                            break;
                        }
                        None => {
                            sync_info!("Push channel {} closed", key);
                            break;
                        }
                    }
                }
            }
            Err(err) => sync_warn!("Push channel {} unavailable: {}", key, err),
        }

        if !inbox.is_live() {
            sync_debug!("Push channel {} no longer has a live job; not reconnecting", key);
            return;
        }
        tokio::select! {
            biased;
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(settings.reconnect_delay) => {}
        }
    }
}

fn forward(text: &str, job_id: &JobId, inbox: &PollerInbox) {
    match decode_push(text, job_id, Utc::now()) {
        Ok(Some(PushUpdate::Status(snapshot))) => inbox.deliver_status(snapshot),
        Ok(Some(PushUpdate::Qr { frame, status })) => {
            if let Some(snapshot) = status {
                inbox.deliver_status(snapshot);
            }
            inbox.deliver_qr(frame);
        }
        Ok(None) => sync_trace!("Push frame not for job {}", job_id),
        Err(err) => sync_debug!("Discarding push frame: {}", err),
    }
}
