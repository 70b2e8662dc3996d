use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// A repeating timer that stops for good when disposed or dropped.
///
/// The tick callback must not block; it typically spawns the request for
/// that tick and returns, so a slow request never delays the next tick.
#[derive(Debug)]
pub struct ScheduledTask {
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl ScheduledTask {
    /// Calls `tick` every `every`, first after one full interval.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn repeating<F>(every: Duration, mut tick: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + every, every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    biased;
                    _ = cancelled.cancelled() => break,
                    _ = interval.tick() => {
                        if cancelled.is_cancelled() {
                            break;
                        }
                        tick();
                    }
                }
            }
        });
        Self {
            token,
            handle: Some(handle),
        }
    }

    /// Cancels the timer. Safe to call any number of times.
    pub fn dispose(&mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.dispose();
    }
}
