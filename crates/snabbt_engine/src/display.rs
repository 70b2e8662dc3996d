use snabbt_core::{ConnectionState, DisplayEvent, JobStatusSnapshot, QrFrame};
use tokio::sync::mpsc;

/// Presentation layer fed by the sync runtime.
///
/// Callbacks run on the runtime's tasks while the poller holds its lock, at up
/// to several calls per second. Implementations must return quickly and must
/// not call back into the poller. Adapters that do blocking IO should sit
/// behind a [`ChannelDisplay`] and render from the receiving end.
pub trait DisplayAdapter: Send + Sync {
    fn on_status(&self, snapshot: &JobStatusSnapshot);
    fn on_qr(&self, frame: &QrFrame);
    fn on_connection(&self, state: ConnectionState);
}

pub(crate) fn deliver(display: &dyn DisplayAdapter, event: &DisplayEvent) {
    match event {
        DisplayEvent::Status(snapshot) => display.on_status(snapshot),
        DisplayEvent::Qr(frame) => display.on_qr(frame),
        DisplayEvent::Connection(state) => display.on_connection(*state),
    }
}

/// Forwards every callback as a [`DisplayEvent`] into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelDisplay {
    tx: mpsc::UnboundedSender<DisplayEvent>,
}

impl ChannelDisplay {
    pub fn new(tx: mpsc::UnboundedSender<DisplayEvent>) -> Self {
        Self { tx }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<DisplayEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl DisplayAdapter for ChannelDisplay {
    fn on_status(&self, snapshot: &JobStatusSnapshot) {
        let _ = self.tx.send(DisplayEvent::Status(snapshot.clone()));
    }

    fn on_qr(&self, frame: &QrFrame) {
        let _ = self.tx.send(DisplayEvent::Qr(frame.clone()));
    }

    fn on_connection(&self, state: ConnectionState) {
        let _ = self.tx.send(DisplayEvent::Connection(state));
    }
}
