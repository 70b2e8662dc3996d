//! Terminal rendering of status lines, QR updates and connection changes.

use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

use snabbt_core::{
    format_log_line, progress_bar, ConnectionState, DisplayEvent, JobStatusSnapshot, QrFrame,
};
use snabbt_engine::{ChannelDisplay, DisplayAdapter};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const PROGRESS_WIDTH: usize = 20;

pub struct TerminalDisplay {
    out: Mutex<Box<dyn Write + Send>>,
    qr_updates: Mutex<u64>,
}

impl TerminalDisplay {
    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
            qr_updates: Mutex::new(0),
        }
    }

    fn write_line(&self, line: &str) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        // A closed terminal is not worth failing the sync loop over.
        let _ = writeln!(out, "{line}");
        let _ = out.flush();
    }
}

/// Renders on a blocking thread so a slow terminal never stalls the sync runtime.
///
/// The returned adapter only queues events. The renderer exits once every
/// clone of the adapter is dropped and the queue is drained.
pub fn spawn_renderer(terminal: TerminalDisplay) -> (ChannelDisplay, JoinHandle<()>) {
    let (display, events) = ChannelDisplay::channel();
    let handle = tokio::task::spawn_blocking(move || render_all(&terminal, events));
    (display, handle)
}

fn render_all(terminal: &TerminalDisplay, mut events: mpsc::UnboundedReceiver<DisplayEvent>) {
    while let Some(event) = events.blocking_recv() {
        match event {
            DisplayEvent::Status(snapshot) => terminal.on_status(&snapshot),
            DisplayEvent::Qr(frame) => terminal.on_qr(&frame),
            DisplayEvent::Connection(state) => terminal.on_connection(state),
        }
    }
}

impl DisplayAdapter for TerminalDisplay {
    fn on_status(&self, snapshot: &JobStatusSnapshot) {
        self.write_line(&render_status(snapshot));
    }

    fn on_qr(&self, frame: &QrFrame) {
        let count = {
            let mut count = self
                .qr_updates
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            *count += 1;
            *count
        };
        self.write_line(&render_qr(frame, count));
    }

    fn on_connection(&self, state: ConnectionState) {
        self.write_line(&render_connection(state));
    }
}

pub fn render_status(snapshot: &JobStatusSnapshot) -> String {
    match snapshot.progress {
        Some(_) => format!(
            "{} {}",
            progress_bar(snapshot.progress, PROGRESS_WIDTH),
            format_log_line(snapshot)
        ),
        None => format_log_line(snapshot),
    }
}

pub fn render_qr(frame: &QrFrame, update: u64) -> String {
    let preview = match &frame.payload {
        snabbt_core::QrPayload::Url(url) => url.clone(),
        snabbt_core::QrPayload::Data(data) => format!("<{} bytes of image data>", data.len()),
    };
    format!(
        "QR #{update} [{}] scan with BankID: {preview}",
        frame.content_hash.short()
    )
}

pub fn render_connection(state: ConnectionState) -> String {
    let hint = match state {
        ConnectionState::Checking => "checking worker",
        ConnectionState::Connected => "worker reachable",
        ConnectionState::Degraded => "worker slow to answer; still polling",
        ConnectionState::Disconnected => "worker unreachable; retrying",
        ConnectionState::Fallback => "offline mode; new jobs run locally",
    };
    format!("[{}] {hint}", state.label())
}
