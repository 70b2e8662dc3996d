use crate::JobStatusSnapshot;

/// Status or stage values meaning the worker is waiting for a BankID QR scan.
pub const READY_SIGNALS: &[&str] = &[
    "qr_waiting",
    "bankid_waiting",
    "waiting_bankid",
    "qr_streaming",
    "bankid",
    "authenticating",
    "authentication",
];

/// Substrings that mark a free-text message as QR-ready.
///
/// Heuristic: the worker does not expose a ready signal on every code path,
/// and these can misfire on unrelated message text.
pub const READY_MESSAGE_KEYWORDS: &[&str] = &["qr", "bankid"];

/// True when the snapshot says the worker is showing a QR code to scan.
pub fn is_qr_ready(snapshot: &JobStatusSnapshot) -> bool {
    if matches_ready_signal(snapshot.status.as_str()) {
        return true;
    }
    if snapshot.stage.as_deref().is_some_and(matches_ready_signal) {
        return true;
    }
    snapshot.message.as_deref().is_some_and(|message| {
        let lowered = message.to_lowercase();
        READY_MESSAGE_KEYWORDS
            .iter()
            .any(|keyword| lowered.contains(keyword))
    })
}

fn matches_ready_signal(text: &str) -> bool {
    let normalized = text.trim().to_ascii_lowercase();
    READY_SIGNALS.contains(&normalized.as_str())
}
