use crate::JobStatusSnapshot;

/// One trailing-log line: `HH:MM:SS status[/stage][: message][ (NN%)]`.
pub fn format_log_line(snapshot: &JobStatusSnapshot) -> String {
    let mut line = format!(
        "{} {}",
        snapshot.timestamp.format("%H:%M:%S"),
        snapshot.status.as_str()
    );
    if let Some(stage) = snapshot.stage.as_deref() {
        if !stage.is_empty() && !stage.eq_ignore_ascii_case(snapshot.status.as_str()) {
            line.push('/');
            line.push_str(stage);
        }
    }
    if let Some(message) = snapshot.message.as_deref() {
        let message = message.trim();
        if !message.is_empty() {
            line.push_str(": ");
            line.push_str(message);
        }
    }
    if let Some(progress) = snapshot.progress {
        line.push_str(&format!(" ({progress}%)"));
    }
    if snapshot.slots_found > 0 {
        line.push_str(&format!(" [{} slots]", snapshot.slots_found));
    }
    line
}

/// Fixed-width text progress bar, e.g. `[#####-----]`. Unknown progress renders empty.
pub fn progress_bar(progress: Option<u8>, width: usize) -> String {
    let percent = usize::from(progress.unwrap_or(0).min(100));
    let filled = (percent * width + 50) / 100;
    let mut bar = String::with_capacity(width + 2);
    bar.push('[');
    bar.extend(std::iter::repeat_n('#', filled.min(width)));
    bar.extend(std::iter::repeat_n('-', width.saturating_sub(filled)));
    bar.push(']');
    bar
}
