use crate::{
    is_qr_ready, DisplayEvent, Effect, JobStatus, JobStatusSnapshot, Msg, PollKind, PollerState,
    PollingPhase, QrAcceptance, QrFrame, QrOrigin, QrPollOutcome,
};

/// Pure update function: applies a message to the poller state and returns the effects to run.
pub fn update(mut state: PollerState, msg: Msg) -> (PollerState, Vec<Effect>) {
    let effects = match msg {
        Msg::Start(job_id) => {
            if state.phase() != PollingPhase::Idle {
                return (state, Vec::new());
            }
            state.begin(job_id);
            vec![
                Effect::FetchStatus,
                Effect::ScheduleStatusPolling {
                    every: state.settings().status_interval,
                },
            ]
        }
        Msg::Stop => stop(&mut state),
        Msg::StatusPolled(snapshot) => {
            if !state.phase().is_active() {
                return (state, Vec::new());
            }
            let mut effects = record_success(&mut state);
            effects.extend(apply_status(&mut state, snapshot, Source::StatusPoll));
            effects
        }
        Msg::StatusPushed(snapshot) => apply_status(&mut state, snapshot, Source::Push),
        Msg::QrPolled {
            origin,
            outcome,
            status,
        } => {
            if !state.phase().is_active() {
                return (state, Vec::new());
            }
            let (mut effects, source) = match origin {
                QrOrigin::Scheduled => (record_success(&mut state), Source::QrPoll),
                QrOrigin::Manual => (Vec::new(), Source::Manual),
            };
            if let Some(snapshot) = status {
                effects.extend(apply_status(&mut state, snapshot, source));
            }
            if let QrPollOutcome::Frame(frame) = outcome {
                effects.extend(apply_qr(&mut state, frame, source));
            }
            effects
        }
        Msg::QrPushed(frame) => apply_qr(&mut state, frame, Source::Push),
        Msg::PollFailed { kind, reason: _ } => {
            if !state.phase().is_active() {
                return (state, Vec::new());
            }
            let mut effects = Vec::new();
            if state.record_failure() {
                effects.push(Effect::BackendUnresponsive {
                    consecutive_failures: state.consecutive_failures(),
                });
            }
            if kind == PollKind::Status {
                effects.extend(count_ready_attempt(&mut state));
            }
            effects
        }
        Msg::RefreshFaster => {
            if state.phase() != PollingPhase::FastQrPolling {
                return (state, Vec::new());
            }
            let faster = state.qr_interval().min(state.settings().fast_qr_interval);
            if faster == state.qr_interval() {
                return (state, Vec::new());
            }
            state.set_qr_interval(faster);
            vec![Effect::ScheduleQrPolling { every: faster }]
        }
    };

    (state, effects)
}

/// Where an update came from. Only status polls count toward the ready budget,
/// and manual refreshes never change the phase short of a terminal status.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Source {
    StatusPoll,
    QrPoll,
    Push,
    Manual,
}

fn stop(state: &mut PollerState) -> Vec<Effect> {
    let mut effects = match state.phase() {
        PollingPhase::Idle if state.job_id().is_none() => return Vec::new(),
        PollingPhase::AwaitingReady { .. } => vec![Effect::CancelStatusPolling],
        PollingPhase::FastQrPolling => vec![Effect::CancelQrPolling],
        PollingPhase::Idle | PollingPhase::Terminal => Vec::new(),
    };
    if state.backend_warning_raised() {
        effects.push(Effect::BackendWarningCleared);
    }
    state.reset();
    effects
}

fn record_success(state: &mut PollerState) -> Vec<Effect> {
    if state.record_success() {
        vec![Effect::BackendWarningCleared]
    } else {
        Vec::new()
    }
}

/// Shared status path for polls, pushes and statuses piggybacked on QR responses.
fn apply_status(state: &mut PollerState, snapshot: JobStatusSnapshot, source: Source) -> Vec<Effect> {
    if !state.phase().is_active() || state.job_id() != Some(&snapshot.job_id) {
        return Vec::new();
    }

    let accepted = state.ledger_mut().accept_status(&snapshot);
    let mut effects = Vec::new();
    if accepted {
        let terminal = snapshot.is_terminal();
        let ready = is_qr_ready(&snapshot);
        let status = snapshot.status.clone();
        effects.push(Effect::Emit(DisplayEvent::Status(snapshot)));
        if terminal {
            effects.extend(finish(state, status));
            return effects;
        }
        if ready && source != Source::Manual && is_awaiting_ready(state) {
            effects.extend(escalate(state));
            return effects;
        }
    }
    if source == Source::StatusPoll {
        effects.extend(count_ready_attempt(state));
    }
    effects
}

fn apply_qr(state: &mut PollerState, frame: QrFrame, source: Source) -> Vec<Effect> {
    if !state.phase().is_active() {
        return Vec::new();
    }
    match state.ledger_mut().accept_qr(&frame) {
        QrAcceptance::Heartbeat => Vec::new(),
        QrAcceptance::New { .. } => {
            let mut effects = vec![Effect::Emit(DisplayEvent::Qr(frame))];
            // A published QR code is the strongest ready signal there is.
            if source != Source::Manual && is_awaiting_ready(state) {
                effects.extend(escalate(state));
            }
            effects
        }
    }
}

fn is_awaiting_ready(state: &PollerState) -> bool {
    matches!(state.phase(), PollingPhase::AwaitingReady { .. })
}

fn count_ready_attempt(state: &mut PollerState) -> Vec<Effect> {
    let PollingPhase::AwaitingReady { attempts } = state.phase() else {
        return Vec::new();
    };
    let attempts = attempts.saturating_add(1);
    if attempts >= state.settings().max_ready_attempts {
        let mut effects = vec![Effect::ReadyTimedOut { attempts }];
        effects.extend(escalate(state));
        return effects;
    }
    state.set_phase(PollingPhase::AwaitingReady { attempts });
    Vec::new()
}

fn escalate(state: &mut PollerState) -> Vec<Effect> {
    state.set_phase(PollingPhase::FastQrPolling);
    vec![
        Effect::CancelStatusPolling,
        Effect::FetchQr,
        Effect::ScheduleQrPolling {
            every: state.qr_interval(),
        },
    ]
}

fn finish(state: &mut PollerState, status: JobStatus) -> Vec<Effect> {
    let cancel = match state.phase() {
        PollingPhase::AwaitingReady { .. } => Effect::CancelStatusPolling,
        _ => Effect::CancelQrPolling,
    };
    state.set_phase(PollingPhase::Terminal);
    vec![cancel, Effect::Finished { status }]
}
