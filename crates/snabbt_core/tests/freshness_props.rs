use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use snabbt_core::{
    is_newer, update, DisplayEvent, Effect, JobId, JobStatus, JobStatusSnapshot, Msg,
    PollerState, QrFrame, QrPayload, SyncLedger,
};

fn snapshot(secs: i64, step: Option<u64>) -> JobStatusSnapshot {
    let mut snap = JobStatusSnapshot::new(
        JobId::new("job-1"),
        JobStatus::Running,
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
    )
    .with_message(format!("t={secs}"));
    snap.step = step;
    snap
}

#[test]
fn out_of_order_delivery_keeps_the_later_snapshot() {
    let t1 = snapshot(1, None);
    let t2 = snapshot(2, None);
    let (state, _) = update(PollerState::default(), Msg::Start(JobId::new("job-1")));

    // t2 arrives first over push, t1 second over polling.
    let (state, pushed) = update(state, Msg::StatusPushed(t2.clone()));
    let (state, polled) = update(state, Msg::StatusPolled(t1));

    assert_eq!(pushed, vec![Effect::Emit(DisplayEvent::Status(t2.clone()))]);
    assert!(!polled
        .iter()
        .any(|effect| matches!(effect, Effect::Emit(_))));
    assert_eq!(state.ledger().latest_status(), Some(&t2));
}

proptest! {
    #[test]
    fn accepted_snapshots_never_go_backwards(
        deliveries in prop::collection::vec((0i64..50, prop::option::of(0u64..5)), 1..60)
    ) {
        let mut ledger = SyncLedger::default();
        let mut accepted: Vec<JobStatusSnapshot> = Vec::new();
        for (secs, step) in deliveries {
            let candidate = snapshot(secs, step);
            if ledger.accept_status(&candidate) {
                accepted.push(candidate);
            }
        }
        for pair in accepted.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            prop_assert!(next.timestamp >= prev.timestamp);
            if next.timestamp == prev.timestamp {
                prop_assert!(next.step > prev.step);
            }
        }
    }

    #[test]
    fn held_snapshot_is_the_maximum_timestamp_seen(
        seconds in prop::collection::vec(0i64..1_000, 1..40)
    ) {
        let mut ledger = SyncLedger::default();
        for secs in &seconds {
            ledger.accept_status(&snapshot(*secs, None));
        }
        let max = seconds.iter().copied().max().unwrap_or_default();
        let held = ledger.latest_status().map(|snap| snap.timestamp);
        prop_assert_eq!(held, Some(Utc.timestamp_opt(1_700_000_000 + max, 0).unwrap()));
    }

    #[test]
    fn equal_or_earlier_timestamps_are_never_newer(held in 0i64..1_000, delta in 0i64..1_000) {
        let held = snapshot(held, None);
        let candidate = snapshot(held.timestamp.timestamp() - 1_700_000_000 - delta, None);
        prop_assert!(!is_newer(&candidate, Some(&held)));
    }

    #[test]
    fn qr_newness_depends_only_on_content(
        url in "[a-z]{1,12}",
        other in "[a-z]{1,12}",
        first_secs in 0i64..1_000,
        second_secs in 0i64..1_000,
    ) {
        let held = QrFrame::new(QrPayload::Url(url.clone()), Utc.timestamp_opt(first_secs, 0).unwrap());
        let same = QrFrame::new(QrPayload::Url(url.clone()), Utc.timestamp_opt(second_secs, 0).unwrap());
        let different = QrFrame::new(QrPayload::Url(other.clone()), Utc.timestamp_opt(second_secs, 0).unwrap());

        prop_assert!(!is_newer(&same, Some(&held)));
        prop_assert_eq!(is_newer(&different, Some(&held)), url != other);
    }

    #[test]
    fn each_distinct_frame_counts_once(urls in prop::collection::vec("[abc]", 1..50)) {
        let mut ledger = SyncLedger::default();
        for (secs, url) in urls.iter().enumerate() {
            let frame = QrFrame::new(
                QrPayload::Url(url.clone()),
                Utc.timestamp_opt(secs as i64, 0).unwrap(),
            );
            ledger.accept_qr(&frame);
        }
        // Well inside the recent-hash window, so a frame that comes back is a heartbeat.
        let distinct = urls.iter().collect::<std::collections::HashSet<_>>().len() as u64;
        prop_assert_eq!(ledger.qr_update_count(), distinct);
    }
}
