mod support;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use snabbt_core::{ConnectionState, JobId};
use snabbt_engine::{start_job_or_fallback, FailureKind, HealthMonitor, HealthSettings, JobMode};
use support::{settle, FakeApi, Reply};

fn monitor(api: &Arc<FakeApi>) -> HealthMonitor {
    HealthMonitor::new(api.clone(), &HealthSettings::default(), Duration::from_secs(5))
}

#[tokio::test(start_paused = true)]
async fn probes_immediately_then_every_thirty_seconds() {
    let api = Arc::new(FakeApi::new());
    let mut monitor = monitor(&api);
    assert_eq!(monitor.state(), ConnectionState::Checking);

    monitor.start();
    assert!(monitor.is_running());
    settle(Duration::from_millis(10)).await;
    assert_eq!(api.health_calls(), 1);
    assert_eq!(monitor.state(), ConnectionState::Connected);

    settle(Duration::from_secs(61)).await;
    assert_eq!(api.health_calls(), 3);

    monitor.stop();
    assert!(!monitor.is_running());
    settle(Duration::from_secs(120)).await;
    assert_eq!(api.health_calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn scheduled_failures_disconnect_but_never_enter_fallback() {
    let api = Arc::new(FakeApi::new().with_health(|n| {
        if n == 1 {
            Reply::ok(())
        } else {
            Reply::err(FailureKind::Offline)
        }
    }));
    let mut monitor = monitor(&api);
    let mut observer = monitor.subscribe();

    monitor.start();
    observer.changed().await.unwrap();
    assert_eq!(*observer.borrow_and_update(), ConnectionState::Connected);

    settle(Duration::from_secs(31)).await;
    assert_eq!(monitor.state(), ConnectionState::Disconnected);
    assert_eq!(*observer.borrow_and_update(), ConnectionState::Disconnected);

    assert_eq!(monitor.force_probe().await, ConnectionState::Fallback);
    assert_eq!(*observer.borrow(), ConnectionState::Fallback);
    monitor.stop();
}

#[tokio::test(start_paused = true)]
async fn fallback_persists_until_a_probe_succeeds() {
    let api = Arc::new(FakeApi::new().with_health(|n| match n {
        1 => Reply::err(FailureKind::Offline),
        2 => Reply::err(FailureKind::Timeout),
        _ => Reply::ok(()),
    }));
    let monitor = monitor(&api);

    assert_eq!(monitor.force_probe().await, ConnectionState::Fallback);
    assert_eq!(
        monitor.handle().probe(snabbt_core::ProbeTrigger::Scheduled).await,
        ConnectionState::Fallback
    );
    assert_eq!(monitor.force_probe().await, ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn a_probe_slower_than_its_timeout_counts_as_a_failure() {
    let api = Arc::new(
        FakeApi::new().with_health(|_| Reply::ok(()).after(Duration::from_secs(10))),
    );
    let monitor = monitor(&api);
    assert_eq!(monitor.force_probe().await, ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn dropped_observers_do_not_affect_probing() {
    let api = Arc::new(FakeApi::new());
    let mut monitor = monitor(&api);
    let observer = monitor.subscribe();
    drop(observer);

    monitor.start();
    settle(Duration::from_secs(31)).await;
    assert_eq!(api.health_calls(), 2);
    assert_eq!(monitor.state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn start_uses_the_worker_when_reachable() {
    let api = Arc::new(FakeApi::new());
    let monitor = monitor(&api);

    let started = start_job_or_fallback(api.as_ref(), &monitor.handle(), &json!({}))
        .await
        .unwrap();
    assert_eq!(started.job_id, JobId::new("job-42"));
    assert_eq!(started.mode, JobMode::Live);
}

#[tokio::test(start_paused = true)]
async fn start_synthesizes_a_local_job_when_offline() {
    let api = Arc::new(
        FakeApi::new()
            .with_start(|_| Reply::err(FailureKind::Offline))
            .with_health(|_| Reply::err(FailureKind::Offline)),
    );
    let monitor = monitor(&api);

    let started = start_job_or_fallback(api.as_ref(), &monitor.handle(), &json!({}))
        .await
        .unwrap();
    assert_eq!(started.mode, JobMode::Fallback);
    assert!(started.job_id.is_local());
    assert_eq!(monitor.state(), ConnectionState::Fallback);

    // Already in fallback: no further start attempts hit the worker.
    let again = start_job_or_fallback(api.as_ref(), &monitor.handle(), &json!({}))
        .await
        .unwrap();
    assert!(again.job_id.is_local());
    assert_ne!(again.job_id, started.job_id);
    assert_eq!(api.start_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn start_errors_other_than_offline_propagate() {
    let api = Arc::new(FakeApi::new().with_start(|_| Reply::err(FailureKind::HttpStatus(500))));
    let monitor = monitor(&api);

    let err = start_job_or_fallback(api.as_ref(), &monitor.handle(), &json!({}))
        .await
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::HttpStatus(500));
    assert_eq!(api.health_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn offline_start_with_a_reachable_health_endpoint_is_an_error() {
    let api = Arc::new(FakeApi::new().with_start(|_| Reply::err(FailureKind::Offline)));
    let monitor = monitor(&api);

    let err = start_job_or_fallback(api.as_ref(), &monitor.handle(), &json!({}))
        .await
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::Offline);
    assert_eq!(monitor.state(), ConnectionState::Connected);
}
