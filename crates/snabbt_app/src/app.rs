//! Command implementations for the `snabbt` binary.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use snabbt_core::{format_log_line, JobId, PollingPhase};
use snabbt_engine::{
    start_job_or_fallback, ChannelKey, HealthMonitor, JobMode, PushChannel, ReqwestWorkerApi,
    StartedJob, SyncSession, SyncSettings, WebSocketChannel, WorkerApi,
};
use sync_logging::{sync_debug, sync_info, sync_warn};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::config::AppConfig;
use crate::display::{spawn_renderer, TerminalDisplay};
use crate::session_store::{SessionRecord, SessionStore};

const PHASE_CHECK_INTERVAL: Duration = Duration::from_millis(250);

pub struct RunOptions {
    pub booking: Option<std::path::PathBuf>,
    pub resume: bool,
    pub job_id: Option<String>,
    pub user: Option<String>,
}

pub async fn run(config: &AppConfig, options: RunOptions) -> Result<()> {
    let settings = config.sync_settings()?;
    let api = worker_api(config, &settings)?;
    let store = SessionStore::new(&config.state_dir);

    let mut monitor = HealthMonitor::new(api.clone(), &settings.health, settings.timeouts.health);
    monitor.start();

    let started = match (&options.job_id, options.resume) {
        (Some(job_id), _) => StartedJob::live(JobId::new(job_id.clone())),
        (None, true) => match store.load() {
            Some(record) => {
                if record.base_url != config.base_url {
                    sync_warn!(
                        "Resuming job {} recorded against {}; now using {}",
                        record.job_id,
                        record.base_url,
                        config.base_url
                    );
                }
                record.started_job()
            }
            None => bail!("no session to resume in {:?}", store.path()),
        },
        (None, false) => {
            let booking = read_booking(options.booking.as_deref())?;
            start_job_or_fallback(api.as_ref(), &monitor.handle(), &booking)
                .await
                .context("worker refused to start the job")?
        }
    };

    if started.mode == JobMode::Live {
        store
            .save(&SessionRecord::new(&started.job_id, &config.base_url, Utc::now()))
            .context("failed to record the session")?;
    }
    println!("Following job {} ({:?})", started.job_id, started.mode);
    println!("Commands: r = refresh QR now, f = refresh faster, q = quit");

    let push = push_channel(config)?;
    let push_key = options.user.clone().map(ChannelKey::User);
    let (display, renderer) = spawn_renderer(TerminalDisplay::stdout());
    let mut session = SyncSession::new(
        api.clone(),
        push,
        Arc::new(display),
        monitor.handle(),
        &settings,
    );
    session.begin(&started, push_key)?;

    let outcome = follow(&session).await;
    let view = session.view();
    drop(session);
    monitor.stop();
    // In-flight requests keep the display alive until they time out.
    let drain = settings.timeouts.status.max(settings.timeouts.qr);
    if tokio::time::timeout(drain, renderer).await.is_err() {
        sync_debug!("Terminal renderer still busy after {:?}", drain);
    }

    match outcome {
        FollowOutcome::Finished => {
            if let Some(status) = view.latest_status.as_ref() {
                println!("Finished: {}", format_log_line(status));
            }
            store.clear()?;
        }
        FollowOutcome::Detached => {
            println!(
                "Detached from job {}; `snabbt run --resume` re-attaches",
                started.job_id
            );
        }
    }
    Ok(())
}

enum FollowOutcome {
    Finished,
    Detached,
}

/// Waits for a terminal status, Ctrl-C or `q`, handling keyboard commands meanwhile.
async fn follow(session: &SyncSession) -> FollowOutcome {
    if session
        .current_job()
        .is_some_and(|job| job.mode == JobMode::Fallback)
    {
        println!("Worker offline: no live updates for this job. Press Ctrl-C to exit.");
        let _ = tokio::signal::ctrl_c().await;
        return FollowOutcome::Detached;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut ticker = tokio::time::interval(PHASE_CHECK_INTERVAL);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return FollowOutcome::Detached,
            _ = ticker.tick() => {
                if session.phase() == PollingPhase::Terminal {
                    return FollowOutcome::Finished;
                }
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(command)) => match command.trim() {
                    "r" => {
                        if !session.refresh_once() {
                            println!("Nothing to refresh");
                        }
                    }
                    "f" => session.refresh_faster(),
                    "q" => return FollowOutcome::Detached,
                    "" => {}
                    other => println!("Unknown command {other:?}"),
                },
                Ok(None) | Err(_) => stdin_open = false,
            },
        }
    }
}

pub async fn stop(config: &AppConfig, job_id: Option<String>) -> Result<()> {
    let settings = config.sync_settings()?;
    let store = SessionStore::new(&config.state_dir);
    let job_id = match job_id {
        Some(job_id) => JobId::new(job_id),
        None => match store.load() {
            Some(record) => JobId::new(record.job_id),
            None => bail!("no recorded job; pass --job-id"),
        },
    };

    if job_id.is_local() {
        sync_info!("Job {} only existed locally", job_id);
    } else {
        let api = worker_api(config, &settings)?;
        api.stop_job(&job_id)
            .await
            .with_context(|| format!("failed to stop job {job_id}"))?;
    }
    store.clear()?;
    println!("Stopped job {job_id}");
    Ok(())
}

pub async fn health(config: &AppConfig) -> Result<()> {
    let settings = config.sync_settings()?;
    let api = worker_api(config, &settings)?;
    let monitor = HealthMonitor::new(api, &settings.health, settings.timeouts.health);
    let state = monitor.force_probe().await;
    println!("{}: {}", config.base_url, state);
    Ok(())
}

fn worker_api(config: &AppConfig, settings: &SyncSettings) -> Result<Arc<dyn WorkerApi>> {
    let api = ReqwestWorkerApi::new(&config.base_url, settings.timeouts.clone())
        .with_context(|| format!("invalid worker url {}", config.base_url))?;
    Ok(Arc::new(api))
}

fn push_channel(config: &AppConfig) -> Result<Option<Arc<dyn PushChannel>>> {
    let Some(push_url) = config.push_url.as_deref() else {
        return Ok(None);
    };
    let channel = WebSocketChannel::new(push_url)
        .with_context(|| format!("invalid push url {push_url}"))?;
    Ok(Some(Arc::new(channel)))
}

fn read_booking(path: Option<&Path>) -> Result<serde_json::Value> {
    let Some(path) = path else {
        return Ok(serde_json::Value::Object(serde_json::Map::new()));
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read booking file {path:?}"))?;
    serde_json::from_str(&text).with_context(|| format!("booking file {path:?} is not JSON"))
}
