mod app;
mod cli;
mod config;
mod display;
mod session_store;

use clap::Parser;
use log::LevelFilter;

use crate::app::RunOptions;
use crate::cli::{Cli, Command};
use crate::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let loaded = AppConfig::load(&cli.config)?;
    let from_file = loaded.is_some();
    let mut config = loaded.unwrap_or_default();
    config.apply_env(|name| std::env::var(name).ok());

    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    if !sync_logging::initialize(cli.log.into(), &config.log_file, level) {
        eprintln!("Warning: logging is disabled");
    }
    if !from_file {
        sync_logging::sync_info!("No config at {:?}; using defaults", cli.config);
    }
    sync_logging::sync_info!("snabbt starting; worker at {}", config.base_url);

    let result = match cli.command {
        Command::Run {
            booking,
            resume,
            job_id,
            user,
        } => {
            app::run(
                &config,
                RunOptions {
                    booking,
                    resume,
                    job_id,
                    user,
                },
            )
            .await
        }
        Command::Stop { job_id } => app::stop(&config, job_id).await,
        Command::Health => app::health(&config).await,
    };
    if let Err(err) = &result {
        sync_logging::sync_error!("snabbt failed: {:#}", err);
    }
    result
}
