use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(name = "snabbt", about = "Follow a driving-test booking job: status, BankID QR and progress")]
pub struct Cli {
    /// Configuration file (RON). Missing file means built-in defaults.
    #[arg(long, default_value = "snabbt.ron", global = true)]
    pub config: PathBuf,

    /// Where log output goes.
    #[arg(long, value_enum, default_value_t = LogTarget::File, global = true)]
    pub log: LogTarget,

    /// Log debug messages too.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start a job (or attach to one) and follow it until it finishes
    Run {
        /// JSON booking configuration sent to the worker
        #[arg(long, conflicts_with_all = ["resume", "job_id"])]
        booking: Option<PathBuf>,
        /// Re-attach to the job recorded by the previous run
        #[arg(long)]
        resume: bool,
        /// Attach to an already running job
        #[arg(long, conflicts_with = "resume")]
        job_id: Option<String>,
        /// Subscribe to the user's push channel instead of the job's
        #[arg(long)]
        user: Option<String>,
    },
    /// Ask the worker to stop the recorded (or given) job
    Stop {
        #[arg(long)]
        job_id: Option<String>,
    },
    /// Probe the worker once and print the connection state
    Health,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogTarget {
    File,
    Terminal,
    Both,
}

impl From<LogTarget> for sync_logging::LogDestination {
    fn from(target: LogTarget) -> Self {
        match target {
            LogTarget::File => sync_logging::LogDestination::File,
            LogTarget::Terminal => sync_logging::LogDestination::Terminal,
            LogTarget::Both => sync_logging::LogDestination::Both,
        }
    }
}
