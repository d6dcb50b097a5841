use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use crate::config::Stage;

#[derive(Parser)]
#[command(
    name = "peck",
    about = "A fast pre-commit hook runner",
    version,
    disable_help_subcommand = true
)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Use verbose output; repeat for debug and trace logging.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run hooks against the staged files.
    Run(RunArgs),

    /// Validate a configuration file.
    Validate {
        /// Path to the configuration file.
        config: Option<PathBuf>,
    },

    /// Remove all cached repositories.
    Clean,

    /// Remove cache entries whose configuration files no longer exist.
    Gc,
}

#[derive(clap::Args)]
pub(crate) struct RunArgs {
    /// Only run the hooks with these ids.
    pub hook_ids: Vec<String>,

    /// Path to an alternate configuration file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Run on all files tracked by git instead of staged files.
    #[arg(short, long)]
    pub all_files: bool,

    /// Specific files to run on.
    #[arg(long, num_args = 1..)]
    pub files: Vec<PathBuf>,

    /// The stage to run hooks for.
    #[arg(long, value_enum, default_value_t = Stage::PreCommit)]
    pub hook_stage: Stage,

    /// Stop after the first failing hook.
    #[arg(long)]
    pub fail_fast: bool,

    /// Show a diff of changes on failure.
    #[arg(long)]
    pub show_diff_on_failure: bool,

    /// Per-hook timeout in seconds. 0 waits indefinitely.
    #[arg(long, default_value_t = 0)]
    pub timeout: u64,

    /// Number of hooks to run concurrently.
    #[arg(short = 'j', long, alias = "parallel")]
    pub jobs: Option<usize>,

    /// Force refreshing cached hook repositories.
    #[arg(long)]
    pub refresh: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExitStatus {
    /// Every non-skipped hook succeeded.
    Success,
    /// At least one hook failed.
    Failure,
    /// The runner itself failed.
    Error,
}

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> Self {
        match status {
            ExitStatus::Success => Self::from(0),
            ExitStatus::Failure => Self::from(1),
            ExitStatus::Error => Self::from(2),
        }
    }
}
