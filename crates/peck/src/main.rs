use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use owo_colors::OwoColorize;
use tracing::debug;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::Directive;

use peck_consts::CONFIG_FILE;
use peck_consts::env_vars::EnvVars;

use crate::cli::{Cli, Command, ExitStatus, RunArgs};
use crate::run::{HookResult, RunContext};
use crate::store::Store;

mod cli;
mod command;
mod config;
mod env_state;
mod exec;
mod filter;
mod fs;
mod git;
mod hook;
mod languages;
mod process;
mod registry;
mod repo;
mod run;
mod store;
mod warnings;

fn setup_logging(verbosity: u8) -> Result<()> {
    let directive = match verbosity {
        0 => LevelFilter::OFF.into(),
        1 => Directive::from_str("peck=info")?,
        2 => Directive::from_str("peck=debug")?,
        _ => Directive::from_str("peck=trace")?,
    };

    let filter = EnvFilter::builder()
        .with_default_directive(directive)
        .from_env()
        .context("Invalid RUST_LOG directive")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(anstream::stderr)
        .init();
    Ok(())
}

async fn run(cli: Cli) -> Result<ExitStatus> {
    match cli.command {
        Command::Run(args) => {
            let store = Store::from_settings()?;
            run_command(&store, args, cli.verbose > 0).await
        }
        Command::Validate { config } => {
            let path = config::resolve_config_path(
                config.as_deref().unwrap_or(Path::new(CONFIG_FILE)),
            )?;
            config::read_config(&path)?;
            anstream::println!("{}: `{}` is valid", "ok".green().bold(), path.display());
            Ok(ExitStatus::Success)
        }
        Command::Clean => {
            let store = Store::from_settings()?;
            store.clean().await?;
            anstream::println!("Cleaned `{}`", store.path().display());
            Ok(ExitStatus::Success)
        }
        Command::Gc => {
            let store = Store::from_settings()?;
            gc(&store)?;
            Ok(ExitStatus::Success)
        }
    }
}

/// Drop index rows for configuration files that no longer exist, then prune
/// working trees whose `.git` directory has vanished.
fn gc(store: &Store) -> Result<()> {
    let mut removed = 0usize;
    for config in store.tracked_configs()? {
        if !config.is_file() {
            store.remove_config(&config)?;
            removed += 1;
        }
    }

    for (repo_key, rev, path) in store.repo_entries()? {
        if !path.join(".git").is_dir() {
            store.remove_repo_entry(&repo_key, &rev)?;
            if path.is_dir() {
                fs_err::remove_dir_all(&path)?;
            }
            removed += 1;
        }
    }

    anstream::println!("Removed {removed} stale cache entries");
    Ok(())
}

async fn run_command(store: &Store, args: RunArgs, verbose: bool) -> Result<ExitStatus> {
    let config_path = config::resolve_config_path(
        args.config.as_deref().unwrap_or(Path::new(CONFIG_FILE)),
    )?;
    let config = config::read_config(&config_path)?;
    if let Err(err) = store.mark_config_used(&config_path) {
        debug!(%err, "Failed to track config file");
    }

    let work_root = match git::get_root().await {
        Ok(root) => root,
        Err(err) => {
            debug!(%err, "Not inside a git repository, using the current directory");
            fs::CWD.clone()
        }
    };

    let files: Vec<PathBuf> = if !args.files.is_empty() {
        args.files
    } else if args.all_files {
        git::ls_files(&work_root).await?
    } else {
        git::get_staged_files(&work_root).await?
    };

    let skips = EnvVars::var(EnvVars::SKIP)
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect();

    let ctx = RunContext {
        config,
        work_root: work_root.clone(),
        files,
        stage: args.hook_stage,
        hook_ids: args.hook_ids,
        skips,
        fail_fast: args.fail_fast,
        verbose,
        timeout: (args.timeout > 0).then(|| Duration::from_secs(args.timeout)),
        parallel: args.jobs.unwrap_or(*run::CONCURRENCY),
        refresh: args.refresh,
    };

    let results = run::run_hooks(store, &ctx).await?;
    let failed = render_results(&results, verbose)?;

    if failed && args.show_diff_on_failure {
        anstream::println!("All changes made by hooks:");
        git::git_cmd("git diff")?
            .arg("--no-pager")
            .arg("diff")
            .arg("--no-ext-diff")
            .arg("--")
            .arg(&work_root)
            .check(false)
            .status()
            .await?;
    }

    if failed {
        Ok(ExitStatus::Failure)
    } else {
        Ok(ExitStatus::Success)
    }
}

const COLUMNS: usize = 79;

fn status_line(name: &str, status: &str, colored: String) -> String {
    let dots = COLUMNS.saturating_sub(name.chars().count() + status.len());
    format!("{name}{}{colored}", ".".repeat(dots.max(3)))
}

/// Print one line per result plus detail for failures, returning whether any
/// non-skipped hook failed.
fn render_results(results: &[HookResult], verbose: bool) -> Result<bool> {
    let mut failed = false;

    for result in results {
        if result.skipped {
            anstream::println!(
                "{}",
                status_line(
                    &result.hook.name,
                    "Skipped",
                    "Skipped".black().on_cyan().to_string()
                )
            );
            continue;
        }

        if result.success {
            anstream::println!(
                "{}",
                status_line(
                    &result.hook.name,
                    "Passed",
                    "Passed".on_green().to_string()
                )
            );
        } else {
            failed = true;
            anstream::println!(
                "{}",
                status_line(&result.hook.name, "Failed", "Failed".on_red().to_string())
            );
        }

        if result.success && !verbose && !result.hook.verbose {
            continue;
        }

        anstream::println!("{}", format!("- hook id: {}", result.hook.id).dimmed());
        if verbose || result.hook.verbose {
            anstream::println!(
                "{}",
                format!("- duration: {:.2}s", result.duration.as_secs_f64()).dimmed()
            );
        }
        if result.exit_code != 0 {
            anstream::println!("{}", format!("- exit code: {}", result.exit_code).dimmed());
        }
        if let Some(error) = &result.error {
            anstream::println!("{}", format!("- error: {error}").dimmed());
        }

        let output = result.output.trim_end();
        if output.is_empty() {
            continue;
        }
        if let Some(log_file) = result.hook.log_file.as_deref() {
            let mut file = fs_err::OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_file)?;
            writeln!(file, "{output}")?;
        } else {
            anstream::println!();
            for line in output.lines() {
                anstream::println!("  {line}");
            }
        }
    }

    Ok(failed)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(err) = setup_logging(cli.verbose) {
        eprintln!("{}: {err}", "error".red().bold());
        return ExitStatus::Error.into();
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("{}: failed to start runtime: {err}", "error".red().bold());
            return ExitStatus::Error.into();
        }
    };

    let result = runtime.block_on(run(cli));
    match result {
        Ok(status) => status.into(),
        Err(err) => {
            eprintln!("{}: {err:#}", "error".red().bold());
            ExitStatus::Error.into()
        }
    }
}
