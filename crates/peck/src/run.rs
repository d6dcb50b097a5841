use std::path::PathBuf;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use anyhow::{Context, Result};
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tokio::sync::Semaphore;
use tracing::{debug, trace};

use peck_consts::env_vars::EnvVars;

use crate::command::build_command;
use crate::config::{Config, ManifestHook, RepoConfig, Stage};
use crate::exec::execute;
use crate::filter::FileFilter;
use crate::hook::{Hook, RepoSource, from_manifest_hook, resolve_hook};
use crate::languages::ensure_environment;
use crate::registry;
use crate::repo;
use crate::store::Store;

pub(crate) static CONCURRENCY: LazyLock<usize> = LazyLock::new(|| {
    if EnvVars::is_set(EnvVars::PECK_NO_CONCURRENCY) {
        1
    } else {
        std::thread::available_parallelism()
            .map(std::num::NonZero::get)
            .unwrap_or(1)
    }
});

/// Everything the orchestrator needs for one run, handed over by the CLI.
pub(crate) struct RunContext {
    pub config: Config,
    /// The user's repository root; hooks execute with this working
    /// directory.
    pub work_root: PathBuf,
    /// Candidate files, relative to `work_root`.
    pub files: Vec<PathBuf>,
    pub stage: Stage,
    /// Only run hooks with these ids. Empty means all.
    pub hook_ids: Vec<String>,
    /// Hook ids to skip (from the `SKIP` environment variable).
    pub skips: Vec<String>,
    pub fail_fast: bool,
    pub verbose: bool,
    /// Per-hook execution timeout. `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// Degree of parallelism. `1` forces sequential execution.
    pub parallel: usize,
    /// Force refreshing cached working trees.
    pub refresh: bool,
}

/// The outcome of one hook invocation.
#[derive(Debug, Clone)]
pub(crate) struct HookResult {
    pub hook: Hook,
    /// The files actually handed to the hook.
    pub files: Vec<String>,
    pub output: String,
    pub error: Option<String>,
    pub duration: Duration,
    pub exit_code: i32,
    pub success: bool,
    pub timed_out: bool,
    pub skipped: bool,
}

impl HookResult {
    fn skipped(hook: Hook) -> Self {
        Self {
            hook,
            files: Vec::new(),
            output: String::new(),
            error: None,
            duration: Duration::ZERO,
            exit_code: 0,
            success: true,
            timed_out: false,
            skipped: true,
        }
    }

    fn from_error(hook: Hook, error: String) -> Self {
        Self {
            hook,
            files: Vec::new(),
            output: String::new(),
            error: Some(error),
            duration: Duration::ZERO,
            exit_code: -1,
            success: false,
            timed_out: false,
            skipped: false,
        }
    }
}

/// A collected hook plus its provisioned environment.
struct ScheduledHook {
    hook: Hook,
    env_path: Option<PathBuf>,
}

/// Phase 1: walk the configuration in order and resolve every hook that
/// participates in this run.
async fn collect_hooks(store: &Store, ctx: &RunContext) -> Result<Vec<Hook>> {
    let mut hooks = Vec::new();
    let mut idx = 0usize;

    let wanted = |id: &str| -> bool {
        if ctx.skips.iter().any(|skip| skip == id) {
            return false;
        }
        ctx.hook_ids.is_empty() || ctx.hook_ids.iter().any(|want| want == id)
    };

    for provider in &ctx.config.repos {
        match provider {
            RepoConfig::Remote(remote) => {
                let rev = remote.rev.as_deref().unwrap_or_default();

                // Each hook acquires its own working tree: additional
                // dependencies are part of the cache key, so two hooks of the
                // same provider may land in different trees. Repeat
                // acquisitions of the same key are index hits.
                for user in &remote.hooks {
                    let this_idx = idx;
                    idx += 1;
                    if !wanted(&user.id) {
                        continue;
                    }

                    let deps = user
                        .options
                        .additional_dependencies
                        .clone()
                        .unwrap_or_default();
                    let path = if ctx.refresh {
                        repo::update(store, &remote.repo, rev, &deps).await
                    } else {
                        repo::acquire(store, &remote.repo, rev, &deps).await
                    }
                    .with_context(|| {
                        format!("Failed to acquire repo `{}`", remote.repo)
                    })?;

                    let base = crate::config::read_manifest_from_tree(&path)
                        .ok()
                        .and_then(|manifest| {
                            manifest.hooks.into_iter().find(|hook| hook.id == user.id)
                        })
                        .or_else(|| registry::well_known_hook(&remote.repo, &user.id))
                        .with_context(|| {
                            format!(
                                "Hook `{}` not found in repo `{}`",
                                user.id, remote.repo
                            )
                        })?;

                    let source = Arc::new(RepoSource::Remote {
                        url: remote.repo.clone(),
                        rev: rev.to_string(),
                        path,
                    });
                    let hook = resolve_hook(base, user, &ctx.config, source, this_idx);
                    if hook.runs_at(ctx.stage) {
                        hooks.push(hook);
                    }
                }
            }
            RepoConfig::Local(local) => {
                let source = Arc::new(RepoSource::Local);
                for manifest_hook in &local.hooks {
                    let this_idx = idx;
                    idx += 1;
                    if !wanted(&manifest_hook.id) {
                        continue;
                    }
                    let hook = from_manifest_hook(
                        manifest_hook.clone(),
                        &ctx.config,
                        source.clone(),
                        this_idx,
                    );
                    if hook.runs_at(ctx.stage) {
                        hooks.push(hook);
                    }
                }
            }
            RepoConfig::Meta(meta) => {
                let source = Arc::new(RepoSource::Meta);
                for user in &meta.hooks {
                    let this_idx = idx;
                    idx += 1;
                    if !wanted(&user.id) {
                        continue;
                    }
                    let base: ManifestHook =
                        registry::meta_hook(&user.id).with_context(|| {
                            format!("Unknown meta hook `{}`", user.id)
                        })?;
                    let hook = resolve_hook(base, user, &ctx.config, source.clone(), this_idx);
                    if hook.runs_at(ctx.stage) {
                        hooks.push(hook);
                    }
                }
            }
        }
    }

    debug!(
        "Hooks going to run: {:?}",
        hooks.iter().map(|hook| &hook.id).collect::<Vec<_>>()
    );
    Ok(hooks)
}

/// Phase 2: provision every required environment before anything executes,
/// amortizing clones and installs. Any provisioning failure aborts the run.
async fn preinitialize(store: &Store, hooks: Vec<Hook>) -> Result<Vec<ScheduledHook>> {
    let mut tasks = futures::stream::iter(hooks.into_iter().enumerate().map(
        |(slot, hook)| async move {
            let env = ensure_environment(&hook, store).await;
            (slot, hook, env)
        },
    ))
    .buffer_unordered(*CONCURRENCY);

    let mut scheduled: Vec<Option<ScheduledHook>> = Vec::new();
    let mut errors = Vec::new();
    while let Some((slot, hook, env)) = tasks.next().await {
        if scheduled.len() <= slot {
            scheduled.resize_with(slot + 1, || None);
        }
        match env {
            Ok(env_path) => {
                scheduled[slot] = Some(ScheduledHook { hook, env_path });
            }
            Err(err) => errors.push(format!("{}: {err:#}", hook.id)),
        }
    }

    if !errors.is_empty() {
        anyhow::bail!(
            "Failed to provision hook environments:\n{}",
            errors.join("\n")
        );
    }

    Ok(scheduled.into_iter().flatten().collect())
}

async fn run_one(
    scheduled: &ScheduledHook,
    filter: &FileFilter<'_>,
    ctx: &RunContext,
) -> HookResult {
    let hook = &scheduled.hook;

    let matched = filter.for_hook(hook);
    trace!(hook = %hook.id, files = matched.len(), "Files after filtering");

    if matched.is_empty() && !hook.always_run {
        return HookResult::skipped(hook.clone());
    }

    let files: Vec<String> = matched
        .iter()
        .map(|path| path.to_string_lossy().into_owned())
        .collect();

    let command = match build_command(
        hook,
        &files,
        &ctx.work_root,
        scheduled.env_path.as_deref(),
    ) {
        Ok(command) => command,
        Err(err) => return HookResult::from_error(hook.clone(), err.to_string()),
    };

    let start = std::time::Instant::now();
    let execution = execute(hook, &command, &ctx.work_root, ctx.timeout).await;
    let duration = start.elapsed();

    if EnvVars::is_set(EnvVars::PECK_TIMING_DEBUG) {
        debug!(hook = %hook.id, ?duration, "Hook finished");
    }

    HookResult {
        hook: hook.clone(),
        files,
        output: execution.output,
        error: execution.error,
        duration,
        exit_code: execution.exit_code,
        success: execution.success,
        timed_out: execution.timed_out,
        skipped: false,
    }
}

/// Run all hooks for this context, returning results in configuration order.
pub(crate) async fn run_hooks(store: &Store, ctx: &RunContext) -> Result<Vec<HookResult>> {
    let hooks = collect_hooks(store, ctx).await?;
    if hooks.is_empty() {
        return Ok(Vec::new());
    }

    let scheduled = preinitialize(store, hooks).await?;

    let fail_fast = ctx.fail_fast || ctx.config.fail_fast.unwrap_or(false);
    let filter = FileFilter::new(ctx.files.iter(), &ctx.config);

    let serial = ctx.parallel <= 1
        || scheduled
            .iter()
            .any(|scheduled| scheduled.hook.require_serial);

    if serial {
        let mut results = Vec::with_capacity(scheduled.len());
        for item in &scheduled {
            let result = run_one(item, &filter, ctx).await;
            let failed = !result.success && !result.skipped;
            results.push(result);
            if fail_fast && failed {
                debug!("Stopping after first failure (fail-fast)");
                break;
            }
        }
        return Ok(results);
    }

    // Parallel: a semaphore bounds concurrency; every result is written into
    // its configuration-order slot by exactly one worker.
    let semaphore = Arc::new(Semaphore::new(ctx.parallel));
    let mut slots: Vec<Option<HookResult>> = Vec::new();
    slots.resize_with(scheduled.len(), || None);

    let mut tasks = scheduled
        .iter()
        .enumerate()
        .map(|(slot, item)| {
            let semaphore = semaphore.clone();
            let filter = &filter;
            async move {
                let _permit = semaphore.acquire().await.expect("semaphore closed");
                (slot, run_one(item, filter, ctx).await)
            }
        })
        .collect::<FuturesUnordered<_>>();

    while let Some((slot, result)) = tasks.next().await {
        slots[slot] = Some(result);
    }
    drop(tasks);

    Ok(slots.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use crate::config::Stage;
    use crate::store::Store;

    use super::{RunContext, run_hooks};

    fn context(config: &str, files: &[&str], root: PathBuf) -> RunContext {
        RunContext {
            config: serde_yaml::from_str(config).expect("config"),
            work_root: root,
            files: files.iter().map(PathBuf::from).collect(),
            stage: Stage::PreCommit,
            hook_ids: Vec::new(),
            skips: Vec::new(),
            fail_fast: false,
            verbose: false,
            timeout: None,
            parallel: 1,
            refresh: false,
        }
    }

    fn test_store(tmp: &tempfile::TempDir) -> Store {
        Store::from_path(tmp.path().join("cache")).expect("store")
    }

    const ECHO_HOOKS: &str = r"
repos:
  - repo: local
    hooks:
      - id: first
        name: first
        entry: sh -c 'echo first'
        language: system
        always_run: true
        pass_filenames: false
      - id: second
        name: second
        entry: sh -c 'echo second'
        language: system
        always_run: true
        pass_filenames: false
      - id: third
        name: third
        entry: sh -c 'echo third'
        language: system
        always_run: true
        pass_filenames: false
";

    #[tokio::test]
    async fn results_come_back_in_configuration_order() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = test_store(&tmp);
        let mut ctx = context(ECHO_HOOKS, &[], tmp.path().to_path_buf());
        ctx.parallel = 4;

        let results = run_hooks(&store, &ctx).await.expect("run");
        let ids: Vec<&str> = results.iter().map(|r| r.hook.id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second", "third"]);
        assert!(results.iter().all(|r| r.success));
    }

    #[tokio::test]
    async fn no_files_skips_unless_always_run() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = test_store(&tmp);
        let config = r"
repos:
  - repo: local
    hooks:
      - id: needs-files
        name: needs files
        entry: sh -c 'echo ran'
        language: system
      - id: always
        name: always
        entry: sh -c 'echo ran'
        language: system
        always_run: true
        pass_filenames: false
";
        let ctx = context(config, &[], tmp.path().to_path_buf());
        let results = run_hooks(&store, &ctx).await.expect("run");

        assert_eq!(results.len(), 2);
        assert!(results[0].skipped);
        assert!(results[0].success);
        assert_eq!(results[0].duration, Duration::ZERO);

        assert!(!results[1].skipped);
        assert!(results[1].success);
        assert!(results[1].files.is_empty());
    }

    #[tokio::test]
    async fn fail_fast_returns_completed_prefix() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = test_store(&tmp);
        let config = r"
repos:
  - repo: local
    hooks:
      - id: boom
        name: boom
        entry: sh -c 'exit 1'
        language: system
        always_run: true
        pass_filenames: false
      - id: never
        name: never
        entry: sh -c 'echo nope'
        language: system
        always_run: true
        pass_filenames: false
fail_fast: true
";
        let ctx = context(config, &[], tmp.path().to_path_buf());
        let results = run_hooks(&store, &ctx).await.expect("run");

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].hook.id, "boom");
        assert!(!results[0].success);
    }

    #[tokio::test]
    async fn require_serial_forces_sequential_execution() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = test_store(&tmp);
        let log = tmp.path().join("order.log");
        let config = format!(
            r"
repos:
  - repo: local
    hooks:
      - id: slow
        name: slow
        entry: sh -c 'sleep 0.3; echo slow >> {log}'
        language: system
        always_run: true
        pass_filenames: false
        require_serial: true
      - id: fast
        name: fast
        entry: sh -c 'echo fast >> {log}'
        language: system
        always_run: true
        pass_filenames: false
",
            log = log.display()
        );
        let mut ctx = context(&config, &[], tmp.path().to_path_buf());
        ctx.parallel = 4;

        let results = run_hooks(&store, &ctx).await.expect("run");
        assert_eq!(results.len(), 2);

        // With require_serial the slow hook finishes before the fast one
        // starts, despite parallel > 1.
        let content = fs_err::read_to_string(&log).expect("log");
        assert_eq!(content, "slow\nfast\n");
    }

    #[tokio::test]
    async fn hook_id_filter_and_skips() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = test_store(&tmp);

        let mut ctx = context(ECHO_HOOKS, &[], tmp.path().to_path_buf());
        ctx.hook_ids = vec!["second".to_string()];
        let results = run_hooks(&store, &ctx).await.expect("run");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].hook.id, "second");

        let mut ctx = context(ECHO_HOOKS, &[], tmp.path().to_path_buf());
        ctx.skips = vec!["second".to_string()];
        let results = run_hooks(&store, &ctx).await.expect("run");
        let ids: Vec<&str> = results.iter().map(|r| r.hook.id.as_str()).collect();
        assert_eq!(ids, vec!["first", "third"]);
    }

    #[tokio::test]
    async fn stage_gate_filters_hooks() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = test_store(&tmp);
        let config = r"
repos:
  - repo: local
    hooks:
      - id: push-only
        name: push only
        entry: sh -c 'echo push'
        language: system
        always_run: true
        pass_filenames: false
        stages: [pre-push]
";
        let ctx = context(config, &[], tmp.path().to_path_buf());
        let results = run_hooks(&store, &ctx).await.expect("run");
        assert!(results.is_empty());

        let mut ctx = context(config, &[], tmp.path().to_path_buf());
        ctx.stage = Stage::PrePush;
        let results = run_hooks(&store, &ctx).await.expect("run");
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn matched_files_are_passed_to_the_hook() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = test_store(&tmp);
        let config = r"
repos:
  - repo: local
    hooks:
      - id: list
        name: list
        entry: echo
        language: system
        types: [python]
";
        let ctx = context(
            config,
            &["a.py", "b.js", "sub/c.py"],
            tmp.path().to_path_buf(),
        );
        let results = run_hooks(&store, &ctx).await.expect("run");

        assert_eq!(results.len(), 1);
        let result = &results[0];
        assert!(result.success);
        assert_eq!(result.files, vec!["a.py", "sub/c.py"]);
        assert!(result.output.contains("a.py"));
        assert!(result.output.contains("sub/c.py"));
        assert!(!result.output.contains("b.js"));
    }

    #[tokio::test]
    async fn meta_hooks_resolve_from_the_builtin_registry() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = test_store(&tmp);
        let config = r"
repos:
  - repo: meta
    hooks:
      - id: check-yaml
        entry: echo
        name: overridden
";
        let ctx = context(config, &["a.yaml"], tmp.path().to_path_buf());
        let results = run_hooks(&store, &ctx).await.expect("run");

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].hook.name, "overridden");
        assert_eq!(results[0].files, vec!["a.yaml"]);

        let config = r"
repos:
  - repo: meta
    hooks:
      - id: not-a-real-meta-hook
";
        let ctx = context(config, &[], tmp.path().to_path_buf());
        let err = run_hooks(&store, &ctx).await.expect_err("unknown meta hook");
        assert!(format!("{err:#}").contains("Unknown meta hook"));
    }
}
