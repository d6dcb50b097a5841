use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, trace};

use crate::config::Language;
use crate::env_state::EnvState;
use crate::hook::Hook;
use crate::store::Store;

mod conda;
mod golang;
mod node;
mod python;
mod ruby;
mod rust;

static CONDA: conda::Conda = conda::Conda;
static GOLANG: golang::Golang = golang::Golang;
static NODE: node::Node = node::Node;
static PYTHON: python::Python = python::Python;
static RUBY: ruby::Ruby = ruby::Ruby;
static RUST: rust::Rust = rust::Rust;
static TRIVIAL: Trivial = Trivial;

/// What a language provisioner gets to work with.
pub(crate) struct SetupContext<'a> {
    pub store: &'a Store,
    pub version: &'a str,
    pub env_path: &'a Path,
    pub repo_path: Option<&'a Path>,
    pub additional_deps: &'a [String],
}

/// Per-language environment provisioning.
///
/// Every capability may be a no-op for languages that run directly
/// (`system`, `script`, `fail`, `pygrep`, the docker family, and anything we
/// do not recognize).
trait LanguageImpl {
    /// The environment directory name for `version`, or `None` when the
    /// language runs without an environment.
    fn environment_dir(&self, version: &str) -> Option<String>;

    /// Create or reuse the environment at `ctx.env_path` and install the
    /// declared dependencies into it.
    async fn setup(&self, ctx: &SetupContext<'_>) -> Result<()>;

    /// Whether an existing environment is usable.
    async fn is_healthy(&self, env_path: &Path, version: &str) -> bool;

    /// Variables to inject when invoking a hook from this environment.
    fn environment_variables(&self, env_path: &Path) -> Vec<(String, OsString)>;
}

/// Languages that run directly with no provisioned environment.
struct Trivial;

impl LanguageImpl for Trivial {
    fn environment_dir(&self, _version: &str) -> Option<String> {
        None
    }

    async fn setup(&self, _ctx: &SetupContext<'_>) -> Result<()> {
        Ok(())
    }

    async fn is_healthy(&self, _env_path: &Path, _version: &str) -> bool {
        true
    }

    fn environment_variables(&self, _env_path: &Path) -> Vec<(String, OsString)> {
        Vec::new()
    }
}

macro_rules! dispatch {
    ($language:expr, $method:ident ( $($arg:expr),* )) => {
        match $language {
            Language::Conda => CONDA.$method($($arg),*),
            Language::Golang => GOLANG.$method($($arg),*),
            Language::Node => NODE.$method($($arg),*),
            Language::Python => PYTHON.$method($($arg),*),
            Language::Ruby => RUBY.$method($($arg),*),
            Language::Rust => RUST.$method($($arg),*),
            _ => TRIVIAL.$method($($arg),*),
        }
    };
}

// Async methods need the await inside each arm: the per-language futures are
// distinct types.
macro_rules! dispatch_async {
    ($language:expr, $method:ident ( $($arg:expr),* )) => {
        match $language {
            Language::Conda => CONDA.$method($($arg),*).await,
            Language::Golang => GOLANG.$method($($arg),*).await,
            Language::Node => NODE.$method($($arg),*).await,
            Language::Python => PYTHON.$method($($arg),*).await,
            Language::Ruby => RUBY.$method($($arg),*).await,
            Language::Rust => RUST.$method($($arg),*).await,
            _ => TRIVIAL.$method($($arg),*).await,
        }
    };
}

impl Language {
    /// The environment directory name for this language, or `None` when
    /// hooks run directly.
    pub(crate) fn environment_dir(&self, version: &str) -> Option<String> {
        dispatch!(self, environment_dir(version))
    }

    pub(crate) async fn is_healthy(&self, env_path: &Path, version: &str) -> bool {
        dispatch_async!(self, is_healthy(env_path, version))
    }

    pub(crate) fn environment_variables(&self, env_path: &Path) -> Vec<(String, OsString)> {
        dispatch!(self, environment_variables(env_path))
    }

    async fn run_setup(&self, ctx: &SetupContext<'_>) -> Result<()> {
        dispatch_async!(self, setup(ctx))
    }
}

/// Normalize a requested version for use in an environment directory name.
fn version_label(version: &str) -> &str {
    if version.is_empty() { "default" } else { version }
}

/// The executables directory of an environment.
pub(crate) fn bin_dir(env_path: &Path) -> PathBuf {
    if cfg!(windows) {
        env_path.join("Scripts")
    } else {
        env_path.join("bin")
    }
}

/// `PATH` with `bin` prepended to the caller's search path.
pub(crate) fn prefixed_path(bin: &Path) -> OsString {
    std::env::join_paths(
        std::iter::once(bin.to_path_buf()).chain(
            peck_consts::env_vars::EnvVars::var_os(peck_consts::env_vars::EnvVars::PATH)
                .as_ref()
                .iter()
                .flat_map(std::env::split_paths),
        ),
    )
    .unwrap_or_else(|_| bin.as_os_str().to_os_string())
}

/// Where a hook's environment lives: inside the cloned working tree for
/// remote hooks, under the store for local and meta hooks.
fn environment_root(hook: &Hook, store: &Store) -> PathBuf {
    match hook.repo_path() {
        Some(path) => path.to_path_buf(),
        None => store.path().join("local"),
    }
}

/// Provision the environment for `hook`, once per process.
///
/// Concurrent callers for the same environment coordinate through the global
/// environment-state registry: the first claims the install, the rest wait
/// for it to finish. Returns `None` for languages that run directly.
pub(crate) async fn ensure_environment(hook: &Hook, store: &Store) -> Result<Option<PathBuf>> {
    let Some(env_dir) = hook.language.environment_dir(&hook.language_version) else {
        return Ok(None);
    };

    let env_path = environment_root(hook, store).join(env_dir);
    let key = hook.env_key(&env_path);
    let state = EnvState::global();

    if !state.mark_installing(&key) {
        if state.is_initialized(&key) || state.wait_initialized(&key).await {
            trace!(%key, "Reusing environment initialized by a peer");
            return Ok(Some(env_path));
        }
        anyhow::bail!(
            "Environment installation failed in a concurrent task for hook `{}`",
            hook.id
        );
    }

    let ctx = SetupContext {
        store,
        version: &hook.language_version,
        env_path: &env_path,
        repo_path: hook.repo_path(),
        additional_deps: &hook.additional_dependencies,
    };

    if env_path.is_dir() {
        if hook
            .language
            .is_healthy(&env_path, &hook.language_version)
            .await
        {
            debug!(env = %env_path.display(), "Environment already healthy");
            state.mark_initialized(&key);
            return Ok(Some(env_path));
        }
        // An unhealthy environment is rebuilt from scratch.
        if let Err(err) = fs_err::tokio::remove_dir_all(&env_path).await {
            state.clear_installing(&key);
            return Err(err).with_context(|| {
                format!("Failed to remove unhealthy environment `{}`", env_path.display())
            });
        }
    }

    debug!(hook = %hook.id, env = %env_path.display(), "Provisioning environment");
    match hook.language.run_setup(&ctx).await {
        Ok(()) => {
            state.mark_initialized(&key);
            Ok(Some(env_path))
        }
        Err(err) => {
            state.clear_installing(&key);
            Err(err).with_context(|| {
                format!(
                    "Failed to provision `{}` environment for hook `{}`",
                    hook.language, hook.id
                )
            })
        }
    }
}

/// Delete and re-create an environment.
pub(crate) async fn rebuild_environment(hook: &Hook, store: &Store) -> Result<Option<PathBuf>> {
    let Some(env_dir) = hook.language.environment_dir(&hook.language_version) else {
        return Ok(None);
    };
    let env_path = environment_root(hook, store).join(env_dir);
    if env_path.is_dir() {
        fs_err::tokio::remove_dir_all(&env_path)
            .await
            .with_context(|| format!("Failed to remove environment `{}`", env_path.display()))?;
    }
    EnvState::global().clear_installing(&hook.env_key(&env_path));

    let ctx = SetupContext {
        store,
        version: &hook.language_version,
        env_path: &env_path,
        repo_path: hook.repo_path(),
        additional_deps: &hook.additional_dependencies,
    };
    hook.language.run_setup(&ctx).await?;
    EnvState::global().mark_initialized(&hook.env_key(&env_path));
    Ok(Some(env_path))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::config::{Config, Language, ManifestHook};
    use crate::hook::{RepoSource, from_manifest_hook};
    use crate::store::Store;

    use super::{ensure_environment, rebuild_environment};

    #[tokio::test]
    async fn direct_languages_have_no_environment() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = Store::from_path(tmp.path()).expect("store");

        let config: Config = serde_yaml::from_str("repos: []").expect("config");
        let manifest = ManifestHook {
            id: "h".to_string(),
            name: "h".to_string(),
            entry: "true".to_string(),
            language: Language::System,
            options: crate::config::HookOptions::default(),
        };
        let hook = from_manifest_hook(manifest, &config, Arc::new(RepoSource::Local), 0);

        assert_eq!(ensure_environment(&hook, &store).await.expect("ensure"), None);
        assert_eq!(rebuild_environment(&hook, &store).await.expect("rebuild"), None);
    }

    #[test]
    fn environment_dir_names() {
        assert_eq!(
            Language::Python.environment_dir("3.12"),
            Some("py_env-3.12".to_string())
        );
        assert_eq!(
            Language::Python.environment_dir(""),
            Some("py_env-default".to_string())
        );
        assert_eq!(
            Language::Node.environment_dir("20"),
            Some("node_env-20".to_string())
        );
        assert_eq!(
            Language::Golang.environment_dir("1.22"),
            Some("goenv-1.22".to_string())
        );

        // Languages that run directly have no environment directory.
        for language in [
            Language::System,
            Language::Script,
            Language::Fail,
            Language::Pygrep,
            Language::Docker,
            Language::DockerImage,
            Language::Other("cobol".to_string()),
        ] {
            assert_eq!(language.environment_dir("1.0"), None, "{language}");
        }
    }
}
