use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{Config, ConfigHook, FilePattern, Language, ManifestHook, Stage};

/// Where a hook's implementation comes from.
#[derive(Debug, Clone)]
pub(crate) enum RepoSource {
    /// A cloned working tree at a pinned revision.
    Remote {
        url: String,
        rev: String,
        path: PathBuf,
    },
    /// Tools on the caller's PATH or within the user's repository.
    Local,
    /// Built-in checks shipped with the runner.
    Meta,
}

impl RepoSource {
    pub(crate) fn path(&self) -> Option<&Path> {
        match self {
            RepoSource::Remote { path, .. } => Some(path),
            _ => None,
        }
    }

    /// The repository url as it appears in environment keys.
    pub(crate) fn url(&self) -> &str {
        match self {
            RepoSource::Remote { url, .. } => url,
            RepoSource::Local => "local",
            RepoSource::Meta => "meta",
        }
    }
}

impl Display for RepoSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RepoSource::Remote { url, rev, .. } => write!(f, "{url}@{rev}"),
            RepoSource::Local => f.write_str("local"),
            RepoSource::Meta => f.write_str("meta"),
        }
    }
}

/// A fully resolved hook: provider manifest (or registry) metadata merged
/// with the user's configuration entry and project-wide defaults.
#[derive(Debug, Clone)]
pub(crate) struct Hook {
    pub repo: Arc<RepoSource>,
    /// The position of the hook in the overall configuration order.
    pub idx: usize,
    pub id: String,
    pub name: String,
    pub entry: String,
    pub language: Language,
    pub files: Option<FilePattern>,
    pub exclude: Option<FilePattern>,
    pub types: Vec<String>,
    pub types_or: Vec<String>,
    pub exclude_types: Vec<String>,
    pub additional_dependencies: Vec<String>,
    pub args: Vec<String>,
    pub always_run: bool,
    /// Tri-state: `None` falls back to the per-language default at
    /// command-build time. Never collapsed to a plain bool.
    pub pass_filenames: Option<bool>,
    pub description: Option<String>,
    /// Requested language version; empty means "default".
    pub language_version: String,
    pub log_file: Option<String>,
    pub require_serial: bool,
    /// `None` means the hook runs at every stage.
    pub stages: Option<Vec<Stage>>,
    pub verbose: bool,
}

impl Display for Hook {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if f.alternate() {
            write!(f, "{}:{}", self.repo, self.id)
        } else {
            f.write_str(&self.id)
        }
    }
}

impl Hook {
    pub(crate) fn repo_path(&self) -> Option<&Path> {
        self.repo.path()
    }

    pub(crate) fn runs_at(&self, stage: Stage) -> bool {
        match &self.stages {
            None => true,
            Some(stages) => stages.contains(&stage),
        }
    }

    /// The key identifying this hook's environment in the process-global
    /// environment-state registry.
    pub(crate) fn env_key(&self, env_path: &Path) -> String {
        format!(
            "{}-{}-{}",
            self.language.as_str().to_lowercase(),
            self.repo.url(),
            env_path.display(),
        )
    }
}

/// Merge a manifest (or registry) base with the user configuration entry.
///
/// The base supplies every field; override fields apply only when set and
/// non-empty. Applying an all-empty override yields the base unchanged, and
/// applying the same override twice is idempotent.
pub(crate) fn resolve_hook(
    mut base: ManifestHook,
    user: &ConfigHook,
    config: &Config,
    repo: Arc<RepoSource>,
    idx: usize,
) -> Hook {
    if let Some(name) = &user.name {
        if !name.is_empty() {
            base.name.clone_from(name);
        }
    }
    if let Some(entry) = &user.entry {
        if !entry.is_empty() {
            base.entry.clone_from(entry);
        }
    }
    if let Some(language) = &user.language {
        base.language.clone_from(language);
    }
    base.options.update(&user.options);

    from_manifest_hook(base, config, repo, idx)
}

/// Build a resolved hook straight from a manifest definition (local repos) or
/// a merged base, applying document-level defaults.
pub(crate) fn from_manifest_hook(
    hook: ManifestHook,
    config: &Config,
    repo: Arc<RepoSource>,
    idx: usize,
) -> Hook {
    let options = hook.options;

    let language_version = options
        .language_version
        .or_else(|| {
            config
                .default_language_version
                .as_ref()
                .and_then(|versions| versions.get(&hook.language).cloned())
        })
        .unwrap_or_default();

    let stages = options.stages.or_else(|| config.default_stages.clone());

    Hook {
        repo,
        idx,
        id: hook.id,
        name: hook.name,
        entry: hook.entry,
        language: hook.language,
        files: options.files,
        exclude: options.exclude,
        types: options.types.unwrap_or_default(),
        types_or: options.types_or.unwrap_or_default(),
        exclude_types: options.exclude_types.unwrap_or_default(),
        additional_dependencies: options.additional_dependencies.unwrap_or_default(),
        args: options.args.unwrap_or_default(),
        always_run: options.always_run.unwrap_or(false),
        pass_filenames: options.pass_filenames,
        description: options.description,
        language_version,
        log_file: options.log_file,
        require_serial: options.require_serial.unwrap_or(false),
        stages,
        verbose: options.verbose.unwrap_or(false),
    }
}
