use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::{Component, Path, PathBuf};

use fancy_regex::Regex;
use itertools::Itertools;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use peck_consts::{ALT_MANIFEST_FILE, MANIFEST_FILE};

use crate::fs::{CWD, Simplified};
use crate::warnings::warn_user;

/// A compiled include/exclude pattern from the configuration.
#[derive(Debug, Clone)]
pub(crate) struct FilePattern(Regex);

impl FilePattern {
    pub(crate) fn new(pattern: &str) -> Result<Self, Box<fancy_regex::Error>> {
        Ok(Self(Regex::new(pattern)?))
    }

    pub(crate) fn is_match(&self, s: &str) -> bool {
        self.0.is_match(s).unwrap_or(false)
    }

    pub(crate) fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for FilePattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0.as_str())
    }
}

impl<'de> Deserialize<'de> for FilePattern {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let pattern = String::deserialize(deserializer)?;
        FilePattern::new(&pattern)
            .map_err(|e| serde::de::Error::custom(format!("invalid regex `{pattern}`: {e}")))
    }
}

/// The language tag of a hook.
///
/// Unrecognized tags are preserved as [`Language::Other`]; the command
/// builder treats them like `system`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Language {
    Conda,
    Coursier,
    Dart,
    Docker,
    DockerImage,
    Dotnet,
    Fail,
    Golang,
    Haskell,
    Julia,
    Lua,
    Node,
    Perl,
    Python,
    R,
    Ruby,
    Rust,
    Swift,
    Pygrep,
    Script,
    System,
    Other(String),
}

impl Language {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Conda => "conda",
            Self::Coursier => "coursier",
            Self::Dart => "dart",
            Self::Docker => "docker",
            Self::DockerImage => "docker_image",
            Self::Dotnet => "dotnet",
            Self::Fail => "fail",
            Self::Golang => "golang",
            Self::Haskell => "haskell",
            Self::Julia => "julia",
            Self::Lua => "lua",
            Self::Node => "node",
            Self::Perl => "perl",
            Self::Python => "python",
            Self::R => "r",
            Self::Ruby => "ruby",
            Self::Rust => "rust",
            Self::Swift => "swift",
            Self::Pygrep => "pygrep",
            Self::Script => "script",
            Self::System => "system",
            Self::Other(tag) => tag,
        }
    }

    fn from_tag(tag: &str) -> Self {
        match tag {
            "conda" => Self::Conda,
            "coursier" => Self::Coursier,
            "dart" => Self::Dart,
            "docker" => Self::Docker,
            "docker_image" => Self::DockerImage,
            "dotnet" => Self::Dotnet,
            "fail" => Self::Fail,
            "golang" => Self::Golang,
            "haskell" => Self::Haskell,
            "julia" => Self::Julia,
            "lua" => Self::Lua,
            "node" => Self::Node,
            "perl" => Self::Perl,
            // `python3` is dispatched identically to `python`.
            "python" | "python3" => Self::Python,
            "r" => Self::R,
            "ruby" => Self::Ruby,
            "rust" => Self::Rust,
            "swift" => Self::Swift,
            "pygrep" => Self::Pygrep,
            "script" => Self::Script,
            "system" => Self::System,
            other => Self::Other(other.to_string()),
        }
    }
}

impl Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Language {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let tag = String::deserialize(deserializer)?;
        Ok(Language::from_tag(&tag))
    }
}

impl Serialize for Language {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

/// A named phase of the git lifecycle that gates which hooks run.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Deserialize, Serialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub(crate) enum Stage {
    Manual,
    CommitMsg,
    PostCheckout,
    PostCommit,
    PostMerge,
    PostRewrite,
    #[default]
    #[serde(alias = "commit")]
    PreCommit,
    #[serde(alias = "merge-commit")]
    PreMergeCommit,
    #[serde(alias = "push")]
    PrePush,
    PreRebase,
    PrepareCommitMsg,
}

impl Stage {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Manual => "manual",
            Self::CommitMsg => "commit-msg",
            Self::PostCheckout => "post-checkout",
            Self::PostCommit => "post-commit",
            Self::PostMerge => "post-merge",
            Self::PostRewrite => "post-rewrite",
            Self::PreCommit => "pre-commit",
            Self::PreMergeCommit => "pre-merge-commit",
            Self::PrePush => "pre-push",
            Self::PreRebase => "pre-rebase",
            Self::PrepareCommitMsg => "prepare-commit-msg",
        }
    }
}

impl Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Common hook options.
///
/// Every field is optional so the same struct serves as a manifest base and a
/// configuration override; the merge applies override fields only when set.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct HookOptions {
    /// The pattern of files to run on.
    pub files: Option<FilePattern>,
    /// Exclude files that were matched by `files`.
    pub exclude: Option<FilePattern>,
    /// File types to run on, all required (AND).
    pub types: Option<Vec<String>>,
    /// File types to run on, any sufficient (OR).
    pub types_or: Option<Vec<String>>,
    /// File types to exclude.
    pub exclude_types: Option<Vec<String>>,
    /// Extra dependencies installed into the hook environment.
    pub additional_dependencies: Option<Vec<String>>,
    /// Additional arguments to pass to the hook.
    pub args: Option<Vec<String>>,
    /// Run even if there are no matching files.
    pub always_run: Option<bool>,
    /// Append matched filenames to the command line.
    ///
    /// Tri-state: unset falls back to a per-language default.
    pub pass_filenames: Option<bool>,
    /// A description of the hook. For metadata only.
    pub description: Option<String>,
    /// Run the hook on a specific version of the language.
    pub language_version: Option<String>,
    /// Write the output of the hook to a file when it fails.
    pub log_file: Option<String>,
    /// Execute using a single process instead of in parallel.
    pub require_serial: Option<bool>,
    /// Git stages the hook runs for.
    pub stages: Option<Vec<Stage>>,
    /// Print the output of the hook even if it passes.
    pub verbose: Option<bool>,
    /// The minimum runner version required by this hook.
    pub minimum_pre_commit_version: Option<String>,
    #[serde(flatten)]
    pub _unused_keys: BTreeMap<String, serde_json::Value>,
}

impl HookOptions {
    /// Apply `other` on top of `self`, field by field, only where `other`
    /// has a value.
    pub fn update(&mut self, other: &Self) {
        macro_rules! update_if_some {
            ($($field:ident),* $(,)?) => {
                $(
                if other.$field.is_some() {
                    self.$field.clone_from(&other.$field);
                }
                )*
            };
        }

        update_if_some!(
            files,
            exclude,
            types,
            types_or,
            exclude_types,
            additional_dependencies,
            args,
            always_run,
            pass_filenames,
            description,
            language_version,
            log_file,
            require_serial,
            stages,
            verbose,
            minimum_pre_commit_version,
        );
    }
}

fn default_language() -> Language {
    Language::System
}

/// A hook definition as it appears in a provider's manifest
/// (`.pre-commit-hooks.yaml`) or in a `local` repo entry.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ManifestHook {
    pub id: String,
    pub name: String,
    pub entry: String,
    /// Defaults to `system`: the entry runs as-is.
    #[serde(default = "default_language")]
    pub language: Language,
    #[serde(flatten)]
    pub options: HookOptions,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
pub(crate) struct Manifest {
    pub hooks: Vec<ManifestHook>,
}

/// A hook invocation in the user configuration.
///
/// All manifest fields are valid here but optional; set fields override the
/// manifest base.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ConfigHook {
    pub id: String,
    pub name: Option<String>,
    pub entry: Option<String>,
    pub language: Option<Language>,
    #[serde(flatten)]
    pub options: HookOptions,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RemoteRepoConfig {
    pub repo: String,
    pub rev: Option<String>,
    pub hooks: Vec<ConfigHook>,
    #[serde(flatten)]
    pub _unused_keys: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct LocalRepoConfig {
    pub hooks: Vec<ManifestHook>,
    #[serde(flatten)]
    pub _unused_keys: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct MetaRepoConfig {
    pub hooks: Vec<ConfigHook>,
    #[serde(flatten)]
    pub _unused_keys: BTreeMap<String, serde_json::Value>,
}

/// A provider entry in the configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "serde_json::Value")]
pub(crate) enum RepoConfig {
    Remote(RemoteRepoConfig),
    Local(LocalRepoConfig),
    Meta(MetaRepoConfig),
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum RepoWireError {
    #[error("missing field `repo`")]
    MissingRepo,

    #[error("`repo` must be a string")]
    RepoNotString,

    #[error("invalid local repo: {0}")]
    InvalidLocal(String),

    #[error("invalid meta repo: {0}")]
    InvalidMeta(String),

    #[error("invalid remote repo: {0}")]
    InvalidRemote(String),
}

impl TryFrom<serde_json::Value> for RepoConfig {
    type Error = RepoWireError;

    fn try_from(wire: serde_json::Value) -> Result<Self, Self::Error> {
        let location = wire
            .get("repo")
            .ok_or(RepoWireError::MissingRepo)?
            .as_str()
            .ok_or(RepoWireError::RepoNotString)?
            .to_string();

        match location.as_str() {
            "local" => LocalRepoConfig::deserialize(wire)
                .map(RepoConfig::Local)
                .map_err(|e| RepoWireError::InvalidLocal(e.to_string())),
            "meta" => MetaRepoConfig::deserialize(wire)
                .map(RepoConfig::Meta)
                .map_err(|e| RepoWireError::InvalidMeta(e.to_string())),
            _ => RemoteRepoConfig::deserialize(wire)
                .map(RepoConfig::Remote)
                .map_err(|e| RepoWireError::InvalidRemote(e.to_string())),
        }
    }
}

impl Display for RepoConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RepoConfig::Remote(repo) => {
                write!(f, "{}@{}", repo.repo, repo.rev.as_deref().unwrap_or(""))
            }
            RepoConfig::Local(_) => f.write_str("local"),
            RepoConfig::Meta(_) => f.write_str("meta"),
        }
    }
}

/// The top-level configuration document.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Config {
    pub repos: Vec<RepoConfig>,
    /// A mapping from language to the default `language_version`.
    pub default_language_version: Option<FxHashMap<Language, String>>,
    /// A configuration-wide default for the stages property of hooks.
    pub default_stages: Option<Vec<Stage>>,
    /// Global file include pattern.
    pub files: Option<FilePattern>,
    /// Global file exclude pattern.
    pub exclude: Option<FilePattern>,
    /// Stop running hooks after the first failure.
    pub fail_fast: Option<bool>,
    /// The minimum runner version required by this configuration.
    pub minimum_pre_commit_version: Option<String>,
    /// Opaque CI service configuration; carried but never interpreted.
    pub ci: Option<serde_json::Value>,

    #[serde(flatten)]
    pub _unused_keys: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Config file is empty: {0}")]
    Empty(String),

    #[error("Config path must not contain `..`: {0}")]
    PathTraversal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to parse `{0}`")]
    Yaml(String, #[source] serde_yaml::Error),

    #[error("repos[{index}]: missing `rev` for repo `{repo}`")]
    MissingRev { index: usize, repo: String },

    #[error("repos[{repo_index}].hooks[{hook_index}]: missing hook `id`")]
    MissingHookId {
        repo_index: usize,
        hook_index: usize,
    },
}

/// Resolve a user-supplied configuration path.
///
/// Paths containing `..` are rejected; relative paths are resolved against
/// the caller's working directory.
pub(crate) fn resolve_config_path(path: &Path) -> Result<PathBuf, Error> {
    if path
        .components()
        .any(|component| matches!(component, Component::ParentDir))
    {
        return Err(Error::PathTraversal(path.display().to_string()));
    }
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(CWD.join(path))
    }
}

/// Read the configuration file from the given path.
pub(crate) fn load_config(path: &Path) -> Result<Config, Error> {
    let content = match fs_err::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::NotFound(path.user_display().to_string()));
        }
        Err(e) => return Err(e.into()),
    };
    if content.trim().is_empty() {
        return Err(Error::Empty(path.user_display().to_string()));
    }

    let config: Config = serde_yaml::from_str(&content)
        .map_err(|e| Error::Yaml(path.user_display().to_string(), e))?;

    validate_config(&config)?;
    Ok(config)
}

/// Structural checks beyond what serde enforces, reported with the offending
/// provider/hook index.
fn validate_config(config: &Config) -> Result<(), Error> {
    for (repo_index, repo) in config.repos.iter().enumerate() {
        match repo {
            RepoConfig::Remote(remote) => {
                if remote.rev.as_deref().is_none_or(str::is_empty) {
                    return Err(Error::MissingRev {
                        index: repo_index,
                        repo: remote.repo.clone(),
                    });
                }
                for (hook_index, hook) in remote.hooks.iter().enumerate() {
                    if hook.id.is_empty() {
                        return Err(Error::MissingHookId {
                            repo_index,
                            hook_index,
                        });
                    }
                }
            }
            RepoConfig::Local(local) => {
                for (hook_index, hook) in local.hooks.iter().enumerate() {
                    if hook.id.is_empty() {
                        return Err(Error::MissingHookId {
                            repo_index,
                            hook_index,
                        });
                    }
                }
            }
            RepoConfig::Meta(meta) => {
                for (hook_index, hook) in meta.hooks.iter().enumerate() {
                    if hook.id.is_empty() {
                        return Err(Error::MissingHookId {
                            repo_index,
                            hook_index,
                        });
                    }
                }
            }
        }
    }
    Ok(())
}

/// Keys we knowingly ignore.
const EXPECTED_UNUSED: &[&str] = &["default_install_hook_types"];

/// Read the configuration file and warn about ignored keys.
pub(crate) fn read_config(path: &Path) -> Result<Config, Error> {
    let config = load_config(path)?;

    let unused = config
        ._unused_keys
        .keys()
        .filter(|key| !EXPECTED_UNUSED.contains(&key.as_str()))
        .map(|key| format!("`{key}`"))
        .join(", ");
    if !unused.is_empty() {
        warn_user!(
            "Ignored unexpected keys in `{}`: {unused}",
            path.user_display()
        );
    }

    Ok(config)
}

/// Read a provider manifest from a working tree, trying the canonical name
/// then the `.yml` alternate.
pub(crate) fn read_manifest_from_tree(tree: &Path) -> Result<Manifest, Error> {
    let path = tree.join(MANIFEST_FILE);
    let path = if path.is_file() {
        path
    } else {
        tree.join(ALT_MANIFEST_FILE)
    };
    read_manifest(&path)
}

/// Read a manifest file from the given path.
pub(crate) fn read_manifest(path: &Path) -> Result<Manifest, Error> {
    let content = match fs_err::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::NotFound(path.user_display().to_string()));
        }
        Err(e) => return Err(e.into()),
    };
    let manifest = serde_yaml::from_str(&content)
        .map_err(|e| Error::Yaml(path.user_display().to_string(), e))?;
    Ok(manifest)
}
