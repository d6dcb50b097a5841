pub mod env_vars;

pub const CONFIG_FILE: &str = ".pre-commit-config.yaml";
pub const ALT_CONFIG_FILE: &str = ".pre-commit-config.yml";
pub const MANIFEST_FILE: &str = ".pre-commit-hooks.yaml";
pub const ALT_MANIFEST_FILE: &str = ".pre-commit-hooks.yml";

/// Name of the SQLite index file inside the cache root.
pub const DB_FILE: &str = "db.db";

/// Name of the lock sentinel file inside the cache root.
pub const LOCK_FILE: &str = ".lock";

/// Prefix of working-tree directory names under the cache root.
pub const REPO_DIR_PREFIX: &str = "repo";
