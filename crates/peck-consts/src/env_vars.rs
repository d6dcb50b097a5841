use std::ffi::OsString;

pub struct EnvVars;

impl EnvVars {
    pub const PATH: &'static str = "PATH";
    pub const HOME: &'static str = "HOME";
    pub const USERPROFILE: &'static str = "USERPROFILE";
    pub const CI: &'static str = "CI";

    // Git related
    pub const GIT_DIR: &'static str = "GIT_DIR";
    pub const GIT_WORK_TREE: &'static str = "GIT_WORK_TREE";
    pub const GIT_TERMINAL_PROMPT: &'static str = "GIT_TERMINAL_PROMPT";

    pub const SKIP: &'static str = "SKIP";

    // Cache root overrides, compatible with pre-commit
    pub const PRE_COMMIT_HOME: &'static str = "PRE_COMMIT_HOME";
    pub const XDG_CACHE_HOME: &'static str = "XDG_CACHE_HOME";

    // peck specific environment variables
    pub const PECK_NO_CONCURRENCY: &'static str = "PECK_NO_CONCURRENCY";
    pub const PECK_TIMING_DEBUG: &'static str = "PECK_TIMING_DEBUG";

    // Python related
    pub const VIRTUAL_ENV: &'static str = "VIRTUAL_ENV";
    pub const PYTHONHOME: &'static str = "PYTHONHOME";

    // Node related
    pub const NODE_VIRTUAL_ENV: &'static str = "NODE_VIRTUAL_ENV";
    pub const NODE_PATH: &'static str = "NODE_PATH";
    pub const NPM_CONFIG_PREFIX: &'static str = "NPM_CONFIG_PREFIX";

    // Go related
    pub const GOPATH: &'static str = "GOPATH";
    pub const GOBIN: &'static str = "GOBIN";

    // Ruby related
    pub const GEM_HOME: &'static str = "GEM_HOME";
    pub const GEM_PATH: &'static str = "GEM_PATH";

    // Rust related
    pub const CARGO_HOME: &'static str = "CARGO_HOME";

    // Conda related
    pub const CONDA_PREFIX: &'static str = "CONDA_PREFIX";
}

impl EnvVars {
    pub fn var_os(name: &str) -> Option<OsString> {
        #[allow(clippy::disallowed_methods)]
        std::env::var_os(name)
    }

    pub fn is_set(name: &str) -> bool {
        Self::var_os(name).is_some()
    }

    pub fn var(name: &str) -> Result<String, std::env::VarError> {
        match Self::var_os(name) {
            Some(s) => s.into_string().map_err(std::env::VarError::NotUnicode),
            None => Err(std::env::VarError::NotPresent),
        }
    }
}
