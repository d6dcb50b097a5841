use std::ffi::OsString;
use std::path::Path;

use anyhow::{Context, Result};

use peck_consts::env_vars::EnvVars;

use crate::process::Cmd;

use super::{LanguageImpl, SetupContext, bin_dir, prefixed_path, version_label};

#[derive(Debug, Copy, Clone)]
pub(crate) struct Node;

impl LanguageImpl for Node {
    fn environment_dir(&self, version: &str) -> Option<String> {
        Some(format!("node_env-{}", version_label(version)))
    }

    async fn setup(&self, ctx: &SetupContext<'_>) -> Result<()> {
        fs_err::tokio::create_dir_all(ctx.env_path).await?;

        // `npm install --global` with a prefix override lays binaries out
        // under `<env>/bin` the same way a real node prefix would.
        let mut targets: Vec<OsString> = Vec::new();
        if let Some(repo) = ctx.repo_path {
            if repo.join("package.json").is_file() {
                targets.push(repo.as_os_str().to_os_string());
            }
        }
        targets.extend(ctx.additional_deps.iter().map(OsString::from));

        if !targets.is_empty() {
            Cmd::new("npm", "npm install")
                .arg("install")
                .arg("--global")
                .arg("--no-audit")
                .arg("--no-fund")
                .args(&targets)
                .env(EnvVars::NPM_CONFIG_PREFIX, ctx.env_path)
                .check(true)
                .output()
                .await
                .context("Failed to install node dependencies")?;
        }

        Ok(())
    }

    async fn is_healthy(&self, env_path: &Path, _version: &str) -> bool {
        if !env_path.is_dir() {
            return false;
        }
        Cmd::new("node", "node --version")
            .arg("--version")
            .check(false)
            .output()
            .await
            .is_ok_and(|output| output.status.success())
    }

    fn environment_variables(&self, env_path: &Path) -> Vec<(String, OsString)> {
        vec![
            (
                EnvVars::NODE_VIRTUAL_ENV.to_string(),
                env_path.as_os_str().to_os_string(),
            ),
            (
                EnvVars::NPM_CONFIG_PREFIX.to_string(),
                env_path.as_os_str().to_os_string(),
            ),
            (EnvVars::PATH.to_string(), prefixed_path(&bin_dir(env_path))),
        ]
    }
}
