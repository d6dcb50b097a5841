use std::ffi::OsString;
use std::path::Path;

use anyhow::{Context, Result};

use peck_consts::env_vars::EnvVars;

use crate::process::Cmd;

use super::{LanguageImpl, SetupContext, bin_dir, prefixed_path, version_label};

#[derive(Debug, Copy, Clone)]
pub(crate) struct Rust;

impl LanguageImpl for Rust {
    fn environment_dir(&self, version: &str) -> Option<String> {
        Some(format!("rustenv-{}", version_label(version)))
    }

    async fn setup(&self, ctx: &SetupContext<'_>) -> Result<()> {
        fs_err::tokio::create_dir_all(ctx.env_path).await?;

        if let Some(repo) = ctx.repo_path {
            if repo.join("Cargo.toml").is_file() {
                Cmd::new("cargo", "cargo install hook repo")
                    .arg("install")
                    .arg("--quiet")
                    .arg("--path")
                    .arg(repo)
                    .arg("--root")
                    .arg(ctx.env_path)
                    .check(true)
                    .output()
                    .await
                    .context("Failed to build hook repository")?;
            }
        }

        // Additional dependencies are crate names with optional
        // `name:version` pins, following the cli-dep convention.
        for dep in ctx.additional_deps {
            let mut cmd = Cmd::new("cargo", "cargo install dependency");
            cmd.arg("install").arg("--quiet");
            match dep.split_once(':') {
                Some((name, version)) => {
                    cmd.arg(name).arg("--version").arg(version);
                }
                None => {
                    cmd.arg(dep);
                }
            }
            cmd.arg("--root")
                .arg(ctx.env_path)
                .check(true)
                .output()
                .await
                .with_context(|| format!("Failed to install `{dep}`"))?;
        }

        Ok(())
    }

    async fn is_healthy(&self, env_path: &Path, _version: &str) -> bool {
        if !env_path.is_dir() {
            return false;
        }
        Cmd::new("cargo", "cargo --version")
            .arg("--version")
            .check(false)
            .output()
            .await
            .is_ok_and(|output| output.status.success())
    }

    fn environment_variables(&self, env_path: &Path) -> Vec<(String, OsString)> {
        vec![(EnvVars::PATH.to_string(), prefixed_path(&bin_dir(env_path)))]
    }
}
