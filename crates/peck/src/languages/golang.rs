use std::ffi::OsString;
use std::path::Path;

use anyhow::{Context, Result};

use peck_consts::env_vars::EnvVars;

use crate::process::Cmd;

use super::{LanguageImpl, SetupContext, prefixed_path, version_label};

#[derive(Debug, Copy, Clone)]
pub(crate) struct Golang;

fn go_bin(env_path: &Path) -> std::path::PathBuf {
    env_path.join("bin")
}

impl LanguageImpl for Golang {
    fn environment_dir(&self, version: &str) -> Option<String> {
        Some(format!("goenv-{}", version_label(version)))
    }

    async fn setup(&self, ctx: &SetupContext<'_>) -> Result<()> {
        fs_err::tokio::create_dir_all(ctx.env_path).await?;

        // Build the hook repository's commands into the environment's GOPATH.
        if let Some(repo) = ctx.repo_path {
            if repo.join("go.mod").is_file() {
                Cmd::new("go", "go install hook repo")
                    .current_dir(repo)
                    .arg("install")
                    .arg("./...")
                    .env(EnvVars::GOPATH, ctx.env_path)
                    .env(EnvVars::GOBIN, go_bin(ctx.env_path))
                    .check(true)
                    .output()
                    .await
                    .context("Failed to build hook repository")?;
            }
        }

        // Additional dependencies are module paths, optionally versioned.
        for dep in ctx.additional_deps {
            let target = if dep.contains('@') {
                dep.clone()
            } else {
                format!("{dep}@latest")
            };
            Cmd::new("go", "go install dependency")
                .arg("install")
                .arg(&target)
                .env(EnvVars::GOPATH, ctx.env_path)
                .env(EnvVars::GOBIN, go_bin(ctx.env_path))
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
        Cmd::new("go", "go version")
            .arg("version")
            .check(false)
            .output()
            .await
            .is_ok_and(|output| output.status.success())
    }

    fn environment_variables(&self, env_path: &Path) -> Vec<(String, OsString)> {
        vec![
            (
                EnvVars::GOPATH.to_string(),
                env_path.as_os_str().to_os_string(),
            ),
            (
                EnvVars::GOBIN.to_string(),
                go_bin(env_path).into_os_string(),
            ),
            (EnvVars::PATH.to_string(), prefixed_path(&go_bin(env_path))),
        ]
    }
}
