use std::ffi::OsString;
use std::path::Path;

use anyhow::{Context, Result};

use peck_consts::env_vars::EnvVars;

use crate::process::Cmd;

use super::{LanguageImpl, SetupContext, version_label};

#[derive(Debug, Copy, Clone)]
pub(crate) struct Conda;

impl LanguageImpl for Conda {
    fn environment_dir(&self, version: &str) -> Option<String> {
        Some(format!("conda-{}", version_label(version)))
    }

    async fn setup(&self, ctx: &SetupContext<'_>) -> Result<()> {
        // Hook repos for this language ship an environment.yml; fall back to
        // a bare environment when they do not.
        let env_file = ctx.repo_path.map(|repo| repo.join("environment.yml"));
        match env_file.filter(|path| path.is_file()) {
            Some(env_file) => {
                Cmd::new("conda", "conda env create")
                    .arg("env")
                    .arg("create")
                    .arg("--yes")
                    .arg("-p")
                    .arg(ctx.env_path)
                    .arg("-f")
                    .arg(env_file)
                    .check(true)
                    .output()
                    .await
                    .context("Failed to create conda environment")?;
            }
            None => {
                Cmd::new("conda", "conda create")
                    .arg("create")
                    .arg("--yes")
                    .arg("-p")
                    .arg(ctx.env_path)
                    .check(true)
                    .output()
                    .await
                    .context("Failed to create conda environment")?;
            }
        }

        if !ctx.additional_deps.is_empty() {
            Cmd::new("conda", "conda install")
                .arg("install")
                .arg("--yes")
                .arg("-p")
                .arg(ctx.env_path)
                .args(ctx.additional_deps)
                .check(true)
                .output()
                .await
                .context("Failed to install conda dependencies")?;
        }

        Ok(())
    }

    async fn is_healthy(&self, env_path: &Path, _version: &str) -> bool {
        env_path.join("conda-meta").is_dir()
    }

    fn environment_variables(&self, env_path: &Path) -> Vec<(String, OsString)> {
        vec![(
            EnvVars::CONDA_PREFIX.to_string(),
            env_path.as_os_str().to_os_string(),
        )]
    }
}
