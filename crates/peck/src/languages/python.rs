use std::ffi::OsString;
use std::path::Path;

use anyhow::{Context, Result};

use peck_consts::env_vars::EnvVars;

use crate::process::Cmd;

use super::{LanguageImpl, SetupContext, bin_dir, prefixed_path, version_label};

#[derive(Debug, Copy, Clone)]
pub(crate) struct Python;

/// Pick the interpreter used to create the virtualenv.
///
/// A requested version like `3.12` maps to a `python3.12` executable on
/// PATH; everything else falls back to `python3`.
fn base_interpreter(version: &str) -> String {
    if version.is_empty() {
        return "python3".to_string();
    }
    let candidate = if version.starts_with("python") {
        version.to_string()
    } else {
        format!("python{version}")
    };
    if which::which(&candidate).is_ok() {
        candidate
    } else {
        "python3".to_string()
    }
}

fn interpreter(env_path: &Path) -> std::path::PathBuf {
    bin_dir(env_path).join(if cfg!(windows) { "python.exe" } else { "python" })
}

impl LanguageImpl for Python {
    fn environment_dir(&self, version: &str) -> Option<String> {
        Some(format!("py_env-{}", version_label(version)))
    }

    async fn setup(&self, ctx: &SetupContext<'_>) -> Result<()> {
        let base = base_interpreter(ctx.version);
        Cmd::new(&base, "create virtualenv")
            .arg("-m")
            .arg("venv")
            .arg("--clear")
            .arg(ctx.env_path)
            .check(true)
            .output()
            .await
            .context("Failed to create virtualenv")?;

        let python = interpreter(ctx.env_path);

        // Install the hook repository itself when it is an installable
        // project, then the declared dependencies.
        if let Some(repo) = ctx.repo_path {
            if repo.join("pyproject.toml").is_file() || repo.join("setup.py").is_file() {
                Cmd::new(&python, "install hook project")
                    .arg("-m")
                    .arg("pip")
                    .arg("install")
                    .arg("--quiet")
                    .arg(repo)
                    .env(EnvVars::VIRTUAL_ENV, ctx.env_path)
                    .env_remove(EnvVars::PYTHONHOME)
                    .check(true)
                    .output()
                    .await
                    .context("Failed to install hook project")?;
            }
        }

        if !ctx.additional_deps.is_empty() {
            Cmd::new(&python, "install additional dependencies")
                .arg("-m")
                .arg("pip")
                .arg("install")
                .arg("--quiet")
                .args(ctx.additional_deps)
                .env(EnvVars::VIRTUAL_ENV, ctx.env_path)
                .env_remove(EnvVars::PYTHONHOME)
                .check(true)
                .output()
                .await
                .context("Failed to install additional dependencies")?;
        }

        Ok(())
    }

    async fn is_healthy(&self, env_path: &Path, _version: &str) -> bool {
        let python = interpreter(env_path);
        if !python.is_file() {
            return false;
        }
        Cmd::new(&python, "python --version")
            .arg("--version")
            .check(false)
            .output()
            .await
            .is_ok_and(|output| output.status.success())
    }

    fn environment_variables(&self, env_path: &Path) -> Vec<(String, OsString)> {
        vec![
            (
                EnvVars::VIRTUAL_ENV.to_string(),
                env_path.as_os_str().to_os_string(),
            ),
            (EnvVars::PATH.to_string(), prefixed_path(&bin_dir(env_path))),
        ]
    }
}
