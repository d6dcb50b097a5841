use std::ffi::OsString;
use std::path::Path;

use anyhow::{Context, Result};

use peck_consts::env_vars::EnvVars;

use crate::process::Cmd;

use super::{LanguageImpl, SetupContext, bin_dir, prefixed_path, version_label};

#[derive(Debug, Copy, Clone)]
pub(crate) struct Ruby;

impl LanguageImpl for Ruby {
    fn environment_dir(&self, version: &str) -> Option<String> {
        Some(format!("rbenv-{}", version_label(version)))
    }

    async fn setup(&self, ctx: &SetupContext<'_>) -> Result<()> {
        fs_err::tokio::create_dir_all(ctx.env_path).await?;

        let mut gems: Vec<OsString> = Vec::new();
        if let Some(repo) = ctx.repo_path {
            // A hook repo shipping gemspecs is built and installed from
            // source.
            let has_gemspec = fs_err::read_dir(repo)
                .map(|entries| {
                    entries.filter_map(Result::ok).any(|entry| {
                        entry
                            .path()
                            .extension()
                            .is_some_and(|ext| ext == "gemspec")
                    })
                })
                .unwrap_or(false);
            if has_gemspec {
                Cmd::new("gem", "gem build")
                    .current_dir(repo)
                    .arg("build")
                    .arg("--norc")
                    .args(
                        fs_err::read_dir(repo)?
                            .filter_map(Result::ok)
                            .map(|entry| entry.path())
                            .filter(|path| path.extension().is_some_and(|ext| ext == "gemspec")),
                    )
                    .check(true)
                    .output()
                    .await
                    .context("Failed to build gemspec")?;
                gems.extend(
                    fs_err::read_dir(repo)?
                        .filter_map(Result::ok)
                        .map(|entry| entry.path())
                        .filter(|path| path.extension().is_some_and(|ext| ext == "gem"))
                        .map(|path| path.into_os_string()),
                );
            }
        }
        gems.extend(ctx.additional_deps.iter().map(OsString::from));

        if !gems.is_empty() {
            Cmd::new("gem", "gem install")
                .arg("install")
                .arg("--norc")
                .arg("--no-document")
                .arg("--bindir")
                .arg(bin_dir(ctx.env_path))
                .args(&gems)
                .env(EnvVars::GEM_HOME, ctx.env_path)
                .check(true)
                .output()
                .await
                .context("Failed to install gems")?;
        }

        Ok(())
    }

    async fn is_healthy(&self, env_path: &Path, _version: &str) -> bool {
        if !env_path.is_dir() {
            return false;
        }
        Cmd::new("ruby", "ruby --version")
            .arg("--version")
            .check(false)
            .output()
            .await
            .is_ok_and(|output| output.status.success())
    }

    fn environment_variables(&self, env_path: &Path) -> Vec<(String, OsString)> {
        vec![
            (
                EnvVars::GEM_HOME.to_string(),
                env_path.as_os_str().to_os_string(),
            ),
            (
                EnvVars::GEM_PATH.to_string(),
                env_path.as_os_str().to_os_string(),
            ),
            (EnvVars::PATH.to_string(), prefixed_path(&bin_dir(env_path))),
        ]
    }
}
