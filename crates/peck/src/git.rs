use std::path::{Path, PathBuf};
use std::str::Utf8Error;
use std::sync::LazyLock;

use tracing::{debug, warn};

use peck_consts::env_vars::EnvVars;

use crate::process;
use crate::process::Cmd;

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error(transparent)]
    Command(#[from] process::Error),

    #[error("Failed to find git: {0}")]
    GitNotFound(#[from] which::Error),

    #[error("failed to resolve revision `{rev}` in `{repo}`")]
    RevisionNotFound { repo: String, rev: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Utf8(#[from] Utf8Error),
}

pub(crate) static GIT: LazyLock<Result<PathBuf, which::Error>> =
    LazyLock::new(|| which::which("git"));

/// `GIT_` environment variables to scrub from git subprocesses.
///
/// Hooks run from inside other git hooks inherit variables like
/// `GIT_INDEX_FILE` that would make our own git invocations operate on the
/// wrong index.
pub(crate) static GIT_ENV_TO_REMOVE: LazyLock<Vec<(String, String)>> = LazyLock::new(|| {
    let keep = &[
        "GIT_EXEC_PATH",
        "GIT_SSH",
        "GIT_SSH_COMMAND",
        "GIT_SSL_CAINFO",
        "GIT_SSL_NO_VERIFY",
        "GIT_CONFIG_COUNT",
        "GIT_ALLOW_PROTOCOL",
        "GIT_ASKPASS",
    ];

    std::env::vars()
        .filter(|(k, _)| {
            k.starts_with("GIT_")
                && !k.starts_with("GIT_CONFIG_KEY_")
                && !k.starts_with("GIT_CONFIG_VALUE_")
                && !keep.contains(&k.as_str())
        })
        .collect()
});

pub(crate) fn git_cmd(summary: &str) -> Result<Cmd, Error> {
    let mut cmd = Cmd::new(GIT.as_ref().map_err(|&e| Error::GitNotFound(e))?, summary);
    cmd.arg("-c").arg("core.useBuiltinFSMonitor=false");
    Ok(cmd)
}

fn zsplit(s: &[u8]) -> Result<Vec<PathBuf>, Utf8Error> {
    s.split(|&b| b == b'\0')
        .filter(|slice| !slice.is_empty())
        .map(|slice| str::from_utf8(slice).map(PathBuf::from))
        .collect()
}

/// The repository root of the caller's checkout.
pub(crate) async fn get_root() -> Result<PathBuf, Error> {
    let output = git_cmd("get git root")?
        .arg("rev-parse")
        .arg("--show-toplevel")
        .check(true)
        .output()
        .await?;
    Ok(PathBuf::from(
        String::from_utf8_lossy(&output.stdout).trim_ascii(),
    ))
}

/// Files staged for the next commit (everything except deletions).
pub(crate) async fn get_staged_files(root: &Path) -> Result<Vec<PathBuf>, Error> {
    let output = git_cmd("get staged files")?
        .current_dir(root)
        .arg("diff")
        .arg("--cached")
        .arg("--name-only")
        .arg("--diff-filter=ACMRTUXB")
        .arg("--no-ext-diff")
        .arg("-z")
        .check(true)
        .output()
        .await?;
    Ok(zsplit(&output.stdout)?)
}

/// All files known to git.
pub(crate) async fn ls_files(root: &Path) -> Result<Vec<PathBuf>, Error> {
    let output = git_cmd("git ls-files")?
        .current_dir(root)
        .arg("ls-files")
        .arg("-z")
        .check(true)
        .output()
        .await?;
    Ok(zsplit(&output.stdout)?)
}

async fn init_repo(url: &str, path: &Path) -> Result<(), Error> {
    fs_err::tokio::create_dir_all(path).await?;

    git_cmd("git init")?
        .current_dir(path)
        .arg("init")
        .arg("--quiet")
        .remove_git_envs()
        .check(true)
        .output()
        .await?;

    git_cmd("git remote add")?
        .current_dir(path)
        .arg("remote")
        .arg("add")
        .arg("origin")
        .arg(url)
        .remove_git_envs()
        .check(true)
        .output()
        .await?;

    Ok(())
}

/// Fetch everything from origin, tags included.
async fn fetch_all(path: &Path) -> Result<(), Error> {
    git_cmd("git fetch")?
        .current_dir(path)
        .arg("fetch")
        .arg("origin")
        .arg("--tags")
        // Disable interactive prompts; a hung credential prompt looks like a
        // hung clone.
        .env(EnvVars::GIT_TERMINAL_PROMPT, "0")
        .remove_git_envs()
        .check(true)
        .output()
        .await?;
    Ok(())
}

/// Fetch branch and tag refs explicitly, used on the update path when a
/// revision cannot be resolved from what is already on disk.
pub(crate) async fn fetch_refs(path: &Path) -> Result<(), Error> {
    git_cmd("git fetch refs")?
        .current_dir(path)
        .arg("fetch")
        .arg("origin")
        .arg("+refs/heads/*:refs/remotes/origin/*")
        .arg("+refs/tags/*:refs/tags/*")
        .env(EnvVars::GIT_TERMINAL_PROMPT, "0")
        .remove_git_envs()
        .check(true)
        .output()
        .await?;
    Ok(())
}

fn is_hex_sha(rev: &str) -> bool {
    (rev.len() == 7 || rev.len() == 40)
        && rev
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Resolve `rev` to a commit in the working tree at `path`.
///
/// Tried in order: a 7/40-char lowercase hex hash, `refs/tags/<rev>`,
/// `refs/remotes/origin/<rev>`, `refs/heads/<rev>`.
pub(crate) async fn resolve_revision(path: &Path, rev: &str) -> Result<Option<String>, Error> {
    let mut candidates = Vec::with_capacity(4);
    if is_hex_sha(rev) {
        candidates.push(rev.to_string());
    }
    candidates.push(format!("refs/tags/{rev}"));
    candidates.push(format!("refs/remotes/origin/{rev}"));
    candidates.push(format!("refs/heads/{rev}"));

    for candidate in candidates {
        let output = git_cmd("git rev-parse")?
            .current_dir(path)
            .arg("rev-parse")
            .arg("--verify")
            .arg("--quiet")
            .arg(format!("{candidate}^{{commit}}"))
            .remove_git_envs()
            .check(false)
            .output()
            .await?;
        if output.status.success() {
            let commit = String::from_utf8_lossy(&output.stdout).trim_ascii().to_string();
            return Ok(Some(commit));
        }
    }
    Ok(None)
}

async fn checkout(path: &Path, commit: &str) -> Result<(), Error> {
    git_cmd("git checkout")?
        .current_dir(path)
        .arg("checkout")
        .arg("--quiet")
        .arg(commit)
        .remove_git_envs()
        .check(true)
        .output()
        .await?;
    Ok(())
}

/// Clone `url` into `path` and check out `rev`.
pub(crate) async fn clone_repo(url: &str, rev: &str, path: &Path) -> Result<(), Error> {
    debug!(url, rev, target = %path.display(), "Cloning repo");

    init_repo(url, path).await?;
    fetch_all(path).await?;

    let Some(commit) = resolve_revision(path, rev).await? else {
        return Err(Error::RevisionNotFound {
            repo: url.to_string(),
            rev: rev.to_string(),
        });
    };
    checkout(path, &commit).await?;
    Ok(())
}

/// Check out `rev` in an existing working tree, fetching refs when the
/// revision is not resolvable from what is already on disk.
pub(crate) async fn update_repo(url: &str, rev: &str, path: &Path) -> Result<(), Error> {
    let commit = match resolve_revision(path, rev).await? {
        Some(commit) => commit,
        None => {
            debug!(url, rev, "Revision not found locally, fetching");
            fetch_refs(path).await?;
            resolve_revision(path, rev)
                .await?
                .ok_or_else(|| Error::RevisionNotFound {
                    repo: url.to_string(),
                    rev: rev.to_string(),
                })?
        }
    };

    if let Err(err) = checkout(path, &commit).await {
        warn!(%err, url, rev, "Failed to checkout during update");
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::is_hex_sha;

    #[test]
    fn hex_sha_detection() {
        assert!(is_hex_sha("abc1234"));
        assert!(is_hex_sha(&"a".repeat(40)));
        assert!(!is_hex_sha("ABC1234"));
        assert!(!is_hex_sha("v1.2.3"));
        assert!(!is_hex_sha("abc123"));
        assert!(!is_hex_sha("main"));
    }
}
