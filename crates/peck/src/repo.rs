use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, warn};

use crate::git;
use crate::store::{self, Store};

#[derive(Debug, Error)]
pub(crate) enum Error {
    #[error("Failed to clone `{repo}`")]
    Clone {
        repo: String,
        #[source]
        source: git::Error,
    },

    #[error(transparent)]
    Git(#[from] git::Error),

    #[error(transparent)]
    Store(#[from] store::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The cache key for a repository reference.
///
/// Additional dependencies change what gets installed into the working tree's
/// environments, so they participate in the key, in declared order.
pub(crate) fn repo_key(url: &str, additional_deps: &[String]) -> String {
    if additional_deps.is_empty() {
        url.to_string()
    } else {
        format!("{url}:{}", additional_deps.join(","))
    }
}

/// Return a working tree for `url` checked out at `rev`, cloning on a cache
/// miss.
///
/// Safe against concurrent callers: the clone happens into a freshly reserved
/// directory under the store lock, and the index is re-checked after the lock
/// is taken in case another process finished the same clone first.
pub(crate) async fn acquire(
    store: &Store,
    url: &str,
    rev: &str,
    additional_deps: &[String],
) -> Result<PathBuf, Error> {
    let key = repo_key(url, additional_deps);

    if let Some(path) = store.lookup(&key, rev) {
        debug!(url, rev, path = %path.display(), "Using cached working tree");
        return Ok(path);
    }

    let target = store.reserve_new_path()?;
    let _lock = store.lock_async().await?;

    // Another process may have completed this clone while we waited.
    if let Some(path) = store.lookup(&key, rev) {
        debug!(url, rev, "Working tree appeared while waiting for lock");
        return Ok(path);
    }

    if let Err(source) = git::clone_repo(url, rev, &target).await {
        // Leave no partial working tree behind.
        if let Err(err) = fs_err::tokio::remove_dir_all(&target).await {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(%err, path = %target.display(), "Failed to remove partial clone");
            }
        }
        return Err(Error::Clone {
            repo: url.to_string(),
            source,
        });
    }

    if let Err(err) = store.insert(&key, rev, &target) {
        warn!(%err, url, rev, "Failed to index cloned working tree");
    }

    Ok(crate::fs::canonicalize(&target))
}

/// Refresh an existing working tree, or re-clone it when the update fails.
pub(crate) async fn update(
    store: &Store,
    url: &str,
    rev: &str,
    additional_deps: &[String],
) -> Result<PathBuf, Error> {
    let key = repo_key(url, additional_deps);

    let Some(path) = store.lookup(&key, rev) else {
        return acquire(store, url, rev, additional_deps).await;
    };

    match git::update_repo(url, rev, &path).await {
        Ok(()) => Ok(path),
        Err(err) => {
            warn!(%err, url, rev, "Update failed, re-cloning");
            let _lock = store.lock_async().await?;
            fs_err::tokio::remove_dir_all(&path).await.ok();
            // The stale row is removed by the next lookup.
            drop(_lock);
            acquire(store, url, rev, additional_deps).await
        }
    }
}
