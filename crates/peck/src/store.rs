use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use etcetera::BaseStrategy;
use rand::Rng;
use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;
use tracing::{debug, trace, warn};

use peck_consts::env_vars::EnvVars;
use peck_consts::{DB_FILE, LOCK_FILE, REPO_DIR_PREFIX};

use crate::fs::{LockedFile, canonicalize};

#[derive(Debug, Error)]
pub enum Error {
    #[error("Home directory not found")]
    HomeNotFound,
    #[error("Cache index is closed")]
    Closed,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("Failed to open cache index at `{path}`")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

/// Expand a path starting with `~` to the user's home directory.
fn expand_tilde(path: PathBuf) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = std::env::home_dir() {
            return home.join(stripped);
        }
    }
    path
}

/// The on-disk cache: working trees under the cache root, indexed by a small
/// SQLite database mapping `(repo_key, rev)` to a working-tree path, plus the
/// set of configuration files the tool has seen.
#[derive(Debug)]
pub struct Store {
    path: PathBuf,
    conn: Mutex<Option<Connection>>,
}

impl Store {
    pub(crate) fn from_path(path: impl Into<PathBuf>) -> Result<Self, Error> {
        Self {
            path: path.into(),
            conn: Mutex::new(None),
        }
        .init()
    }

    /// Create a store from environment variables or default paths.
    pub(crate) fn from_settings() -> Result<Self, Error> {
        let path = if let Some(path) = EnvVars::var_os(EnvVars::PRE_COMMIT_HOME) {
            Some(expand_tilde(PathBuf::from(path)))
        } else {
            etcetera::choose_base_strategy()
                .map(|strategy| strategy.cache_dir().join("pre-commit"))
                .ok()
        };

        let Some(path) = path else {
            return Err(Error::HomeNotFound);
        };
        Self::from_path(path)
    }

    pub(crate) fn path(&self) -> &Path {
        self.path.as_ref()
    }

    /// Initialize the cache root and open the index database.
    ///
    /// Database open or migration failures are fatal here; once the store is
    /// initialized, index read/write problems degrade to warnings.
    fn init(self) -> Result<Self, Error> {
        fs_err::create_dir_all(&self.path)?;

        match fs_err::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.path.join("README"))
        {
            Ok(mut f) => f.write_all(b"This directory is maintained by peck.\n")?,
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => (),
            Err(err) => return Err(err.into()),
        }

        let db_path = self.path.join(DB_FILE);
        let conn = Connection::open(&db_path).map_err(|source| Error::Open {
            path: db_path.clone(),
            source,
        })?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS repos (
                repo TEXT,
                ref TEXT,
                path TEXT,
                PRIMARY KEY (repo, ref)
            );
            CREATE TABLE IF NOT EXISTS configs (
                path TEXT PRIMARY KEY NOT NULL
            );",
        )
        .map_err(|source| Error::Open {
            path: db_path,
            source,
        })?;

        *self.conn.lock().unwrap() = Some(conn);
        Ok(self)
    }

    /// Look up the working tree for `(repo_key, rev)`.
    ///
    /// An entry whose `.git` directory has vanished is stale: the row is
    /// deleted and the lookup reports a miss so a fresh tree gets allocated.
    pub(crate) fn lookup(&self, repo_key: &str, rev: &str) -> Option<PathBuf> {
        let guard = self.conn.lock().unwrap();
        let conn = guard.as_ref()?;

        let path: Option<String> = match conn
            .query_row(
                "SELECT path FROM repos WHERE repo = ?1 AND ref = ?2",
                params![repo_key, rev],
                |row| row.get(0),
            )
            .optional()
        {
            Ok(path) => path,
            Err(err) => {
                warn!(%err, repo_key, rev, "Failed to query cache index");
                return None;
            }
        };

        let path = PathBuf::from(path?);
        if path.join(".git").is_dir() {
            return Some(path);
        }

        debug!(
            path = %path.display(),
            repo_key,
            "Cache entry is stale, removing",
        );
        if let Err(err) = conn.execute(
            "DELETE FROM repos WHERE repo = ?1 AND ref = ?2",
            params![repo_key, rev],
        ) {
            warn!(%err, repo_key, rev, "Failed to delete stale cache entry");
        }
        None
    }

    /// Record the working tree for `(repo_key, rev)`.
    ///
    /// The path is canonicalized first so later lookups succeed regardless of
    /// the caller's perspective. Write failures are logged, not fatal.
    pub(crate) fn insert(&self, repo_key: &str, rev: &str, path: &Path) -> Result<(), Error> {
        let guard = self.conn.lock().unwrap();
        let conn = guard.as_ref().ok_or(Error::Closed)?;

        let path = canonicalize(path);
        if let Err(err) = conn.execute(
            "INSERT OR REPLACE INTO repos (repo, ref, path) VALUES (?1, ?2, ?3)",
            params![repo_key, rev, path.to_string_lossy()],
        ) {
            warn!(%err, repo_key, rev, "Failed to record working tree in cache index");
        }
        Ok(())
    }

    /// Reserve a fresh working-tree directory name under the cache root.
    ///
    /// The directory is created atomically to claim a unique name, then
    /// removed immediately; only the name is kept. The caller clones into it
    /// under the store lock.
    pub(crate) fn reserve_new_path(&self) -> Result<PathBuf, Error> {
        match tempfile::Builder::new()
            .prefix(REPO_DIR_PREFIX)
            .tempdir_in(&self.path)
        {
            Ok(dir) => {
                let path = dir.path().to_path_buf();
                dir.close()?;
                Ok(path)
            }
            Err(err) => {
                trace!(%err, "Atomic name reservation failed, falling back to random suffix");
                let mut rng = rand::rng();
                let suffix: String = (0..8)
                    .map(|_| {
                        const CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
                        CHARS[rng.random_range(0..CHARS.len())] as char
                    })
                    .collect();
                Ok(self.path.join(format!("{REPO_DIR_PREFIX}{suffix}")))
            }
        }
    }

    /// Remember that a configuration file was used. Idempotent; paths that do
    /// not exist on disk are silently skipped.
    pub(crate) fn mark_config_used(&self, path: &Path) -> Result<(), Error> {
        let path = canonicalize(path);
        if !path.is_file() {
            return Ok(());
        }

        let guard = self.conn.lock().unwrap();
        let conn = guard.as_ref().ok_or(Error::Closed)?;
        if let Err(err) = conn.execute(
            "INSERT OR IGNORE INTO configs (path) VALUES (?1)",
            params![path.to_string_lossy()],
        ) {
            warn!(%err, path = %path.display(), "Failed to record config file");
        }
        Ok(())
    }

    /// All configuration files ever recorded.
    pub(crate) fn tracked_configs(&self) -> Result<Vec<PathBuf>, Error> {
        let guard = self.conn.lock().unwrap();
        let conn = guard.as_ref().ok_or(Error::Closed)?;
        let mut stmt = conn.prepare("SELECT path FROM configs")?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .filter_map(|row| row.ok().map(PathBuf::from))
            .collect();
        Ok(rows)
    }

    /// Every `(repo_key, rev, path)` row in the index.
    pub(crate) fn repo_entries(&self) -> Result<Vec<(String, String, PathBuf)>, Error> {
        let guard = self.conn.lock().unwrap();
        let conn = guard.as_ref().ok_or(Error::Closed)?;
        let mut stmt = conn.prepare("SELECT repo, ref, path FROM repos")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    PathBuf::from(row.get::<_, String>(2)?),
                ))
            })?
            .filter_map(std::result::Result::ok)
            .collect();
        Ok(rows)
    }

    pub(crate) fn remove_repo_entry(&self, repo_key: &str, rev: &str) -> Result<(), Error> {
        let guard = self.conn.lock().unwrap();
        let conn = guard.as_ref().ok_or(Error::Closed)?;
        conn.execute(
            "DELETE FROM repos WHERE repo = ?1 AND ref = ?2",
            params![repo_key, rev],
        )?;
        Ok(())
    }

    pub(crate) fn remove_config(&self, path: &Path) -> Result<(), Error> {
        let guard = self.conn.lock().unwrap();
        let conn = guard.as_ref().ok_or(Error::Closed)?;
        conn.execute(
            "DELETE FROM configs WHERE path = ?1",
            params![path.to_string_lossy()],
        )?;
        Ok(())
    }

    /// Remove every cached working tree.
    ///
    /// Runs under the exclusive store lock so a concurrent clone cannot be
    /// ripped out from underneath another process.
    pub(crate) async fn clean(&self) -> Result<(), Error> {
        let _lock = LockedFile::acquire_timeout(
            self.path.join(LOCK_FILE),
            "store",
            Duration::from_secs(30),
        )
        .await?;

        for entry in fs_err::read_dir(&self.path)? {
            let entry = entry?;
            let name = entry.file_name();
            if name.to_string_lossy().starts_with(REPO_DIR_PREFIX) {
                debug!(path = %entry.path().display(), "Removing cached working tree");
                if entry.file_type()?.is_dir() {
                    fs_err::remove_dir_all(entry.path())?;
                } else {
                    fs_err::remove_file(entry.path())?;
                }
            }
        }

        let guard = self.conn.lock().unwrap();
        if let Some(conn) = guard.as_ref() {
            conn.execute("DELETE FROM repos", [])?;
        }
        Ok(())
    }

    /// Acquire the exclusive store lock.
    pub(crate) async fn lock_async(&self) -> Result<LockedFile, std::io::Error> {
        LockedFile::acquire(self.path.join(LOCK_FILE), "store").await
    }

    /// Close the index database. Idempotent.
    pub(crate) fn close(&self) {
        if let Some(conn) = self.conn.lock().unwrap().take() {
            // Dropping the connection closes it; ignore a poisoned close.
            drop(conn);
        }
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> (tempfile::TempDir, Store) {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = Store::from_path(tmp.path()).expect("store init");
        (tmp, store)
    }

    fn fake_working_tree(store: &Store) -> PathBuf {
        let path = store.reserve_new_path().expect("reserve");
        fs_err::create_dir_all(path.join(".git")).expect("create .git");
        path
    }

    #[test]
    fn lookup_roundtrip() {
        let (_tmp, store) = test_store();
        let tree = fake_working_tree(&store);

        assert_eq!(store.lookup("https://example/repo", "v1"), None);
        store
            .insert("https://example/repo", "v1", &tree)
            .expect("insert");

        let hit = store.lookup("https://example/repo", "v1").expect("hit");
        assert_eq!(hit, canonicalize(&tree));
        // Repeated lookups return the same path.
        assert_eq!(store.lookup("https://example/repo", "v1"), Some(hit));
    }

    #[test]
    fn stale_entry_is_deleted_on_lookup() {
        let (_tmp, store) = test_store();
        let tree = fake_working_tree(&store);
        store
            .insert("https://example/repo", "v1", &tree)
            .expect("insert");

        fs_err::remove_dir_all(&tree).expect("remove tree");

        assert_eq!(store.lookup("https://example/repo", "v1"), None);
        // The stale row is gone: no entries remain.
        assert!(store.repo_entries().expect("entries").is_empty());
    }

    #[test]
    fn reserved_paths_are_unique_and_prefixed() {
        let (_tmp, store) = test_store();
        let first = store.reserve_new_path().expect("reserve");
        let second = store.reserve_new_path().expect("reserve");

        assert_ne!(first, second);
        for path in [&first, &second] {
            let name = path.file_name().unwrap().to_string_lossy();
            assert!(name.starts_with("repo"), "unexpected name `{name}`");
            assert_eq!(path.parent().unwrap(), store.path());
            // Only the name is reserved; the directory itself is gone.
            assert!(!path.exists());
        }
    }

    #[test]
    fn config_tracking_is_idempotent_and_skips_missing() {
        let (tmp, store) = test_store();

        let config = tmp.path().join("config.yaml");
        fs_err::write(&config, "repos: []").expect("write config");

        store.mark_config_used(&config).expect("mark");
        store.mark_config_used(&config).expect("mark again");
        store
            .mark_config_used(&tmp.path().join("missing.yaml"))
            .expect("missing path is skipped");

        let tracked = store.tracked_configs().expect("tracked");
        assert_eq!(tracked, vec![canonicalize(&config)]);
    }

    #[tokio::test]
    async fn clean_removes_working_trees() {
        let (_tmp, store) = test_store();
        let tree = fake_working_tree(&store);
        store.insert("repo", "v1", &tree).expect("insert");

        store.clean().await.expect("clean");

        assert!(!tree.exists());
        assert!(store.repo_entries().expect("entries").is_empty());
        // The database itself survives.
        assert!(store.path().join(DB_FILE).exists());
    }

    #[test]
    fn close_is_idempotent() {
        let (_tmp, store) = test_store();
        store.close();
        store.close();
        assert!(matches!(
            store.insert("repo", "v1", Path::new("/nonexistent")),
            Err(Error::Closed)
        ));
    }
}
