use std::sync::{LazyLock, Mutex};
use std::time::Duration;

use rustc_hash::FxHashSet;
use tokio::sync::Notify;
use tracing::trace;

/// Process-global record of which hook environments are being provisioned or
/// are ready.
///
/// Exists only for the lifetime of the process; cross-process provisioning
/// races are serialized elsewhere by the store lock.
pub(crate) struct EnvState {
    inner: Mutex<Inner>,
    notify: Notify,
}

#[derive(Default)]
struct Inner {
    installing: FxHashSet<String>,
    initialized: FxHashSet<String>,
}

static STATE: LazyLock<EnvState> = LazyLock::new(|| EnvState {
    inner: Mutex::new(Inner::default()),
    notify: Notify::new(),
});

impl EnvState {
    pub(crate) fn global() -> &'static Self {
        &STATE
    }

    /// Claim the right to provision `key`.
    ///
    /// Returns true exactly once per key: on the call that transitions it
    /// from absent to installing. Everyone else either finds it installing
    /// (and should wait) or already initialized.
    pub(crate) fn mark_installing(&self, key: &str) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.initialized.contains(key) || inner.installing.contains(key) {
            return false;
        }
        inner.installing.insert(key.to_string());
        trace!(key, "Environment marked installing");
        true
    }

    /// Record that `key` is ready and wake any waiters.
    pub(crate) fn mark_initialized(&self, key: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.installing.remove(key);
        inner.initialized.insert(key.to_string());
        drop(inner);
        trace!(key, "Environment marked initialized");
        self.notify.notify_waiters();
    }

    /// Roll back a failed provisioning attempt so peers stop waiting.
    pub(crate) fn clear_installing(&self, key: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.installing.remove(key);
        drop(inner);
        self.notify.notify_waiters();
    }

    pub(crate) fn is_initialized(&self, key: &str) -> bool {
        self.inner.lock().unwrap().initialized.contains(key)
    }

    /// Wait until `key` becomes initialized, or until its installer gives up.
    ///
    /// Returns true if the environment is ready. A bounded poll backs up the
    /// notification so a wake-up racing with the first check cannot be lost.
    pub(crate) async fn wait_initialized(&self, key: &str) -> bool {
        loop {
            {
                let inner = self.inner.lock().unwrap();
                if inner.initialized.contains(key) {
                    return true;
                }
                if !inner.installing.contains(key) {
                    return false;
                }
            }
            let notified = self.notify.notified();
            tokio::select! {
                () = notified => {}
                () = tokio::time::sleep(Duration::from_millis(50)) => {}
            }
        }
    }
}
