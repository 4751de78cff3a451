use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{OcflError, Result};

/// A table of named mutexes with timed acquisition.
///
/// One table instance serves as the per-object write lock for a whole
/// repository; a second, short-lived instance serializes writers to the
/// same logical path within one staged update. Lock entries are created on
/// first use and live for the table's lifetime, which is bounded by the
/// number of distinct keys the owner touches.
pub struct LockTable {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    timeout: Duration,
}

impl LockTable {
    pub fn new(timeout: Duration) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `action` while holding the exclusive lock for `key`.
    ///
    /// At most one holder per key across all threads; waiters fail with
    /// [`OcflError::LockTimeout`] once the configured timeout elapses.
    /// Acquisition is not reentrant.
    pub fn with_lock<T>(&self, key: &str, action: impl FnOnce() -> Result<T>) -> Result<T> {
        let lock = {
            let mut locks = self.locks.lock();
            Arc::clone(locks.entry(key.to_string()).or_default())
        };
        let guard = lock
            .try_lock_for(self.timeout)
            .ok_or_else(|| OcflError::LockTimeout {
                key: key.to_string(),
            })?;
        let result = action();
        drop(guard);
        result
    }
}

impl std::fmt::Debug for LockTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockTable")
            .field("keys", &self.locks.lock().len())
            .field("timeout", &self.timeout)
            .finish()
    }
}
