//! Per-user concurrency control.
//!
//! Ensures only one turn runs per user at a time. A second message arriving
//! while a turn is in-flight waits for the permit, so turns for one user are
//! strictly serialized in arrival order while different users proceed in
//! parallel.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use sibyl_domain::error::{Error, Result};

/// Manages per-user turn locks.
///
/// Each user id maps to a `Semaphore(1)`. Acquiring the permit ensures
/// exclusive access for one turn at a time.
pub struct UserLockMap {
    locks: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl Default for UserLockMap {
    fn default() -> Self {
        Self::new()
    }
}

impl UserLockMap {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire the turn lock for a user.
    ///
    /// Waits until any in-flight turn for the same user finishes. Hold the
    /// permit for the duration of the turn — it auto-releases on drop.
    pub async fn acquire(&self, user_id: &str) -> Result<OwnedSemaphorePermit> {
        let sem = {
            let mut locks = self.locks.lock();
            locks
                .entry(user_id.to_owned())
                .or_insert_with(|| Arc::new(Semaphore::new(1)))
                .clone()
        };

        sem.acquire_owned()
            .await
            .map_err(|_| Error::Other("user lock closed".into()))
    }

    /// Number of tracked users (for monitoring).
    pub fn user_count(&self) -> usize {
        self.locks.lock().len()
    }

    /// Remove locks for users without an in-flight turn (cleanup).
    pub fn prune_idle(&self) {
        let mut locks = self.locks.lock();
        locks.retain(|_, sem| sem.available_permits() == 0);
    }
}
