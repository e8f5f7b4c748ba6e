//! Per-user write serialization.

use memloop_core::UserId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OwnedMutexGuard;

/// One async mutex per user id. Writers hold the guard for the whole
/// read-max-then-insert sequence so sequence numbers never collide.
///
/// Entries nobody holds or waits on are dropped whenever a lock is taken,
/// so the map tracks active writers rather than every user ever seen.
#[derive(Default)]
pub struct UserLocks {
    locks: Mutex<HashMap<UserId, Arc<tokio::sync::Mutex<()>>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, user: &UserId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(user.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Number of users with a live entry.
    pub fn tracked(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
