//! # Per-User Lock Registry
//!
//! Serializes conversation turns per user. A turn reads the stage, writes the
//! next one and records the sent message id; two turns for the same user must
//! never interleave, while turns for different users run in parallel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Async mutex per user id
///
/// # Lock Lifecycle
///
/// - A lock is created on first request for a user
/// - Later requests for the same user get the same lock
/// - [`UserLocks::release_idle`] drops locks that nobody holds or waits on
pub struct UserLocks {
    locks: Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn locks(&self) -> MutexGuard<'_, HashMap<i64, Arc<tokio::sync::Mutex<()>>>> {
        self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Get or create the lock for a user
    pub fn lock_for(&self, user_id: i64) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(self.locks().entry(user_id).or_default())
    }

    /// Drop locks only referenced by the registry, returning how many were removed
    pub fn release_idle(&self) -> usize {
        let mut locks = self.locks();
        let before = locks.len();
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        let released = before - locks.len();
        if released > 0 {
            debug!(released, "Released idle user locks");
        }
        released
    }

    /// Get the number of registered locks
    pub fn len(&self) -> usize {
        self.locks().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for UserLocks {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_user_gets_same_lock() {
        let locks = UserLocks::new();
        let a = locks.lock_for(1);
        let b = locks.lock_for(1);
        let c = locks.lock_for(2);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(locks.len(), 2);
    }

    #[test]
    fn test_release_idle_keeps_held_locks() {
        let locks = UserLocks::new();
        let held = locks.lock_for(1);
        drop(locks.lock_for(2));
        assert_eq!(locks.release_idle(), 1);
        assert_eq!(locks.len(), 1);
        drop(held);
        assert_eq!(locks.release_idle(), 1);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_lock_serializes_turns() {
        let locks = UserLocks::new();
        let lock = locks.lock_for(1);
        let guard = lock.lock().await;
        assert!(locks.lock_for(1).try_lock().is_err());
        drop(guard);
        assert!(locks.lock_for(1).try_lock().is_ok());
    }
}
