//! Per-owner serialization of tree-shaping operations.
//!
//! # Invariants
//! - At most one tree-shaping operation per owner holds its guard at a time.
//! - Different owners never wait on each other.
//! - Idle entries are pruned once the table grows past a threshold.

use crate::model::document::OwnerId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

const PRUNE_THRESHOLD: usize = 1024;

#[derive(Default)]
pub(crate) struct OwnerLocks {
    locks: Mutex<HashMap<OwnerId, Arc<AsyncMutex<()>>>>,
}

impl OwnerLocks {
    /// Waits for exclusive access to `owner`'s tree.
    pub(crate) async fn acquire(&self, owner: &OwnerId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            if locks.len() >= PRUNE_THRESHOLD {
                // Held guards and waiters keep their own clone of the Arc.
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            Arc::clone(locks.entry(owner.clone()).or_default())
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[cfg(test)]
mod tests {
    use super::OwnerLocks;
    use crate::model::document::OwnerId;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn other_owners_are_not_blocked() {
        let locks = OwnerLocks::default();
        let _alice = locks.acquire(&OwnerId::from("alice")).await;
        let bob = tokio::time::timeout(
            Duration::from_millis(200),
            locks.acquire(&OwnerId::from("bob")),
        )
        .await;
        assert!(bob.is_ok());
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn same_owner_is_blocked_until_release() {
        let locks = OwnerLocks::default();
        let owner = OwnerId::from("alice");
        let guard = locks.acquire(&owner).await;

        let blocked =
            tokio::time::timeout(Duration::from_millis(50), locks.acquire(&owner)).await;
        assert!(blocked.is_err());

        drop(guard);
        let reacquired =
            tokio::time::timeout(Duration::from_millis(200), locks.acquire(&owner)).await;
        assert!(reacquired.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn guards_are_mutually_exclusive_under_contention() {
        let locks = Arc::new(OwnerLocks::default());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let locks = Arc::clone(&locks);
            let inside = Arc::clone(&inside);
            let max_inside = Arc::clone(&max_inside);
            tasks.push(tokio::spawn(async move {
                let _guard = locks.acquire(&OwnerId::from("alice")).await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_inside.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }
}
