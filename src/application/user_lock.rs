//! Keyed mutual exclusion: at most one mutation in flight per user, while
//! different users never wait on each other.
//!
//! Each user id maps to its own `tokio::sync::Mutex`, created on first use.
//! The registry map is guarded by a short-lived `parking_lot` mutex that is
//! only held to look up, insert or evict an entry and never across an
//! `.await`. Entries are reference counted: once the last holder or waiter
//! for a user lets go, the entry is removed from the registry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::domain::UserId;

type Slot = Arc<AsyncMutex<()>>;
type Registry = Arc<Mutex<HashMap<UserId, Slot>>>;

/// Registry of per-user locks.
#[derive(Debug, Default)]
pub struct UserLocks {
    registry: Registry,
}

/// Exclusive hold on one user's lock. Released on drop.
#[derive(Debug)]
pub struct UserLockGuard {
    // Field order matters: the mutex guard must be released before the lease
    // checks whether the registry entry can be evicted.
    _guard: OwnedMutexGuard<()>,
    lease: SlotLease,
}

/// A counted reference to a registry entry. Dropping the last lease for a
/// user evicts the entry.
#[derive(Debug)]
struct SlotLease {
    user_id: UserId,
    slot: Slot,
    registry: Registry,
}

impl Drop for SlotLease {
    fn drop(&mut self) {
        let mut registry = self.registry.lock();

        // Leases are only handed out under the registry lock, so a count of
        // two (the registry and this lease) means nobody else holds or waits
        // for this user.
        let idle = registry
            .get(&self.user_id)
            .is_some_and(|slot| Arc::ptr_eq(slot, &self.slot) && Arc::strong_count(slot) == 2);
        if idle {
            registry.remove(&self.user_id);
        }
    }
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lease(&self, user_id: UserId) -> SlotLease {
        let mut registry = self.registry.lock();
        let slot = registry
            .entry(user_id)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        SlotLease {
            user_id,
            slot,
            registry: Arc::clone(&self.registry),
        }
    }

    /// Wait until no other task holds this user's lock.
    /// Waiters for the same user are served in arrival order.
    pub async fn acquire(&self, user_id: UserId) -> UserLockGuard {
        let lease = self.lease(user_id);
        let guard = Arc::clone(&lease.slot).lock_owned().await;
        UserLockGuard {
            _guard: guard,
            lease,
        }
    }

    /// Like [`acquire`](Self::acquire), giving up after `timeout`.
    /// A timed-out attempt leaves its place in the queue and holds nothing.
    pub async fn acquire_timeout(
        &self,
        user_id: UserId,
        timeout: Duration,
    ) -> Option<UserLockGuard> {
        tokio::time::timeout(timeout, self.acquire(user_id))
            .await
            .ok()
    }

    /// Number of users with a live registry entry (held or awaited).
    pub fn active_users(&self) -> usize {
        self.registry.lock().len()
    }
}
