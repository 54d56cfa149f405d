use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;

use crate::domain::{HistoryEntry, Points, TransactionKind, UserId};

pub(crate) type UserHistory = Arc<RwLock<Vec<HistoryEntry>>>;

/// Append-only log of point changes, grouped by user.
///
/// Every user owns a separately locked vector; the map is only locked long
/// enough to find or create that vector. Copying one user's history therefore
/// never holds up appends for anyone else.
///
/// Entry ids come from one counter shared by all users, so they are unique
/// and follow creation order. Per user, insertion order is preserved.
#[derive(Debug)]
pub struct HistoryLog {
    users: DashMap<UserId, UserHistory>,
    next_id: AtomicU64,
}

impl Default for HistoryLog {
    fn default() -> Self {
        Self {
            users: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }
}

impl HistoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn user_history(&self, user_id: UserId) -> Option<UserHistory> {
        self.users.get(&user_id).map(|history| Arc::clone(history.value()))
    }

    /// Create and store a new entry.
    /// Returns the entry together with the user's entry count after the append.
    pub fn append(
        &self,
        user_id: UserId,
        kind: TransactionKind,
        amount: Points,
        timestamp: DateTime<Utc>,
    ) -> (HistoryEntry, usize) {
        let history = Arc::clone(self.users.entry(user_id).or_default().value());

        let mut entries = history.write();
        let entry = HistoryEntry {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            user_id,
            amount,
            kind,
            timestamp,
        };
        entries.push(entry.clone());
        (entry, entries.len())
    }

    /// All entries for a user in insertion order (empty if none).
    pub fn query_by_user(&self, user_id: UserId) -> Vec<HistoryEntry> {
        self.user_history(user_id)
            .map(|history| history.read().clone())
            .unwrap_or_default()
    }

    /// The first `len` entries for a user.
    pub fn query_prefix(&self, user_id: UserId, len: usize) -> Vec<HistoryEntry> {
        self.user_history(user_id)
            .map(|history| history.read().iter().take(len).cloned().collect())
            .unwrap_or_default()
    }
}
