use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::domain::{Balance, Points, UserId};

/// In-memory mapping from user id to current balance.
///
/// Each call is atomic on its own and only touches the shard holding that
/// user. Ordering between a read and the following write is the caller's
/// job: the ledger service only writes while holding that user's lock.
#[derive(Debug, Default)]
pub struct BalanceStore {
    balances: DashMap<UserId, Balance>,
}

impl BalanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current balance, or the zero balance for a user never written.
    pub fn read(&self, user_id: UserId) -> Balance {
        self.get(user_id)
            .unwrap_or_else(|| Balance::empty(user_id))
    }

    /// Current balance only if the user has been written at least once.
    pub fn get(&self, user_id: UserId) -> Option<Balance> {
        self.balances.get(&user_id).map(|balance| balance.clone())
    }

    /// Replace the stored balance and return what was written.
    pub fn write(
        &self,
        user_id: UserId,
        amount: Points,
        updated_at: DateTime<Utc>,
        history_len: usize,
    ) -> Balance {
        debug_assert!(amount >= 0, "balance must never be negative");
        let balance = Balance {
            user_id,
            amount,
            updated_at,
            history_len,
        };
        self.balances.insert(user_id, balance.clone());
        balance
    }

    pub fn contains(&self, user_id: UserId) -> bool {
        self.balances.contains_key(&user_id)
    }

    /// All stored balances ordered by user id.
    pub fn list(&self) -> Vec<Balance> {
        let mut balances: Vec<Balance> = self
            .balances
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        balances.sort_by_key(|b| b.user_id);
        balances
    }
}
