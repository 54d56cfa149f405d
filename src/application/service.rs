use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{
    build_integrity_report, Balance, HistoryEntry, IntegrityReport, Points, TransactionKind,
    UserId,
};
use crate::storage::{BalanceStore, HistoryLog};

use super::{AppError, LedgerConfig, UserLockGuard, UserLocks};

/// Application service owning the point ledger.
/// This is the primary interface for any client (CLI, API, batch import, etc.).
///
/// Mutations for one user are serialized through that user's lock; different
/// users proceed in parallel. Reads never take a user lock.
#[derive(Debug, Default)]
pub struct LedgerService {
    balances: BalanceStore,
    history: HistoryLog,
    locks: UserLocks,
    config: LedgerConfig,
}

/// A balance together with exactly the history that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub balance: Balance,
    pub history: Vec<HistoryEntry>,
}

impl LedgerService {
    /// Create a new ledger service with empty stores.
    pub fn new(config: LedgerConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// The per-user lock registry.
    pub fn locks(&self) -> &UserLocks {
        &self.locks
    }

    // ========================
    // Mutations
    // ========================

    /// Add `amount` points to a user's balance.
    pub async fn charge(&self, user_id: UserId, amount: Points) -> Result<Balance, AppError> {
        validate_amount(amount)?;
        let _guard = self.lock_user(user_id).await?;

        let current = self.balances.read(user_id);
        let new_amount = current
            .amount
            .checked_add(amount)
            .ok_or(AppError::Overflow {
                user_id,
                balance: current.amount,
                requested: amount,
            })?;

        Ok(self.commit(&current, TransactionKind::Charge, amount, new_amount))
    }

    /// Spend `amount` points from a user's balance.
    pub async fn use_points(&self, user_id: UserId, amount: Points) -> Result<Balance, AppError> {
        validate_amount(amount)?;
        let _guard = self.lock_user(user_id).await?;

        let current = self.balances.read(user_id);
        if current.amount < amount {
            return Err(AppError::InsufficientBalance {
                user_id,
                balance: current.amount,
                requested: amount,
            });
        }

        Ok(self.commit(&current, TransactionKind::Use, amount, current.amount - amount))
    }

    /// Apply a mutation of the given kind.
    pub async fn apply(
        &self,
        user_id: UserId,
        kind: TransactionKind,
        amount: Points,
    ) -> Result<Balance, AppError> {
        match kind {
            TransactionKind::Charge => self.charge(user_id, amount).await,
            TransactionKind::Use => self.use_points(user_id, amount).await,
        }
    }

    async fn lock_user(&self, user_id: UserId) -> Result<UserLockGuard, AppError> {
        match self.config.lock_timeout() {
            Some(waited) => self
                .locks
                .acquire_timeout(user_id, waited)
                .await
                .ok_or(AppError::Timeout { user_id, waited }),
            None => Ok(self.locks.acquire(user_id).await),
        }
    }

    /// Append the history entry, then publish the balance that counts it.
    /// Must only be called while holding the user's lock.
    fn commit(
        &self,
        current: &Balance,
        kind: TransactionKind,
        amount: Points,
        new_amount: Points,
    ) -> Balance {
        let user_id = current.user_id;
        let timestamp = current.next_timestamp(Utc::now());

        let (entry, history_len) = self.history.append(user_id, kind, amount, timestamp);
        let balance = self
            .balances
            .write(user_id, new_amount, timestamp, history_len);

        debug!(
            user_id,
            entry_id = entry.id,
            kind = %kind,
            amount,
            balance = new_amount,
            "point mutation committed"
        );
        balance
    }

    // ========================
    // Queries
    // ========================

    /// Current balance; zero for a user never mutated.
    pub fn get_balance(&self, user_id: UserId) -> Balance {
        self.balances.read(user_id)
    }

    /// Current balance, or `UserNotFound` if no mutation ever succeeded for
    /// this user.
    pub fn get_user_or_fail(&self, user_id: UserId) -> Result<Balance, AppError> {
        self.balances
            .get(user_id)
            .ok_or(AppError::UserNotFound(user_id))
    }

    pub fn user_exists(&self, user_id: UserId) -> bool {
        self.balances.contains(user_id)
    }

    /// Committed history for a user, oldest first. Empty for unknown users.
    pub fn get_history(&self, user_id: UserId) -> Vec<HistoryEntry> {
        self.snapshot(user_id).history
    }

    /// Balance and history observed together.
    ///
    /// The balance is read first and bounds how much history is returned, so
    /// an entry appended by an in-flight mutation whose balance is not yet
    /// published is never included.
    pub fn snapshot(&self, user_id: UserId) -> AccountSnapshot {
        let balance = self.balances.read(user_id);
        let history = self.history.query_prefix(user_id, balance.history_len);
        AccountSnapshot { balance, history }
    }

    /// Balances of every user that has been mutated, ordered by user id.
    pub fn list_balances(&self) -> Vec<Balance> {
        self.balances.list()
    }

    /// Committed history across all users, ordered by entry id.
    pub fn list_history(&self) -> Vec<HistoryEntry> {
        let mut all: Vec<HistoryEntry> = self
            .list_balances()
            .into_iter()
            .flat_map(|balance| {
                self.history
                    .query_prefix(balance.user_id, balance.history_len)
            })
            .collect();
        all.sort_by_key(|entry| entry.id);
        all
    }

    // ========================
    // Integrity operations
    // ========================

    /// Replay a user's history and compare it with the stored balance.
    pub fn verify_user(&self, user_id: UserId) -> IntegrityReport {
        let snapshot = self.snapshot(user_id);
        build_integrity_report(&snapshot.balance, &snapshot.history)
    }

    /// Integrity reports for every known user.
    pub fn verify_all(&self) -> Vec<IntegrityReport> {
        self.list_balances()
            .iter()
            .map(|balance| self.verify_user(balance.user_id))
            .collect()
    }
}

fn validate_amount(amount: Points) -> Result<(), AppError> {
    if amount <= 0 {
        return Err(AppError::InvalidAmount { amount });
    }
    Ok(())
}
