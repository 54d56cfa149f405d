use serde::{Deserialize, Serialize};

use super::{Balance, HistoryEntry, Points, UserId};

/// Replay a user's history from zero.
/// Returns `None` if any prefix would be negative or overflow, which a
/// correctly serialized history can never produce.
pub fn replay_balance(entries: &[HistoryEntry]) -> Option<Points> {
    entries.iter().try_fold(0 as Points, |balance, entry| {
        let next = balance.checked_add(entry.delta())?;
        (next >= 0).then_some(next)
    })
}

/// Outcome of comparing a stored balance with its replayed history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub user_id: UserId,
    pub stored_balance: Points,
    pub replayed_balance: Option<Points>,
    pub entry_count: usize,
    pub issues: Vec<String>,
}

impl IntegrityReport {
    pub fn is_ok(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Check that `entries` explain `balance` exactly.
pub fn build_integrity_report(balance: &Balance, entries: &[HistoryEntry]) -> IntegrityReport {
    let mut issues = Vec::new();
    let replayed = replay_balance(entries);

    match replayed {
        Some(amount) if amount != balance.amount => issues.push(format!(
            "replayed balance {} does not match stored balance {}",
            amount, balance.amount
        )),
        Some(_) => {}
        None => issues.push("history goes negative or overflows during replay".to_string()),
    }

    if entries.len() != balance.history_len {
        issues.push(format!(
            "{} history entries but balance commits {}",
            entries.len(),
            balance.history_len
        ));
    }

    if let Some(stranger) = entries.iter().find(|e| e.user_id != balance.user_id) {
        issues.push(format!(
            "entry {} belongs to user {}",
            stranger.id, stranger.user_id
        ));
    }

    if entries.windows(2).any(|w| w[0].id >= w[1].id) {
        issues.push("entry ids are not strictly increasing".to_string());
    }

    if entries.iter().any(|e| e.amount <= 0) {
        issues.push("history contains a non-positive amount".to_string());
    }

    IntegrityReport {
        user_id: balance.user_id,
        stored_balance: balance.amount,
        replayed_balance: replayed,
        entry_count: entries.len(),
        issues,
    }
}
