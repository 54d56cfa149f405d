use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Points, UserId};

pub type EntryId = u64;

/// The two ways a balance can change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionKind {
    /// Adds points to the balance
    Charge,
    /// Spends points from the balance
    Use,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Charge => "CHARGE",
            TransactionKind::Use => "USE",
        }
    }

    /// Case-insensitive parse of `charge` / `use`.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "CHARGE" => Some(TransactionKind::Charge),
            "USE" => Some(TransactionKind::Use),
            _ => None,
        }
    }

    /// Signed effect of `amount` on a balance.
    pub fn signed(&self, amount: Points) -> Points {
        match self {
            TransactionKind::Charge => amount,
            TransactionKind::Use => -amount,
        }
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One committed charge or use. Entries are immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// Unique across all users, increasing in creation order
    pub id: EntryId,
    pub user_id: UserId,
    /// Magnitude of the change (always positive)
    pub amount: Points,
    pub kind: TransactionKind,
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    /// Signed delta this entry applies to the balance.
    pub fn delta(&self) -> Points {
        self.kind.signed(self.amount)
    }
}
