use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::Points;

pub type UserId = u64;

/// Current point balance of a single user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Balance {
    pub user_id: UserId,
    /// Always >= 0
    pub amount: Points,
    /// Strictly increases across mutations of the same user
    pub updated_at: DateTime<Utc>,
    /// Number of history entries committed together with this balance
    #[serde(skip)]
    pub history_len: usize,
}

impl Balance {
    /// The balance every user starts from before the first mutation.
    pub fn empty(user_id: UserId) -> Self {
        Self {
            user_id,
            amount: 0,
            updated_at: Utc::now(),
            history_len: 0,
        }
    }

    /// Timestamp for the next mutation: wall-clock now, bumped past the
    /// previous `updated_at` when the clock has not advanced.
    pub fn next_timestamp(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let floor = self.updated_at + Duration::microseconds(1);
        if now > self.updated_at { now } else { floor }
    }
}
