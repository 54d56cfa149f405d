use std::time::Duration;

use thiserror::Error;

use crate::domain::{Points, UserId};

/// Expected failures of ledger operations. None of them leaves a partial
/// update behind, and none is retried internally.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    #[error("Invalid amount: {amount} (must be greater than zero)")]
    InvalidAmount { amount: Points },

    #[error("Insufficient balance for user {user_id}: balance {balance}, requested {requested}")]
    InsufficientBalance {
        user_id: UserId,
        balance: Points,
        requested: Points,
    },

    #[error("Balance overflow for user {user_id}: {balance} + {requested} is out of range")]
    Overflow {
        user_id: UserId,
        balance: Points,
        requested: Points,
    },

    #[error("User not found: {0}")]
    UserNotFound(UserId),

    #[error("Timed out after {waited:?} waiting for user {user_id}")]
    Timeout { user_id: UserId, waited: Duration },
}

/// Field-less classification of [`AppError`], for callers that map
/// failures onto their own status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidAmount,
    InsufficientBalance,
    Overflow,
    NotFound,
    Timeout,
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::InvalidAmount { .. } => ErrorKind::InvalidAmount,
            AppError::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            AppError::Overflow { .. } => ErrorKind::Overflow,
            AppError::UserNotFound(_) => ErrorKind::NotFound,
            AppError::Timeout { .. } => ErrorKind::Timeout,
        }
    }

    /// Caller mistakes, as opposed to data-range or contention problems.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::InvalidAmount | ErrorKind::InsufficientBalance | ErrorKind::NotFound
        )
    }
}
