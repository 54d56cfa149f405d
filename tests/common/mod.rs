// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use pointledger::application::{LedgerConfig, LedgerService};
use pointledger::domain::{replay_balance, UserId};

/// Helper to create a shared service with default configuration
pub fn test_service() -> Arc<LedgerService> {
    Arc::new(LedgerService::default())
}

/// Helper to create a shared service whose mutations give up after `timeout`
pub fn test_service_with_timeout(timeout: Duration) -> Arc<LedgerService> {
    Arc::new(LedgerService::new(
        LedgerConfig::default().with_lock_timeout(timeout),
    ))
}

/// Assert that a user's history explains the stored balance exactly
pub fn assert_consistent(service: &LedgerService, user_id: UserId) {
    let snapshot = service.snapshot(user_id);
    assert!(
        snapshot.balance.amount >= 0,
        "negative balance for user {}",
        user_id
    );
    assert_eq!(
        replay_balance(&snapshot.history),
        Some(snapshot.balance.amount),
        "history does not replay to the balance of user {}",
        user_id
    );
    let report = service.verify_user(user_id);
    assert!(report.is_ok(), "user {}: {:?}", user_id, report.issues);
}

/// Test fixture: charge a set of users up front
pub async fn fund_users(service: &LedgerService, users: &[UserId], amount: i64) -> Result<()> {
    for user_id in users {
        service.charge(*user_id, amount).await?;
    }
    Ok(())
}
