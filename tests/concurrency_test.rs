mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Result;
use pointledger::application::ErrorKind;
use pointledger::domain::replay_balance;
use tokio::task::JoinSet;

use common::{assert_consistent, test_service, test_service_with_timeout};

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_charges_lose_no_updates() -> Result<()> {
    let service = test_service();
    let mut tasks = JoinSet::new();

    for _ in 0..100 {
        let service = Arc::clone(&service);
        tasks.spawn(async move { service.charge(1, 10).await });
    }
    while let Some(joined) = tasks.join_next().await {
        joined??;
    }

    assert_eq!(service.get_balance(1).amount, 1000);
    let history = service.get_history(1);
    assert_eq!(history.len(), 100);
    assert!(history.iter().all(|e| e.amount == 10));
    assert_consistent(&service, 1);
    assert_eq!(service.locks().active_users(), 0);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_uses_never_overdraw() -> Result<()> {
    let service = test_service();
    service.charge(1, 500).await?;

    let mut tasks = JoinSet::new();
    for _ in 0..80 {
        let service = Arc::clone(&service);
        tasks.spawn(async move { service.use_points(1, 10).await });
    }

    let mut succeeded = 0;
    let mut insufficient = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined? {
            Ok(_) => succeeded += 1,
            Err(e) => {
                assert_eq!(e.kind(), ErrorKind::InsufficientBalance);
                insufficient += 1;
            }
        }
    }

    assert_eq!(succeeded, 50);
    assert_eq!(insufficient, 30);
    assert_eq!(service.get_balance(1).amount, 0);
    assert_eq!(service.get_history(1).len(), 51);
    assert_consistent(&service, 1);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_mixed_operations_across_users() -> Result<()> {
    let service = test_service();
    let mut tasks = JoinSet::new();

    for user_id in 1..=10u64 {
        for n in 0..40 {
            let service = Arc::clone(&service);
            tasks.spawn(async move {
                if n % 3 == 0 {
                    service.use_points(user_id, 7).await
                } else {
                    service.charge(user_id, 5).await
                }
            });
        }
    }
    while let Some(joined) = tasks.join_next().await {
        // Insufficient balance is an expected outcome here.
        let _ = joined?;
    }

    for user_id in 1..=10u64 {
        assert_consistent(&service, user_id);
    }
    assert_eq!(service.locks().active_users(), 0);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_other_users_are_not_blocked() -> Result<()> {
    let service = test_service_with_timeout(Duration::from_millis(200));

    // User 1 is stuck behind a held lock.
    let held = service.locks().acquire(1).await;

    let mut tasks = JoinSet::new();
    for user_id in 2..=20u64 {
        let service = Arc::clone(&service);
        tasks.spawn(async move { service.charge(user_id, 1).await });
    }
    while let Some(joined) = tasks.join_next().await {
        joined??;
    }

    let blocked = service.charge(1, 1).await.unwrap_err();
    assert_eq!(blocked.kind(), ErrorKind::Timeout);
    assert_eq!(service.get_balance(1).amount, 0);

    drop(held);
    service.charge(1, 1).await?;
    assert_eq!(service.get_balance(1).amount, 1);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_reads_do_not_wait_for_the_user_lock() -> Result<()> {
    let service = test_service();
    service.charge(1, 100).await?;

    let _held = service.locks().acquire(1).await;
    let reader = Arc::clone(&service);
    let snapshot = tokio::time::timeout(
        Duration::from_millis(200),
        tokio::task::spawn_blocking(move || reader.snapshot(1)),
    )
    .await??;

    assert_eq!(snapshot.balance.amount, 100);
    assert_eq!(snapshot.history.len(), 1);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_readers_never_observe_a_torn_pair() -> Result<()> {
    let service = test_service();
    let done = Arc::new(AtomicBool::new(false));

    let mut readers = JoinSet::new();
    for _ in 0..4 {
        let service = Arc::clone(&service);
        let done = Arc::clone(&done);
        readers.spawn(async move {
            let mut observations = 0usize;
            loop {
                let snapshot = service.snapshot(1);
                assert_eq!(
                    replay_balance(&snapshot.history),
                    Some(snapshot.balance.amount),
                    "balance and history observed out of step"
                );
                observations += 1;
                if done.load(Ordering::Acquire) {
                    break observations;
                }
                tokio::task::yield_now().await;
            }
        });
    }

    let mut writers = JoinSet::new();
    for n in 0..200 {
        let service = Arc::clone(&service);
        writers.spawn(async move {
            if n % 4 == 3 {
                service.use_points(1, 2).await
            } else {
                service.charge(1, 3).await
            }
        });
    }
    while let Some(joined) = writers.join_next().await {
        let _ = joined?;
    }
    done.store(true, Ordering::Release);

    while let Some(joined) = readers.join_next().await {
        assert!(joined? > 0);
    }
    assert_consistent(&service, 1);

    Ok(())
}
