mod common;

use chrono::{Duration, Utc};
use common::{setup_test_ledger, TTL_MINUTES};
use futures::future::join_all;
use quota_ledger::{
    errors::AppError,
    services::{ExpirySweeper, SweepSummary},
};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reserves_never_overcommit() {
    let ledger = setup_test_ledger().await;
    ledger.create_org("acme", 1000).await;

    let (first, second) = tokio::join!(
        ledger.reservations.reserve("acme", 600, None, None),
        ledger.reservations.reserve("acme", 600, None, None),
    );

    let results = [first, second];
    let granted = results.iter().filter(|r| r.is_ok()).count();
    let rejected = results
        .iter()
        .filter(|r| matches!(r, Err(AppError::QuotaExceeded { requested: 600, available: 400 })))
        .count();

    assert_eq!(granted, 1);
    assert_eq!(rejected, 1);
    ledger.assert_invariants("acme").await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reserves_fill_limit_exactly() {
    let ledger = setup_test_ledger().await;
    ledger.create_org("acme", 1000).await;

    let attempts = (0..25).map(|_| {
        let reservations = ledger.reservations.clone();
        tokio::spawn(async move { reservations.reserve("acme", 100, None, None).await })
    });

    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.expect("task panicked"))
        .collect();

    let granted = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(granted, 10);
    assert!(results
        .iter()
        .filter(|r| r.is_err())
        .all(|r| matches!(r, Err(AppError::QuotaExceeded { .. }))));

    let snapshot = ledger.quota.snapshot("acme").await.unwrap();
    assert_eq!(snapshot.reserved_bytes, 1000);
    assert_eq!(snapshot.available_bytes, 0);
    ledger.assert_invariants("acme").await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_commits_apply_once() {
    let ledger = setup_test_ledger().await;
    ledger.create_org("acme", 1000).await;
    let id = ledger.reservations.reserve("acme", 400, None, None).await.unwrap();

    let attempts = (0..8).map(|i| {
        let reservations = ledger.reservations.clone();
        tokio::spawn(async move {
            if i % 2 == 0 {
                reservations.commit(id).await
            } else {
                reservations.cancel(id).await
            }
        })
    });

    let applied = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.expect("task panicked").unwrap())
        .filter(|resolved| *resolved)
        .count();
    assert_eq!(applied, 1);

    let snapshot = ledger.quota.snapshot("acme").await.unwrap();
    assert_eq!(snapshot.reserved_bytes, 0);
    assert!(snapshot.used_bytes == 400 || snapshot.used_bytes == 0);
    ledger.assert_invariants("acme").await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sweep_racing_commit_resolves_once() {
    let ledger = setup_test_ledger().await;
    ledger.create_org("acme", 1000).await;
    let id = ledger.reservations.reserve("acme", 250, None, None).await.unwrap();
    let later = Utc::now() + Duration::minutes(TTL_MINUTES + 1);

    let (committed, swept) = tokio::join!(
        ledger.reservations.commit(id),
        ledger.reservations.sweep_expired_at("acme", later),
    );

    let committed = committed.unwrap();
    let swept = swept.unwrap();
    assert!(committed ^ (swept == 250));

    let snapshot = ledger.quota.snapshot("acme").await.unwrap();
    assert_eq!(snapshot.reserved_bytes, 0);
    assert_eq!(snapshot.used_bytes, if committed { 250 } else { 0 });
}

#[tokio::test]
async fn test_sweeper_pass_covers_every_organization() {
    let ledger = setup_test_ledger().await;
    ledger.create_org("acme", 1000).await;
    ledger.create_org("globex", 1000).await;
    ledger.create_org("initech", 1000).await;

    ledger.reservations.reserve("acme", 100, None, None).await.unwrap();
    ledger.reservations.reserve("acme", 150, None, None).await.unwrap();
    ledger.reservations.reserve("globex", 300, None, None).await.unwrap();
    let kept = ledger.reservations.reserve("initech", 50, None, None).await.unwrap();
    ledger.reservations.commit(kept).await.unwrap();

    let sweeper = ExpirySweeper::new(
        ledger.database.ledger(),
        ledger.reservations.clone(),
        std::time::Duration::from_secs(60),
    );

    assert_eq!(sweeper.sweep_all().await.unwrap(), SweepSummary::default());

    let later = Utc::now() + Duration::minutes(TTL_MINUTES + 1);
    let summary = sweeper.sweep_all_at(later).await.unwrap();
    assert_eq!(
        summary,
        SweepSummary {
            organizations: 2,
            bytes_reclaimed: 550,
            failures: 0,
        }
    );

    for org in ["acme", "globex", "initech"] {
        assert_eq!(ledger.quota.snapshot(org).await.unwrap().reserved_bytes, 0);
    }
    assert_eq!(ledger.quota.snapshot("initech").await.unwrap().used_bytes, 50);
}

#[tokio::test]
async fn test_sweeper_stops_on_cancellation() {
    let ledger = setup_test_ledger().await;
    let sweeper = ExpirySweeper::new(
        ledger.database.ledger(),
        ledger.reservations.clone(),
        std::time::Duration::from_millis(10),
    );

    let shutdown = tokio_util::sync::CancellationToken::new();
    let handle = sweeper.spawn(shutdown.clone());
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    shutdown.cancel();

    tokio::time::timeout(std::time::Duration::from_secs(5), handle)
        .await
        .expect("sweeper did not stop")
        .expect("sweeper panicked");
}
