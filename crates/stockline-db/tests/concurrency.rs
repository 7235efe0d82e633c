//! Contention behaviour: lost updates, deadlock freedom, lock timeouts and
//! gap-free numbering, against a multi-connection WAL database.

mod common;

use std::collections::BTreeSet;
use std::time::Duration;

use common::*;
use stockline_core::{MovementKind, Pagination};
use stockline_db::{CoordinatorSettings, ErrorCode, LedgerError};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_two_concurrent_sales_of_last_units() {
    let t = TestDb::new().await;
    let coordinator = t.coordinator();
    coordinator.apply_stock_in(SHOP, COKE, 2, ACTOR).await.unwrap();

    let a = tokio::spawn({
        let c = coordinator.clone();
        async move { c.apply_sale(sale(SHOP, &[(COKE, 1)])).await }
    });
    let b = tokio::spawn({
        let c = coordinator.clone();
        async move { c.apply_sale(sale(SHOP, &[(COKE, 1)])).await }
    });
    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    assert_eq!(t.balance(SHOP, COKE).await, 0);
    let history = t.db.ledger().history(SHOP, COKE, Pagination::default()).await.unwrap();
    let results: Vec<i64> = history
        .iter()
        .filter(|e| e.kind == MovementKind::Sale)
        .map(|e| e.resulting_quantity)
        .collect();
    assert_eq!(results, vec![1, 0]);
    t.assert_consistent(SHOP).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_no_lost_updates_and_no_oversell() {
    let t = TestDb::new().await;
    let coordinator = t.coordinator();
    coordinator.apply_stock_in(SHOP, COKE, 15, ACTOR).await.unwrap();

    let handles: Vec<_> = (0..20)
        .map(|_| {
            let c = coordinator.clone();
            tokio::spawn(async move { c.apply_sale(sale(SHOP, &[(COKE, 1)])).await })
        })
        .collect();

    let mut committed = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => committed += 1,
            Err(LedgerError::InsufficientStock { .. }) => rejected += 1,
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    assert_eq!(committed, 15);
    assert_eq!(rejected, 5);
    assert_eq!(t.balance(SHOP, COKE).await, 0);
    assert_eq!(t.entry_count(SHOP, COKE).await, 16);

    let invoices: BTreeSet<String> = t
        .db
        .sales()
        .list_for_shop(SHOP, 100)
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.invoice_number)
        .collect();
    let expected: BTreeSet<String> = (1..=15).map(invoice).collect();
    assert_eq!(invoices, expected);
    t.assert_consistent(SHOP).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_overlapping_multi_item_sales_do_not_deadlock() {
    let t = TestDb::new().await;
    let coordinator = t.coordinator();
    for item in [COKE, CHIPS, WATER] {
        coordinator.apply_stock_in(SHOP, item, 100, ACTOR).await.unwrap();
    }

    // Opposite request orders; locks are still taken in item order.
    let handles: Vec<_> = (0..12)
        .map(|i| {
            let c = coordinator.clone();
            let lines: &[(&str, i64)] = if i % 2 == 0 {
                &[(COKE, 1), (CHIPS, 1), (WATER, 1)]
            } else {
                &[(WATER, 1), (CHIPS, 1), (COKE, 1)]
            };
            let request = sale(SHOP, lines);
            tokio::spawn(async move { c.apply_sale(request).await })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    for item in [COKE, CHIPS, WATER] {
        assert_eq!(t.balance(SHOP, item).await, 88);
    }
    t.assert_consistent(SHOP).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_idempotent_retries_commit_once() {
    let t = TestDb::new().await;
    let coordinator = t.coordinator();
    coordinator.apply_stock_in(SHOP, COKE, 10, ACTOR).await.unwrap();

    let mut request = sale(SHOP, &[(COKE, 1)]);
    request.idempotency_key = Some("retry-storm".to_string());

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let c = coordinator.clone();
            let request = request.clone();
            tokio::spawn(async move { c.apply_sale(request).await })
        })
        .collect();

    let mut ids = BTreeSet::new();
    for handle in handles {
        ids.insert(handle.await.unwrap().unwrap().id);
    }

    assert_eq!(ids.len(), 1);
    assert_eq!(t.balance(SHOP, COKE).await, 9);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sequence_values_are_contiguous_under_contention() {
    let t = TestDb::new().await;
    let sequences = t.db.sequences();

    let handles: Vec<_> = (0..100)
        .map(|_| {
            let s = sequences.clone();
            tokio::spawn(async move { s.next("INV-2025").await })
        })
        .collect();

    let mut values = BTreeSet::new();
    for handle in handles {
        assert!(values.insert(handle.await.unwrap().unwrap()));
    }

    assert_eq!(values, (1..=100).collect::<BTreeSet<i64>>());
    assert_eq!(sequences.current("INV-2025").await.unwrap(), 100);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_busy_database_reports_concurrency_timeout() {
    let t = TestDb::with_pool(4, Duration::from_millis(200)).await;
    let coordinator = t.coordinator_with(CoordinatorSettings {
        lock_timeout: Duration::from_secs(1),
        ..CoordinatorSettings::default()
    });
    coordinator.apply_stock_in(SHOP, COKE, 5, ACTOR).await.unwrap();

    // Another writer holds SQLite's write lock; SQLite gives up first.
    let mut blocker = t.db.pool().begin().await.unwrap();
    sqlx::query("UPDATE stock_accounts SET last_movement_at = last_movement_at WHERE shop_id = ?1")
        .bind(SHOP)
        .execute(&mut *blocker)
        .await
        .unwrap();

    let err = coordinator.apply_sale(sale(SHOP, &[(COKE, 1)])).await.unwrap_err();
    match &err {
        LedgerError::ConcurrencyTimeout { shop_id, .. } => assert_eq!(shop_id, SHOP),
        other => panic!("expected ConcurrencyTimeout, got {other:?}"),
    }
    assert_eq!(err.code(), ErrorCode::ConcurrencyTimeout);
    assert!(err.is_retryable());

    blocker.rollback().await.unwrap();

    assert_eq!(t.balance(SHOP, COKE).await, 5);
    let sale = coordinator.apply_sale(sale(SHOP, &[(COKE, 1)])).await.unwrap();
    assert_eq!(sale.invoice_number, invoice(1));
    assert_eq!(t.balance(SHOP, COKE).await, 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_lock_timeout_elapses_before_sqlite_gives_up() {
    let t = TestDb::with_pool(4, Duration::from_secs(5)).await;
    let coordinator = t.coordinator_with(CoordinatorSettings {
        lock_timeout: Duration::from_millis(300),
        ..CoordinatorSettings::default()
    });
    coordinator.apply_stock_in(SHOP, COKE, 5, ACTOR).await.unwrap();

    // SQLite would keep waiting for 5s; the coordinator stops at 300ms.
    let mut blocker = t.db.pool().begin().await.unwrap();
    sqlx::query("UPDATE stock_accounts SET last_movement_at = last_movement_at WHERE shop_id = ?1")
        .bind(SHOP)
        .execute(&mut *blocker)
        .await
        .unwrap();

    let err = coordinator.apply_sale(sale(SHOP, &[(COKE, 1)])).await.unwrap_err();
    match &err {
        LedgerError::ConcurrencyTimeout { shop_id, waited_ms } => {
            assert_eq!(shop_id, SHOP);
            assert!(*waited_ms >= 300, "returned after {waited_ms} ms");
            assert!(*waited_ms < 5_000, "waited for SQLite's busy timeout: {waited_ms} ms");
        }
        other => panic!("expected ConcurrencyTimeout, got {other:?}"),
    }
    assert!(err.is_retryable());

    blocker.rollback().await.unwrap();

    let sale = coordinator.apply_sale(sale(SHOP, &[(COKE, 1)])).await.unwrap();
    assert_eq!(sale.invoice_number, invoice(1));
    assert_eq!(t.balance(SHOP, COKE).await, 4);
    assert_eq!(t.entry_count(SHOP, COKE).await, 2);
    t.assert_consistent(SHOP).await;
}
