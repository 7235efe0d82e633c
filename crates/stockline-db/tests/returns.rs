//! Customer returns against committed sales.

mod common;

use common::*;
use stockline_core::{LineRequest, MovementKind, ReturnRequest, SaleTransaction, ValidationError};
use stockline_db::{ErrorCode, LedgerError, StockCoordinator};

fn return_of(sale: &SaleTransaction, lines: &[(&str, i64)], reason: Option<&str>) -> ReturnRequest {
    ReturnRequest {
        shop_id: sale.shop_id.clone(),
        sale_id: sale.id.clone(),
        actor_id: ACTOR.to_string(),
        reason: reason.map(str::to_string),
        lines: lines
            .iter()
            .map(|(item, qty)| LineRequest::new(*item, *qty))
            .collect(),
    }
}

async fn sold(t: &TestDb) -> (StockCoordinator, SaleTransaction) {
    let coordinator = t.coordinator();
    coordinator.apply_stock_in(SHOP, COKE, 10, ACTOR).await.unwrap();
    coordinator.apply_stock_in(SHOP, CHIPS, 10, ACTOR).await.unwrap();
    let sale = coordinator
        .apply_sale(sale(SHOP, &[(COKE, 3), (CHIPS, 2)]))
        .await
        .unwrap();
    (coordinator, sale)
}

#[tokio::test]
async fn test_return_restocks_and_records_entries() {
    let t = TestDb::new().await;
    let (coordinator, sale) = sold(&t).await;

    let receipt = coordinator
        .apply_return(return_of(&sale, &[(COKE, 2)], Some("wrong flavour")))
        .await
        .unwrap();

    assert_eq!(receipt.sale_id, sale.id);
    assert_eq!(receipt.new_quantities, vec![9]);
    assert_eq!(t.balance(SHOP, COKE).await, 9);

    let entries = t.db.ledger().entries_for_correlation(&receipt.id).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].kind, MovementKind::Return);
    assert_eq!(entries[0].quantity_delta, 2);
    assert_eq!(entries[0].reason.as_deref(), Some("wrong flavour"));

    assert_eq!(t.db.sales().returned_quantity(&sale.id, COKE).await.unwrap(), 2);
    assert_eq!(t.db.outbox().for_aggregate(&receipt.id).await.unwrap().len(), 1);
    t.assert_consistent(SHOP).await;
}

#[tokio::test]
async fn test_return_without_reason_references_invoice() {
    let t = TestDb::new().await;
    let (coordinator, sale) = sold(&t).await;

    let receipt = coordinator
        .apply_return(return_of(&sale, &[(CHIPS, 1)], None))
        .await
        .unwrap();

    let entries = t.db.ledger().entries_for_correlation(&receipt.id).await.unwrap();
    assert_eq!(
        entries[0].reason.as_deref(),
        Some(format!("Return against {}", sale.invoice_number).as_str())
    );
}

#[tokio::test]
async fn test_cannot_return_more_than_sold_across_returns() {
    let t = TestDb::new().await;
    let (coordinator, sale) = sold(&t).await;

    coordinator
        .apply_return(return_of(&sale, &[(COKE, 2)], None))
        .await
        .unwrap();

    let err = coordinator
        .apply_return(return_of(&sale, &[(COKE, 2)], None))
        .await
        .unwrap_err();
    match err {
        LedgerError::Validation(ValidationError::ExceedsReturnable {
            requested,
            returnable,
            ..
        }) => {
            assert_eq!(requested, 2);
            assert_eq!(returnable, 1);
        }
        other => panic!("expected ExceedsReturnable, got {other:?}"),
    }
    assert_eq!(t.balance(SHOP, COKE).await, 9);

    coordinator
        .apply_return(return_of(&sale, &[(COKE, 1)], None))
        .await
        .unwrap();
    assert_eq!(t.balance(SHOP, COKE).await, 10);
}

#[tokio::test]
async fn test_return_rejects_foreign_items_and_sales() {
    let t = TestDb::new().await;
    let (coordinator, sale) = sold(&t).await;

    let err = coordinator
        .apply_return(return_of(&sale, &[(WATER, 1)], None))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(ValidationError::NotOnSale { .. })));

    let mut request = return_of(&sale, &[(COKE, 1)], None);
    request.shop_id = OTHER_SHOP.to_string();
    let err = coordinator.apply_return(request).await.unwrap_err();
    assert!(matches!(err, LedgerError::NotFound { ref entity, .. } if entity == "Sale"));

    let mut request = return_of(&sale, &[(COKE, 1)], None);
    request.sale_id = "no-such-sale".to_string();
    let err = coordinator.apply_return(request).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);

    let err = coordinator
        .apply_return(return_of(&sale, &[(COKE, 0)], None))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ValidationError);

    assert_eq!(t.balance(SHOP, COKE).await, 7);
}

#[tokio::test]
async fn test_partial_failure_returns_nothing() {
    let t = TestDb::new().await;
    let (coordinator, sale) = sold(&t).await;

    let err = coordinator
        .apply_return(return_of(&sale, &[(COKE, 1), (CHIPS, 5)], None))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        LedgerError::Validation(ValidationError::ExceedsReturnable { .. })
    ));
    assert_eq!(t.balance(SHOP, COKE).await, 7);
    assert_eq!(t.balance(SHOP, CHIPS).await, 8);
    assert_eq!(t.db.sales().returned_quantity(&sale.id, COKE).await.unwrap(), 0);
}
