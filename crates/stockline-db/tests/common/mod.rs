//! Shared fixture for the integration tests: a throwaway on-disk WAL
//! database with one merchant, two shops and a small catalog.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Datelike, Utc};
use stockline_core::{CatalogItem, LineRequest, LowStockAlert, PaymentMeta, SaleRequest, Shop};
use stockline_db::{
    CoordinatorSettings, Database, DbConfig, LowStockNotifier, NotifyError, StockCoordinator,
};
use uuid::Uuid;

pub const MERCHANT: &str = "merchant-1";
pub const OTHER_MERCHANT: &str = "merchant-2";
pub const SHOP: &str = "shop-1";
pub const OTHER_SHOP: &str = "shop-2";
pub const CLOSED_SHOP: &str = "shop-closed";
pub const ACTOR: &str = "clerk-7";

pub const COKE: &str = "coke";
pub const CHIPS: &str = "chips";
pub const WATER: &str = "water";
/// Belongs to [`OTHER_MERCHANT`].
pub const FOREIGN: &str = "foreign-tea";

pub struct TestDb {
    pub db: Database,
    path: PathBuf,
}

impl TestDb {
    /// Fresh database file in the temp dir with `connections` pooled
    /// connections and the given busy timeout.
    pub async fn with_pool(connections: u32, busy_timeout: Duration) -> Self {
        let path = std::env::temp_dir().join(format!("stockline-test-{}.db", Uuid::new_v4()));
        let config = DbConfig::new(&path)
            .max_connections(connections)
            .min_connections(1)
            .busy_timeout(busy_timeout);

        let db = Database::new(config).await.unwrap();
        seed(&db).await;

        TestDb { db, path }
    }

    pub async fn new() -> Self {
        Self::with_pool(8, Duration::from_secs(5)).await
    }

    pub fn coordinator(&self) -> StockCoordinator {
        self.db.coordinator()
    }

    pub fn coordinator_with(&self, settings: CoordinatorSettings) -> StockCoordinator {
        self.db.coordinator_with(settings)
    }

    pub async fn balance(&self, shop_id: &str, item_id: &str) -> i64 {
        self.db.accounts().get_balance(shop_id, item_id).await.unwrap()
    }

    pub async fn entry_count(&self, shop_id: &str, item_id: &str) -> usize {
        self.db
            .ledger()
            .history(shop_id, item_id, stockline_core::Pagination::oldest_first(500))
            .await
            .unwrap()
            .len()
    }

    /// Asserts that every account of `shop_id` equals its ledger sum.
    pub async fn assert_consistent(&self, shop_id: &str) {
        let mismatches = self.db.ledger().verify_shop(shop_id).await.unwrap();
        assert!(mismatches.is_empty(), "ledger mismatches: {mismatches:?}");
    }
}

impl Drop for TestDb {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let mut file = self.path.clone().into_os_string();
            file.push(suffix);
            let _ = std::fs::remove_file(file);
        }
    }
}

async fn seed(db: &Database) {
    let shops = db.shops();
    for (id, merchant, active) in [
        (SHOP, MERCHANT, true),
        (OTHER_SHOP, MERCHANT, true),
        (CLOSED_SHOP, MERCHANT, false),
    ] {
        let shop = Shop {
            id: id.to_string(),
            merchant_id: merchant.to_string(),
            is_active: active,
        };
        shops.insert(&shop, id).await.unwrap();
    }

    let catalog = db.catalog();
    for (id, merchant, price, threshold) in [
        (COKE, MERCHANT, 150, Some(5)),
        (CHIPS, MERCHANT, 210, None),
        (WATER, MERCHANT, 90, Some(3)),
        (FOREIGN, OTHER_MERCHANT, 300, None),
    ] {
        let item = CatalogItem {
            id: id.to_string(),
            merchant_id: merchant.to_string(),
            sku: id.to_uppercase(),
            name: id.to_string(),
            unit_price_cents: price,
            low_stock_threshold: threshold,
        };
        catalog.insert(&item).await.unwrap();
    }
}

pub fn sale(shop_id: &str, lines: &[(&str, i64)]) -> SaleRequest {
    SaleRequest {
        shop_id: shop_id.to_string(),
        merchant_id: MERCHANT.to_string(),
        actor_id: ACTOR.to_string(),
        lines: lines
            .iter()
            .map(|(item, qty)| LineRequest::new(*item, *qty))
            .collect(),
        payment: PaymentMeta::default(),
        idempotency_key: None,
    }
}

/// Invoice number `n` of the current year.
pub fn invoice(n: i64) -> String {
    format!("INV-{}-{:04}", Utc::now().year(), n)
}

/// Sequence scope behind this year's invoice numbers.
pub fn invoice_scope() -> String {
    format!("INV-{}", Utc::now().year())
}

// =============================================================================
// Notifier doubles
// =============================================================================

#[derive(Default)]
pub struct RecordingNotifier {
    pub alerts: Mutex<Vec<LowStockAlert>>,
}

impl RecordingNotifier {
    pub fn take(&self) -> Vec<LowStockAlert> {
        std::mem::take(&mut *self.alerts.lock().unwrap())
    }
}

#[async_trait]
impl LowStockNotifier for RecordingNotifier {
    async fn notify(&self, alert: &LowStockAlert) -> Result<(), NotifyError> {
        self.alerts.lock().unwrap().push(alert.clone());
        Ok(())
    }
}

pub struct FailingNotifier;

#[async_trait]
impl LowStockNotifier for FailingNotifier {
    async fn notify(&self, _alert: &LowStockAlert) -> Result<(), NotifyError> {
        Err(NotifyError("pager offline".to_string()))
    }
}

pub fn recording() -> Arc<RecordingNotifier> {
    Arc::new(RecordingNotifier::default())
}
