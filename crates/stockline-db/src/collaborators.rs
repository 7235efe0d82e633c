//! # Collaborators
//!
//! The systems the coordinator consults but does not own.
//!
//! ```text
//! ┌──────────────────┐   get_item()    ┌──────────────────────────────┐
//! │     Catalog      │ ◄────────────── │                              │
//! └──────────────────┘                 │                              │
//! ┌──────────────────┐   get_shop()    │      StockCoordinator        │
//! │  ShopDirectory   │ ◄────────────── │                              │
//! └──────────────────┘                 │                              │
//! ┌──────────────────┐  notify()       │                              │
//! │ LowStockNotifier │ ◄── after commit│                              │
//! └──────────────────┘                 └──────────────────────────────┘
//! ```
//!
//! Catalog and directory lookups happen before any lock is taken.
//! Notifications are sent after commit; a failing notifier is logged and
//! never undoes the operation that triggered it.

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use stockline_core::{CatalogItem, LowStockAlert, Shop};

use crate::coordinator::LedgerResult;

/// Item master data. Returns `NotFound` for unknown or archived items.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn get_item(&self, item_id: &str) -> LedgerResult<CatalogItem>;
}

/// Shop identity and status. Returns `NotFound` for unknown shops.
#[async_trait]
pub trait ShopDirectory: Send + Sync {
    async fn get_shop(&self, shop_id: &str) -> LedgerResult<Shop>;
}

/// Notification delivery failed. Never propagated to coordinator callers.
#[derive(Debug, Error)]
#[error("Notification failed: {0}")]
pub struct NotifyError(pub String);

/// Receives low-stock alerts once the triggering operation has committed.
#[async_trait]
pub trait LowStockNotifier: Send + Sync {
    async fn notify(&self, alert: &LowStockAlert) -> Result<(), NotifyError>;
}

/// Default notifier: writes the alert to the log.
///
/// Alerts are also recorded in the stock outbox, so a deployment that
/// relays the outbox does not need another notifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl LowStockNotifier for LogNotifier {
    async fn notify(&self, alert: &LowStockAlert) -> Result<(), NotifyError> {
        warn!(
            shop_id = %alert.shop_id,
            item_id = %alert.item_id,
            quantity = alert.new_quantity,
            threshold = alert.low_stock_threshold,
            "Stock below threshold"
        );
        Ok(())
    }
}
