//! # Domain Types
//!
//! Stock accounts, ledger entries and the collaborator records the ledger
//! consumes.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Ledger Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌──────────────────────┐   ┌────────────────┐   │
//! │  │  StockAccount   │   │    MovementEntry     │   │ MovementKind   │   │
//! │  │  ─────────────  │   │  ──────────────────  │   │ ────────────── │   │
//! │  │  shop_id  ┐ key │◄──│  shop_id, item_id    │   │ StockIn        │   │
//! │  │  item_id  ┘     │   │  quantity_delta      │   │ Sale           │   │
//! │  │  quantity       │   │  resulting_quantity  │   │ Return         │   │
//! │  │  (cache of Σ)   │   │  correlation_id      │   │ Adjustment     │   │
//! │  └─────────────────┘   └──────────────────────┘   └────────────────┘   │
//! │                                                                         │
//! │  quantity == Σ quantity_delta  (the ledger is the source of truth)     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Movement Kind
// =============================================================================

/// Why a stock quantity changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    /// Goods received into the shop.
    StockIn,
    /// Units sold at checkout.
    Sale,
    /// Units returned by a customer against an earlier sale.
    Return,
    /// Manual correction (shrinkage, damage, found stock).
    Adjustment,
}

impl MovementKind {
    /// Storage / wire name of the kind.
    pub const fn as_str(&self) -> &'static str {
        match self {
            MovementKind::StockIn => "stock_in",
            MovementKind::Sale => "sale",
            MovementKind::Return => "return",
            MovementKind::Adjustment => "adjustment",
        }
    }

    /// Whether a movement of this kind must carry a reason.
    pub const fn requires_reason(&self) -> bool {
        matches!(self, MovementKind::Adjustment)
    }
}

impl std::fmt::Display for MovementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Stock Account
// =============================================================================

/// Quantity on hand of one item in one shop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct StockAccount {
    pub shop_id: String,
    pub item_id: String,
    /// Never negative.
    pub quantity: i64,
    /// `None` until the first movement is recorded.
    #[ts(as = "Option<String>")]
    pub last_movement_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Movement Entry
// =============================================================================

/// One immutable, signed quantity change in the audit ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct MovementEntry {
    /// Store-assigned, strictly increasing.
    pub id: i64,
    pub shop_id: String,
    pub item_id: String,
    /// Who or what caused the movement. Supplied by the caller.
    pub actor_id: String,
    pub kind: MovementKind,
    /// Positive = increase.
    pub quantity_delta: i64,
    /// Balance of the account right after this entry was written.
    pub resulting_quantity: i64,
    pub reason: Option<String>,
    #[ts(as = "String")]
    pub occurred_at: DateTime<Utc>,
    /// Groups all entries written by one logical transaction.
    pub correlation_id: String,
}

impl MovementEntry {
    /// Balance the account held right before this entry.
    #[inline]
    pub fn previous_quantity(&self) -> i64 {
        self.resulting_quantity - self.quantity_delta
    }
}

/// A movement that has not been appended yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMovement {
    pub shop_id: String,
    pub item_id: String,
    pub actor_id: String,
    pub kind: MovementKind,
    pub quantity_delta: i64,
    pub resulting_quantity: i64,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub correlation_id: String,
}

// =============================================================================
// History Pagination
// =============================================================================

/// Order in which ledger history is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum HistoryOrder {
    #[default]
    OldestFirst,
    NewestFirst,
}

/// Page of ledger history to read.
///
/// The limit is clamped to `1..=MAX_LIMIT` whichever way the value was
/// built, deserialized ones included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    limit: u32,
    offset: u32,
    order: HistoryOrder,
}

impl Pagination {
    /// Largest page a caller may request.
    pub const MAX_LIMIT: u32 = 500;

    pub fn new(limit: u32, offset: u32, order: HistoryOrder) -> Self {
        Pagination {
            limit: limit.clamp(1, Self::MAX_LIMIT),
            offset,
            order,
        }
    }

    pub fn oldest_first(limit: u32) -> Self {
        Self::new(limit, 0, HistoryOrder::OldestFirst)
    }

    pub fn newest_first(limit: u32) -> Self {
        Self::new(limit, 0, HistoryOrder::NewestFirst)
    }

    pub fn limit(&self) -> u32 {
        self.limit.clamp(1, Self::MAX_LIMIT)
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn order(&self) -> HistoryOrder {
        self.order
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Pagination::oldest_first(50)
    }
}

// =============================================================================
// Operation Results
// =============================================================================

/// Outcome of a single-item stock operation (stock-in or adjustment).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct StockChange {
    pub shop_id: String,
    pub item_id: String,
    pub previous_quantity: i64,
    pub new_quantity: i64,
    /// Ledger entry written for this change.
    pub entry_id: i64,
    pub correlation_id: String,
}

/// Raised after commit when an operation moved a balance below its threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct LowStockAlert {
    pub shop_id: String,
    pub item_id: String,
    pub previous_quantity: i64,
    pub new_quantity: i64,
    pub low_stock_threshold: i64,
}

/// An account whose cached quantity disagrees with its ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct BalanceMismatch {
    pub shop_id: String,
    pub item_id: String,
    pub account_quantity: i64,
    pub ledger_quantity: i64,
}

// =============================================================================
// Collaborator Records
// =============================================================================

/// Item data supplied by the external catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CatalogItem {
    pub id: String,
    pub merchant_id: String,
    pub sku: String,
    pub name: String,
    pub unit_price_cents: i64,
    /// Balance below which a low-stock alert is raised.
    pub low_stock_threshold: Option<i64>,
}

impl CatalogItem {
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }
}

/// Shop identity supplied by the external shop directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Shop {
    pub id: String,
    pub merchant_id: String,
    pub is_active: bool,
}

// =============================================================================
// Unit Tests
// =============================================================================
