//! # Sale and Return Types
//!
//! Requests accepted by the coordinator and the immutable records it produces.
//!
//! ## Snapshot Pattern
//! Sale lines freeze the catalog's sku, name and unit price at the moment of
//! sale, so later catalog edits never rewrite history.
//!
//! ## Duplicate Lines
//! ```text
//! request:  [COKE x2, CHIPS x1, COKE x3]
//!                 │
//!                 ▼  merge_line_requests()
//! merged:   [COKE x5, CHIPS x1]      ← first-occurrence order kept
//!                 │
//!                 ▼  canonical_item_order()
//! locking:  [CHIPS, COKE]            ← ascending item id
//! ```

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::Money;
use crate::validation::{validate_quantity, ValidationResult};
use crate::MAX_SALE_LINES;

// =============================================================================
// Payment Metadata
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Physical cash payment.
    #[default]
    Cash,
    /// Card payment on an external terminal.
    ExternalCard,
    /// Mobile wallet / bank transfer settled outside the ledger.
    Wallet,
}

/// Payment details recorded with a sale. Settlement happens elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMeta {
    pub method: PaymentMethod,
    /// External reference (card auth code, wallet transaction id).
    pub reference: Option<String>,
}

// =============================================================================
// Requests
// =============================================================================

/// One requested line of a sale or return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct LineRequest {
    pub item_id: String,
    pub quantity: i64,
}

impl LineRequest {
    pub fn new(item_id: impl Into<String>, quantity: i64) -> Self {
        LineRequest {
            item_id: item_id.into(),
            quantity,
        }
    }
}

/// Checkout request handed to the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SaleRequest {
    pub shop_id: String,
    pub merchant_id: String,
    pub actor_id: String,
    pub lines: Vec<LineRequest>,
    #[serde(default)]
    pub payment: PaymentMeta,
    /// Caller-generated key; a repeated key returns the committed sale.
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

/// Customer return against a committed sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ReturnRequest {
    pub shop_id: String,
    pub sale_id: String,
    pub actor_id: String,
    pub reason: Option<String>,
    pub lines: Vec<LineRequest>,
}

// =============================================================================
// Sale Records
// =============================================================================

/// A line of a committed sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SaleLine {
    /// Position in the (merged) request, starting at 1.
    pub line_no: i64,
    pub item_id: String,
    /// SKU at time of sale (frozen).
    pub sku_snapshot: String,
    /// Item name at time of sale (frozen).
    pub name_snapshot: String,
    pub quantity: i64,
    /// Unit price in cents at time of sale (frozen).
    pub unit_price_cents: i64,
    pub line_total_cents: i64,
}

/// A committed, immutable sale.
///
/// Every line has exactly one `sale` movement entry whose correlation id is
/// the sale id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SaleTransaction {
    pub id: String,
    pub shop_id: String,
    pub merchant_id: String,
    pub actor_id: String,
    pub invoice_number: String,
    pub lines: Vec<SaleLine>,
    pub total_cents: i64,
    pub payment: PaymentMeta,
    pub idempotency_key: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl SaleTransaction {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    /// Quantity of `item_id` sold on this sale (0 if absent).
    pub fn quantity_of(&self, item_id: &str) -> i64 {
        self.lines
            .iter()
            .filter(|line| line.item_id == item_id)
            .map(|line| line.quantity)
            .sum()
    }
}

/// A committed customer return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ReturnReceipt {
    pub id: String,
    pub sale_id: String,
    pub shop_id: String,
    pub lines: Vec<LineRequest>,
    /// New balance per returned item, in line order.
    pub new_quantities: Vec<i64>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Line Merging
// =============================================================================

/// Validates request lines and merges duplicate item ids by summing them.
///
/// ## Rules
/// - At least one line, at most [`MAX_SALE_LINES`] distinct items
/// - Every line quantity must be positive (checked before merging, so a
///   negative line can never cancel out a positive one)
/// - Merged lines keep the order in which each item first appeared
pub fn merge_line_requests(lines: &[LineRequest]) -> ValidationResult<Vec<LineRequest>> {
    if lines.is_empty() {
        return Err(ValidationError::Required {
            field: "lines".to_string(),
        });
    }

    let mut merged: Vec<LineRequest> = Vec::with_capacity(lines.len());
    let mut positions: HashMap<&str, usize> = HashMap::new();

    for line in lines {
        if line.item_id.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "item_id".to_string(),
            });
        }
        validate_quantity(line.quantity)?;

        match positions.get(line.item_id.as_str()) {
            Some(&idx) => {
                let existing = &mut merged[idx];
                existing.quantity = existing.quantity.checked_add(line.quantity).ok_or_else(|| {
                    ValidationError::Overflow {
                        field: "quantity".to_string(),
                    }
                })?;
            }
            None => {
                positions.insert(line.item_id.as_str(), merged.len());
                merged.push(line.clone());
            }
        }
    }

    if merged.len() > MAX_SALE_LINES {
        return Err(ValidationError::OutOfRange {
            field: "lines".to_string(),
            min: 1,
            max: MAX_SALE_LINES as i64,
        });
    }

    Ok(merged)
}

/// Distinct item ids in ascending order: the order in which account locks
/// must be taken.
pub fn canonical_item_order<'a, I>(item_ids: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    item_ids
        .into_iter()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_sums_duplicates_in_first_seen_order() {
        let merged = merge_line_requests(&[
            LineRequest::new("coke", 2),
            LineRequest::new("chips", 1),
            LineRequest::new("coke", 3),
        ])
        .unwrap();

        assert_eq!(
            merged,
            vec![LineRequest::new("coke", 5), LineRequest::new("chips", 1)]
        );
    }

    #[test]
    fn test_merge_rejects_empty_and_non_positive() {
        assert!(matches!(
            merge_line_requests(&[]),
            Err(ValidationError::Required { .. })
        ));
        assert!(matches!(
            merge_line_requests(&[LineRequest::new("coke", 0)]),
            Err(ValidationError::MustBePositive { .. })
        ));
        // A negative duplicate must not be able to net out a positive line.
        assert!(merge_line_requests(&[
            LineRequest::new("coke", 5),
            LineRequest::new("coke", -5)
        ])
        .is_err());
        assert!(matches!(
            merge_line_requests(&[LineRequest::new(" ", 1)]),
            Err(ValidationError::Required { .. })
        ));
    }

    #[test]
    fn test_merge_rejects_too_many_items() {
        let lines: Vec<LineRequest> = (0..=MAX_SALE_LINES)
            .map(|i| LineRequest::new(format!("item-{i}"), 1))
            .collect();
        assert!(matches!(
            merge_line_requests(&lines),
            Err(ValidationError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_canonical_order_sorts_and_dedups() {
        let order = canonical_item_order(["b", "a", "c", "a"]);
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_quantity_of() {
        let sale = SaleTransaction {
            id: "sale-1".to_string(),
            shop_id: "shop".to_string(),
            merchant_id: "m".to_string(),
            actor_id: "clerk".to_string(),
            invoice_number: "INV-2025-0001".to_string(),
            lines: vec![SaleLine {
                line_no: 1,
                item_id: "coke".to_string(),
                sku_snapshot: "COKE".to_string(),
                name_snapshot: "Coke".to_string(),
                quantity: 3,
                unit_price_cents: 150,
                line_total_cents: 450,
            }],
            total_cents: 450,
            payment: PaymentMeta::default(),
            idempotency_key: None,
            created_at: Utc::now(),
        };
        assert_eq!(sale.quantity_of("coke"), 3);
        assert_eq!(sale.quantity_of("chips"), 0);
        assert_eq!(sale.total().cents(), 450);
    }
}
