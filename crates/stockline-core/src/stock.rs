//! # Stock Rules
//!
//! The two decisions the coordinator makes about balances, kept pure so they
//! can be tested without a database:
//!
//! - [`find_shortfalls`]: would any requested decrement drive a balance
//!   negative?
//! - [`crossed_low_stock`]: did this operation move a balance from at-or-above
//!   its threshold to below it?

use crate::error::StockShortfall;

/// A requested change against the balance currently held for one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceCheck<'a> {
    pub item_id: &'a str,
    pub available: i64,
    /// Signed change; negative for sales and shrinkage.
    pub delta: i64,
}

impl BalanceCheck<'_> {
    /// Balance after the change, `None` on overflow.
    pub fn resulting(&self) -> Option<i64> {
        self.available.checked_add(self.delta)
    }
}

/// Returns every check whose resulting balance would be negative.
///
/// An empty result means the whole operation may be applied.
///
/// ## Example
/// ```rust
/// use stockline_core::stock::{find_shortfalls, BalanceCheck};
///
/// let short = find_shortfalls(&[
///     BalanceCheck { item_id: "coke", available: 10, delta: -3 },
///     BalanceCheck { item_id: "chips", available: 1, delta: -2 },
/// ]);
/// assert_eq!(short.len(), 1);
/// assert_eq!(short[0].item_id, "chips");
/// assert_eq!(short[0].requested, 2);
/// ```
pub fn find_shortfalls(checks: &[BalanceCheck<'_>]) -> Vec<StockShortfall> {
    checks
        .iter()
        .filter(|check| check.resulting().map_or(true, |q| q < 0))
        .map(|check| StockShortfall {
            item_id: check.item_id.to_string(),
            requested: check.delta.checked_neg().unwrap_or(i64::MAX),
            available: check.available,
        })
        .collect()
}

/// Whether moving from `previous` to `new` crossed below `threshold`.
///
/// Fires only on the crossing itself: an account that was already below the
/// threshold does not alert again on further decrements.
#[inline]
pub fn crossed_low_stock(previous: i64, new: i64, threshold: Option<i64>) -> bool {
    match threshold {
        Some(threshold) => previous >= threshold && new < threshold,
        None => false,
    }
}
