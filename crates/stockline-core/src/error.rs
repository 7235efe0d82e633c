//! # Error Types
//!
//! Domain-specific error types for stockline-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  stockline-core errors (this file)                                     │
//! │  ├── ValidationError  - Input validation failures                      │
//! │  └── StockShortfall   - One short line, carried by InsufficientStock   │
//! │                                                                         │
//! │  stockline-db errors (separate crate)                                  │
//! │  ├── DbError          - Storage failures                               │
//! │  └── LedgerError      - What coordinator callers see                   │
//! │                                                                         │
//! │  Flow: ValidationError → LedgerError → caller                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

// =============================================================================
// Stock Shortfall
// =============================================================================

/// One line item that could not be satisfied from the shop's stock.
///
/// A failed checkout reports every short line, so the point-of-sale UI can
/// highlight all of them at once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct StockShortfall {
    pub item_id: String,
    pub requested: i64,
    pub available: i64,
}

impl std::fmt::Display for StockShortfall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (requested {}, available {})",
            self.item_id, self.requested, self.available
        )
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Always fixable by the caller; never retried automatically.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be zero.
    #[error("{field} must not be zero")]
    MustBeNonZero { field: String },

    /// Invalid format.
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// A referenced entity belongs to a different merchant.
    #[error("{entity} '{id}' does not belong to merchant {merchant_id}")]
    MerchantMismatch {
        entity: String,
        id: String,
        merchant_id: String,
    },

    /// Arithmetic on the request would overflow.
    #[error("{field} is too large")]
    Overflow { field: String },

    /// A return names an item the original sale did not contain.
    #[error("Item {item_id} was not sold on sale {sale_id}")]
    NotOnSale { item_id: String, sale_id: String },

    /// A return asks for more units than remain returnable.
    #[error("Cannot return {requested} of {item_id}: only {returnable} returnable")]
    ExceedsReturnable {
        item_id: String,
        requested: i64,
        returnable: i64,
    },
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shortfall_display() {
        let short = StockShortfall {
            item_id: "COKE-330".to_string(),
            requested: 5,
            available: 3,
        };
        assert_eq!(short.to_string(), "COKE-330 (requested 5, available 3)");
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::Required {
            field: "reason".to_string(),
        };
        assert_eq!(err.to_string(), "reason is required");

        let err = ValidationError::MustBeNonZero {
            field: "delta".to_string(),
        };
        assert_eq!(err.to_string(), "delta must not be zero");
    }
}
