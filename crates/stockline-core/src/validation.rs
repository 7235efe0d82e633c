//! # Validation Module
//!
//! Input validation for coordinator requests.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: THIS MODULE (before any lock is taken)                       │
//! │  ├── identifiers present, quantities positive, reasons non-empty       │
//! │  └── cheap, rejected requests never touch the store                    │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Coordinator (under lock)                                     │
//! │  └── resulting balances must stay >= 0                                 │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK (quantity >= 0), CHECK (quantity_delta <> 0)                │
//! │  └── UNIQUE invoice_number / idempotency_key, append-only triggers     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::MAX_REASON_LENGTH;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Longest identifier (shop, item, actor, idempotency key) accepted.
pub const MAX_IDENTIFIER_LENGTH: usize = 128;

// =============================================================================
// String Validators
// =============================================================================

/// Validates an opaque identifier such as a shop, item or actor id.
///
/// ## Rules
/// - Must not be empty or whitespace
/// - At most [`MAX_IDENTIFIER_LENGTH`] characters
pub fn validate_identifier(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.len() > MAX_IDENTIFIER_LENGTH {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_IDENTIFIER_LENGTH,
        });
    }

    Ok(())
}

/// Validates an adjustment reason and returns it trimmed.
///
/// ## Example
/// ```rust
/// use stockline_core::validation::validate_reason;
///
/// assert_eq!(validate_reason("  damaged ").unwrap(), "damaged");
/// assert!(validate_reason("   ").is_err());
/// ```
pub fn validate_reason(reason: &str) -> ValidationResult<String> {
    let reason = reason.trim();

    if reason.is_empty() {
        return Err(ValidationError::Required {
            field: "reason".to_string(),
        });
    }

    if reason.len() > MAX_REASON_LENGTH {
        return Err(ValidationError::TooLong {
            field: "reason".to_string(),
            max: MAX_REASON_LENGTH,
        });
    }

    Ok(reason.to_string())
}

/// Validates a sequence scope key such as `INV-2025`.
///
/// ## Rules
/// - Must not be empty, at most 64 characters
/// - Letters, numbers, hyphens and underscores only
pub fn validate_scope_key(scope: &str) -> ValidationResult<()> {
    if scope.is_empty() {
        return Err(ValidationError::Required {
            field: "scope".to_string(),
        });
    }

    if scope.len() > 64 {
        return Err(ValidationError::TooLong {
            field: "scope".to_string(),
            max: 64,
        });
    }

    if !scope
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "scope".to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a unit quantity (sale line, stock-in, return line).
///
/// ## Rules
/// - Must be positive (> 0)
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    Ok(())
}

/// Validates a signed adjustment delta.
///
/// ## Rules
/// - Must not be zero (a zero movement would be a ledger entry with no effect)
/// - `i64::MIN` is rejected so the delta can always be negated
pub fn validate_delta(delta: i64) -> ValidationResult<()> {
    if delta == 0 {
        return Err(ValidationError::MustBeNonZero {
            field: "delta".to_string(),
        });
    }

    if delta == i64::MIN {
        return Err(ValidationError::Overflow {
            field: "delta".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
