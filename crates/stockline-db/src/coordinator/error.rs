//! # Ledger Error Type
//!
//! The single error type returned by every coordinator operation.
//!
//! ## Error Handling Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    What Callers See                                     │
//! │                                                                         │
//! │  ValidationError ─┐                                                    │
//! │                   ├──► LedgerError ──► code() ──► VALIDATION_ERROR     │
//! │  DbError ─────────┘        │                      INSUFFICIENT_STOCK   │
//! │                            │                      NOT_FOUND            │
//! │                            │                      SHOP_INACTIVE        │
//! │                            │                      CONCURRENCY_TIMEOUT  │
//! │                            │                      CONSISTENCY_VIOLATION│
//! │                            │                      STORAGE_ERROR        │
//! │                            ▼                                            │
//! │                   is_retryable()?                                      │
//! │                   only CONCURRENCY_TIMEOUT                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every variant is returned *after* the transaction has been rolled back:
//! no caller ever sees a partially applied operation.

use serde::Serialize;
use thiserror::Error;

use stockline_core::{StockShortfall, ValidationError};

use crate::error::DbError;

fn join_shortfalls(shortfalls: &[StockShortfall]) -> String {
    shortfalls
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors returned by [`StockCoordinator`](super::StockCoordinator).
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The request is malformed. Fix the input; never retry as-is.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// One or more decrements would drive a balance negative.
    /// Lists every short item, not just the first.
    #[error("Insufficient stock in shop {shop_id}: {}", join_shortfalls(.shortfalls))]
    InsufficientStock {
        shop_id: String,
        shortfalls: Vec<StockShortfall>,
    },

    /// Shop, item or sale does not exist (or is archived).
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// The shop exists but is not accepting stock operations.
    #[error("Shop {0} is inactive")]
    ShopInactive(String),

    /// Account locks could not be acquired within the lock timeout.
    /// Nothing was written; safe to retry.
    #[error("Timed out after {waited_ms} ms waiting for stock locks in shop {shop_id}")]
    ConcurrencyTimeout { shop_id: String, waited_ms: u64 },

    /// The ledger and the account cache disagree. Indicates a bug or an
    /// out-of-band write; the operation was aborted.
    #[error(
        "Ledger inconsistent for {shop_id}/{item_id}: expected prior quantity {expected}, found {recorded}"
    )]
    ConsistencyViolation {
        shop_id: String,
        item_id: String,
        expected: i64,
        recorded: i64,
    },

    /// Storage failure not covered above.
    #[error("Storage error: {0}")]
    Storage(DbError),
}

/// Machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    InsufficientStock,
    NotFound,
    ShopInactive,
    ConcurrencyTimeout,
    ConsistencyViolation,
    StorageError,
}

/// Serializable form of a [`LedgerError`] for API layers.
///
/// ```json
/// { "code": "INSUFFICIENT_STOCK", "message": "Insufficient stock in shop ..." }
/// ```
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
}

impl LedgerError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        LedgerError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            LedgerError::Validation(_) => ErrorCode::ValidationError,
            LedgerError::InsufficientStock { .. } => ErrorCode::InsufficientStock,
            LedgerError::NotFound { .. } => ErrorCode::NotFound,
            LedgerError::ShopInactive(_) => ErrorCode::ShopInactive,
            LedgerError::ConcurrencyTimeout { .. } => ErrorCode::ConcurrencyTimeout,
            LedgerError::ConsistencyViolation { .. } => ErrorCode::ConsistencyViolation,
            LedgerError::Storage(_) => ErrorCode::StorageError,
        }
    }

    /// Whether retrying the identical request from scratch may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::ConcurrencyTimeout { .. })
    }

    /// Whether the caller's request (not the system) is at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            LedgerError::Validation(_)
                | LedgerError::InsufficientStock { .. }
                | LedgerError::NotFound { .. }
                | LedgerError::ShopInactive(_)
        )
    }

    /// Code and message, with storage details withheld.
    pub fn to_body(&self) -> ErrorBody {
        let message = match self {
            LedgerError::Storage(_) => "Storage operation failed".to_string(),
            other => other.to_string(),
        };
        ErrorBody {
            code: self.code(),
            message,
        }
    }
}

impl From<DbError> for LedgerError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => LedgerError::NotFound { entity, id },
            other => LedgerError::Storage(other),
        }
    }
}

/// Result type for coordinator operations.
pub type LedgerResult<T> = Result<T, LedgerError>;
