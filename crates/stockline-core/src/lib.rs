//! # stockline-core: Pure Domain Logic for the Stock Ledger
//!
//! This crate holds the rules of the stock ledger as pure functions and plain
//! data types. It never touches a database, a socket or the file system.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Stockline Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │          Sale / stock-in / adjustment handlers (external)       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │          stockline-db: StockCoordinator + repositories          │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ uses                                   │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ stockline-core (THIS CRATE) ★                   │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   sale    │  │  invoice  │  │   stock   │  │   │
//! │  │   │ Movement  │  │ SaleTx    │  │  Scope    │  │ shortfall │  │   │
//! │  │   │ Account   │  │ merging   │  │  numbers  │  │ low-stock │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Stock accounts, movement entries, pagination
//! - [`sale`] - Sale and return types, duplicate-line merging
//! - [`invoice`] - Year-scoped invoice numbers
//! - [`stock`] - Availability checks and the low-stock crossing rule
//! - [`money`] - Money type with integer arithmetic
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//!
//! ## Example Usage
//!
//! ```rust
//! use stockline_core::invoice::InvoiceScope;
//!
//! let scope = InvoiceScope::new("INV", 2025);
//! assert_eq!(scope.key(), "INV-2025");
//! assert_eq!(scope.format_number(1), "INV-2025-0001");
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod invoice;
pub mod money;
pub mod sale;
pub mod stock;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{StockShortfall, ValidationError};
pub use invoice::InvoiceScope;
pub use money::Money;
pub use sale::*;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum number of distinct items in a single sale or return.
///
/// Bounds the number of account rows one transaction locks.
pub const MAX_SALE_LINES: usize = 100;

/// Maximum length of an adjustment or return reason.
pub const MAX_REASON_LENGTH: usize = 500;

/// Default prefix of invoice numbers and their sequence scopes.
pub const DEFAULT_INVOICE_PREFIX: &str = "INV";

/// Minimum number of digits in the sequential part of an invoice number.
pub const INVOICE_NUMBER_WIDTH: usize = 4;
