//! # stockline-db: Storage and Coordination for Stockline
//!
//! This crate owns every write to stock. It uses SQLite for storage with
//! sqlx for async operations, and serializes stock-changing operations
//! through the [`StockCoordinator`].
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Stockline Data Flow                              │
//! │                                                                         │
//! │  POS checkout / receiving / back office                                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  stockline-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────────┐     ┌────────────────────────────┐     │   │
//! │  │   │ StockCoordinator  │────►│ Repositories               │     │   │
//! │  │   │ (coordinator/)    │     │ accounts   ledger          │     │   │
//! │  │   │                   │     │ sequences  sales  outbox   │     │   │
//! │  │   │ lock → apply →    │     └────────────────────────────┘     │   │
//! │  │   │ commit / rollback │               │                         │   │
//! │  │   └───────────────────┘               │                         │   │
//! │  │        │ Catalog, ShopDirectory,      │                         │   │
//! │  │        │ LowStockNotifier             │                         │   │
//! │  │        ▼ (collaborators.rs)           ▼                         │   │
//! │  │   ┌───────────────┐          ┌──────────────┐                   │   │
//! │  │   │   Database    │          │  Migrations  │                   │   │
//! │  │   │   (pool.rs)   │          │  (embedded)  │                   │   │
//! │  │   └───────────────┘          └──────────────┘                   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (WAL)                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`config`] - TOML + environment configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Storage error types
//! - [`repository`] - Accounts, ledger, sequences, sales, catalog, outbox
//! - [`collaborators`] - Catalog, shop directory and notifier seams
//! - [`coordinator`] - The stock coordinator and its error type
//!
//! ## Usage
//!
//! ```rust,ignore
//! use stockline_db::{Database, LedgerConfig};
//!
//! let config = LedgerConfig::load(Some(Path::new("stockline.toml")))?;
//! let db = Database::from_config(&config).await?;
//!
//! let coordinator = db.coordinator_with(config.coordinator_settings());
//! coordinator.apply_stock_in("shop-1", "coke", 24, "receiving").await?;
//!
//! let balance = db.accounts().get_balance("shop-1", "coke").await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod collaborators;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{ConfigError, LedgerConfig};
pub use coordinator::{CoordinatorSettings, ErrorBody, ErrorCode, LedgerError, LedgerResult, StockCoordinator};
pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use collaborators::{Catalog, LogNotifier, LowStockNotifier, NotifyError, ShopDirectory};

// Repository re-exports for convenience
pub use repository::account::StockAccountRepository;
pub use repository::catalog::{CatalogRepository, ShopRepository};
pub use repository::ledger::MovementLedger;
pub use repository::outbox::{OutboxEntry, OutboxEventType, OutboxRepository};
pub use repository::sale::SaleRepository;
pub use repository::sequence::SequenceRepository;
