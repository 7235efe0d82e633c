//! # Repository Module
//!
//! SQLite repositories behind the stock coordinator.
//!
//! ## Two Kinds of Methods
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Access Paths                              │
//! │                                                                         │
//! │  Read / admin methods (&self, use the pool)                            │
//! │       │   db.accounts().get_balance("shop-1", "coke")                  │
//! │       │   db.ledger().history("shop-1", "coke", page)                  │
//! │       ▼                                                                 │
//! │  SqlitePool                                                            │
//! │                                                                         │
//! │  In-transaction methods (associated fns, crate-private, `*_in`)        │
//! │       │   StockAccountRepository::apply_delta(&mut tx, ...)            │
//! │       │   MovementLedger::append(&mut tx, ...)                         │
//! │       ▼                                                                 │
//! │  The coordinator's open transaction, nothing else                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`account::StockAccountRepository`] - Balances per (shop, item)
//! - [`ledger::MovementLedger`] - Append-only movement history
//! - [`sequence::SequenceRepository`] - Gap-free counters (invoice numbers)
//! - [`sale::SaleRepository`] - Committed sales and return lines
//! - [`catalog::CatalogRepository`] / [`catalog::ShopRepository`] - Collaborator data
//! - [`outbox::OutboxRepository`] - Stock event outbox

pub mod account;
pub mod catalog;
pub mod ledger;
pub mod outbox;
pub mod sale;
pub mod sequence;
