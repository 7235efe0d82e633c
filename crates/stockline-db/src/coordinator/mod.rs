//! # Stock Coordinator
//!
//! The only component that changes stock. Every operation is one
//! transaction that locks the affected accounts, applies the deltas, writes
//! the ledger entries (and, for sales, the sale record and its invoice
//! number), then commits or rolls back as a whole.
//!
//! ## Operation Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    apply_sale([COKE x2, CHIPS x1])                      │
//! │                                                                         │
//! │  VALIDATING   merge duplicate lines, check ids and quantities          │
//! │      │        resolve shop + catalog items (no locks held)             │
//! │      ▼                                                                  │
//! │  LOCKING      BEGIN; touch accounts in ascending item order            │
//! │      │        [CHIPS, COKE]  ── bounded by lock_timeout ──┐            │
//! │      ▼                                                     │            │
//! │  APPLYING     all balances sufficient? ── no ──► REJECTED │            │
//! │      │        per item: apply_delta + ledger append        │            │
//! │      │        next invoice number, sale record, outbox     │            │
//! │      ▼                                                     ▼            │
//! │  COMMITTED    notify low-stock (after commit)      CONCURRENCY_TIMEOUT │
//! │                                                                         │
//! │  Any failure after BEGIN rolls back everything: no balance, entry,     │
//! │  sale or sequence value survives a rejected operation.                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Lock Ordering
//! Accounts are always locked in ascending item id order. Two operations
//! that share items therefore acquire them in the same order and cannot
//! deadlock; disjoint operations never wait on each other's rows.

pub mod error;

pub use error::{ErrorBody, ErrorCode, LedgerError, LedgerResult};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::{debug, info, warn};
use uuid::Uuid;

use stockline_core::stock::{crossed_low_stock, find_shortfalls, BalanceCheck};
use stockline_core::validation::{
    validate_delta, validate_identifier, validate_quantity, validate_reason,
};
use stockline_core::{
    canonical_item_order, merge_line_requests, CatalogItem, InvoiceScope, LineRequest,
    LowStockAlert, Money, MovementKind, NewMovement, ReturnReceipt, ReturnRequest, SaleLine,
    SaleRequest, SaleTransaction, Shop, StockChange, ValidationError, DEFAULT_INVOICE_PREFIX,
};

use crate::collaborators::{Catalog, LogNotifier, LowStockNotifier, ShopDirectory};
use crate::error::DbError;
use crate::repository::account::StockAccountRepository;
use crate::repository::ledger::MovementLedger;
use crate::repository::outbox::{OutboxEventType, OutboxRepository};
use crate::repository::sale::SaleRepository;
use crate::repository::sequence::SequenceRepository;

// =============================================================================
// Settings
// =============================================================================

/// Tunables of the coordinator. Built from
/// [`LedgerConfig::coordinator_settings`](crate::config::LedgerConfig::coordinator_settings).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorSettings {
    /// Longest an operation waits for its account locks.
    pub lock_timeout: Duration,
    /// Prefix of invoice numbers (`INV` → `INV-2025-0001`).
    pub invoice_prefix: String,
    /// Threshold for items whose catalog entry has none.
    pub default_low_stock_threshold: Option<i64>,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        CoordinatorSettings {
            lock_timeout: Duration::from_secs(5),
            invoice_prefix: DEFAULT_INVOICE_PREFIX.to_string(),
            default_low_stock_threshold: None,
        }
    }
}

// =============================================================================
// Internal Types
// =============================================================================

/// An open transaction holding the write lock, plus the balances read
/// under it.
struct LockedAccounts {
    tx: Transaction<'static, Sqlite>,
    balances: HashMap<String, i64>,
}

impl LockedAccounts {
    fn balance(&self, item_id: &str) -> LedgerResult<i64> {
        self.balances.get(item_id).copied().ok_or_else(|| {
            LedgerError::Storage(DbError::Internal(format!(
                "account for {item_id} was not locked"
            )))
        })
    }
}

/// A sale after validation and pricing, before any lock is taken.
struct PreparedSale {
    shop: Shop,
    lines: Vec<SaleLine>,
    total_cents: i64,
    thresholds: HashMap<String, Option<i64>>,
}

enum SaleOutcome {
    Committed {
        sale: SaleTransaction,
        alerts: Vec<LowStockAlert>,
    },
    /// Another request with the same idempotency key committed first.
    Replayed(SaleTransaction),
}

/// A single-account movement (stock-in or adjustment).
struct SingleMovement<'a> {
    shop_id: &'a str,
    item_id: &'a str,
    actor_id: &'a str,
    kind: MovementKind,
    delta: i64,
    reason: Option<String>,
    event: OutboxEventType,
}

// =============================================================================
// Coordinator
// =============================================================================

/// Serializes every stock-changing operation per account and keeps the
/// ledger, the account balances, sales and invoice numbers consistent.
///
/// ## Usage
/// ```rust,ignore
/// let coordinator = db.coordinator();
///
/// coordinator.apply_stock_in("shop-1", "coke", 24, "receiving").await?;
///
/// let sale = coordinator
///     .apply_sale(SaleRequest {
///         shop_id: "shop-1".into(),
///         merchant_id: "merchant-1".into(),
///         actor_id: "clerk-7".into(),
///         lines: vec![LineRequest::new("coke", 2)],
///         payment: PaymentMeta::default(),
///         idempotency_key: Some(checkout_id),
///     })
///     .await?;
/// assert!(sale.invoice_number.starts_with("INV-"));
/// ```
#[derive(Clone)]
pub struct StockCoordinator {
    pool: SqlitePool,
    catalog: Arc<dyn Catalog>,
    shops: Arc<dyn ShopDirectory>,
    notifier: Arc<dyn LowStockNotifier>,
    settings: CoordinatorSettings,
}

impl std::fmt::Debug for StockCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StockCoordinator")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl StockCoordinator {
    /// Creates a coordinator over `pool` with the given collaborators and
    /// default settings. Low-stock alerts go to the log until
    /// [`with_notifier`](Self::with_notifier) is called.
    pub fn new(
        pool: SqlitePool,
        catalog: Arc<dyn Catalog>,
        shops: Arc<dyn ShopDirectory>,
    ) -> Self {
        StockCoordinator {
            pool,
            catalog,
            shops,
            notifier: Arc::new(LogNotifier),
            settings: CoordinatorSettings::default(),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn LowStockNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_settings(mut self, settings: CoordinatorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &CoordinatorSettings {
        &self.settings
    }

    // =========================================================================
    // Sales
    // =========================================================================

    /// Records a checkout: decrements every line, writes one `sale` ledger
    /// entry per distinct item, issues the next invoice number of the
    /// current year and stores the sale, all in one transaction.
    ///
    /// ## Errors
    /// - `Validation` - empty lines, non-positive quantity, bad ids
    /// - `NotFound` / `ShopInactive` - unknown shop or item, closed shop
    /// - `InsufficientStock` - lists every short line; nothing is written
    /// - `ConcurrencyTimeout` - locks not acquired in time; nothing is written
    ///
    /// A request whose idempotency key was already committed returns that
    /// sale unchanged.
    pub async fn apply_sale(&self, request: SaleRequest) -> LedgerResult<SaleTransaction> {
        debug!(shop_id = %request.shop_id, phase = "validating", "apply_sale");

        validate_identifier("shop_id", &request.shop_id)?;
        validate_identifier("merchant_id", &request.merchant_id)?;
        validate_identifier("actor_id", &request.actor_id)?;
        if let Some(key) = request.idempotency_key.as_deref() {
            validate_identifier("idempotency_key", key)?;
        }
        let lines = merge_line_requests(&request.lines)?;

        if let Some(key) = request.idempotency_key.as_deref() {
            let sales = SaleRepository::new(self.pool.clone());
            if let Some(existing) = sales.find_by_idempotency_key(key).await? {
                return replay(existing, &request);
            }
        }

        let prepared = self.prepare_sale(&request, &lines).await?;
        let shop_id = prepared.shop.id.clone();
        let order = canonical_item_order(lines.iter().map(|l| l.item_id.as_str()));

        let mut locked = self.lock_accounts(&shop_id, &order).await?;

        debug!(shop_id = %shop_id, phase = "applying", "apply_sale");
        let outcome = self.sale_locked(&mut locked, &request, &prepared, &order).await;

        match outcome {
            Ok(SaleOutcome::Committed { sale, alerts }) => {
                commit(locked.tx).await?;
                info!(
                    shop_id = %sale.shop_id,
                    sale_id = %sale.id,
                    invoice = %sale.invoice_number,
                    lines = sale.lines.len(),
                    total = %sale.total(),
                    "Sale committed"
                );
                self.dispatch_alerts(&alerts).await;
                Ok(sale)
            }
            Ok(SaleOutcome::Replayed(existing)) => {
                rollback(locked.tx).await;
                replay(existing, &request)
            }
            Err(LedgerError::Storage(err)) if err.is_unique_violation_on("idempotency_key") => {
                rollback(locked.tx).await;
                let key = request.idempotency_key.as_deref().unwrap_or_default();
                match SaleRepository::new(self.pool.clone())
                    .find_by_idempotency_key(key)
                    .await?
                {
                    Some(existing) => replay(existing, &request),
                    None => Err(LedgerError::Storage(err)),
                }
            }
            Err(err) => {
                rollback(locked.tx).await;
                log_rejection("apply_sale", &shop_id, &err);
                Err(err)
            }
        }
    }

    /// Validation and pricing that needs no lock.
    async fn prepare_sale(
        &self,
        request: &SaleRequest,
        lines: &[LineRequest],
    ) -> LedgerResult<PreparedSale> {
        let shop = self.active_shop(&request.shop_id).await?;
        if shop.merchant_id != request.merchant_id {
            return Err(ValidationError::MerchantMismatch {
                entity: "Shop".to_string(),
                id: shop.id,
                merchant_id: request.merchant_id.clone(),
            }
            .into());
        }

        let mut priced = Vec::with_capacity(lines.len());
        let mut thresholds = HashMap::with_capacity(lines.len());
        let mut total = Money::zero();

        for (idx, line) in lines.iter().enumerate() {
            let item = self.resolve_item(&shop, &line.item_id).await?;

            let line_total = item
                .unit_price()
                .checked_multiply_quantity(line.quantity)
                .ok_or_else(|| overflow("line_total"))?;
            total = total.checked_add(line_total).ok_or_else(|| overflow("total"))?;

            thresholds.insert(item.id.clone(), self.threshold_for(&item));
            priced.push(SaleLine {
                line_no: idx as i64 + 1,
                item_id: item.id,
                sku_snapshot: item.sku,
                name_snapshot: item.name,
                quantity: line.quantity,
                unit_price_cents: item.unit_price_cents,
                line_total_cents: line_total.cents(),
            });
        }

        Ok(PreparedSale {
            shop,
            lines: priced,
            total_cents: total.cents(),
            thresholds,
        })
    }

    async fn sale_locked(
        &self,
        locked: &mut LockedAccounts,
        request: &SaleRequest,
        prepared: &PreparedSale,
        order: &[String],
    ) -> LedgerResult<SaleOutcome> {
        if let Some(key) = request.idempotency_key.as_deref() {
            if let Some(existing) = SaleRepository::find_by_idempotency_key_in(&mut locked.tx, key).await? {
                return Ok(SaleOutcome::Replayed(existing));
            }
        }

        let shop_id = prepared.shop.id.as_str();

        // Every line is checked before anything is written.
        let mut checks = Vec::with_capacity(prepared.lines.len());
        for line in &prepared.lines {
            checks.push(BalanceCheck {
                item_id: &line.item_id,
                available: locked.balance(&line.item_id)?,
                delta: -line.quantity,
            });
        }
        let shortfalls = find_shortfalls(&checks);
        if !shortfalls.is_empty() {
            return Err(LedgerError::InsufficientStock {
                shop_id: shop_id.to_string(),
                shortfalls,
            });
        }

        let now = Utc::now();
        let sale_id = Uuid::new_v4().to_string();
        let quantities: HashMap<&str, i64> = prepared
            .lines
            .iter()
            .map(|line| (line.item_id.as_str(), line.quantity))
            .collect();
        let mut alerts = Vec::new();

        for item_id in order {
            let quantity = quantities.get(item_id.as_str()).copied().unwrap_or(0);
            let previous = locked.balance(item_id)?;

            let new_quantity =
                StockAccountRepository::apply_delta(&mut locked.tx, shop_id, item_id, -quantity, now)
                    .await?;

            MovementLedger::append(
                &mut locked.tx,
                &NewMovement {
                    shop_id: shop_id.to_string(),
                    item_id: item_id.clone(),
                    actor_id: request.actor_id.clone(),
                    kind: MovementKind::Sale,
                    quantity_delta: -quantity,
                    resulting_quantity: new_quantity,
                    reason: None,
                    occurred_at: now,
                    correlation_id: sale_id.clone(),
                },
                previous,
            )
            .await?;

            let threshold = prepared.thresholds.get(item_id).copied().flatten();
            if crossed_low_stock(previous, new_quantity, threshold) {
                alerts.push(LowStockAlert {
                    shop_id: shop_id.to_string(),
                    item_id: item_id.clone(),
                    previous_quantity: previous,
                    new_quantity,
                    low_stock_threshold: threshold.unwrap_or_default(),
                });
            }
        }

        // Drawn inside the transaction: a rollback hands the number back.
        let scope = InvoiceScope::for_date(self.settings.invoice_prefix.as_str(), now);
        let number = SequenceRepository::next_in(&mut locked.tx, &scope.key()).await?;

        let sale = SaleTransaction {
            id: sale_id,
            shop_id: shop_id.to_string(),
            merchant_id: prepared.shop.merchant_id.clone(),
            actor_id: request.actor_id.clone(),
            invoice_number: scope.format_number(number),
            lines: prepared.lines.clone(),
            total_cents: prepared.total_cents,
            payment: request.payment.clone(),
            idempotency_key: request.idempotency_key.clone(),
            created_at: now,
        };

        SaleRepository::insert_in(&mut locked.tx, &sale).await?;
        OutboxRepository::enqueue_in(&mut locked.tx, OutboxEventType::SaleCommitted, &sale.id, &sale)
            .await?;
        for alert in &alerts {
            OutboxRepository::enqueue_in(&mut locked.tx, OutboxEventType::LowStock, &sale.id, alert)
                .await?;
        }

        Ok(SaleOutcome::Committed { sale, alerts })
    }

    // =========================================================================
    // Single-Account Movements
    // =========================================================================

    /// Receives `quantity` units of an item into a shop.
    pub async fn apply_stock_in(
        &self,
        shop_id: &str,
        item_id: &str,
        quantity: i64,
        actor_id: &str,
    ) -> LedgerResult<StockChange> {
        validate_quantity(quantity)?;

        self.apply_single(SingleMovement {
            shop_id,
            item_id,
            actor_id,
            kind: MovementKind::StockIn,
            delta: quantity,
            reason: None,
            event: OutboxEventType::StockIn,
        })
        .await
    }

    /// Corrects a balance by a signed, non-zero `delta` (shrinkage, damage,
    /// count corrections). A reason is mandatory.
    pub async fn apply_adjustment(
        &self,
        shop_id: &str,
        item_id: &str,
        delta: i64,
        reason: &str,
        actor_id: &str,
    ) -> LedgerResult<StockChange> {
        validate_delta(delta)?;
        let reason = validate_reason(reason)?;

        self.apply_single(SingleMovement {
            shop_id,
            item_id,
            actor_id,
            kind: MovementKind::Adjustment,
            delta,
            reason: Some(reason),
            event: OutboxEventType::Adjustment,
        })
        .await
    }

    async fn apply_single(&self, op: SingleMovement<'_>) -> LedgerResult<StockChange> {
        debug!(shop_id = %op.shop_id, kind = %op.kind, phase = "validating", "apply_single");

        validate_identifier("shop_id", op.shop_id)?;
        validate_identifier("item_id", op.item_id)?;
        validate_identifier("actor_id", op.actor_id)?;

        let shop = self.active_shop(op.shop_id).await?;
        let item = self.resolve_item(&shop, op.item_id).await?;
        let threshold = self.threshold_for(&item);

        let mut locked = self
            .lock_accounts(&shop.id, &[item.id.clone()])
            .await?;

        match self.single_locked(&mut locked, &op, threshold).await {
            Ok((change, alert)) => {
                commit(locked.tx).await?;
                info!(
                    shop_id = %change.shop_id,
                    item_id = %change.item_id,
                    kind = %op.kind,
                    delta = op.delta,
                    quantity = change.new_quantity,
                    "Stock movement committed"
                );
                if let Some(alert) = alert {
                    self.dispatch_alerts(std::slice::from_ref(&alert)).await;
                }
                Ok(change)
            }
            Err(err) => {
                rollback(locked.tx).await;
                log_rejection(op.kind.as_str(), op.shop_id, &err);
                Err(err)
            }
        }
    }

    async fn single_locked(
        &self,
        locked: &mut LockedAccounts,
        op: &SingleMovement<'_>,
        threshold: Option<i64>,
    ) -> LedgerResult<(StockChange, Option<LowStockAlert>)> {
        let previous = locked.balance(op.item_id)?;

        previous.checked_add(op.delta).ok_or_else(|| overflow("quantity"))?;
        let shortfalls = find_shortfalls(&[BalanceCheck {
            item_id: op.item_id,
            available: previous,
            delta: op.delta,
        }]);
        if !shortfalls.is_empty() {
            return Err(LedgerError::InsufficientStock {
                shop_id: op.shop_id.to_string(),
                shortfalls,
            });
        }

        let now = Utc::now();
        let correlation_id = Uuid::new_v4().to_string();

        let new_quantity =
            StockAccountRepository::apply_delta(&mut locked.tx, op.shop_id, op.item_id, op.delta, now)
                .await?;

        let entry_id = MovementLedger::append(
            &mut locked.tx,
            &NewMovement {
                shop_id: op.shop_id.to_string(),
                item_id: op.item_id.to_string(),
                actor_id: op.actor_id.to_string(),
                kind: op.kind,
                quantity_delta: op.delta,
                resulting_quantity: new_quantity,
                reason: op.reason.clone(),
                occurred_at: now,
                correlation_id: correlation_id.clone(),
            },
            previous,
        )
        .await?;

        let change = StockChange {
            shop_id: op.shop_id.to_string(),
            item_id: op.item_id.to_string(),
            previous_quantity: previous,
            new_quantity,
            entry_id,
            correlation_id,
        };
        OutboxRepository::enqueue_in(&mut locked.tx, op.event, &change.correlation_id, &change).await?;

        let alert = crossed_low_stock(previous, new_quantity, threshold).then(|| LowStockAlert {
            shop_id: op.shop_id.to_string(),
            item_id: op.item_id.to_string(),
            previous_quantity: previous,
            new_quantity,
            low_stock_threshold: threshold.unwrap_or_default(),
        });
        if let Some(alert) = &alert {
            OutboxRepository::enqueue_in(&mut locked.tx, OutboxEventType::LowStock, &change.correlation_id, alert)
                .await?;
        }

        Ok((change, alert))
    }

    // =========================================================================
    // Returns
    // =========================================================================

    /// Puts units of a committed sale back into stock.
    ///
    /// Each item may be returned at most as many times as it was sold,
    /// summed over every return against the sale.
    pub async fn apply_return(&self, request: ReturnRequest) -> LedgerResult<ReturnReceipt> {
        debug!(shop_id = %request.shop_id, sale_id = %request.sale_id, phase = "validating", "apply_return");

        validate_identifier("shop_id", &request.shop_id)?;
        validate_identifier("sale_id", &request.sale_id)?;
        validate_identifier("actor_id", &request.actor_id)?;
        let reason = request.reason.as_deref().map(validate_reason).transpose()?;
        let lines = merge_line_requests(&request.lines)?;

        let shop = self.active_shop(&request.shop_id).await?;
        let sale = SaleRepository::new(self.pool.clone())
            .get_by_id(&request.sale_id)
            .await?
            .filter(|sale| sale.shop_id == shop.id)
            .ok_or_else(|| LedgerError::not_found("Sale", &request.sale_id))?;

        for line in &lines {
            if sale.quantity_of(&line.item_id) == 0 {
                return Err(ValidationError::NotOnSale {
                    item_id: line.item_id.clone(),
                    sale_id: sale.id.clone(),
                }
                .into());
            }
        }

        let reason = reason.unwrap_or_else(|| format!("Return against {}", sale.invoice_number));
        let order = canonical_item_order(lines.iter().map(|l| l.item_id.as_str()));
        let mut locked = self.lock_accounts(&shop.id, &order).await?;

        match self
            .return_locked(&mut locked, &request, &sale, &lines, &order, reason)
            .await
        {
            Ok(receipt) => {
                commit(locked.tx).await?;
                info!(
                    shop_id = %receipt.shop_id,
                    sale_id = %receipt.sale_id,
                    return_id = %receipt.id,
                    lines = receipt.lines.len(),
                    "Return committed"
                );
                Ok(receipt)
            }
            Err(err) => {
                rollback(locked.tx).await;
                log_rejection("apply_return", &shop.id, &err);
                Err(err)
            }
        }
    }

    async fn return_locked(
        &self,
        locked: &mut LockedAccounts,
        request: &ReturnRequest,
        sale: &SaleTransaction,
        lines: &[LineRequest],
        order: &[String],
        reason: String,
    ) -> LedgerResult<ReturnReceipt> {
        // Read under lock so two concurrent returns cannot both pass.
        for line in lines {
            let returned =
                SaleRepository::returned_quantity_in(&mut locked.tx, &sale.id, &line.item_id).await?;
            let returnable = sale.quantity_of(&line.item_id) - returned;
            if line.quantity > returnable {
                return Err(ValidationError::ExceedsReturnable {
                    item_id: line.item_id.clone(),
                    requested: line.quantity,
                    returnable,
                }
                .into());
            }
        }

        let now = Utc::now();
        let return_id = Uuid::new_v4().to_string();
        let quantities: HashMap<&str, i64> = lines
            .iter()
            .map(|line| (line.item_id.as_str(), line.quantity))
            .collect();
        let mut new_balances = HashMap::with_capacity(lines.len());

        for item_id in order {
            let quantity = quantities.get(item_id.as_str()).copied().unwrap_or(0);
            let previous = locked.balance(item_id)?;

            let new_quantity =
                StockAccountRepository::apply_delta(&mut locked.tx, &sale.shop_id, item_id, quantity, now)
                    .await?;

            MovementLedger::append(
                &mut locked.tx,
                &NewMovement {
                    shop_id: sale.shop_id.clone(),
                    item_id: item_id.clone(),
                    actor_id: request.actor_id.clone(),
                    kind: MovementKind::Return,
                    quantity_delta: quantity,
                    resulting_quantity: new_quantity,
                    reason: Some(reason.clone()),
                    occurred_at: now,
                    correlation_id: return_id.clone(),
                },
                previous,
            )
            .await?;

            new_balances.insert(item_id.as_str(), new_quantity);
        }

        SaleRepository::insert_return_lines_in(
            &mut locked.tx,
            &return_id,
            &sale.id,
            &request.actor_id,
            lines,
            now,
        )
        .await?;

        let receipt = ReturnReceipt {
            id: return_id,
            sale_id: sale.id.clone(),
            shop_id: sale.shop_id.clone(),
            new_quantities: lines
                .iter()
                .map(|line| new_balances.get(line.item_id.as_str()).copied().unwrap_or_default())
                .collect(),
            lines: lines.to_vec(),
            created_at: now,
        };
        OutboxRepository::enqueue_in(&mut locked.tx, OutboxEventType::Return, &receipt.id, &receipt)
            .await?;

        Ok(receipt)
    }

    // =========================================================================
    // Locking
    // =========================================================================

    /// Opens a transaction and touches each account in the given
    /// (ascending) order, materializing missing ones at zero.
    ///
    /// Pool checkout and SQLite's busy wait both count against
    /// `lock_timeout`. If it elapses, the partial transaction is dropped
    /// (rolled back) and `ConcurrencyTimeout` is returned.
    async fn lock_accounts(&self, shop_id: &str, item_ids: &[String]) -> LedgerResult<LockedAccounts> {
        debug!(shop_id = %shop_id, items = item_ids.len(), phase = "locking", "Acquiring account locks");
        let started = Instant::now();

        let acquire = async {
            let mut tx = self.pool.begin().await?;
            let mut balances = HashMap::with_capacity(item_ids.len());
            for item_id in item_ids {
                let quantity = StockAccountRepository::lock_account(&mut tx, shop_id, item_id).await?;
                balances.insert(item_id.clone(), quantity);
            }
            Ok::<_, DbError>(LockedAccounts { tx, balances })
        };

        let timeout_error = || {
            let waited_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
            warn!(shop_id = %shop_id, waited_ms, "Timed out waiting for account locks");
            LedgerError::ConcurrencyTimeout {
                shop_id: shop_id.to_string(),
                waited_ms,
            }
        };

        match tokio::time::timeout(self.settings.lock_timeout, acquire).await {
            Ok(Ok(locked)) => {
                debug!(
                    shop_id = %shop_id,
                    waited_ms = started.elapsed().as_millis() as u64,
                    "Account locks acquired"
                );
                Ok(locked)
            }
            Ok(Err(err)) if err.is_contention() => Err(timeout_error()),
            Ok(Err(err)) => Err(err.into()),
            Err(_elapsed) => Err(timeout_error()),
        }
    }

    // =========================================================================
    // Collaborators
    // =========================================================================

    async fn active_shop(&self, shop_id: &str) -> LedgerResult<Shop> {
        let shop = self.shops.get_shop(shop_id).await?;
        if !shop.is_active {
            return Err(LedgerError::ShopInactive(shop.id));
        }
        Ok(shop)
    }

    async fn resolve_item(&self, shop: &Shop, item_id: &str) -> LedgerResult<CatalogItem> {
        let item = self.catalog.get_item(item_id).await?;
        if item.merchant_id != shop.merchant_id {
            return Err(ValidationError::MerchantMismatch {
                entity: "Item".to_string(),
                id: item.id,
                merchant_id: shop.merchant_id.clone(),
            }
            .into());
        }
        Ok(item)
    }

    fn threshold_for(&self, item: &CatalogItem) -> Option<i64> {
        item.low_stock_threshold
            .or(self.settings.default_low_stock_threshold)
    }

    /// Notifier failures are logged; the operation has already committed.
    async fn dispatch_alerts(&self, alerts: &[LowStockAlert]) {
        for alert in alerts {
            if let Err(err) = self.notifier.notify(alert).await {
                warn!(
                    shop_id = %alert.shop_id,
                    item_id = %alert.item_id,
                    error = %err,
                    "Low-stock notification failed"
                );
            }
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn replay(existing: SaleTransaction, request: &SaleRequest) -> LedgerResult<SaleTransaction> {
    if existing.shop_id != request.shop_id {
        return Err(ValidationError::InvalidFormat {
            field: "idempotency_key".to_string(),
            reason: "already used for a sale in another shop".to_string(),
        }
        .into());
    }

    info!(
        sale_id = %existing.id,
        invoice = %existing.invoice_number,
        "Idempotent replay, returning committed sale"
    );
    Ok(existing)
}

fn overflow(field: &str) -> LedgerError {
    ValidationError::Overflow {
        field: field.to_string(),
    }
    .into()
}

async fn commit(tx: Transaction<'static, Sqlite>) -> LedgerResult<()> {
    tx.commit()
        .await
        .map_err(|e| LedgerError::Storage(DbError::TransactionFailed(e.to_string())))
}

async fn rollback(tx: Transaction<'static, Sqlite>) {
    if let Err(err) = tx.rollback().await {
        warn!(error = %err, "Rollback failed; connection will be discarded");
    }
}

fn log_rejection(operation: &str, shop_id: &str, err: &LedgerError) {
    if err.is_client_error() {
        info!(operation, shop_id = %shop_id, code = ?err.code(), error = %err, "Operation rejected");
    } else {
        warn!(operation, shop_id = %shop_id, code = ?err.code(), error = %err, "Operation failed");
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
