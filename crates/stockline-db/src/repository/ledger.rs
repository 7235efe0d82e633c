//! # Movement Ledger
//!
//! Append-only audit log of every quantity change.
//!
//! ## Ledger / Account Pairing
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    One Movement, One Transaction                        │
//! │                                                                         │
//! │  stock_accounts (cache)              movement_entries (truth)          │
//! │  ┌──────────────────────┐            ┌──────────────────────────────┐  │
//! │  │ shop-1 / coke  qty 7 │ ◄── Σ ──── │ #1 stock_in   +10  → 10      │  │
//! │  └──────────────────────┘            │ #2 sale        -3  →  7      │  │
//! │                                       └──────────────────────────────┘  │
//! │                                                                         │
//! │  append() refuses an entry whose previous quantity (resulting - delta) │
//! │  differs from the account's balance or the last entry's result.        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Entries are never updated or deleted; triggers in the schema enforce it.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, error};

use stockline_core::{
    BalanceMismatch, HistoryOrder, MovementEntry, MovementKind, NewMovement, Pagination,
    ValidationError,
};

use crate::coordinator::{LedgerError, LedgerResult};
use crate::error::{DbError, DbResult};

const ENTRY_COLUMNS: &str = r#"
    id, shop_id, item_id, actor_id, kind, quantity_delta,
    resulting_quantity, reason, occurred_at, correlation_id
"#;

/// Repository for the movement ledger.
#[derive(Debug, Clone)]
pub struct MovementLedger {
    pool: SqlitePool,
}

impl MovementLedger {
    /// Creates a new MovementLedger.
    pub fn new(pool: SqlitePool) -> Self {
        MovementLedger { pool }
    }

    /// Appends an entry inside the caller's transaction and returns its id.
    ///
    /// `prior_quantity` is the account balance the caller read under lock
    /// before applying the delta.
    pub(crate) async fn append(
        conn: &mut SqliteConnection,
        entry: &NewMovement,
        prior_quantity: i64,
    ) -> LedgerResult<i64> {
        if entry.quantity_delta == 0 {
            return Err(ValidationError::MustBeNonZero {
                field: "quantity_delta".to_string(),
            }
            .into());
        }
        if entry.kind.requires_reason() && entry.reason.as_deref().map_or(true, str::is_empty) {
            return Err(ValidationError::Required {
                field: "reason".to_string(),
            }
            .into());
        }

        let claimed_prior = entry.resulting_quantity - entry.quantity_delta;
        let last_result: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT resulting_quantity FROM movement_entries
            WHERE shop_id = ?1 AND item_id = ?2
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .bind(&entry.shop_id)
        .bind(&entry.item_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(DbError::from)?;
        let ledger_prior = last_result.unwrap_or(0);

        for expected in [prior_quantity, ledger_prior] {
            if claimed_prior != expected {
                error!(
                    shop_id = %entry.shop_id,
                    item_id = %entry.item_id,
                    expected,
                    recorded = claimed_prior,
                    account_prior = prior_quantity,
                    ledger_prior,
                    "Refusing ledger append: balance chain broken"
                );
                return Err(LedgerError::ConsistencyViolation {
                    shop_id: entry.shop_id.clone(),
                    item_id: entry.item_id.clone(),
                    expected,
                    recorded: claimed_prior,
                });
            }
        }

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO movement_entries (
                shop_id, item_id, actor_id, kind, quantity_delta,
                resulting_quantity, reason, occurred_at, correlation_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            RETURNING id
            "#,
        )
        .bind(&entry.shop_id)
        .bind(&entry.item_id)
        .bind(&entry.actor_id)
        .bind(entry.kind)
        .bind(entry.quantity_delta)
        .bind(entry.resulting_quantity)
        .bind(&entry.reason)
        .bind(entry.occurred_at)
        .bind(&entry.correlation_id)
        .fetch_one(&mut *conn)
        .await
        .map_err(DbError::from)?;

        debug!(
            entry_id = id,
            kind = %entry.kind,
            delta = entry.quantity_delta,
            resulting = entry.resulting_quantity,
            "Ledger entry appended"
        );

        Ok(id)
    }

    /// Entries of one account, ordered by time.
    pub async fn history(
        &self,
        shop_id: &str,
        item_id: &str,
        page: Pagination,
    ) -> DbResult<Vec<MovementEntry>> {
        let order = match page.order() {
            HistoryOrder::OldestFirst => "occurred_at ASC, id ASC",
            HistoryOrder::NewestFirst => "occurred_at DESC, id DESC",
        };
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM movement_entries
             WHERE shop_id = ?1 AND item_id = ?2
             ORDER BY {order}
             LIMIT ?3 OFFSET ?4"
        );

        let entries = sqlx::query_as::<_, MovementEntry>(&sql)
            .bind(shop_id)
            .bind(item_id)
            .bind(i64::from(page.limit()))
            .bind(i64::from(page.offset()))
            .fetch_all(&self.pool)
            .await?;

        Ok(entries)
    }

    /// Entries of one account of a given kind within `[from, to)`.
    pub async fn history_between(
        &self,
        shop_id: &str,
        item_id: &str,
        kind: Option<MovementKind>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DbResult<Vec<MovementEntry>> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM movement_entries
             WHERE shop_id = ?1 AND item_id = ?2
             AND occurred_at >= ?3 AND occurred_at < ?4
             AND (?5 IS NULL OR kind = ?5)
             ORDER BY occurred_at ASC, id ASC"
        );

        let entries = sqlx::query_as::<_, MovementEntry>(&sql)
            .bind(shop_id)
            .bind(item_id)
            .bind(from)
            .bind(to)
            .bind(kind)
            .fetch_all(&self.pool)
            .await?;

        Ok(entries)
    }

    /// Balance implied by the ledger alone: Σ quantity_delta.
    pub async fn reconstruct_balance(&self, shop_id: &str, item_id: &str) -> DbResult<i64> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(quantity_delta), 0)
            FROM movement_entries
            WHERE shop_id = ?1 AND item_id = ?2
            "#,
        )
        .bind(shop_id)
        .bind(item_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(total)
    }

    /// Every entry written by one logical transaction (sale, return, ...).
    pub async fn entries_for_correlation(&self, correlation_id: &str) -> DbResult<Vec<MovementEntry>> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM movement_entries
             WHERE correlation_id = ?1
             ORDER BY id ASC"
        );

        let entries = sqlx::query_as::<_, MovementEntry>(&sql)
            .bind(correlation_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(entries)
    }

    /// Integrity sweep: every account of the shop whose cached quantity
    /// differs from its ledger sum. Empty means consistent.
    pub async fn verify_shop(&self, shop_id: &str) -> DbResult<Vec<BalanceMismatch>> {
        let rows: Vec<(String, i64, i64)> = sqlx::query_as(
            r#"
            WITH ledger AS (
                SELECT item_id, SUM(quantity_delta) AS total
                FROM movement_entries
                WHERE shop_id = ?1
                GROUP BY item_id
            ),
            keys AS (
                SELECT item_id FROM stock_accounts WHERE shop_id = ?1
                UNION
                SELECT item_id FROM ledger
            )
            SELECT
                k.item_id,
                COALESCE(a.quantity, 0) AS account_quantity,
                COALESCE(l.total, 0) AS ledger_quantity
            FROM keys k
            LEFT JOIN stock_accounts a ON a.shop_id = ?1 AND a.item_id = k.item_id
            LEFT JOIN ledger l ON l.item_id = k.item_id
            WHERE COALESCE(a.quantity, 0) <> COALESCE(l.total, 0)
            ORDER BY k.item_id
            "#,
        )
        .bind(shop_id)
        .fetch_all(&self.pool)
        .await?;

        let mismatches: Vec<BalanceMismatch> = rows
            .into_iter()
            .map(|(item_id, account_quantity, ledger_quantity)| BalanceMismatch {
                shop_id: shop_id.to_string(),
                item_id,
                account_quantity,
                ledger_quantity,
            })
            .collect();

        if !mismatches.is_empty() {
            error!(shop_id = %shop_id, count = mismatches.len(), "Ledger/account mismatch detected");
        }

        Ok(mismatches)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    fn movement(kind: MovementKind, delta: i64, resulting: i64, correlation: &str) -> NewMovement {
        NewMovement {
            shop_id: "shop-1".to_string(),
            item_id: "coke".to_string(),
            actor_id: "clerk".to_string(),
            kind,
            quantity_delta: delta,
            resulting_quantity: resulting,
            reason: kind.requires_reason().then(|| "count".to_string()),
            occurred_at: Utc::now(),
            correlation_id: correlation.to_string(),
        }
    }

    #[tokio::test]
    async fn test_append_and_read_back() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut tx = db.pool().begin().await.unwrap();

        let first = MovementLedger::append(&mut tx, &movement(MovementKind::StockIn, 10, 10, "a"), 0)
            .await
            .unwrap();
        let second = MovementLedger::append(&mut tx, &movement(MovementKind::Sale, -3, 7, "b"), 10)
            .await
            .unwrap();
        assert!(second > first);
        tx.commit().await.unwrap();

        let ledger = db.ledger();
        assert_eq!(ledger.reconstruct_balance("shop-1", "coke").await.unwrap(), 7);

        let newest = ledger
            .history("shop-1", "coke", Pagination::newest_first(1))
            .await
            .unwrap();
        assert_eq!(newest.len(), 1);
        assert_eq!(newest[0].kind, MovementKind::Sale);
        assert_eq!(newest[0].previous_quantity(), 10);

        let by_sale = ledger.entries_for_correlation("b").await.unwrap();
        assert_eq!(by_sale.len(), 1);
        assert_eq!(by_sale[0].quantity_delta, -3);
    }

    #[tokio::test]
    async fn test_append_rejects_broken_chain() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut tx = db.pool().begin().await.unwrap();

        MovementLedger::append(&mut tx, &movement(MovementKind::StockIn, 5, 5, "a"), 0)
            .await
            .unwrap();

        // Claims the account held 4 before a -1, but the ledger says 5.
        let err = MovementLedger::append(&mut tx, &movement(MovementKind::Sale, -1, 3, "b"), 4)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::ConsistencyViolation { expected: 5, recorded: 4, .. }
        ));

        // Chain is fine but disagrees with the account balance read under lock.
        let err = MovementLedger::append(&mut tx, &movement(MovementKind::Sale, -1, 4, "c"), 6)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::ConsistencyViolation { expected: 6, recorded: 5, .. }
        ));
    }

    #[tokio::test]
    async fn test_adjustment_requires_reason() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut tx = db.pool().begin().await.unwrap();

        let mut entry = movement(MovementKind::Adjustment, 2, 2, "a");
        entry.reason = None;
        let err = MovementLedger::append(&mut tx, &entry, 0).await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation(ValidationError::Required { .. })));
    }

    #[tokio::test]
    async fn test_verify_shop_reports_drift() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut tx = db.pool().begin().await.unwrap();
        MovementLedger::append(&mut tx, &movement(MovementKind::StockIn, 5, 5, "a"), 0)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        // Ledger says 5, no account row yet.
        let mismatches = db.ledger().verify_shop("shop-1").await.unwrap();
        assert_eq!(mismatches.len(), 1);
        assert_eq!(mismatches[0].account_quantity, 0);
        assert_eq!(mismatches[0].ledger_quantity, 5);

        sqlx::query("INSERT INTO stock_accounts (shop_id, item_id, quantity) VALUES ('shop-1', 'coke', 5)")
            .execute(db.pool())
            .await
            .unwrap();
        assert!(db.ledger().verify_shop("shop-1").await.unwrap().is_empty());
    }
}
