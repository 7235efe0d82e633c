//! # Stock Account Repository
//!
//! Current quantity on hand per (shop, item).
//!
//! ## Who Writes Here
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Stock Account Access                                 │
//! │                                                                         │
//! │  Anyone (pool)                        Coordinator only (open tx)       │
//! │  ─────────────                        ──────────────────────────        │
//! │  get_balance()    lazily creates 0    lock_account()  first write of   │
//! │  get_account()                                        the tx, takes    │
//! │  list_for_shop()                                      the write lock   │
//! │                                       apply_delta()   guarded UPDATE,  │
//! │                                                       paired with a    │
//! │                                                       ledger append    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `apply_delta` is crate-private: changing a quantity without holding the
//! account lock and writing the matching ledger entry would break the
//! ledger/account invariant.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use stockline_core::{StockAccount, StockShortfall};

use crate::coordinator::{LedgerError, LedgerResult};
use crate::error::{DbError, DbResult};

/// Repository for stock account balances.
#[derive(Debug, Clone)]
pub struct StockAccountRepository {
    pool: SqlitePool,
}

impl StockAccountRepository {
    /// Creates a new StockAccountRepository.
    pub fn new(pool: SqlitePool) -> Self {
        StockAccountRepository { pool }
    }

    /// Returns the quantity on hand, creating a zero-balance account on
    /// first access.
    pub async fn get_balance(&self, shop_id: &str, item_id: &str) -> DbResult<i64> {
        let mut conn = self.pool.acquire().await?;
        Self::lock_account(&mut conn, shop_id, item_id).await
    }

    /// Returns the account if it has been materialized.
    pub async fn get_account(&self, shop_id: &str, item_id: &str) -> DbResult<Option<StockAccount>> {
        let account = sqlx::query_as::<_, StockAccount>(
            r#"
            SELECT shop_id, item_id, quantity, last_movement_at
            FROM stock_accounts
            WHERE shop_id = ?1 AND item_id = ?2
            "#,
        )
        .bind(shop_id)
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    /// Lists every materialized account of a shop, ordered by item id.
    pub async fn list_for_shop(&self, shop_id: &str) -> DbResult<Vec<StockAccount>> {
        let accounts = sqlx::query_as::<_, StockAccount>(
            r#"
            SELECT shop_id, item_id, quantity, last_movement_at
            FROM stock_accounts
            WHERE shop_id = ?1
            ORDER BY item_id
            "#,
        )
        .bind(shop_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(accounts)
    }

    // =========================================================================
    // In-transaction operations (coordinator only)
    // =========================================================================

    /// Materializes the account if needed and returns its quantity.
    ///
    /// Inside a transaction this is a write, so the first call takes
    /// SQLite's write lock (waiting up to busy_timeout) before anything has
    /// been read. That keeps the snapshot the coordinator reads from
    /// current for the rest of the transaction.
    pub(crate) async fn lock_account(
        conn: &mut SqliteConnection,
        shop_id: &str,
        item_id: &str,
    ) -> DbResult<i64> {
        sqlx::query(
            r#"
            INSERT INTO stock_accounts (shop_id, item_id, quantity, last_movement_at)
            VALUES (?1, ?2, 0, NULL)
            ON CONFLICT (shop_id, item_id) DO NOTHING
            "#,
        )
        .bind(shop_id)
        .bind(item_id)
        .execute(&mut *conn)
        .await?;

        let quantity: i64 = sqlx::query_scalar(
            "SELECT quantity FROM stock_accounts WHERE shop_id = ?1 AND item_id = ?2",
        )
        .bind(shop_id)
        .bind(item_id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(quantity)
    }

    /// Adds `delta` to the account and returns the new quantity.
    ///
    /// The guard lives in the UPDATE itself, so a delta that would take the
    /// quantity below zero changes nothing and reports the shortfall.
    pub(crate) async fn apply_delta(
        conn: &mut SqliteConnection,
        shop_id: &str,
        item_id: &str,
        delta: i64,
        at: DateTime<Utc>,
    ) -> LedgerResult<i64> {
        debug!(shop_id = %shop_id, item_id = %item_id, delta, "Applying stock delta");

        let updated: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE stock_accounts SET
                quantity = quantity + ?3,
                last_movement_at = ?4
            WHERE shop_id = ?1 AND item_id = ?2
            AND quantity + ?3 >= 0
            RETURNING quantity
            "#,
        )
        .bind(shop_id)
        .bind(item_id)
        .bind(delta)
        .bind(at)
        .fetch_optional(&mut *conn)
        .await
        .map_err(DbError::from)?;

        if let Some(quantity) = updated {
            return Ok(quantity);
        }

        let available = Self::lock_account(conn, shop_id, item_id).await?;
        Err(LedgerError::InsufficientStock {
            shop_id: shop_id.to_string(),
            shortfalls: vec![StockShortfall {
                item_id: item_id.to_string(),
                requested: delta.checked_neg().unwrap_or(i64::MAX),
                available,
            }],
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    async fn setup() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_get_balance_materializes_zero() {
        let db = setup().await;
        let accounts = db.accounts();

        assert!(accounts.get_account("shop-1", "coke").await.unwrap().is_none());
        assert_eq!(accounts.get_balance("shop-1", "coke").await.unwrap(), 0);

        let account = accounts.get_account("shop-1", "coke").await.unwrap().unwrap();
        assert_eq!(account.quantity, 0);
        assert!(account.last_movement_at.is_none());
    }

    #[tokio::test]
    async fn test_apply_delta_guards_negative() {
        let db = setup().await;
        let mut tx = db.pool().begin().await.unwrap();

        StockAccountRepository::lock_account(&mut tx, "shop-1", "coke")
            .await
            .unwrap();
        let qty = StockAccountRepository::apply_delta(&mut tx, "shop-1", "coke", 5, Utc::now())
            .await
            .unwrap();
        assert_eq!(qty, 5);

        let err = StockAccountRepository::apply_delta(&mut tx, "shop-1", "coke", -6, Utc::now())
            .await
            .unwrap_err();
        match err {
            LedgerError::InsufficientStock { shortfalls, .. } => {
                assert_eq!(shortfalls[0].requested, 6);
                assert_eq!(shortfalls[0].available, 5);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let qty = StockAccountRepository::apply_delta(&mut tx, "shop-1", "coke", -5, Utc::now())
            .await
            .unwrap();
        assert_eq!(qty, 0);
        tx.commit().await.unwrap();

        let accounts = db.accounts().list_for_shop("shop-1").await.unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].quantity, 0);
        assert!(accounts[0].last_movement_at.is_some());
    }
}
