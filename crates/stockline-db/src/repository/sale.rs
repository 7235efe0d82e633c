//! # Sale Repository
//!
//! Storage for committed sales and the returns recorded against them.
//!
//! ## Sale Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sale Lifecycle                                    │
//! │                                                                         │
//! │  1. COMMIT (coordinator, one transaction)                              │
//! │     └── insert_in() → sale_transactions + sale_line_items              │
//! │         (alongside the ledger entries and the invoice number)          │
//! │                                                                         │
//! │  2. READ                                                               │
//! │     └── get_by_id() / get_by_invoice_number()                          │
//! │     └── find_by_idempotency_key() → replay of a retried checkout       │
//! │                                                                         │
//! │  3. (OPTIONAL) RETURNS                                                 │
//! │     └── insert_return_lines_in() → sale_return_lines                   │
//! │     └── returned_quantity_in() caps what may still come back           │
//! │                                                                         │
//! │  A committed sale is never modified.                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use stockline_core::{LineRequest, PaymentMeta, PaymentMethod, SaleLine, SaleTransaction};

use crate::error::DbResult;

/// Row shape of `sale_transactions`.
#[derive(Debug, sqlx::FromRow)]
struct SaleHeaderRow {
    id: String,
    shop_id: String,
    merchant_id: String,
    actor_id: String,
    invoice_number: String,
    total_cents: i64,
    payment_method: PaymentMethod,
    payment_reference: Option<String>,
    idempotency_key: Option<String>,
    created_at: DateTime<Utc>,
}

impl SaleHeaderRow {
    fn into_sale(self, lines: Vec<SaleLine>) -> SaleTransaction {
        SaleTransaction {
            id: self.id,
            shop_id: self.shop_id,
            merchant_id: self.merchant_id,
            actor_id: self.actor_id,
            invoice_number: self.invoice_number,
            lines,
            total_cents: self.total_cents,
            payment: PaymentMeta {
                method: self.payment_method,
                reference: self.payment_reference,
            },
            idempotency_key: self.idempotency_key,
            created_at: self.created_at,
        }
    }
}

const HEADER_COLUMNS: &str = r#"
    id, shop_id, merchant_id, actor_id, invoice_number, total_cents,
    payment_method, payment_reference, idempotency_key, created_at
"#;

/// Repository for sale database operations.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    /// Creates a new SaleRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    /// Gets a sale (with lines) by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<SaleTransaction>> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch_one_where(&mut conn, "id", id).await
    }

    /// Gets a sale by its invoice number.
    pub async fn get_by_invoice_number(&self, invoice_number: &str) -> DbResult<Option<SaleTransaction>> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch_one_where(&mut conn, "invoice_number", invoice_number).await
    }

    /// Gets the sale committed under an idempotency key.
    pub async fn find_by_idempotency_key(&self, key: &str) -> DbResult<Option<SaleTransaction>> {
        let mut conn = self.pool.acquire().await?;
        Self::find_by_idempotency_key_in(&mut conn, key).await
    }

    /// Most recent sales of a shop, newest first.
    pub async fn list_for_shop(&self, shop_id: &str, limit: u32) -> DbResult<Vec<SaleTransaction>> {
        let mut conn = self.pool.acquire().await?;

        let sql = format!(
            "SELECT {HEADER_COLUMNS} FROM sale_transactions
             WHERE shop_id = ?1
             ORDER BY created_at DESC, invoice_number DESC
             LIMIT ?2"
        );
        let headers = sqlx::query_as::<_, SaleHeaderRow>(&sql)
            .bind(shop_id)
            .bind(i64::from(limit))
            .fetch_all(&mut *conn)
            .await?;

        let mut sales = Vec::with_capacity(headers.len());
        for header in headers {
            let lines = Self::lines_in(&mut conn, &header.id).await?;
            sales.push(header.into_sale(lines));
        }

        Ok(sales)
    }

    /// Units of `item_id` already returned against `sale_id`.
    pub async fn returned_quantity(&self, sale_id: &str, item_id: &str) -> DbResult<i64> {
        let mut conn = self.pool.acquire().await?;
        Self::returned_quantity_in(&mut conn, sale_id, item_id).await
    }

    // =========================================================================
    // In-transaction operations (coordinator only)
    // =========================================================================

    pub(crate) async fn find_by_idempotency_key_in(
        conn: &mut SqliteConnection,
        key: &str,
    ) -> DbResult<Option<SaleTransaction>> {
        Self::fetch_one_where(conn, "idempotency_key", key).await
    }

    /// Inserts the sale header and its lines.
    pub(crate) async fn insert_in(conn: &mut SqliteConnection, sale: &SaleTransaction) -> DbResult<()> {
        debug!(sale_id = %sale.id, invoice = %sale.invoice_number, "Inserting sale");

        sqlx::query(
            r#"
            INSERT INTO sale_transactions (
                id, shop_id, merchant_id, actor_id, invoice_number, total_cents,
                payment_method, payment_reference, idempotency_key, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&sale.id)
        .bind(&sale.shop_id)
        .bind(&sale.merchant_id)
        .bind(&sale.actor_id)
        .bind(&sale.invoice_number)
        .bind(sale.total_cents)
        .bind(sale.payment.method)
        .bind(&sale.payment.reference)
        .bind(&sale.idempotency_key)
        .bind(sale.created_at)
        .execute(&mut *conn)
        .await?;

        for line in &sale.lines {
            sqlx::query(
                r#"
                INSERT INTO sale_line_items (
                    sale_id, line_no, item_id, sku_snapshot, name_snapshot,
                    quantity, unit_price_cents, line_total_cents
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            )
            .bind(&sale.id)
            .bind(line.line_no)
            .bind(&line.item_id)
            .bind(&line.sku_snapshot)
            .bind(&line.name_snapshot)
            .bind(line.quantity)
            .bind(line.unit_price_cents)
            .bind(line.line_total_cents)
            .execute(&mut *conn)
            .await?;
        }

        Ok(())
    }

    pub(crate) async fn returned_quantity_in(
        conn: &mut SqliteConnection,
        sale_id: &str,
        item_id: &str,
    ) -> DbResult<i64> {
        let returned: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(quantity), 0)
            FROM sale_return_lines
            WHERE sale_id = ?1 AND item_id = ?2
            "#,
        )
        .bind(sale_id)
        .bind(item_id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(returned)
    }

    pub(crate) async fn insert_return_lines_in(
        conn: &mut SqliteConnection,
        return_id: &str,
        sale_id: &str,
        actor_id: &str,
        lines: &[LineRequest],
        at: DateTime<Utc>,
    ) -> DbResult<()> {
        for line in lines {
            sqlx::query(
                r#"
                INSERT INTO sale_return_lines (
                    return_id, sale_id, item_id, quantity, actor_id, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )
            .bind(return_id)
            .bind(sale_id)
            .bind(&line.item_id)
            .bind(line.quantity)
            .bind(actor_id)
            .bind(at)
            .execute(&mut *conn)
            .await?;
        }

        Ok(())
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// `column` is always one of our own literals, never caller input.
    async fn fetch_one_where(
        conn: &mut SqliteConnection,
        column: &'static str,
        value: &str,
    ) -> DbResult<Option<SaleTransaction>> {
        let sql = format!("SELECT {HEADER_COLUMNS} FROM sale_transactions WHERE {column} = ?1");
        let header = sqlx::query_as::<_, SaleHeaderRow>(&sql)
            .bind(value)
            .fetch_optional(&mut *conn)
            .await?;

        match header {
            Some(header) => {
                let lines = Self::lines_in(conn, &header.id).await?;
                Ok(Some(header.into_sale(lines)))
            }
            None => Ok(None),
        }
    }

    async fn lines_in(conn: &mut SqliteConnection, sale_id: &str) -> DbResult<Vec<SaleLine>> {
        let lines = sqlx::query_as::<_, SaleLine>(
            r#"
            SELECT line_no, item_id, sku_snapshot, name_snapshot,
                   quantity, unit_price_cents, line_total_cents
            FROM sale_line_items
            WHERE sale_id = ?1
            ORDER BY line_no
            "#,
        )
        .bind(sale_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(lines)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
