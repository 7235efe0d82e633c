//! # Stock Event Outbox
//!
//! Events describing committed stock changes, written in the same
//! transaction as the change itself.
//!
//! ## The Outbox Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Outbox Pattern Implementation                        │
//! │                                                                         │
//! │  COORDINATOR OPERATION (e.g., apply_sale)                              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   SINGLE TRANSACTION                            │   │
//! │  │                                                                 │   │
//! │  │  1. UPDATE stock_accounts / INSERT movement_entries            │   │
//! │  │  2. INSERT sale_transactions (+ lines)                         │   │
//! │  │  3. INSERT INTO stock_outbox (event_type, aggregate_id, ...)   │   │
//! │  │     SALE_COMMITTED, LOW_STOCK, ...                             │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  COMMIT ← The event exists if and only if the change does              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  RELAY (outside this crate)                                            │
//! │    pending() → deliver → mark_delivered() / mark_failed()              │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};

// =============================================================================
// Event Types
// =============================================================================

/// Kind of committed change an outbox entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboxEventType {
    SaleCommitted,
    StockIn,
    Adjustment,
    Return,
    LowStock,
}

impl OutboxEventType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            OutboxEventType::SaleCommitted => "SALE_COMMITTED",
            OutboxEventType::StockIn => "STOCK_IN",
            OutboxEventType::Adjustment => "ADJUSTMENT",
            OutboxEventType::Return => "RETURN",
            OutboxEventType::LowStock => "LOW_STOCK",
        }
    }
}

impl std::fmt::Display for OutboxEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A queued event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct OutboxEntry {
    pub id: String,
    pub event_type: String,
    /// Sale id, return id or movement correlation id.
    pub aggregate_id: String,
    /// JSON body of the event.
    pub payload: String,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub attempted_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for the stock event outbox.
#[derive(Debug, Clone)]
pub struct OutboxRepository {
    pool: SqlitePool,
}

impl OutboxRepository {
    /// Creates a new OutboxRepository.
    pub fn new(pool: SqlitePool) -> Self {
        OutboxRepository { pool }
    }

    /// Queues an event inside the caller's transaction.
    pub(crate) async fn enqueue_in<T: Serialize>(
        conn: &mut SqliteConnection,
        event_type: OutboxEventType,
        aggregate_id: &str,
        payload: &T,
    ) -> DbResult<String> {
        let id = Uuid::new_v4().to_string();
        let payload =
            serde_json::to_string(payload).map_err(|e| DbError::Internal(e.to_string()))?;

        debug!(event_type = %event_type, aggregate_id = %aggregate_id, "Queuing stock event");

        sqlx::query(
            r#"
            INSERT INTO stock_outbox (
                id, event_type, aggregate_id, payload, attempts, created_at
            ) VALUES (?1, ?2, ?3, ?4, 0, ?5)
            "#,
        )
        .bind(&id)
        .bind(event_type.as_str())
        .bind(aggregate_id)
        .bind(&payload)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

        Ok(id)
    }

    /// Undelivered entries, oldest first.
    pub async fn pending(&self, limit: u32) -> DbResult<Vec<OutboxEntry>> {
        let entries = sqlx::query_as::<_, OutboxEntry>(
            r#"
            SELECT id, event_type, aggregate_id, payload, attempts,
                   last_error, created_at, attempted_at, delivered_at
            FROM stock_outbox
            WHERE delivered_at IS NULL
            ORDER BY created_at ASC, rowid ASC
            LIMIT ?1
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Every entry (delivered or not) for one aggregate, in creation order.
    pub async fn for_aggregate(&self, aggregate_id: &str) -> DbResult<Vec<OutboxEntry>> {
        let entries = sqlx::query_as::<_, OutboxEntry>(
            r#"
            SELECT id, event_type, aggregate_id, payload, attempts,
                   last_error, created_at, attempted_at, delivered_at
            FROM stock_outbox
            WHERE aggregate_id = ?1
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(aggregate_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Marks an entry as delivered.
    pub async fn mark_delivered(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE stock_outbox SET
                delivered_at = ?2,
                attempted_at = ?2
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("OutboxEntry", id));
        }

        Ok(())
    }

    /// Records a failed delivery attempt.
    pub async fn mark_failed(&self, id: &str, error: &str) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE stock_outbox SET
                attempts = attempts + 1,
                last_error = ?2,
                attempted_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("OutboxEntry", id));
        }

        Ok(())
    }

    /// Counts undelivered entries.
    pub async fn count_pending(&self) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM stock_outbox WHERE delivered_at IS NULL")
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    /// Deletes entries delivered more than `days_old` days ago.
    pub async fn cleanup_delivered(&self, days_old: u32) -> DbResult<u64> {
        let cutoff = Utc::now() - Duration::days(i64::from(days_old));

        let result = sqlx::query(
            r#"
            DELETE FROM stock_outbox
            WHERE delivered_at IS NOT NULL
            AND delivered_at < ?1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    #[tokio::test]
    async fn test_enqueue_deliver_fail() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let outbox = db.outbox();

        let mut tx = db.pool().begin().await.unwrap();
        let first = OutboxRepository::enqueue_in(
            &mut tx,
            OutboxEventType::StockIn,
            "corr-1",
            &serde_json::json!({ "qty": 5 }),
        )
        .await
        .unwrap();
        let second = OutboxRepository::enqueue_in(
            &mut tx,
            OutboxEventType::LowStock,
            "corr-1",
            &serde_json::json!({ "qty": 1 }),
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(outbox.count_pending().await.unwrap(), 2);
        let pending = outbox.pending(10).await.unwrap();
        assert_eq!(pending[0].id, first);
        assert_eq!(pending[0].event_type, "STOCK_IN");

        outbox.mark_failed(&second, "relay down").await.unwrap();
        outbox.mark_delivered(&first).await.unwrap();

        let pending = outbox.pending(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].attempts, 1);
        assert_eq!(pending[0].last_error.as_deref(), Some("relay down"));

        // Delivered today: nothing older than a day to clean.
        assert_eq!(outbox.cleanup_delivered(1).await.unwrap(), 0);
        assert!(outbox.mark_delivered("missing").await.is_err());
    }

    #[tokio::test]
    async fn test_rolled_back_event_disappears() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let mut tx = db.pool().begin().await.unwrap();
        OutboxRepository::enqueue_in(&mut tx, OutboxEventType::Adjustment, "x", &"payload")
            .await
            .unwrap();
        tx.rollback().await.unwrap();

        assert_eq!(db.outbox().count_pending().await.unwrap(), 0);
    }
}
