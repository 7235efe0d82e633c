//! # Sequence Repository
//!
//! Gap-free, strictly increasing counters per scope (e.g. `INV-2025`).
//!
//! ## Allocation
//! ```text
//! INSERT INTO sequence_counters (scope, last_issued) VALUES ('INV-2025', 1)
//! ON CONFLICT (scope) DO UPDATE SET last_issued = last_issued + 1
//! RETURNING last_issued
//! ```
//!
//! One statement both creates the counter and increments it, so two
//! callers can never read the same value. When the statement runs inside
//! a sale's transaction ([`SequenceRepository::next_in`]), a rollback
//! returns the value as well: numbers are only consumed by committed sales.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use stockline_core::validation::validate_scope_key;

use crate::coordinator::LedgerResult;
use crate::error::{DbError, DbResult};

/// Repository for sequence counters.
#[derive(Debug, Clone)]
pub struct SequenceRepository {
    pool: SqlitePool,
}

impl SequenceRepository {
    /// Creates a new SequenceRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SequenceRepository { pool }
    }

    /// Issues the next value of `scope` in its own transaction.
    /// The first value of a new scope is 1.
    pub async fn next(&self, scope: &str) -> LedgerResult<i64> {
        validate_scope_key(scope)?;
        let mut conn = self.pool.acquire().await.map_err(DbError::from)?;
        Ok(Self::next_in(&mut conn, scope).await?)
    }

    /// Last value issued for `scope`; 0 for a scope that never issued one.
    pub async fn current(&self, scope: &str) -> DbResult<i64> {
        let value: Option<i64> =
            sqlx::query_scalar("SELECT last_issued FROM sequence_counters WHERE scope = ?1")
                .bind(scope)
                .fetch_optional(&self.pool)
                .await?;

        Ok(value.unwrap_or(0))
    }

    /// Issues the next value of `scope` inside the caller's transaction.
    pub(crate) async fn next_in(conn: &mut SqliteConnection, scope: &str) -> DbResult<i64> {
        let value: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO sequence_counters (scope, last_issued, updated_at)
            VALUES (?1, 1, ?2)
            ON CONFLICT (scope) DO UPDATE SET
                last_issued = last_issued + 1,
                updated_at = excluded.updated_at
            RETURNING last_issued
            "#,
        )
        .bind(scope)
        .bind(Utc::now())
        .fetch_one(&mut *conn)
        .await?;

        debug!(scope = %scope, value, "Sequence value issued");
        Ok(value)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
