//! # Catalog and Shop Repositories
//!
//! SQLite-backed implementations of [`Catalog`] and [`ShopDirectory`].
//!
//! Deployments that keep item master data elsewhere implement the traits
//! themselves and hand them to
//! [`StockCoordinator::new`](crate::coordinator::StockCoordinator::new);
//! these repositories back the default setup, the seed binary and tests.
//!
//! ## Archiving
//! ```text
//! catalog_items
//! ┌──────────┬────────────┬─────────────┐
//! │ id       │ sku        │ is_archived │
//! ├──────────┼────────────┼─────────────┤
//! │ coke     │ COKE-330   │ 0           │ ← get_item() OK
//! │ old-cola │ OLD-COLA   │ 1           │ ← get_item() NotFound
//! └──────────┴────────────┴─────────────┘
//! ```
//! Archived items keep their ledger history; they just cannot be sold or
//! restocked any more.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use stockline_core::{CatalogItem, Shop};

use crate::collaborators::{Catalog, ShopDirectory};
use crate::coordinator::{LedgerError, LedgerResult};
use crate::error::{DbError, DbResult};

// =============================================================================
// Catalog
// =============================================================================

/// Repository for catalog items.
#[derive(Debug, Clone)]
pub struct CatalogRepository {
    pool: SqlitePool,
}

impl CatalogRepository {
    /// Creates a new CatalogRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CatalogRepository { pool }
    }

    /// Gets an active (non-archived) item by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<CatalogItem>> {
        let item = sqlx::query_as::<_, CatalogItem>(
            r#"
            SELECT id, merchant_id, sku, name, unit_price_cents, low_stock_threshold
            FROM catalog_items
            WHERE id = ?1 AND is_archived = 0
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(item)
    }

    /// Inserts a new item.
    ///
    /// ## Returns
    /// * `Err(DbError::UniqueViolation)` - id, or SKU within the merchant, exists
    pub async fn insert(&self, item: &CatalogItem) -> DbResult<()> {
        debug!(sku = %item.sku, "Inserting catalog item");

        sqlx::query(
            r#"
            INSERT INTO catalog_items (
                id, merchant_id, sku, name, unit_price_cents,
                low_stock_threshold, is_archived, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)
            "#,
        )
        .bind(&item.id)
        .bind(&item.merchant_id)
        .bind(&item.sku)
        .bind(&item.name)
        .bind(item.unit_price_cents)
        .bind(item.low_stock_threshold)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Archives an item so it can no longer be sold or restocked.
    pub async fn archive(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query("UPDATE catalog_items SET is_archived = 1 WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Item", id));
        }

        Ok(())
    }
}

#[async_trait]
impl Catalog for CatalogRepository {
    async fn get_item(&self, item_id: &str) -> LedgerResult<CatalogItem> {
        self.get_by_id(item_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Item", item_id))
    }
}

// =============================================================================
// Shop Directory
// =============================================================================

/// Repository for shops.
#[derive(Debug, Clone)]
pub struct ShopRepository {
    pool: SqlitePool,
}

impl ShopRepository {
    /// Creates a new ShopRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ShopRepository { pool }
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Shop>> {
        let shop = sqlx::query_as::<_, Shop>(
            "SELECT id, merchant_id, is_active FROM shops WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(shop)
    }

    /// Registers a shop.
    pub async fn insert(&self, shop: &Shop, name: &str) -> DbResult<()> {
        debug!(shop_id = %shop.id, "Inserting shop");

        sqlx::query(
            r#"
            INSERT INTO shops (id, merchant_id, name, is_active, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&shop.id)
        .bind(&shop.merchant_id)
        .bind(name)
        .bind(shop.is_active)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

}

#[async_trait]
impl ShopDirectory for ShopRepository {
    async fn get_shop(&self, shop_id: &str) -> LedgerResult<Shop> {
        self.get_by_id(shop_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Shop", shop_id))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    fn coke() -> CatalogItem {
        CatalogItem {
            id: "coke".to_string(),
            merchant_id: "merchant-1".to_string(),
            sku: "COKE-330".to_string(),
            name: "Coca-Cola 330ml".to_string(),
            unit_price_cents: 150,
            low_stock_threshold: Some(5),
        }
    }

    #[tokio::test]
    async fn test_catalog_lookup_and_archive() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let catalog = db.catalog();
        catalog.insert(&coke()).await.unwrap();

        assert_eq!(catalog.get_item("coke").await.unwrap(), coke());

        catalog.archive("coke").await.unwrap();
        let err = catalog.get_item("coke").await.unwrap_err();
        assert!(matches!(err, LedgerError::NotFound { .. }));
        assert!(catalog.get_by_id("coke").await.unwrap().is_none());

        assert!(matches!(
            catalog.archive("ghost").await.unwrap_err(),
            DbError::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_duplicate_sku_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.catalog().insert(&coke()).await.unwrap();

        let mut dup = coke();
        dup.id = "coke-2".to_string();
        let err = db.catalog().insert(&dup).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_shop_directory() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let shops = db.shops();
        let shop = Shop {
            id: "shop-1".to_string(),
            merchant_id: "merchant-1".to_string(),
            is_active: true,
        };
        shops.insert(&shop, "Downtown").await.unwrap();
        assert_eq!(shops.get_shop("shop-1").await.unwrap(), shop);

        let closed = Shop {
            id: "shop-2".to_string(),
            is_active: false,
            ..shop.clone()
        };
        shops.insert(&closed, "Harbour").await.unwrap();
        assert!(!shops.get_shop("shop-2").await.unwrap().is_active);

        assert!(matches!(
            shops.get_shop("nowhere").await.unwrap_err(),
            LedgerError::NotFound { .. }
        ));
    }
}
