//! # Seed Data Generator
//!
//! Populates a database with a demo merchant, its shops and catalog, then
//! receives opening stock and rings up one sale through the coordinator.
//!
//! ## Usage
//! ```bash
//! # Seed ./stockline_dev.db with 3 shops (default)
//! cargo run -p stockline-db --bin seed
//!
//! # Custom shop count and database path
//! cargo run -p stockline-db --bin seed -- --shops 5 --db ./data/stockline.db
//!
//! # Read settings from a config file (STOCKLINE_* env vars still apply)
//! cargo run -p stockline-db --bin seed -- --config ./stockline.toml
//! ```
//!
//! ## Generated Data
//! - One merchant (`merchant-demo`) with shops `shop-01`, `shop-02`, ...
//! - Catalog items across beverages, snacks and dairy, each with a
//!   low-stock threshold
//! - Opening stock per shop, recorded as `stock_in` ledger entries
//! - One demo sale in the first shop, so an invoice number is issued

use std::env;
use std::path::PathBuf;

use stockline_core::{CatalogItem, LineRequest, PaymentMeta, SaleRequest, Shop};
use stockline_db::{Database, LedgerConfig};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const MERCHANT_ID: &str = "merchant-demo";
const ACTOR_ID: &str = "seed";

/// (sku, name, unit price in cents, low-stock threshold)
const ITEMS: &[(&str, &str, i64, i64)] = &[
    ("BEV-COLA-330", "Cola 330ml", 150, 12),
    ("BEV-WATR-500", "Still Water 500ml", 90, 24),
    ("BEV-JUIC-1L", "Orange Juice 1L", 320, 6),
    ("SNK-CHIP-150", "Salted Chips 150g", 210, 10),
    ("SNK-CHOC-100", "Dark Chocolate 100g", 280, 8),
    ("DRY-MILK-1L", "Whole Milk 1L", 130, 10),
    ("DRY-YOGT-500", "Plain Yogurt 500g", 240, 5),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    let mut shop_count: usize = 3;
    let mut db_path: Option<String> = None;
    let mut config_path: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--shops" | "-s" => {
                if i + 1 < args.len() {
                    shop_count = args[i + 1].parse().unwrap_or(3);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Stockline Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -s, --shops <N>      Number of shops to create (default: 3)");
                println!("  -d, --db <PATH>      Database file path (default: ./stockline_dev.db)");
                println!("  -c, --config <PATH>  TOML config file");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            other => warn!(arg = %other, "Ignoring unknown argument"),
        }
        i += 1;
    }

    let mut config = LedgerConfig::load(config_path.as_deref())?;
    match db_path {
        Some(path) => config.database.path = PathBuf::from(path),
        None if config_path.is_none() => config.database.path = PathBuf::from("./stockline_dev.db"),
        None => {}
    }
    config.validate()?;

    info!(path = %config.database.path.display(), shops = shop_count, "Seeding database");

    let db = Database::from_config(&config).await?;

    if db.shops().get_by_id("shop-01").await?.is_some() {
        warn!("Database already has demo shops; delete the file to regenerate");
        return Ok(());
    }

    // Shops
    let shop_ids: Vec<String> = (1..=shop_count).map(|n| format!("shop-{n:02}")).collect();
    for (idx, shop_id) in shop_ids.iter().enumerate() {
        let shop = Shop {
            id: shop_id.clone(),
            merchant_id: MERCHANT_ID.to_string(),
            is_active: true,
        };
        db.shops().insert(&shop, &format!("Demo Shop {}", idx + 1)).await?;
    }
    info!(count = shop_ids.len(), "Shops created");

    // Catalog
    let mut item_ids = Vec::with_capacity(ITEMS.len());
    for (sku, name, price_cents, threshold) in ITEMS {
        let item = CatalogItem {
            id: sku.to_lowercase(),
            merchant_id: MERCHANT_ID.to_string(),
            sku: sku.to_string(),
            name: name.to_string(),
            unit_price_cents: *price_cents,
            low_stock_threshold: Some(*threshold),
        };
        db.catalog().insert(&item).await?;
        item_ids.push(item.id);
    }
    info!(count = item_ids.len(), "Catalog items created");

    // Opening stock
    let coordinator = db.coordinator_with(config.coordinator_settings());
    let start = std::time::Instant::now();
    let mut movements = 0usize;

    for (shop_idx, shop_id) in shop_ids.iter().enumerate() {
        for (item_idx, item_id) in item_ids.iter().enumerate() {
            let quantity = 20 + ((shop_idx * 7 + item_idx * 13) % 60) as i64;
            match coordinator
                .apply_stock_in(shop_id, item_id, quantity, ACTOR_ID)
                .await
            {
                Ok(_) => movements += 1,
                Err(e) => error!(shop_id = %shop_id, item_id = %item_id, error = %e, "Stock-in failed"),
            }
        }
    }
    info!(movements, elapsed = ?start.elapsed(), "Opening stock received");

    // Demo sale
    if let (Some(shop_id), Some(first), Some(second)) =
        (shop_ids.first(), item_ids.first(), item_ids.get(3))
    {
        let sale = coordinator
            .apply_sale(SaleRequest {
                shop_id: shop_id.clone(),
                merchant_id: MERCHANT_ID.to_string(),
                actor_id: ACTOR_ID.to_string(),
                lines: vec![LineRequest::new(first.as_str(), 2), LineRequest::new(second.as_str(), 1)],
                payment: PaymentMeta::default(),
                idempotency_key: Some("seed-demo-sale".to_string()),
            })
            .await?;
        info!(invoice = %sale.invoice_number, total = %sale.total(), "Demo sale recorded");

        let mismatches = db.ledger().verify_shop(shop_id).await?;
        if mismatches.is_empty() {
            info!(shop_id = %shop_id, "Ledger and balances agree");
        } else {
            error!(shop_id = %shop_id, count = mismatches.len(), "Ledger mismatches found");
        }
    }

    db.close().await;
    info!("Seed complete");

    Ok(())
}
