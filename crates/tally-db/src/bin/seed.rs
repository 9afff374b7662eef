//! # Demo Data Seeder
//!
//! Creates a small store and runs every business event once against it.
//!
//! ## Usage
//! ```bash
//! # Seed the database named in tally.toml (or ./tally.db)
//! cargo run -p tally-db --bin seed
//!
//! # Explicit config file and database path
//! cargo run -p tally-db --bin seed -- --config ./tally.toml --db ./data/demo.db
//! ```
//!
//! ## What It Writes
//! - Module settings and the default chart of accounts
//! - Products, one with a `carton` unit
//! - A supplier purchase on credit (two batches, one expiring)
//! - A customer sale on mixed payment with interest
//! - A damage write-off
//!
//! It finishes by reconciling every cache; a clean seed reports no drift.

use chrono::{Duration, Utc};
use std::env;
use std::path::PathBuf;
use tally_core::{Money, MovementReason, PaymentMethod, PaymentType};
use tally_db::repository::product::{NewProduct, NewProductUnit};
use tally_db::repository::{PartyRepository, ProductRepository};
use tally_db::{
    AdjustStockRequest, CreatePurchaseRequest, CreateSaleRequest, Engine, EngineConfig,
    PurchaseItemInput, SaleItemInput,
};
use tracing_subscriber::EnvFilter;

/// `(name, sku, cost, price)` in IQD.
const PRODUCTS: &[(&str, &str, i64, i64)] = &[
    ("Mineral Water 500ml", "BEV-001", 150, 250),
    ("Yogurt Cup", "DRY-001", 400, 750),
    ("Basmati Rice 5kg", "GRO-001", 9_000, 12_000),
];

fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut config_path: Option<PathBuf> = None;
    let mut db_path: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Tally Demo Seeder");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --config <PATH>  Config file (default: platform config dir)");
                println!("  -d, --db <PATH>      Database file (overrides the config)");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            other => eprintln!("Ignoring unknown argument {}", other),
        }
        i += 1;
    }

    let mut config = EngineConfig::load(config_path)?;
    if let Some(path) = db_path {
        config.database.path = path;
    }
    init_tracing(&config.logging.filter);

    println!("Tally Demo Seeder");
    println!("=================");
    println!("Database: {}", config.database.path.display());
    println!("FIFO:     {}", config.costing.fifo_enabled);
    println!();

    let engine = Engine::open(&config).await?;

    let existing = {
        let mut conn = engine.database().acquire().await?;
        ProductRepository::new(&mut conn).stock_levels().await?.len()
    };
    if existing > 0 {
        println!("Database already has {} products, skipping seed.", existing);
        println!("Delete the database file to regenerate.");
        return Ok(());
    }

    // Settings + chart
    engine.set_setting("currency.base", "IQD").await?;
    engine.set_setting("units.enabled", "true").await?;
    let chart = engine.chart().initialize().await?;
    println!("✓ Chart of accounts: {} created, {} existing", chart.created.len(), chart.existing.len());

    // Catalog + parties
    let (product_ids, customer_id, supplier_id) = {
        let mut conn = engine.database().acquire().await?;
        let mut ids = Vec::with_capacity(PRODUCTS.len());
        for (name, sku, cost, price) in PRODUCTS {
            let product = ProductRepository::new(&mut conn)
                .create(&NewProduct {
                    name: name.to_string(),
                    sku: Some(sku.to_string()),
                    cost_price: Money::from_minor(*cost),
                    selling_price: Money::from_minor(*price),
                })
                .await?;
            ids.push(product.id);
        }

        ProductRepository::new(&mut conn)
            .add_unit(
                ids[0],
                &NewProductUnit {
                    unit_name: "carton".to_string(),
                    factor_to_base: 12,
                    selling_price: Some(Money::from_minor(2_750)),
                    is_default: false,
                },
            )
            .await?;

        let mut parties = PartyRepository::new(&mut conn);
        let customer = parties.create_customer("Ahmed Store", Some("07700000001")).await?;
        let supplier = parties.create_supplier("Baghdad Wholesale", Some("07800000002")).await?;
        (ids, customer.id, supplier.id)
    };
    println!("✓ {} products, 1 customer, 1 supplier", product_ids.len());

    // Purchase on credit
    let expiry = (Utc::now() + Duration::days(30)).date_naive();
    let purchase = engine
        .create_purchase(CreatePurchaseRequest {
            supplier_id: Some(supplier_id),
            items: vec![
                PurchaseItemInput {
                    product_id: product_ids[0],
                    quantity: 120,
                    unit_cost: Money::from_minor(150),
                    ..PurchaseItemInput::default()
                },
                PurchaseItemInput {
                    product_id: product_ids[1],
                    quantity: 40,
                    unit_cost: Money::from_minor(400),
                    expiry_date: Some(expiry),
                    ..PurchaseItemInput::default()
                },
                PurchaseItemInput {
                    product_id: product_ids[2],
                    quantity: 10,
                    unit_cost: Money::from_minor(9_000),
                    ..PurchaseItemInput::default()
                },
            ],
            payment_method: PaymentMethod::Credit,
            paid_amount: Money::from_minor(50_000),
            idempotency_key: Some("seed:purchase:1".to_string()),
            ..CreatePurchaseRequest::default()
        })
        .await?;
    println!(
        "✓ Purchase {} total {} (journal created: {})",
        purchase.purchase.invoice_number, purchase.purchase.total, purchase.journal.created
    );

    // Mixed sale with interest
    let sale = engine
        .create_sale(CreateSaleRequest {
            customer_id: Some(customer_id),
            items: vec![
                SaleItemInput {
                    product_id: product_ids[0],
                    quantity: 2,
                    unit_name: Some("carton".to_string()),
                    ..SaleItemInput::default()
                },
                SaleItemInput {
                    product_id: product_ids[1],
                    quantity: 4,
                    ..SaleItemInput::default()
                },
            ],
            payment_type: PaymentType::Mixed,
            paid_amount: Money::from_minor(3_000),
            interest_rate_bps: 500,
            idempotency_key: Some("seed:sale:1".to_string()),
            ..CreateSaleRequest::default()
        })
        .await?;
    println!(
        "✓ Sale {} total {} cogs {} margin {} bps",
        sale.sale.invoice_number, sale.sale.total, sale.diagnostics.cogs, sale.diagnostics.margin_bps
    );

    // Damage write-off
    let adjustment = engine
        .adjust_stock(AdjustStockRequest {
            product_id: product_ids[2],
            quantity_change: -1,
            reason: Some(MovementReason::Damage),
            notes: Some("Torn bag".to_string()),
            idempotency_key: Some("seed:adjust:1".to_string()),
            ..AdjustStockRequest::default()
        })
        .await?;
    println!("✓ Adjustment movement #{} (stock now {})", adjustment.movement.id, adjustment.product.stock);

    // Reconcile
    let summary = engine.reconciliation().reconcile_all().await?;
    println!();
    println!(
        "Drift: stock {}, customers {}, suppliers {}",
        summary.stock.drifts.len(),
        summary.customer_debt.drifts.len(),
        summary.supplier_balance.drifts.len()
    );

    engine.database().close().await;
    println!("✓ Seed complete!");
    Ok(())
}
