//! # Product Repository
//!
//! Products, their packaging units and the cached `stock` column.
//!
//! ## Stock Cache
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    products.stock is a projection                       │
//! │                                                                         │
//! │  inventory_movements (truth)          products.stock (cache)            │
//! │  ┌────────────────────────┐           ┌──────────────────┐              │
//! │  │ in      +20  purchase  │           │                  │              │
//! │  │ out      −8  sale      │──replay──►│       10         │              │
//! │  │ adjust   −2  damage    │           │                  │              │
//! │  └────────────────────────┘           └──────────────────┘              │
//! │                                                                         │
//! │  Every writer that appends a movement also calls adjust_stock() in     │
//! │  the same transaction. Reconciliation detects and repairs drift.       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::{DbError, DbResult};
use tally_core::{Money, Product, ProductUnit};

/// Insert payload for a product. Stock always starts at zero; opening
/// stock goes through a stock adjustment so it has a movement.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub sku: Option<String>,
    pub cost_price: Money,
    pub selling_price: Money,
}

#[derive(Debug, Clone)]
pub struct NewProductUnit {
    pub unit_name: String,
    pub factor_to_base: i64,
    pub selling_price: Option<Money>,
    pub is_default: bool,
}

pub struct ProductRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> ProductRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        ProductRepository { conn }
    }

    pub async fn create(&mut self, product: &NewProduct) -> DbResult<Product> {
        debug!(name = %product.name, sku = ?product.sku, "Creating product");

        let now = Utc::now();
        let created = sqlx::query_as::<_, Product>(
            r#"
            INSERT INTO products (name, sku, cost_price, selling_price, stock, is_active, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, 0, 1, ?5, ?5)
            RETURNING *
            "#,
        )
        .bind(&product.name)
        .bind(&product.sku)
        .bind(product.cost_price)
        .bind(product.selling_price)
        .bind(now)
        .fetch_one(&mut *self.conn)
        .await?;

        Ok(created)
    }

    pub async fn get_by_id(&mut self, id: i64) -> DbResult<Product> {
        sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?
            .ok_or_else(|| DbError::not_found("Product", id))
    }

    /// Active units for a product, default unit first.
    pub async fn units(&mut self, product_id: i64) -> DbResult<Vec<ProductUnit>> {
        let units = sqlx::query_as::<_, ProductUnit>(
            r#"
            SELECT * FROM product_units
            WHERE product_id = ?1 AND is_active = 1
            ORDER BY is_default DESC, factor_to_base ASC
            "#,
        )
        .bind(product_id)
        .fetch_all(&mut *self.conn)
        .await?;
        Ok(units)
    }

    pub async fn add_unit(&mut self, product_id: i64, unit: &NewProductUnit) -> DbResult<ProductUnit> {
        debug!(product_id, unit = %unit.unit_name, factor = unit.factor_to_base, "Adding product unit");

        let created = sqlx::query_as::<_, ProductUnit>(
            r#"
            INSERT INTO product_units (product_id, unit_name, factor_to_base, selling_price, is_default, is_active)
            VALUES (?1, ?2, ?3, ?4, ?5, 1)
            RETURNING *
            "#,
        )
        .bind(product_id)
        .bind(&unit.unit_name)
        .bind(unit.factor_to_base)
        .bind(unit.selling_price)
        .bind(unit.is_default)
        .fetch_one(&mut *self.conn)
        .await?;

        Ok(created)
    }

    /// Adds `delta` to the cached stock and returns `(before, after)`.
    pub async fn adjust_stock(&mut self, product_id: i64, delta: i64) -> DbResult<(i64, i64)> {
        let after: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE products SET stock = stock + ?1, updated_at = ?2
            WHERE id = ?3
            RETURNING stock
            "#,
        )
        .bind(delta)
        .bind(Utc::now())
        .bind(product_id)
        .fetch_optional(&mut *self.conn)
        .await?;

        let after = after.ok_or_else(|| DbError::not_found("Product", product_id))?;
        debug!(product_id, delta, stock_after = after, "Adjusted product stock");
        Ok((after - delta, after))
    }

    /// Overwrites the cached stock (reconciliation repair).
    pub async fn set_stock(&mut self, product_id: i64, stock: i64) -> DbResult<()> {
        let result = sqlx::query("UPDATE products SET stock = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(stock)
            .bind(Utc::now())
            .bind(product_id)
            .execute(&mut *self.conn)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", product_id));
        }
        Ok(())
    }

    /// `(product_id, cached stock)` for every product.
    pub async fn stock_levels(&mut self) -> DbResult<Vec<(i64, i64)>> {
        let rows: Vec<(i64, i64)> = sqlx::query_as("SELECT id, stock FROM products ORDER BY id")
            .fetch_all(&mut *self.conn)
            .await?;
        Ok(rows)
    }
}
