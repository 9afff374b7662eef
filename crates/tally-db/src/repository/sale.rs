//! # Sale Repository
//!
//! Sales, their frozen line items and per-batch depletions.
//!
//! ## Sale Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sale Lifecycle                                    │
//! │                                                                         │
//! │  1. INSERT HEADER                                                      │
//! │     └── insert() → Some(Sale)  or None when the key was already used   │
//! │                                                                         │
//! │  2. ITEMS                                                              │
//! │     └── insert_item() → SaleItem                                       │
//! │     └── insert_depletion() → one row per batch drawn from              │
//! │                                                                         │
//! │  3. LATER PAYMENTS                                                     │
//! │     └── update_payment() → paid / remaining / status                   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::{DbError, DbResult};
use tally_core::fifo::Depletion;
use tally_core::{DocumentStatus, Money, PaymentType, Sale, SaleItem, SaleItemDepletion};

/// Insert payload for a sale header. Totals are already computed.
#[derive(Debug, Clone)]
pub struct NewSale {
    pub invoice_number: String,
    pub customer_id: Option<i64>,
    pub subtotal: Money,
    pub discount: Money,
    pub tax: Money,
    pub total: Money,
    pub currency: String,
    pub payment_type: PaymentType,
    pub paid_amount: Money,
    pub remaining_amount: Money,
    pub status: DocumentStatus,
    pub interest_rate_bps: i64,
    pub interest_amount: Money,
    pub idempotency_key: Option<String>,
    pub notes: Option<String>,
    pub created_by: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct NewSaleItem {
    pub product_id: i64,
    pub product_name: String,
    pub quantity: i64,
    pub unit_name: String,
    pub unit_factor: i64,
    pub quantity_base: i64,
    pub batch_id: Option<i64>,
    pub unit_price: Money,
    pub discount: Money,
    pub subtotal: Money,
}

pub struct SaleRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> SaleRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        SaleRepository { conn }
    }

    /// Inserts the header. Returns `None` when the idempotency key is taken.
    pub async fn insert(&mut self, sale: &NewSale) -> DbResult<Option<Sale>> {
        debug!(
            invoice = %sale.invoice_number,
            total = %sale.total,
            payment_type = ?sale.payment_type,
            "Inserting sale"
        );

        let created = sqlx::query_as::<_, Sale>(
            r#"
            INSERT INTO sales (
                invoice_number, customer_id, subtotal, discount, tax, total, currency,
                payment_type, paid_amount, remaining_amount, status,
                interest_rate_bps, interest_amount, idempotency_key, notes,
                created_at, created_by
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
            ON CONFLICT (idempotency_key) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(&sale.invoice_number)
        .bind(sale.customer_id)
        .bind(sale.subtotal)
        .bind(sale.discount)
        .bind(sale.tax)
        .bind(sale.total)
        .bind(&sale.currency)
        .bind(sale.payment_type)
        .bind(sale.paid_amount)
        .bind(sale.remaining_amount)
        .bind(sale.status)
        .bind(sale.interest_rate_bps)
        .bind(sale.interest_amount)
        .bind(&sale.idempotency_key)
        .bind(&sale.notes)
        .bind(Utc::now())
        .bind(sale.created_by)
        .fetch_optional(&mut *self.conn)
        .await?;

        Ok(created)
    }

    pub async fn insert_item(&mut self, sale_id: i64, item: &NewSaleItem) -> DbResult<SaleItem> {
        let created = sqlx::query_as::<_, SaleItem>(
            r#"
            INSERT INTO sale_items (
                sale_id, product_id, product_name, quantity, unit_name, unit_factor,
                quantity_base, batch_id, unit_price, discount, subtotal
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            RETURNING *
            "#,
        )
        .bind(sale_id)
        .bind(item.product_id)
        .bind(&item.product_name)
        .bind(item.quantity)
        .bind(&item.unit_name)
        .bind(item.unit_factor)
        .bind(item.quantity_base)
        .bind(item.batch_id)
        .bind(item.unit_price)
        .bind(item.discount)
        .bind(item.subtotal)
        .fetch_one(&mut *self.conn)
        .await?;

        Ok(created)
    }

    pub async fn insert_depletion(
        &mut self,
        sale_id: i64,
        sale_item_id: i64,
        product_id: i64,
        depletion: &Depletion,
    ) -> DbResult<SaleItemDepletion> {
        let created = sqlx::query_as::<_, SaleItemDepletion>(
            r#"
            INSERT INTO sale_item_depletions (
                sale_id, sale_item_id, product_id, batch_id, quantity_base, cost_per_unit, total_cost
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            RETURNING *
            "#,
        )
        .bind(sale_id)
        .bind(sale_item_id)
        .bind(product_id)
        .bind(depletion.batch_id)
        .bind(depletion.quantity)
        .bind(depletion.cost_per_unit)
        .bind(depletion.total_cost)
        .fetch_one(&mut *self.conn)
        .await?;

        Ok(created)
    }

    /// Fetches a sale with its items.
    pub async fn get_by_id(&mut self, id: i64) -> DbResult<Sale> {
        let mut sale = sqlx::query_as::<_, Sale>("SELECT * FROM sales WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?
            .ok_or_else(|| DbError::not_found("Sale", id))?;

        sale.items = self.items(id).await?;
        Ok(sale)
    }

    pub async fn find_by_idempotency_key(&mut self, key: &str) -> DbResult<Option<Sale>> {
        let id: Option<i64> = sqlx::query_scalar("SELECT id FROM sales WHERE idempotency_key = ?1")
            .bind(key)
            .fetch_optional(&mut *self.conn)
            .await?;

        match id {
            Some(id) => Ok(Some(self.get_by_id(id).await?)),
            None => Ok(None),
        }
    }

    pub async fn items(&mut self, sale_id: i64) -> DbResult<Vec<SaleItem>> {
        let items = sqlx::query_as::<_, SaleItem>("SELECT * FROM sale_items WHERE sale_id = ?1 ORDER BY id")
            .bind(sale_id)
            .fetch_all(&mut *self.conn)
            .await?;
        Ok(items)
    }

    pub async fn depletions(&mut self, sale_id: i64) -> DbResult<Vec<SaleItemDepletion>> {
        let rows = sqlx::query_as::<_, SaleItemDepletion>(
            "SELECT * FROM sale_item_depletions WHERE sale_id = ?1 ORDER BY id",
        )
        .bind(sale_id)
        .fetch_all(&mut *self.conn)
        .await?;
        Ok(rows)
    }

    pub async fn update_payment(
        &mut self,
        sale_id: i64,
        paid: Money,
        remaining: Money,
        status: DocumentStatus,
    ) -> DbResult<()> {
        debug!(sale_id, paid = %paid, remaining = %remaining, ?status, "Updating sale payment state");

        let result = sqlx::query(
            "UPDATE sales SET paid_amount = ?1, remaining_amount = ?2, status = ?3 WHERE id = ?4",
        )
        .bind(paid)
        .bind(remaining)
        .bind(status)
        .bind(sale_id)
        .execute(&mut *self.conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Sale", sale_id));
        }
        Ok(())
    }
}
