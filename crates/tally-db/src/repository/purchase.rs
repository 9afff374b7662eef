//! # Purchase Repository
//!
//! Purchases and their items. Each item points at the batch it created.

use chrono::{NaiveDate, Utc};
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::{DbError, DbResult};
use tally_core::{DocumentStatus, Money, Purchase, PurchaseItem};

#[derive(Debug, Clone)]
pub struct NewPurchase {
    pub invoice_number: String,
    pub supplier_id: Option<i64>,
    pub subtotal: Money,
    pub discount: Money,
    pub tax: Money,
    pub total: Money,
    pub currency: String,
    pub paid_amount: Money,
    pub remaining_amount: Money,
    pub status: DocumentStatus,
    pub idempotency_key: Option<String>,
    pub notes: Option<String>,
    pub created_by: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct NewPurchaseItem {
    pub product_id: i64,
    pub product_name: String,
    pub quantity: i64,
    pub unit_cost: Money,
    pub discount: Money,
    pub subtotal: Money,
    pub batch_id: Option<i64>,
    pub expiry_date: Option<NaiveDate>,
}

pub struct PurchaseRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> PurchaseRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        PurchaseRepository { conn }
    }

    /// Inserts the header. Returns `None` when the idempotency key is taken.
    pub async fn insert(&mut self, purchase: &NewPurchase) -> DbResult<Option<Purchase>> {
        debug!(
            invoice = %purchase.invoice_number,
            supplier_id = ?purchase.supplier_id,
            total = %purchase.total,
            "Inserting purchase"
        );

        let created = sqlx::query_as::<_, Purchase>(
            r#"
            INSERT INTO purchases (
                invoice_number, supplier_id, subtotal, discount, tax, total, currency,
                paid_amount, remaining_amount, status, idempotency_key, notes,
                created_at, created_by
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            ON CONFLICT (idempotency_key) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(&purchase.invoice_number)
        .bind(purchase.supplier_id)
        .bind(purchase.subtotal)
        .bind(purchase.discount)
        .bind(purchase.tax)
        .bind(purchase.total)
        .bind(&purchase.currency)
        .bind(purchase.paid_amount)
        .bind(purchase.remaining_amount)
        .bind(purchase.status)
        .bind(&purchase.idempotency_key)
        .bind(&purchase.notes)
        .bind(Utc::now())
        .bind(purchase.created_by)
        .fetch_optional(&mut *self.conn)
        .await?;

        Ok(created)
    }

    pub async fn insert_item(&mut self, purchase_id: i64, item: &NewPurchaseItem) -> DbResult<PurchaseItem> {
        let created = sqlx::query_as::<_, PurchaseItem>(
            r#"
            INSERT INTO purchase_items (
                purchase_id, product_id, product_name, quantity, unit_cost,
                discount, subtotal, batch_id, expiry_date
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            RETURNING *
            "#,
        )
        .bind(purchase_id)
        .bind(item.product_id)
        .bind(&item.product_name)
        .bind(item.quantity)
        .bind(item.unit_cost)
        .bind(item.discount)
        .bind(item.subtotal)
        .bind(item.batch_id)
        .bind(item.expiry_date)
        .fetch_one(&mut *self.conn)
        .await?;

        Ok(created)
    }

    pub async fn get_by_id(&mut self, id: i64) -> DbResult<Purchase> {
        let mut purchase = sqlx::query_as::<_, Purchase>("SELECT * FROM purchases WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?
            .ok_or_else(|| DbError::not_found("Purchase", id))?;

        purchase.items = sqlx::query_as::<_, PurchaseItem>(
            "SELECT * FROM purchase_items WHERE purchase_id = ?1 ORDER BY id",
        )
        .bind(id)
        .fetch_all(&mut *self.conn)
        .await?;

        Ok(purchase)
    }

    pub async fn find_by_idempotency_key(&mut self, key: &str) -> DbResult<Option<Purchase>> {
        let id: Option<i64> = sqlx::query_scalar("SELECT id FROM purchases WHERE idempotency_key = ?1")
            .bind(key)
            .fetch_optional(&mut *self.conn)
            .await?;

        match id {
            Some(id) => Ok(Some(self.get_by_id(id).await?)),
            None => Ok(None),
        }
    }

    pub async fn update_payment(
        &mut self,
        purchase_id: i64,
        paid: Money,
        remaining: Money,
        status: DocumentStatus,
    ) -> DbResult<()> {
        debug!(purchase_id, paid = %paid, remaining = %remaining, "Updating purchase payment state");

        let result = sqlx::query(
            "UPDATE purchases SET paid_amount = ?1, remaining_amount = ?2, status = ?3 WHERE id = ?4",
        )
        .bind(paid)
        .bind(remaining)
        .bind(status)
        .bind(purchase_id)
        .execute(&mut *self.conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Purchase", purchase_id));
        }
        Ok(())
    }
}
