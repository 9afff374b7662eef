//! # Batch Repository
//!
//! Product batches and their on-hand quantities.
//!
//! ## FEFO Order
//! ```text
//! ORDER BY
//!   CASE WHEN expiry_date IS NOT NULL THEN 0 ELSE 1 END,   dated batches first
//!   expiry_date ASC,                                       earliest expiry first
//!   id ASC                                                 then oldest receipt
//! ```
//! Only `active` batches with stock left take part.
//!
//! ## Expiry Window
//! ```text
//! as_of = 2025-03-10, days = 7
//!
//!   expiry 2025-03-01   days_remaining −9   ✓ expired, still on the shelf
//!   expiry 2025-03-17   days_remaining  7   ✓ last day of the window
//!   expiry 2025-03-18   days_remaining  8   ✗
//!   no expiry                               ✗
//! ```

use chrono::{NaiveDate, Utc};
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::{DbError, DbResult};
use tally_core::fifo::BatchSlot;
use tally_core::{BatchStatus, ExpiryAlert, Money, ProductBatch};

#[derive(Debug, Clone)]
pub struct NewBatch {
    pub product_id: i64,
    pub batch_number: String,
    pub expiry_date: Option<NaiveDate>,
    pub quantity: i64,
    pub cost_per_unit: Money,
    pub purchase_id: Option<i64>,
    pub notes: Option<String>,
}

pub struct BatchRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> BatchRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        BatchRepository { conn }
    }

    pub async fn create(&mut self, batch: &NewBatch) -> DbResult<ProductBatch> {
        debug!(
            product_id = batch.product_id,
            batch_number = %batch.batch_number,
            quantity = batch.quantity,
            "Creating product batch"
        );

        let created = sqlx::query_as::<_, ProductBatch>(
            r#"
            INSERT INTO product_batches (
                product_id, batch_number, expiry_date, quantity_received, quantity_on_hand,
                cost_per_unit, purchase_id, status, notes, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?4, ?5, ?6, 'active', ?7, ?8)
            RETURNING *
            "#,
        )
        .bind(batch.product_id)
        .bind(&batch.batch_number)
        .bind(batch.expiry_date)
        .bind(batch.quantity)
        .bind(batch.cost_per_unit)
        .bind(batch.purchase_id)
        .bind(&batch.notes)
        .bind(Utc::now())
        .fetch_one(&mut *self.conn)
        .await?;

        Ok(created)
    }

    pub async fn get_by_id(&mut self, id: i64) -> DbResult<ProductBatch> {
        sqlx::query_as::<_, ProductBatch>("SELECT * FROM product_batches WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?
            .ok_or_else(|| DbError::not_found("ProductBatch", id))
    }

    /// Active batches with stock for one product, in FEFO order.
    pub async fn fefo_batches(&mut self, product_id: i64) -> DbResult<Vec<ProductBatch>> {
        let batches = sqlx::query_as::<_, ProductBatch>(
            r#"
            SELECT * FROM product_batches
            WHERE product_id = ?1 AND status = 'active' AND quantity_on_hand > 0
            ORDER BY
                CASE WHEN expiry_date IS NOT NULL THEN 0 ELSE 1 END,
                expiry_date ASC,
                id ASC
            "#,
        )
        .bind(product_id)
        .fetch_all(&mut *self.conn)
        .await?;
        Ok(batches)
    }

    /// Same rows as [`fefo_batches`](Self::fefo_batches), shaped for the planner.
    pub async fn fefo_slots(&mut self, product_id: i64) -> DbResult<Vec<BatchSlot>> {
        Ok(self
            .fefo_batches(product_id)
            .await?
            .into_iter()
            .map(|b| BatchSlot::new(b.id, b.quantity_on_hand, b.cost_per_unit, b.expiry_date))
            .collect())
    }

    /// Active batches with stock that expire on or before `as_of + days`,
    /// soonest first. Batches already past expiry are included.
    pub async fn expiring_within(&mut self, as_of: NaiveDate, days: u32) -> DbResult<Vec<ExpiryAlert>> {
        let alerts = sqlx::query_as::<_, ExpiryAlert>(
            r#"
            SELECT
                b.id AS batch_id,
                b.product_id AS product_id,
                p.name AS product_name,
                b.batch_number AS batch_number,
                b.expiry_date AS expiry_date,
                b.quantity_on_hand AS quantity_on_hand,
                CAST(julianday(b.expiry_date) - julianday(?1) AS INTEGER) AS days_remaining
            FROM product_batches b
            JOIN products p ON p.id = b.product_id
            WHERE b.status = 'active'
              AND b.quantity_on_hand > 0
              AND b.expiry_date IS NOT NULL
              AND julianday(b.expiry_date) - julianday(?1) <= ?2
            ORDER BY b.expiry_date ASC, b.id ASC
            "#,
        )
        .bind(as_of)
        .bind(i64::from(days))
        .fetch_all(&mut *self.conn)
        .await?;

        debug!(%as_of, days, count = alerts.len(), "Loaded expiry alerts");
        Ok(alerts)
    }

    /// Σ on-hand over active batches.
    pub async fn available_stock(&mut self, product_id: i64) -> DbResult<i64> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(quantity_on_hand), 0) FROM product_batches
            WHERE product_id = ?1 AND status = 'active'
            "#,
        )
        .bind(product_id)
        .fetch_one(&mut *self.conn)
        .await?;
        Ok(total)
    }

    /// Sets on-hand; a batch reaching zero becomes `depleted`.
    pub async fn set_on_hand(&mut self, batch_id: i64, quantity_on_hand: i64) -> DbResult<()> {
        let status = if quantity_on_hand == 0 {
            BatchStatus::Depleted
        } else {
            BatchStatus::Active
        };

        debug!(batch_id, quantity_on_hand, ?status, "Updating batch on-hand");

        let result = sqlx::query(
            "UPDATE product_batches SET quantity_on_hand = ?1, status = ?2 WHERE id = ?3",
        )
        .bind(quantity_on_hand)
        .bind(status)
        .bind(batch_id)
        .execute(&mut *self.conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("ProductBatch", batch_id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::repository::product::{NewProduct, ProductRepository};

    fn batch(product_id: i64, number: &str, qty: i64, expiry: Option<NaiveDate>) -> NewBatch {
        NewBatch {
            product_id,
            batch_number: number.to_string(),
            expiry_date: expiry,
            quantity: qty,
            cost_per_unit: Money::from_minor(100),
            purchase_id: None,
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_expiring_within_includes_boundary_and_expired() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.acquire().await.unwrap();
        let product = ProductRepository::new(&mut conn)
            .create(&NewProduct {
                name: "Cheese".into(),
                sku: None,
                cost_price: Money::from_minor(100),
                selling_price: Money::from_minor(150),
            })
            .await
            .unwrap();

        let day = |d| NaiveDate::from_ymd_opt(2025, 3, d);
        let mut repo = BatchRepository::new(&mut conn);
        let expired = repo.create(&batch(product.id, "C-1", 2, day(1))).await.unwrap();
        let boundary = repo.create(&batch(product.id, "C-2", 3, day(17))).await.unwrap();
        repo.create(&batch(product.id, "C-3", 4, day(18))).await.unwrap();
        repo.create(&batch(product.id, "C-4", 5, None)).await.unwrap();
        let sold_out = repo.create(&batch(product.id, "C-5", 1, day(12))).await.unwrap();
        repo.set_on_hand(sold_out.id, 0).await.unwrap();

        let as_of = day(10).unwrap();
        let alerts = repo.expiring_within(as_of, 7).await.unwrap();
        let ids: Vec<i64> = alerts.iter().map(|a| a.batch_id).collect();
        assert_eq!(ids, vec![expired.id, boundary.id]);

        assert_eq!(alerts[0].days_remaining, -9);
        assert!(alerts[0].is_expired());
        assert_eq!(alerts[1].days_remaining, 7);
        assert!(!alerts[1].is_expired());
        assert_eq!(alerts[1].product_name, "Cheese");
        assert_eq!(alerts[1].quantity_on_hand, 3);

        // Day zero still shows batches expiring today and earlier.
        let today_only = repo.expiring_within(day(17).unwrap(), 0).await.unwrap();
        assert_eq!(today_only.len(), 2);
        assert_eq!(today_only[1].days_remaining, 0);
    }

    #[tokio::test]
    async fn test_fefo_order_and_depletion() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.acquire().await.unwrap();

        let product = ProductRepository::new(&mut conn)
            .create(&NewProduct {
                name: "Milk".into(),
                sku: None,
                cost_price: Money::from_minor(100),
                selling_price: Money::from_minor(150),
            })
            .await
            .unwrap();

        let mut repo = BatchRepository::new(&mut conn);
        let undated = repo.create(&batch(product.id, "B-1", 5, None)).await.unwrap();
        let late = repo
            .create(&batch(product.id, "B-2", 5, NaiveDate::from_ymd_opt(2025, 6, 1)))
            .await
            .unwrap();
        let early = repo
            .create(&batch(product.id, "B-3", 5, NaiveDate::from_ymd_opt(2025, 1, 1)))
            .await
            .unwrap();

        let order: Vec<i64> = repo
            .fefo_batches(product.id)
            .await
            .unwrap()
            .iter()
            .map(|b| b.id)
            .collect();
        assert_eq!(order, vec![early.id, late.id, undated.id]);
        assert_eq!(repo.available_stock(product.id).await.unwrap(), 15);

        repo.set_on_hand(early.id, 0).await.unwrap();
        assert_eq!(repo.get_by_id(early.id).await.unwrap().status, BatchStatus::Depleted);
        assert_eq!(repo.fefo_slots(product.id).await.unwrap().len(), 2);
        assert_eq!(repo.available_stock(product.id).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_negative_on_hand_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.acquire().await.unwrap();

        let product = ProductRepository::new(&mut conn)
            .create(&NewProduct {
                name: "Bread".into(),
                sku: None,
                cost_price: Money::from_minor(50),
                selling_price: Money::from_minor(80),
            })
            .await
            .unwrap();

        let mut repo = BatchRepository::new(&mut conn);
        let b = repo.create(&batch(product.id, "B-1", 2, None)).await.unwrap();
        let err = repo.set_on_hand(b.id, -1).await.unwrap_err();
        assert!(matches!(err, DbError::CheckViolation { .. }));
    }
}
