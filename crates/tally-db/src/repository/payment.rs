//! # Payment Repository
//!
//! ## Idempotent Insert
//! ```text
//! INSERT ... ON CONFLICT (idempotency_key) DO NOTHING RETURNING *
//!
//!   new key      → Some(payment)
//!   replayed key → None          caller loads the existing row
//!   no key       → Some(payment) (NULL keys never conflict)
//! ```

use chrono::Utc;
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::{DbError, DbResult};
use tally_core::{NewPayment, Payment};

pub struct PaymentRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> PaymentRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        PaymentRepository { conn }
    }

    /// Inserts a payment unless its idempotency key already exists.
    pub async fn insert(&mut self, payment: &NewPayment) -> DbResult<Option<Payment>> {
        debug!(
            amount = %payment.amount,
            method = ?payment.payment_method,
            key = ?payment.idempotency_key,
            "Inserting payment"
        );

        let created = sqlx::query_as::<_, Payment>(
            r#"
            INSERT INTO payments (
                sale_id, purchase_id, customer_id, supplier_id, amount, currency,
                payment_method, reference_number, idempotency_key, status, notes,
                created_at, created_by
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 'completed', ?10, ?11, ?12)
            ON CONFLICT (idempotency_key) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(payment.sale_id)
        .bind(payment.purchase_id)
        .bind(payment.customer_id)
        .bind(payment.supplier_id)
        .bind(payment.amount)
        .bind(&payment.currency)
        .bind(payment.payment_method)
        .bind(&payment.reference_number)
        .bind(&payment.idempotency_key)
        .bind(&payment.notes)
        .bind(Utc::now())
        .bind(payment.created_by)
        .fetch_optional(&mut *self.conn)
        .await?;

        Ok(created)
    }

    pub async fn get_by_id(&mut self, id: i64) -> DbResult<Payment> {
        sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?
            .ok_or_else(|| DbError::not_found("Payment", id))
    }

    pub async fn find_by_idempotency_key(&mut self, key: &str) -> DbResult<Option<Payment>> {
        let payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE idempotency_key = ?1")
            .bind(key)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(payment)
    }

    pub async fn list_for_sale(&mut self, sale_id: i64) -> DbResult<Vec<Payment>> {
        let payments = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE sale_id = ?1 ORDER BY id")
            .bind(sale_id)
            .fetch_all(&mut *self.conn)
            .await?;
        Ok(payments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use tally_core::{Money, PaymentMethod};

    fn cash(amount: i64, key: Option<&str>) -> NewPayment {
        NewPayment {
            amount: Money::from_minor(amount),
            currency: "IQD".into(),
            payment_method: PaymentMethod::Cash,
            idempotency_key: key.map(str::to_string),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_replayed_key_returns_none() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.acquire().await.unwrap();
        let mut repo = PaymentRepository::new(&mut conn);

        let first = repo.insert(&cash(1_000, Some("pay-1"))).await.unwrap();
        assert!(first.is_some());
        assert!(repo.insert(&cash(1_000, Some("pay-1"))).await.unwrap().is_none());

        assert!(repo.insert(&cash(500, None)).await.unwrap().is_some());
        assert!(repo.insert(&cash(500, None)).await.unwrap().is_some());

        let existing = repo.find_by_idempotency_key("pay-1").await.unwrap().unwrap();
        assert_eq!(existing.id, first.unwrap().id);
    }

    #[tokio::test]
    async fn test_non_positive_amount_rejected_by_schema() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.acquire().await.unwrap();
        let mut repo = PaymentRepository::new(&mut conn);

        let err = repo.insert(&cash(0, None)).await.unwrap_err();
        assert!(matches!(err, DbError::CheckViolation { .. }));
    }
}
