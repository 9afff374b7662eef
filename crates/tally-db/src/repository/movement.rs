//! # Movement Repository
//!
//! Append-only inventory movements. There is no update or delete.

use chrono::Utc;
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::DbResult;
use tally_core::reconcile::stock_from_parts;
use tally_core::{InventoryMovement, MovementType, NewMovement};

pub struct MovementRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> MovementRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        MovementRepository { conn }
    }

    pub async fn insert(&mut self, movement: &NewMovement) -> DbResult<InventoryMovement> {
        debug!(
            product_id = movement.product_id,
            batch_id = ?movement.batch_id,
            movement_type = ?movement.movement_type,
            quantity = movement.quantity_base,
            "Recording inventory movement"
        );

        let created = sqlx::query_as::<_, InventoryMovement>(
            r#"
            INSERT INTO inventory_movements (
                product_id, batch_id, movement_type, reason, quantity_base,
                unit_name, unit_factor, stock_before, stock_after,
                cost_per_unit, total_cost, source_type, source_id,
                idempotency_key, notes, created_at, created_by
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
            RETURNING *
            "#,
        )
        .bind(movement.product_id)
        .bind(movement.batch_id)
        .bind(movement.movement_type)
        .bind(movement.reason)
        .bind(movement.quantity_base)
        .bind(&movement.unit_name)
        .bind(movement.unit_factor)
        .bind(movement.stock_before)
        .bind(movement.stock_after)
        .bind(movement.cost_per_unit)
        .bind(movement.total_cost)
        .bind(movement.source_type)
        .bind(movement.source_id)
        .bind(&movement.idempotency_key)
        .bind(&movement.notes)
        .bind(Utc::now())
        .bind(movement.created_by)
        .fetch_one(&mut *self.conn)
        .await?;

        Ok(created)
    }

    pub async fn find_by_idempotency_key(&mut self, key: &str) -> DbResult<Option<InventoryMovement>> {
        let movement = sqlx::query_as::<_, InventoryMovement>(
            "SELECT * FROM inventory_movements WHERE idempotency_key = ?1",
        )
        .bind(key)
        .fetch_optional(&mut *self.conn)
        .await?;
        Ok(movement)
    }

    pub async fn list_by_product(&mut self, product_id: i64) -> DbResult<Vec<InventoryMovement>> {
        let movements = sqlx::query_as::<_, InventoryMovement>(
            "SELECT * FROM inventory_movements WHERE product_id = ?1 ORDER BY id",
        )
        .bind(product_id)
        .fetch_all(&mut *self.conn)
        .await?;
        Ok(movements)
    }

    /// Stock level of one product replayed from its movements.
    pub async fn replayed_stock(&mut self, product_id: i64) -> DbResult<i64> {
        let parts: Vec<(MovementType, i64)> = sqlx::query_as(
            r#"
            SELECT movement_type, COALESCE(SUM(quantity_base), 0)
            FROM inventory_movements
            WHERE product_id = ?1
            GROUP BY movement_type
            "#,
        )
        .bind(product_id)
        .fetch_all(&mut *self.conn)
        .await?;

        Ok(stock_from_parts(parts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::repository::product::{NewProduct, ProductRepository};
    use tally_core::{Money, MovementReason, MovementSource};

    fn movement(product_id: i64, kind: MovementType, qty: i64, key: Option<&str>) -> NewMovement {
        NewMovement {
            product_id,
            batch_id: None,
            movement_type: kind,
            reason: MovementReason::Manual,
            quantity_base: qty,
            unit_name: "piece".into(),
            unit_factor: 1,
            stock_before: 0,
            stock_after: 0,
            cost_per_unit: Money::ZERO,
            total_cost: Money::ZERO,
            source_type: Some(MovementSource::Adjustment),
            source_id: None,
            idempotency_key: key.map(str::to_string),
            notes: None,
            created_by: None,
        }
    }

    #[tokio::test]
    async fn test_replay_and_idempotency_key() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.acquire().await.unwrap();

        let product = ProductRepository::new(&mut conn)
            .create(&NewProduct {
                name: "Rice 1kg".into(),
                sku: None,
                cost_price: Money::from_minor(900),
                selling_price: Money::from_minor(1_200),
            })
            .await
            .unwrap();

        let mut repo = MovementRepository::new(&mut conn);
        repo.insert(&movement(product.id, MovementType::In, 20, None)).await.unwrap();
        repo.insert(&movement(product.id, MovementType::Out, 8, None)).await.unwrap();
        repo.insert(&movement(product.id, MovementType::Adjust, -2, Some("adj-1")))
            .await
            .unwrap();

        assert_eq!(repo.replayed_stock(product.id).await.unwrap(), 10);
        assert_eq!(repo.list_by_product(product.id).await.unwrap().len(), 3);
        assert!(repo.find_by_idempotency_key("adj-1").await.unwrap().is_some());

        let dup = repo
            .insert(&movement(product.id, MovementType::Adjust, 1, Some("adj-1")))
            .await
            .unwrap_err();
        assert!(dup.is_unique_violation());
        assert_eq!(repo.replayed_stock(999).await.unwrap(), 0);
    }
}
