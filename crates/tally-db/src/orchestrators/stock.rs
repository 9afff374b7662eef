//! # Adjust Stock
//!
//! Manual corrections outside of sales and purchases.
//!
//! ```text
//! change > 0 ─► named batch += change  |  new batch ADJ-{product}-{ms}
//! change < 0 ─► named batch −= change  |  first FEFO batch holding enough
//!                        │
//!                        ▼
//!        stock cache = Σ active on-hand ─► `adjust` movement ─► JE-ADJ-{id}
//! ```
//!
//! Also home to the read-side stock queries: movement history and expiry
//! alerts.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::SqliteConnection;
use tracing::{debug, info, warn};

use crate::error::DbError;
use crate::orchestrators::{record_journal, Engine};
use crate::repository::batch::NewBatch;
use crate::repository::{
    BatchRepository, MovementRepository, ProductRepository, SettingsRepository,
};
use crate::services::audit::actions;
use crate::services::error::{EngineError, EngineResult};
use tally_core::journal::adjustment_entry;
use tally_core::validation::validate_quantity_change;
use tally_core::{
    BatchStatus, ExpiryAlert, InventoryMovement, MovementReason, MovementSource, MovementType,
    NewMovement, Product, ProductBatch, StepOutcome, ValidationError, DEFAULT_EXPIRY_ALERT_DAYS,
    DEFAULT_UNIT_NAME,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustStockRequest {
    pub product_id: i64,
    /// Signed, in base units.
    pub quantity_change: i64,
    #[serde(default)]
    pub batch_id: Option<i64>,
    /// `manual` when absent.
    #[serde(default)]
    pub reason: Option<MovementReason>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub user_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustmentReceipt {
    pub movement: InventoryMovement,
    pub product: Product,
    pub replayed: bool,
    pub journal: StepOutcome,
}

fn adjustment_reason(reason: Option<MovementReason>) -> EngineResult<MovementReason> {
    match reason.unwrap_or(MovementReason::Manual) {
        r @ (MovementReason::Manual | MovementReason::Damage | MovementReason::Opening) => Ok(r),
        _ => Err(ValidationError::NotAllowed {
            field: "reason".to_string(),
            allowed: vec!["manual".into(), "damage".into(), "opening".into()],
        }
        .into()),
    }
}

impl Engine {
    pub async fn adjust_stock(&self, request: AdjustStockRequest) -> EngineResult<AdjustmentReceipt> {
        validate_quantity_change(request.quantity_change)?;
        let reason = adjustment_reason(request.reason)?;

        let mut tx = self.db.begin().await?;

        if let Some(key) = request.idempotency_key.as_deref() {
            if let Some(existing) = MovementRepository::new(&mut tx)
                .find_by_idempotency_key(key)
                .await?
            {
                let product = ProductRepository::new(&mut tx)
                    .get_by_id(existing.product_id)
                    .await?;
                tx.rollback().await?;
                debug!(movement_id = existing.id, key, "Adjustment replayed from idempotency key");
                return Ok(AdjustmentReceipt {
                    movement: existing,
                    product,
                    replayed: true,
                    journal: StepOutcome::skipped(tally_core::SkipReason::IdempotencyHit),
                });
            }
        }

        let settings = SettingsRepository::new(&mut tx).module_settings().await?;
        let product = ProductRepository::new(&mut tx)
            .get_by_id(request.product_id)
            .await?;

        let magnitude = request
            .quantity_change
            .checked_abs()
            .ok_or_else(|| ValidationError::overflow("quantityChange"))?;
        let batch_id = if request.quantity_change > 0 {
            add_to_batch(&mut tx, &product, request.batch_id, magnitude).await?
        } else {
            take_from_batch(&mut tx, &product, request.batch_id, magnitude).await?
        };

        let available = BatchRepository::new(&mut tx)
            .available_stock(product.id)
            .await?;
        ProductRepository::new(&mut tx)
            .set_stock(product.id, available)
            .await?;

        let value = product.cost_price.checked_mul_qty(magnitude, "totalCost")?;
        let inserted = MovementRepository::new(&mut tx)
            .insert(&NewMovement {
                product_id: product.id,
                batch_id: Some(batch_id),
                movement_type: MovementType::Adjust,
                reason,
                quantity_base: request.quantity_change,
                unit_name: DEFAULT_UNIT_NAME.to_string(),
                unit_factor: 1,
                stock_before: product.stock,
                stock_after: available,
                cost_per_unit: product.cost_price,
                total_cost: value,
                source_type: Some(MovementSource::Adjustment),
                source_id: None,
                idempotency_key: request.idempotency_key.clone(),
                notes: request.notes.clone(),
                created_by: request.user_id,
            })
            .await;

        let movement = match inserted {
            Ok(movement) => movement,
            Err(DbError::UniqueViolation { .. }) if request.idempotency_key.is_some() => {
                tx.rollback().await?;
                return self.replay_adjustment(request.idempotency_key.as_deref()).await;
            }
            Err(e) => return Err(e.into()),
        };

        let plan = adjustment_entry(movement.id, value, request.quantity_change > 0);
        let journal = record_journal(&mut tx, &plan, &settings, request.user_id).await?;

        let product = ProductRepository::new(&mut tx).get_by_id(product.id).await?;
        tx.commit().await?;

        info!(
            product_id = product.id,
            change = request.quantity_change,
            batch_id,
            stock_after = product.stock,
            "Stock adjustment committed"
        );

        self.audit
            .record(
                request.user_id,
                actions::INVENTORY_ADJUST,
                "product",
                product.id,
                format!("Adjusted {} by {}", product.name, request.quantity_change),
                json!({
                    "movementId": movement.id,
                    "batchId": batch_id,
                    "quantityChange": request.quantity_change,
                    "reason": reason,
                }),
            )
            .await;

        Ok(AdjustmentReceipt {
            movement,
            product,
            replayed: false,
            journal,
        })
    }

    pub async fn list_movements(&self, product_id: i64) -> EngineResult<Vec<InventoryMovement>> {
        let mut conn = self.db.acquire().await?;
        Ok(MovementRepository::new(&mut conn).list_by_product(product_id).await?)
    }

    /// Batches expiring within `days` of today (30 when `None`), plus any
    /// already expired batch still holding stock.
    pub async fn expiry_alerts(&self, days: Option<u32>) -> EngineResult<Vec<ExpiryAlert>> {
        self.expiry_alerts_as_of(Utc::now().date_naive(), days).await
    }

    pub async fn expiry_alerts_as_of(
        &self,
        as_of: NaiveDate,
        days: Option<u32>,
    ) -> EngineResult<Vec<ExpiryAlert>> {
        let days = days.unwrap_or(DEFAULT_EXPIRY_ALERT_DAYS);
        let mut conn = self.db.acquire().await?;
        let alerts = BatchRepository::new(&mut conn)
            .expiring_within(as_of, days)
            .await?;

        let expired = alerts.iter().filter(|a| a.is_expired()).count();
        if expired > 0 {
            warn!(expired, "Expired batches still hold stock");
        }
        Ok(alerts)
    }

    async fn replay_adjustment(&self, key: Option<&str>) -> EngineResult<AdjustmentReceipt> {
        let key = key.ok_or_else(|| EngineError::conflict("movement insert returned no row"))?;
        let mut conn = self.db.acquire().await?;
        let movement = MovementRepository::new(&mut conn)
            .find_by_idempotency_key(key)
            .await?
            .ok_or_else(|| EngineError::not_found("InventoryMovement", key))?;
        let product = ProductRepository::new(&mut conn)
            .get_by_id(movement.product_id)
            .await?;
        Ok(AdjustmentReceipt {
            movement,
            product,
            replayed: true,
            journal: StepOutcome::skipped(tally_core::SkipReason::IdempotencyHit),
        })
    }
}

async fn owned_batch(
    conn: &mut SqliteConnection,
    product: &Product,
    batch_id: i64,
) -> EngineResult<ProductBatch> {
    let batch = BatchRepository::new(conn).get_by_id(batch_id).await?;
    if batch.product_id != product.id {
        return Err(ValidationError::InvalidFormat {
            field: "batchId".into(),
            reason: format!("batch {} does not belong to product {}", batch_id, product.id),
        }
        .into());
    }
    if !matches!(batch.status, BatchStatus::Active | BatchStatus::Depleted) {
        return Err(EngineError::invalid_state(format!(
            "batch {} is {:?}",
            batch_id, batch.status
        )));
    }
    Ok(batch)
}

/// Returns the batch that received the stock.
async fn add_to_batch(
    conn: &mut SqliteConnection,
    product: &Product,
    batch_id: Option<i64>,
    quantity: i64,
) -> EngineResult<i64> {
    match batch_id {
        Some(batch_id) => {
            let batch = owned_batch(&mut *conn, product, batch_id).await?;
            let on_hand = batch
                .quantity_on_hand
                .checked_add(quantity)
                .ok_or_else(|| ValidationError::overflow("quantityChange"))?;
            BatchRepository::new(conn).set_on_hand(batch.id, on_hand).await?;
            Ok(batch.id)
        }
        None => {
            let batch = BatchRepository::new(conn)
                .create(&NewBatch {
                    product_id: product.id,
                    batch_number: format!("ADJ-{}-{}", product.id, Utc::now().timestamp_millis()),
                    expiry_date: None,
                    quantity,
                    cost_per_unit: product.cost_price,
                    purchase_id: None,
                    notes: Some("Stock adjustment".to_string()),
                })
                .await?;
            Ok(batch.id)
        }
    }
}

/// Returns the batch the stock was taken from.
async fn take_from_batch(
    conn: &mut SqliteConnection,
    product: &Product,
    batch_id: Option<i64>,
    quantity: i64,
) -> EngineResult<i64> {
    let batch = match batch_id {
        Some(batch_id) => owned_batch(&mut *conn, product, batch_id).await?,
        None => {
            let candidates = BatchRepository::new(&mut *conn)
                .fefo_batches(product.id)
                .await?;
            let largest = candidates.iter().map(|b| b.quantity_on_hand).max().unwrap_or(0);
            candidates
                .into_iter()
                .find(|b| b.quantity_on_hand >= quantity)
                .ok_or_else(|| EngineError::InsufficientStock {
                    product: product.name.clone(),
                    available: largest,
                    requested: quantity,
                })?
        }
    };

    if batch.quantity_on_hand < quantity {
        return Err(EngineError::InsufficientStock {
            product: product.name.clone(),
            available: batch.quantity_on_hand,
            requested: quantity,
        });
    }
    BatchRepository::new(conn)
        .set_on_hand(batch.id, batch.quantity_on_hand - quantity)
        .await?;
    Ok(batch.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrators::test_support::*;
    use chrono::NaiveDate;
    use tally_core::{Money, SkipReason};

    fn adjust(product_id: i64, change: i64) -> AdjustStockRequest {
        AdjustStockRequest {
            product_id,
            quantity_change: change,
            ..AdjustStockRequest::default()
        }
    }

    #[tokio::test]
    async fn test_negative_adjustment_uses_fefo_batch() {
        let engine = engine().await;
        let p = product(&engine, "Cheese", 200, 300).await;
        let plain = receive(&engine, p, "C1", 10, 200, None).await;
        let small = receive(&engine, p, "C2", 2, 200, NaiveDate::from_ymd_opt(2025, 3, 1)).await;
        let soon = receive(&engine, p, "C3", 6, 200, NaiveDate::from_ymd_opt(2025, 5, 1)).await;

        let mut request = adjust(p, -4);
        request.reason = Some(MovementReason::Damage);
        let receipt = engine.adjust_stock(request).await.unwrap();

        assert_eq!(receipt.movement.batch_id, Some(soon));
        assert_eq!(receipt.movement.quantity_base, -4);
        assert_eq!(receipt.movement.total_cost, Money::from_minor(800));
        assert_eq!(receipt.movement.stock_before, 18);
        assert_eq!(receipt.movement.stock_after, 14);
        assert_eq!(receipt.product.stock, 14);
        assert!(receipt.journal.created);

        let mut conn = engine.database().acquire().await.unwrap();
        let mut batches = BatchRepository::new(&mut conn);
        assert_eq!(batches.get_by_id(small).await.unwrap().quantity_on_hand, 2);
        assert_eq!(batches.get_by_id(plain).await.unwrap().quantity_on_hand, 10);
        drop(conn);

        let movements = engine.list_movements(p).await.unwrap();
        assert_eq!(movements.len(), 4);
        assert!(movements.iter().any(|m| m.id == receipt.movement.id));

        assert!(engine.reconciliation().reconcile_all().await.unwrap().is_clean());
    }

    #[tokio::test]
    async fn test_positive_adjustment_creates_or_refills_batch() {
        let engine = engine().await;
        let p = product(&engine, "Eggs", 10, 15).await;

        let opened = engine
            .adjust_stock(AdjustStockRequest {
                reason: Some(MovementReason::Opening),
                ..adjust(p, 30)
            })
            .await
            .unwrap();
        let batch_id = opened.movement.batch_id.unwrap();
        assert_eq!(opened.product.stock, 30);

        engine.adjust_stock(AdjustStockRequest { batch_id: Some(batch_id), ..adjust(p, -30) }).await.unwrap();
        let mut conn = engine.database().acquire().await.unwrap();
        let batch = BatchRepository::new(&mut conn).get_by_id(batch_id).await.unwrap();
        assert_eq!(batch.status, BatchStatus::Depleted);
        assert!(batch.batch_number.starts_with(&format!("ADJ-{}-", p)));
        drop(conn);

        let refilled = engine
            .adjust_stock(AdjustStockRequest { batch_id: Some(batch_id), ..adjust(p, 5) })
            .await
            .unwrap();
        assert_eq!(refilled.product.stock, 5);
        let mut conn = engine.database().acquire().await.unwrap();
        let batch = BatchRepository::new(&mut conn).get_by_id(batch_id).await.unwrap();
        assert_eq!(batch.status, BatchStatus::Active);
        assert_eq!(batch.quantity_on_hand, 5);
    }

    #[tokio::test]
    async fn test_expiry_alerts_window() {
        let engine = engine().await;
        let day = |m, d| NaiveDate::from_ymd_opt(2025, m, d);
        let p = product(&engine, "Milk", 100, 150).await;
        let expired = receive(&engine, p, "M1", 2, 100, day(4, 20)).await;
        let last_day = receive(&engine, p, "M2", 3, 100, day(5, 31)).await;
        receive(&engine, p, "M3", 4, 100, day(6, 1)).await;
        receive(&engine, p, "M4", 5, 100, None).await;

        let as_of = day(5, 1).unwrap();
        let alerts = engine.expiry_alerts_as_of(as_of, None).await.unwrap();
        let ids: Vec<i64> = alerts.iter().map(|a| a.batch_id).collect();
        assert_eq!(ids, vec![expired, last_day]);
        assert_eq!(alerts[0].days_remaining, -11);
        assert_eq!(alerts[1].days_remaining, 30);

        let narrow = engine.expiry_alerts_as_of(as_of, Some(29)).await.unwrap();
        assert_eq!(narrow.len(), 1);
        assert!(narrow[0].is_expired());

        // Writing the expired stock off clears its alert.
        engine
            .adjust_stock(AdjustStockRequest {
                batch_id: Some(expired),
                reason: Some(MovementReason::Damage),
                ..adjust(p, -2)
            })
            .await
            .unwrap();
        let alerts = engine.expiry_alerts_as_of(as_of, None).await.unwrap();
        assert_eq!(alerts.iter().map(|a| a.batch_id).collect::<Vec<_>>(), vec![last_day]);
    }

    #[tokio::test]
    async fn test_adjustment_replay_and_rejections() {
        let engine = engine().await;
        let p = product(&engine, "Jam", 50, 80).await;
        receive(&engine, p, "J1", 3, 50, None).await;

        let keyed = AdjustStockRequest {
            idempotency_key: Some("adj-1".into()),
            ..adjust(p, -1)
        };
        let first = engine.adjust_stock(keyed.clone()).await.unwrap();
        let again = engine.adjust_stock(keyed).await.unwrap();
        assert!(again.replayed);
        assert_eq!(again.movement.id, first.movement.id);
        assert_eq!(again.journal.reason, Some(SkipReason::IdempotencyHit));
        assert_eq!(again.product.stock, 2);

        let err = engine.adjust_stock(adjust(p, -5)).await.unwrap_err();
        assert!(matches!(err, EngineError::InsufficientStock { requested: 5, .. }));

        let err = engine.adjust_stock(adjust(p, 0)).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let sale_reason = AdjustStockRequest {
            reason: Some(MovementReason::Sale),
            ..adjust(p, 1)
        };
        assert!(matches!(
            engine.adjust_stock(sale_reason).await.unwrap_err(),
            EngineError::Validation(_)
        ));

        let other = product(&engine, "Honey", 0, 0).await;
        let foreign = receive(&engine, other, "H1", 1, 0, None).await;
        let err = engine
            .adjust_stock(AdjustStockRequest { batch_id: Some(foreign), ..adjust(p, 1) })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Validation(ValidationError::InvalidFormat { ref field, .. }) if field == "batchId"
        ));

        let err = engine
            .adjust_stock(AdjustStockRequest { batch_id: Some(foreign), ..adjust(p, -1) })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert_eq!(count(&engine, "inventory_movements").await, 3);
    }
}
