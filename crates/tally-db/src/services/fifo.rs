//! # FIFO / FEFO Depletion Service
//!
//! Applies a [`DepletionPlan`] to the batches it was planned over.
//!
//! ```text
//! fefo_slots(product) ──► plan_depletion(slots, qty) ──► set_on_hand per batch
//!      (SQL order)             (pure, tally-core)           (same transaction)
//! ```
//!
//! A short allocation is returned as-is, with `shortfall > 0`. Callers
//! turn it into `InsufficientStock`, which drops the transaction and with
//! it every on-hand change made here.

use sqlx::SqliteConnection;
use tracing::debug;

use crate::repository::BatchRepository;
use crate::services::error::EngineResult;
use tally_core::fifo::{plan_depletion, DepletionPlan};

pub struct FifoService<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> FifoService<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        FifoService { conn }
    }

    /// Σ on-hand over the product's active batches.
    pub async fn available_stock(&mut self, product_id: i64) -> EngineResult<i64> {
        Ok(BatchRepository::new(&mut *self.conn)
            .available_stock(product_id)
            .await?)
    }

    /// Draws `quantity` from the product's batches in FEFO order.
    pub async fn deplete(&mut self, product_id: i64, quantity: i64) -> EngineResult<DepletionPlan> {
        let mut batches = BatchRepository::new(&mut *self.conn);
        let slots = batches.fefo_slots(product_id).await?;
        let plan = plan_depletion(&slots, quantity)?;

        for depletion in &plan.depletions {
            batches
                .set_on_hand(depletion.batch_id, depletion.remaining_on_hand)
                .await?;
        }

        debug!(
            product_id,
            requested = quantity,
            allocated = plan.allocated(),
            batches = plan.depletions.len(),
            total_cost = %plan.total_cost,
            "Depleted product batches"
        );

        Ok(plan)
    }
}
