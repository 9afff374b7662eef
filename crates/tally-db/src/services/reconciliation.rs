//! # Ledger Reconciliation
//!
//! Detects and repairs drift between cached aggregates and the append-only
//! history they are projected from.
//!
//! ```text
//!  products.stock            ◄── replay inventory_movements
//!  customers.total_debt      ◄── tail of customer_ledger
//!  suppliers.current_balance ◄── tail of supplier_ledger
//! ```
//!
//! `reconcile_*` only reads. `repair_*` overwrites every drifted cache with
//! its true value in one transaction, so a following reconcile is clean.

use serde::Serialize;
use sqlx::SqliteConnection;
use std::collections::HashMap;
use tracing::{info, warn};

use crate::pool::Database;
use crate::repository::{MovementRepository, PartyLedgerRepository, PartyRepository, ProductRepository};
use crate::services::error::EngineResult;
use tally_core::reconcile::{DriftKind, DriftReport};
use tally_core::{Money, PartyKind};

/// All three reports from one pass.
#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationSummary {
    pub stock: DriftReport,
    pub customer_debt: DriftReport,
    pub supplier_balance: DriftReport,
}

impl ReconciliationSummary {
    pub fn is_clean(&self) -> bool {
        self.stock.is_clean() && self.customer_debt.is_clean() && self.supplier_balance.is_clean()
    }
}

fn drift_kind(kind: PartyKind) -> DriftKind {
    match kind {
        PartyKind::Customer => DriftKind::CustomerDebt,
        PartyKind::Supplier => DriftKind::SupplierBalance,
    }
}

#[derive(Debug, Clone)]
pub struct ReconciliationService {
    db: Database,
}

impl ReconciliationService {
    pub fn new(db: Database) -> Self {
        ReconciliationService { db }
    }

    pub async fn reconcile_stock(&self) -> EngineResult<DriftReport> {
        let mut conn = self.db.acquire().await?;
        stock_report(&mut conn).await
    }

    pub async fn reconcile_party(&self, kind: PartyKind) -> EngineResult<DriftReport> {
        let mut conn = self.db.acquire().await?;
        party_report(&mut conn, kind).await
    }

    pub async fn reconcile_all(&self) -> EngineResult<ReconciliationSummary> {
        let mut conn = self.db.acquire().await?;
        let summary = ReconciliationSummary {
            stock: stock_report(&mut conn).await?,
            customer_debt: party_report(&mut conn, PartyKind::Customer).await?,
            supplier_balance: party_report(&mut conn, PartyKind::Supplier).await?,
        };

        info!(
            stock = summary.stock.drifts.len(),
            customers = summary.customer_debt.drifts.len(),
            suppliers = summary.supplier_balance.drifts.len(),
            "Reconciliation finished"
        );
        Ok(summary)
    }

    /// Sets `products.stock` to the replayed value for every drifted product.
    /// Returns what was repaired.
    pub async fn repair_stock(&self) -> EngineResult<DriftReport> {
        let mut tx = self.db.begin().await?;
        let report = stock_report(&mut tx).await?;

        for drift in &report.drifts {
            warn!(
                product_id = drift.entity_id,
                cached = drift.cached,
                true_value = drift.true_value,
                "Repairing stock cache"
            );
            ProductRepository::new(&mut tx)
                .set_stock(drift.entity_id, drift.true_value)
                .await?;
        }

        tx.commit().await?;
        Ok(report)
    }

    /// Sets the party balance cache to the ledger tail for every drifted party.
    pub async fn repair_party(&self, kind: PartyKind) -> EngineResult<DriftReport> {
        let mut tx = self.db.begin().await?;
        let report = party_report(&mut tx, kind).await?;

        for drift in &report.drifts {
            warn!(
                party = %kind,
                party_id = drift.entity_id,
                cached = drift.cached,
                true_value = drift.true_value,
                "Repairing party balance cache"
            );
            PartyRepository::new(&mut tx)
                .set_balance(kind, drift.entity_id, Money::from_minor(drift.true_value))
                .await?;
        }

        tx.commit().await?;
        Ok(report)
    }
}

async fn stock_report(conn: &mut SqliteConnection) -> EngineResult<DriftReport> {
    let levels = ProductRepository::new(&mut *conn).stock_levels().await?;

    let mut rows = Vec::with_capacity(levels.len());
    for (product_id, cached) in levels {
        let replayed = MovementRepository::new(&mut *conn)
            .replayed_stock(product_id)
            .await?;
        rows.push((product_id, cached, replayed));
    }

    Ok(DriftReport::from_rows(DriftKind::Stock, rows))
}

/// A party with no ledger rows has a true balance of zero.
async fn party_report(conn: &mut SqliteConnection, kind: PartyKind) -> EngineResult<DriftReport> {
    let cached = PartyRepository::new(&mut *conn).balances(kind).await?;
    let tails: HashMap<i64, Money> = PartyLedgerRepository::new(&mut *conn, kind)
        .tail_balances()
        .await?
        .into_iter()
        .collect();

    let rows = cached.into_iter().map(|(party_id, balance)| {
        let true_value = tails.get(&party_id).copied().unwrap_or(Money::ZERO);
        (party_id, balance.minor(), true_value.minor())
    });

    Ok(DriftReport::from_rows(drift_kind(kind), rows))
}
