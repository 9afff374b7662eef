//! # Reconciliation
//!
//! Compares cached aggregates against the append-only ledgers.
//!
//! ```text
//! ┌──────────────────────┬─────────────────────────────┬──────────────────────────────┐
//! │ Kind                 │ Cached field                │ True value                   │
//! ├──────────────────────┼─────────────────────────────┼──────────────────────────────┤
//! │ Stock                │ products.stock              │ Σ in − Σ out + Σ adjust      │
//! │ Customer debt        │ customers.total_debt        │ last customer_ledger row     │
//! │ Supplier balance     │ suppliers.current_balance   │ last supplier_ledger row     │
//! └──────────────────────┴─────────────────────────────┴──────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};

use crate::types::MovementType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftKind {
    Stock,
    CustomerDebt,
    SupplierBalance,
}

/// One entity whose cache disagrees with its ledger.
///
/// Values are quantities for stock and minor currency units otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Drift {
    pub entity_id: i64,
    pub cached: i64,
    pub true_value: i64,
    /// `cached − true_value`.
    pub drift: i64,
}

impl Drift {
    /// Returns `None` when the two agree.
    pub fn between(entity_id: i64, cached: i64, true_value: i64) -> Option<Drift> {
        (cached != true_value).then(|| Drift {
            entity_id,
            cached,
            true_value,
            drift: cached - true_value,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftReport {
    pub kind: DriftKind,
    pub checked: usize,
    pub drifts: Vec<Drift>,
}

impl DriftReport {
    /// Builds a report from `(entity_id, cached, true_value)` rows.
    pub fn from_rows<I>(kind: DriftKind, rows: I) -> Self
    where
        I: IntoIterator<Item = (i64, i64, i64)>,
    {
        let mut checked = 0;
        let mut drifts = Vec::new();
        for (entity_id, cached, true_value) in rows {
            checked += 1;
            if let Some(drift) = Drift::between(entity_id, cached, true_value) {
                drifts.push(drift);
            }
        }
        DriftReport { kind, checked, drifts }
    }

    pub fn is_clean(&self) -> bool {
        self.drifts.is_empty()
    }

    /// Σ |drift|.
    pub fn total_drift(&self) -> i64 {
        self.drifts.iter().map(|d| d.drift.abs()).sum()
    }
}

/// Replays `(type, quantity)` pairs, as read from an aggregate query, into a
/// stock level.
pub fn stock_from_parts<I>(parts: I) -> i64
where
    I: IntoIterator<Item = (MovementType, i64)>,
{
    parts
        .into_iter()
        .map(|(kind, qty)| match kind {
            MovementType::In | MovementType::Adjust => qty,
            MovementType::Out => -qty,
        })
        .sum()
}
