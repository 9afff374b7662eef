//! # FIFO / FEFO Depletion Planning
//!
//! Decides which batches a depletion draws from and at what cost.
//!
//! ## Ordering
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Active batches with on-hand > 0, sorted by:                           │
//! │                                                                         │
//! │   1. has expiry  before  no expiry          (FEFO)                      │
//! │   2. earliest expiry first                                              │
//! │   3. lowest batch id first                  (FIFO fallback)             │
//! │                                                                         │
//! │  Batch A: id 1, qty 5,  no expiry                                       │
//! │  Batch B: id 2, qty 10, expires 2025-01-01                              │
//! │                                                                         │
//! │  deplete 8 ──► B gives 8 (B left with 2), A untouched                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Running out of batches is not an error here. The planner returns a short
//! plan with a non-zero `shortfall` and the caller decides whether that is
//! an `InsufficientStock` error. The only failure is a cost that overflows.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::validation::ValidationResult;
use crate::money::Money;

// =============================================================================
// Batch Snapshot
// =============================================================================

/// The parts of an active batch the planner needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSlot {
    pub batch_id: i64,
    pub quantity_on_hand: i64,
    pub cost_per_unit: Money,
    pub expiry_date: Option<NaiveDate>,
}

impl BatchSlot {
    pub fn new(
        batch_id: i64,
        quantity_on_hand: i64,
        cost_per_unit: impl Into<Money>,
        expiry_date: Option<NaiveDate>,
    ) -> Self {
        BatchSlot {
            batch_id,
            quantity_on_hand,
            cost_per_unit: cost_per_unit.into(),
            expiry_date,
        }
    }
}

/// FEFO comparison with FIFO fallback.
pub fn fefo_cmp(a: &BatchSlot, b: &BatchSlot) -> Ordering {
    a.expiry_date
        .is_none()
        .cmp(&b.expiry_date.is_none())
        .then_with(|| a.expiry_date.cmp(&b.expiry_date))
        .then_with(|| a.batch_id.cmp(&b.batch_id))
}

/// Sum of positive on-hand quantities.
pub fn available(batches: &[BatchSlot]) -> i64 {
    batches
        .iter()
        .map(|b| b.quantity_on_hand.max(0))
        .sum()
}

// =============================================================================
// Depletion Plan
// =============================================================================

/// Quantity drawn from one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Depletion {
    pub batch_id: i64,
    pub quantity: i64,
    pub cost_per_unit: Money,
    pub total_cost: Money,
    /// On-hand after this draw. Zero means the batch becomes `depleted`.
    pub remaining_on_hand: i64,
}

impl Depletion {
    pub fn exhausts_batch(&self) -> bool {
        self.remaining_on_hand == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepletionPlan {
    pub requested: i64,
    pub depletions: Vec<Depletion>,
    pub total_cost: Money,
    /// `round(total_cost / allocated)`, or zero when nothing was allocated.
    pub weighted_average_cost: Money,
    /// Quantity the batches could not cover.
    pub shortfall: i64,
}

impl DepletionPlan {
    pub fn allocated(&self) -> i64 {
        self.depletions.iter().map(|d| d.quantity).sum()
    }

    pub fn is_complete(&self) -> bool {
        self.shortfall == 0
    }
}

/// Plans a depletion of `quantity` across `batches`.
///
/// Input order does not matter; batches are sorted with [`fefo_cmp`] and
/// empty batches are skipped.
///
/// ## Example
/// ```rust
/// use tally_core::fifo::{plan_depletion, BatchSlot};
///
/// let batches = vec![BatchSlot::new(1, 3, 100, None), BatchSlot::new(2, 4, 130, None)];
/// let plan = plan_depletion(&batches, 5).unwrap();
///
/// assert_eq!(plan.depletions.len(), 2);
/// assert_eq!(plan.total_cost.minor(), 3 * 100 + 2 * 130);
/// assert_eq!(plan.weighted_average_cost.minor(), 112);
/// assert!(plan.is_complete());
/// ```
pub fn plan_depletion(batches: &[BatchSlot], quantity: i64) -> ValidationResult<DepletionPlan> {
    let mut ordered: Vec<&BatchSlot> = batches.iter().filter(|b| b.quantity_on_hand > 0).collect();
    ordered.sort_by(|a, b| fefo_cmp(a, b));

    let mut remaining = quantity.max(0);
    let mut depletions = Vec::new();
    let mut total_cost = Money::ZERO;

    for batch in ordered {
        if remaining == 0 {
            break;
        }
        let take = remaining.min(batch.quantity_on_hand);
        let cost = batch.cost_per_unit.checked_mul_qty(take, "cost")?;

        depletions.push(Depletion {
            batch_id: batch.batch_id,
            quantity: take,
            cost_per_unit: batch.cost_per_unit,
            total_cost: cost,
            remaining_on_hand: batch.quantity_on_hand - take,
        });
        total_cost = total_cost.checked_add(cost, "cost")?;
        remaining -= take;
    }

    let allocated = quantity.max(0) - remaining;

    Ok(DepletionPlan {
        requested: quantity,
        depletions,
        total_cost,
        weighted_average_cost: weighted_average(total_cost, allocated),
        shortfall: remaining,
    })
}

/// Rounds half away from zero.
fn weighted_average(total: Money, quantity: i64) -> Money {
    if quantity <= 0 {
        return Money::ZERO;
    }
    let total = total.minor() as i128;
    let quantity = quantity as i128;
    let doubled = total * 2;
    let rounded = if doubled >= 0 {
        (doubled + quantity) / (2 * quantity)
    } else {
        (doubled - quantity) / (2 * quantity)
    };
    Money::from_minor(rounded as i64)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use proptest::prelude::*;

    fn day(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, d)
    }

    #[test]
    fn test_expiring_batch_goes_first() {
        let batches = vec![
            BatchSlot::new(1, 5, 100, None),
            BatchSlot::new(2, 10, 100, day(2025, 1, 1)),
        ];

        let plan = plan_depletion(&batches, 8).unwrap();

        assert_eq!(plan.depletions.len(), 1);
        assert_eq!(plan.depletions[0].batch_id, 2);
        assert_eq!(plan.depletions[0].quantity, 8);
        assert_eq!(plan.depletions[0].remaining_on_hand, 2);
        assert!(plan.is_complete());
    }

    #[test]
    fn test_earliest_expiry_wins_over_lower_id() {
        let batches = vec![
            BatchSlot::new(1, 4, 100, day(2025, 6, 1)),
            BatchSlot::new(2, 4, 100, day(2025, 3, 1)),
        ];
        let plan = plan_depletion(&batches, 5).unwrap();
        let order: Vec<i64> = plan.depletions.iter().map(|d| d.batch_id).collect();
        assert_eq!(order, vec![2, 1]);
        assert!(plan.depletions[0].exhausts_batch());
    }

    #[test]
    fn test_short_plan_reports_shortfall() {
        let batches = vec![BatchSlot::new(1, 2, 50, None), BatchSlot::new(2, 0, 50, None)];
        let plan = plan_depletion(&batches, 5).unwrap();
        assert_eq!(plan.allocated(), 2);
        assert_eq!(plan.shortfall, 3);
        assert!(!plan.is_complete());
    }

    #[test]
    fn test_overflowing_cost_is_rejected() {
        let batches = vec![BatchSlot::new(1, 5, i64::MAX / 2, None)];

        assert!(plan_depletion(&batches, 2).is_ok());
        let err = plan_depletion(&batches, 3).unwrap_err();
        assert!(matches!(err, ValidationError::Overflow { .. }));

        let pair = vec![
            BatchSlot::new(1, 1, i64::MAX / 2 + 1, None),
            BatchSlot::new(2, 1, i64::MAX / 2 + 1, None),
        ];
        assert!(plan_depletion(&pair, 2).is_err());
    }

    #[test]
    fn test_weighted_average_rounds() {
        assert_eq!(weighted_average(Money::from_minor(10), 4).minor(), 3);
        assert_eq!(weighted_average(Money::from_minor(10), 3).minor(), 3);
        assert_eq!(weighted_average(Money::from_minor(100), 0), Money::ZERO);
    }

    fn batch_strategy() -> impl Strategy<Value = Vec<BatchSlot>> {
        prop::collection::vec(
            (0i64..50, 1i64..1_000, prop::option::of(0u32..365)),
            0..12,
        )
        .prop_map(|rows| {
            rows.into_iter()
                .enumerate()
                .map(|(i, (qty, cost, offset))| {
                    let expiry = offset.and_then(|o| {
                        NaiveDate::from_ymd_opt(2025, 1, 1)
                            .and_then(|d| d.checked_add_days(chrono::Days::new(o as u64)))
                    });
                    BatchSlot::new(i as i64 + 1, qty, cost, expiry)
                })
                .collect()
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Non-expiring batches deplete in ascending id order.
        #[test]
        fn prop_fifo_without_expiry(
            quantities in prop::collection::vec(1i64..50, 1..10),
            wanted in 1i64..300,
        ) {
            let batches: Vec<BatchSlot> = quantities
                .iter()
                .enumerate()
                .rev()
                .map(|(i, q)| BatchSlot::new(i as i64 + 1, *q, 10, None))
                .collect();

            let plan = plan_depletion(&batches, wanted).unwrap();
            let ids: Vec<i64> = plan.depletions.iter().map(|d| d.batch_id).collect();
            let mut sorted = ids.clone();
            sorted.sort();
            prop_assert_eq!(ids, sorted);
        }

        /// Expiring batches are exhausted before any non-expiring batch is touched.
        #[test]
        fn prop_expiring_before_non_expiring(batches in batch_strategy(), wanted in 1i64..400) {
            let plan = plan_depletion(&batches, wanted).unwrap();
            let by_id = |id: i64| batches.iter().find(|b| b.batch_id == id);

            let mut seen_non_expiring = false;
            for depletion in &plan.depletions {
                let batch = by_id(depletion.batch_id);
                prop_assert!(batch.is_some());
                let expires = batch.map(|b| b.expiry_date.is_some()).unwrap_or(false);
                if !expires {
                    seen_non_expiring = true;
                }
                prop_assert!(!(seen_non_expiring && expires));
            }

            for pair in plan.depletions.windows(2) {
                let a = by_id(pair[0].batch_id).cloned();
                let b = by_id(pair[1].batch_id).cloned();
                if let (Some(a), Some(b)) = (a, b) {
                    prop_assert_ne!(fefo_cmp(&a, &b), Ordering::Greater);
                    // Moving to the next batch means the previous one was emptied.
                    prop_assert!(pair[0].exhausts_batch());
                }
            }
        }

        /// available_after == available_before - q whenever q fits.
        #[test]
        fn prop_conserves_quantity(batches in batch_strategy(), wanted in 0i64..400) {
            let before = available(&batches);
            let plan = plan_depletion(&batches, wanted).unwrap();

            prop_assert_eq!(plan.allocated(), wanted.min(before));
            prop_assert_eq!(plan.shortfall, (wanted - before).max(0));

            let after: i64 = batches
                .iter()
                .map(|b| {
                    plan.depletions
                        .iter()
                        .find(|d| d.batch_id == b.batch_id)
                        .map(|d| d.remaining_on_hand)
                        .unwrap_or(b.quantity_on_hand.max(0))
                })
                .sum();
            if wanted <= before {
                prop_assert_eq!(after, before - wanted);
            }

            let cost: Money = plan.depletions.iter().map(|d| d.total_cost).sum();
            prop_assert_eq!(cost, plan.total_cost);
        }
    }
}
