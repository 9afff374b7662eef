//! # Pricing Module
//!
//! Unit resolution and document totals for sales and purchases.
//!
//! ## Sale Totals
//! ```text
//! line subtotal  = qty × unit_price − discount × qty
//! subtotal       = Σ line subtotals
//! base total     = max(0, subtotal − discount) + tax
//! interest       = base total × bps / 10 000     (credit / mixed only, exact)
//! total          = base total + interest
//! remaining      = max(0, total − paid)
//! status         = completed if remaining == 0, else pending
//! ```
//!
//! Every step uses checked integer arithmetic. A fractional interest amount
//! is a validation failure, never a rounding.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::money::Money;
use crate::types::{DocumentStatus, PaymentType, ProductUnit};
use crate::validation::{validate_non_negative, validate_quantity, ValidationResult};
use crate::{BPS_DENOMINATOR, DEFAULT_UNIT_NAME};

// =============================================================================
// Unit Resolution
// =============================================================================

/// What the caller asked for on a sale line.
#[derive(Debug, Clone, Default)]
pub struct UnitRequest<'a> {
    pub unit_name: Option<&'a str>,
    /// Only honored when the product has no configured units.
    pub unit_factor: Option<i64>,
    pub unit_price: Option<Money>,
}

/// The server-authoritative unit for a sale line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedUnit {
    pub unit_name: String,
    pub factor: i64,
    pub unit_price: Money,
}

/// Resolves the unit, factor and price for one sale line.
///
/// ## Rules
/// ```text
/// units configured + unit named   ─► must match an active unit, else error
/// units configured + none named   ─► default active unit, else first active,
///                                    else fall through to product level
/// no units (or units disabled)    ─► requested name / factor, else "piece" × 1
/// ```
/// A unit's stored selling price overrides the requested price. When
/// neither exists the product's selling price is used.
///
/// ## Example
/// ```rust
/// use tally_core::pricing::{resolve_unit, UnitRequest};
/// use tally_core::Money;
///
/// let unit = resolve_unit(&[], &UnitRequest::default(), Money::from_minor(750)).unwrap();
/// assert_eq!(unit.unit_name, "piece");
/// assert_eq!(unit.factor, 1);
/// assert_eq!(unit.unit_price.minor(), 750);
/// ```
pub fn resolve_unit(
    units: &[ProductUnit],
    request: &UnitRequest<'_>,
    product_price: Money,
) -> ValidationResult<ResolvedUnit> {
    let requested_price = request.unit_price.unwrap_or(product_price);

    let configured = match (units.is_empty(), request.unit_name) {
        (false, Some(name)) => {
            let unit = units
                .iter()
                .find(|u| u.unit_name == name && u.is_active)
                .ok_or_else(|| ValidationError::InvalidFormat {
                    field: "unitName".to_string(),
                    reason: format!("unit \"{}\" not found or inactive", name),
                })?;
            Some(unit)
        }
        (false, None) => units
            .iter()
            .find(|u| u.is_default && u.is_active)
            .or_else(|| units.iter().find(|u| u.is_active)),
        (true, _) => None,
    };

    let resolved = match configured {
        Some(unit) => ResolvedUnit {
            unit_name: unit.unit_name.clone(),
            factor: unit.factor_to_base,
            unit_price: unit.selling_price.unwrap_or(requested_price),
        },
        None => ResolvedUnit {
            unit_name: request
                .unit_name
                .unwrap_or(DEFAULT_UNIT_NAME)
                .to_string(),
            factor: request.unit_factor.unwrap_or(1),
            unit_price: requested_price,
        },
    };

    validate_quantity("unitFactor", resolved.factor)?;
    validate_non_negative("unitPrice", resolved.unit_price)?;
    Ok(resolved)
}

/// quantity × factor, checked.
pub fn quantity_base(quantity: i64, factor: i64) -> ValidationResult<i64> {
    let base = quantity
        .checked_mul(factor)
        .ok_or_else(|| ValidationError::overflow("quantityBase"))?;
    validate_quantity("quantityBase", base)?;
    Ok(base)
}

// =============================================================================
// Line Totals
// =============================================================================

/// `qty × unit_price − discount × qty`, with a per-unit discount.
pub fn sale_line_subtotal(quantity: i64, unit_price: Money, discount: Money) -> ValidationResult<Money> {
    validate_quantity("quantity", quantity)?;
    validate_non_negative("unitPrice", unit_price)?;
    validate_non_negative("discount", discount)?;

    let gross = unit_price.checked_mul_qty(quantity, "subtotal")?;
    let off = discount.checked_mul_qty(quantity, "subtotal")?;
    let net = gross.checked_sub(off, "subtotal")?;
    validate_non_negative("subtotal", net)?;
    Ok(net)
}

/// `qty × unit_cost − discount`, with a line-level discount.
pub fn purchase_line_subtotal(quantity: i64, unit_cost: Money, discount: Money) -> ValidationResult<Money> {
    validate_quantity("quantity", quantity)?;
    validate_non_negative("unitCost", unit_cost)?;
    validate_non_negative("discount", discount)?;

    let gross = unit_cost.checked_mul_qty(quantity, "subtotal")?;
    let net = gross.checked_sub(discount, "subtotal")?;
    validate_non_negative("subtotal", net)?;
    Ok(net)
}

// =============================================================================
// Document Totals
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentTotals {
    pub subtotal: Money,
    pub discount: Money,
    pub tax: Money,
    pub interest_rate_bps: i64,
    pub interest_amount: Money,
    pub total: Money,
    pub paid: Money,
    pub remaining: Money,
    pub status: DocumentStatus,
}

/// Inputs shared by sale and purchase totals.
#[derive(Debug, Clone, Copy, Default)]
pub struct TotalsInput {
    pub discount: Money,
    pub tax: Money,
    pub paid: Money,
}

fn base_total(subtotal: Money, input: &TotalsInput) -> ValidationResult<Money> {
    validate_non_negative("discount", input.discount)?;
    validate_non_negative("tax", input.tax)?;
    validate_non_negative("paidAmount", input.paid)?;

    subtotal
        .checked_sub(input.discount, "total")?
        .clamp_non_negative()
        .checked_add(input.tax, "total")
}

fn settle(
    subtotal: Money,
    input: &TotalsInput,
    total: Money,
    interest_rate_bps: i64,
    interest_amount: Money,
) -> DocumentTotals {
    let remaining = (total - input.paid).clamp_non_negative();
    DocumentTotals {
        subtotal,
        discount: input.discount,
        tax: input.tax,
        interest_rate_bps,
        interest_amount,
        total,
        paid: input.paid,
        remaining,
        status: DocumentStatus::for_remaining(remaining),
    }
}

/// Computes sale totals, including exact interest for credit and mixed sales.
///
/// ## Example
/// ```rust
/// use tally_core::pricing::{sale_totals, TotalsInput};
/// use tally_core::{DocumentStatus, Money, PaymentType};
///
/// let lines = [Money::from_minor(20_000)];
/// let totals = sale_totals(
///     &lines,
///     &TotalsInput { paid: Money::from_minor(5_000), ..Default::default() },
///     PaymentType::Mixed,
///     250,
///     "IQD",
/// ).unwrap();
///
/// assert_eq!(totals.interest_amount.minor(), 500);
/// assert_eq!(totals.total.minor(), 20_500);
/// assert_eq!(totals.remaining.minor(), 15_500);
/// assert_eq!(totals.status, DocumentStatus::Pending);
/// ```
pub fn sale_totals(
    line_subtotals: &[Money],
    input: &TotalsInput,
    payment_type: PaymentType,
    interest_rate_bps: i64,
    currency: &str,
) -> ValidationResult<DocumentTotals> {
    let subtotal = sum_checked(line_subtotals)?;
    let base = base_total(subtotal, input)?;

    let bps = if payment_type.carries_interest() {
        interest_rate_bps
    } else {
        0
    };
    if !(0..=BPS_DENOMINATOR).contains(&bps) {
        return Err(ValidationError::OutOfRange {
            field: "interestRateBps".to_string(),
            min: 0,
            max: BPS_DENOMINATOR,
        });
    }

    let interest = base.apply_bps_exact(bps, "interestAmount", currency)?;
    let total = base.checked_add(interest, "total")?;

    Ok(settle(subtotal, input, total, bps, interest))
}

/// Computes purchase totals. Purchases carry no interest.
pub fn purchase_totals(line_subtotals: &[Money], input: &TotalsInput) -> ValidationResult<DocumentTotals> {
    let subtotal = sum_checked(line_subtotals)?;
    let total = base_total(subtotal, input)?;
    Ok(settle(subtotal, input, total, 0, Money::ZERO))
}

fn sum_checked(amounts: &[Money]) -> ValidationResult<Money> {
    amounts
        .iter()
        .try_fold(Money::ZERO, |acc, m| acc.checked_add(*m, "subtotal"))
}

// =============================================================================
// Profit
// =============================================================================

/// `(total − cogs, trunc(profit × 10 000 / total))`. Margin is zero for a zero total.
pub fn profit_and_margin(total: Money, cogs: Money) -> (Money, i64) {
    let profit = total - cogs;
    if total.is_zero() {
        return (profit, 0);
    }
    let margin = profit.minor() as i128 * BPS_DENOMINATOR as i128 / total.minor() as i128;
    (profit, margin as i64)
}

// =============================================================================
// Unit Tests
// =============================================================================
