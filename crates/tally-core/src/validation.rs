//! # Validation Module
//!
//! Input rules checked before an orchestrator writes anything.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Caller (HTTP schema, CLI)                                    │
//! │  └── Shape and type checks                                             │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Orchestrator (inside the transaction)                        │
//! │  ├── THIS MODULE: business input rules                                 │
//! │  └── Integer-only money arithmetic (money.rs)                          │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── UNIQUE (idempotency keys, entry numbers, batch numbers)           │
//! │  └── Foreign key constraints                                           │
//! │                                                                         │
//! │  A failure at any layer rolls the whole business event back.           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use tally_core::validation::{validate_quantity, validate_method_requirements};
//! use tally_core::PaymentMethod;
//!
//! validate_quantity("quantity", 5).unwrap();
//! assert!(validate_method_requirements(PaymentMethod::Card, None, false).is_err());
//! ```

use chrono::NaiveDate;

use crate::error::ValidationError;
use crate::money::Money;
use crate::types::{PaymentMethod, PaymentType};
use crate::BPS_DENOMINATOR;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a display name (product, customer, supplier).
///
/// ## Rules
/// - Must not be blank
/// - At most 200 characters
pub fn validate_name(field: &str, name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::required(field));
    }

    if name.chars().count() > 200 {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 1,
            max: 200,
        });
    }

    Ok(())
}

/// Trims an optional reference and treats blanks as absent.
pub fn normalize_reference(reference: Option<&str>) -> Option<String> {
    reference
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string)
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a quantity value.
///
/// ## Rules
/// - Must be positive (> 0)
///
/// ## Example
/// ```rust
/// use tally_core::validation::validate_quantity;
///
/// assert!(validate_quantity("quantity", 3).is_ok());
/// assert!(validate_quantity("quantity", 0).is_err());
/// ```
pub fn validate_quantity(field: &str, qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }

    Ok(())
}

/// Validates a signed stock adjustment. Zero changes nothing and is rejected.
pub fn validate_quantity_change(qty: i64) -> ValidationResult<()> {
    if qty == 0 {
        return Err(ValidationError::MustBeNonZero {
            field: "quantityChange".to_string(),
        });
    }

    Ok(())
}

/// Validates a price, discount, tax or paid amount.
///
/// ## Rules
/// - Must be non-negative (>= 0)
/// - Zero is allowed
pub fn validate_non_negative(field: &str, amount: Money) -> ValidationResult<()> {
    if amount.is_negative() {
        return Err(ValidationError::MustBeNonNegative {
            field: field.to_string(),
        });
    }

    Ok(())
}

/// Validates a payment amount. Cannot pay zero or negative amounts.
pub fn validate_payment_amount(amount: Money) -> ValidationResult<()> {
    if !amount.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: "amount".to_string(),
        });
    }

    Ok(())
}

/// Validates an interest rate in basis points (0% to 100%).
pub fn validate_interest_bps(bps: i64) -> ValidationResult<()> {
    if !(0..=BPS_DENOMINATOR).contains(&bps) {
        return Err(ValidationError::OutOfRange {
            field: "interestRateBps".to_string(),
            min: 0,
            max: BPS_DENOMINATOR,
        });
    }

    Ok(())
}

// =============================================================================
// Payment Rules
// =============================================================================

/// Validates what each payment method needs.
///
/// ## Rules
/// ```text
/// ┌──────────────┬─────────────────────────────────┐
/// │ Method       │ Requires                        │
/// ├──────────────┼─────────────────────────────────┤
/// │ cash         │ nothing                         │
/// │ card         │ reference number                │
/// │ bank_transfer│ nothing                         │
/// │ credit       │ a customer / supplier           │
/// └──────────────┴─────────────────────────────────┘
/// ```
pub fn validate_method_requirements(
    method: PaymentMethod,
    reference: Option<&str>,
    has_party: bool,
) -> ValidationResult<()> {
    match method {
        PaymentMethod::Card if normalize_reference(reference).is_none() => {
            Err(ValidationError::required("referenceNumber"))
        }
        PaymentMethod::Credit if !has_party => Err(ValidationError::required("customerId")),
        _ => Ok(()),
    }
}

/// A sale that leaves a balance on account needs someone to owe it.
pub fn validate_credit_party(
    payment_type: PaymentType,
    remaining: Money,
    has_party: bool,
) -> ValidationResult<()> {
    if payment_type.carries_interest() && remaining.is_positive() && !has_party {
        return Err(ValidationError::required("customerId"));
    }

    Ok(())
}

// =============================================================================
// Collection & Period Validators
// =============================================================================

/// Documents need at least one line.
pub fn validate_non_empty_items(count: usize) -> ValidationResult<()> {
    if count == 0 {
        return Err(ValidationError::required("items"));
    }

    Ok(())
}

/// Validates a posting period and returns `(start, end)`.
///
/// ## Example
/// ```rust
/// use chrono::NaiveDate;
/// use tally_core::validation::validate_period;
///
/// let jan1 = NaiveDate::from_ymd_opt(2025, 1, 1);
/// let jan31 = NaiveDate::from_ymd_opt(2025, 1, 31);
/// assert!(validate_period(jan1, jan31).is_ok());
/// assert!(validate_period(jan31, jan1).is_err());
/// assert!(validate_period(None, jan31).is_err());
/// ```
pub fn validate_period(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> ValidationResult<(NaiveDate, NaiveDate)> {
    let start = start.ok_or_else(|| ValidationError::required("periodStart"))?;
    let end = end.ok_or_else(|| ValidationError::required("periodEnd"))?;

    if start > end {
        return Err(ValidationError::InvalidFormat {
            field: "period".to_string(),
            reason: format!("start {} is after end {}", start, end),
        });
    }

    Ok((start, end))
}

// =============================================================================
// Unit Tests
// =============================================================================
