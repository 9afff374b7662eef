//! # Money Module
//!
//! Provides the `Money` type for amounts in the base currency.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE BASE CURRENCY HAS NO SUB-UNIT                                      │
//! │                                                                         │
//! │  IQD is booked in whole dinars. A value like 1250.5 cannot exist in    │
//! │  the ledger, so it must never be produced by arithmetic either.        │
//! │                                                                         │
//! │  OUR RULE: reject, never round                                          │
//! │    1000 × 250 bps = 25      ✓ booked                                    │
//! │    1001 × 250 bps = 25.025  ✗ ValidationError::FractionalAmount         │
//! │                                                                         │
//! │  Every total must reconcile exactly against the journal.               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use tally_core::money::Money;
//!
//! let price = Money::from_minor(1500);
//! let line = price.checked_mul_qty(3, "line subtotal").unwrap();
//! assert_eq!(line.minor(), 4500);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

use crate::error::ValidationError;
use crate::validation::ValidationResult;
use crate::BPS_DENOMINATOR;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in whole minor units of the base currency.
///
/// ## Design Decisions
/// - **i64 (signed)**: ledger amounts and balance deltas can be negative
/// - **Transparent**: serializes and stores as a bare integer
/// - **Checked helpers**: overflow and fractional results become
///   `ValidationError`, not panics or silent rounding
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(transparent))]
pub struct Money(i64);

impl Money {
    /// Zero.
    pub const ZERO: Money = Money(0);

    /// Creates a Money value from minor units.
    #[inline]
    pub const fn from_minor(minor: i64) -> Self {
        Money(minor)
    }

    /// Returns the value in minor units.
    #[inline]
    pub const fn minor(&self) -> i64 {
        self.0
    }

    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Returns `max(self, 0)`.
    #[inline]
    pub fn clamp_non_negative(self) -> Self {
        Money(self.0.max(0))
    }

    /// Adds two amounts, failing on overflow.
    pub fn checked_add(self, other: Money, field: &str) -> ValidationResult<Money> {
        self.0
            .checked_add(other.0)
            .map(Money)
            .ok_or_else(|| ValidationError::overflow(field))
    }

    /// Subtracts two amounts, failing on overflow.
    pub fn checked_sub(self, other: Money, field: &str) -> ValidationResult<Money> {
        self.0
            .checked_sub(other.0)
            .map(Money)
            .ok_or_else(|| ValidationError::overflow(field))
    }

    /// Multiplies a unit amount by a quantity, failing on overflow.
    ///
    /// ## Example
    /// ```rust
    /// use tally_core::money::Money;
    ///
    /// let unit = Money::from_minor(750);
    /// assert_eq!(unit.checked_mul_qty(4, "subtotal").unwrap().minor(), 3000);
    /// assert!(Money::from_minor(i64::MAX).checked_mul_qty(2, "subtotal").is_err());
    /// ```
    pub fn checked_mul_qty(self, qty: i64, field: &str) -> ValidationResult<Money> {
        self.0
            .checked_mul(qty)
            .map(Money)
            .ok_or_else(|| ValidationError::overflow(field))
    }

    /// Applies a basis-point rate and requires an exact integer result.
    ///
    /// ## Rule
    /// `amount × bps` must be divisible by 10 000. Anything else would
    /// need rounding, which the base currency forbids.
    ///
    /// ## Example
    /// ```rust
    /// use tally_core::money::Money;
    ///
    /// let total = Money::from_minor(20_000);
    /// assert_eq!(total.apply_bps_exact(250, "interest", "IQD").unwrap().minor(), 500);
    /// assert!(Money::from_minor(1_001).apply_bps_exact(250, "interest", "IQD").is_err());
    /// ```
    pub fn apply_bps_exact(&self, bps: i64, field: &str, currency: &str) -> ValidationResult<Money> {
        let numerator = self.0 as i128 * bps as i128;
        if numerator % BPS_DENOMINATOR as i128 != 0 {
            return Err(ValidationError::FractionalAmount {
                field: field.to_string(),
                currency: currency.to_string(),
            });
        }
        i64::try_from(numerator / BPS_DENOMINATOR as i128)
            .map(Money)
            .map_err(|_| ValidationError::overflow(field))
    }

    /// Parses a decimal string, rejecting any non-zero fractional part.
    ///
    /// ## Example
    /// ```rust
    /// use tally_core::money::Money;
    ///
    /// assert_eq!(Money::parse("1500", "amount", "IQD").unwrap().minor(), 1500);
    /// assert_eq!(Money::parse("1500.00", "amount", "IQD").unwrap().minor(), 1500);
    /// assert!(Money::parse("1500.5", "amount", "IQD").is_err());
    /// ```
    pub fn parse(input: &str, field: &str, currency: &str) -> ValidationResult<Money> {
        let trimmed = input.trim();
        let invalid = |reason: &str| ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: reason.to_string(),
        };

        if trimmed.is_empty() {
            return Err(ValidationError::required(field));
        }

        let (whole, fraction) = match trimmed.split_once('.') {
            Some((w, f)) => (w, Some(f)),
            None => (trimmed, None),
        };

        if let Some(fraction) = fraction {
            if fraction.is_empty() || !fraction.chars().all(|c| c.is_ascii_digit()) {
                return Err(invalid("not a decimal number"));
            }
            if fraction.chars().any(|c| c != '0') {
                return Err(ValidationError::FractionalAmount {
                    field: field.to_string(),
                    currency: currency.to_string(),
                });
            }
        }

        let digits = whole.strip_prefix('-').unwrap_or(whole);
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid("not a decimal number"));
        }

        whole
            .parse::<i64>()
            .map(Money)
            .map_err(|_| ValidationError::overflow(field))
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Money {
    fn from(minor: i64) -> Self {
        Money(minor)
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Neg for Money {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, m| acc + *m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
