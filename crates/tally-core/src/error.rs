//! # Error Types
//!
//! Domain-specific error types for tally-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  tally-core errors (this file)                                         │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  tally-db errors (separate crate)                                      │
//! │  ├── DbError          - Database operation failures                    │
//! │  └── EngineError      - What orchestrator callers see                  │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → EngineError ← DbError             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (product, entry number, etc.)
//! 3. Errors are enum variants, never String
//! 4. Journal soft-fails are NOT errors; they travel as `StepOutcome`

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A referenced entity does not exist.
    ///
    /// ## When This Occurs
    /// - Product, batch, customer or supplier id is unknown
    /// - Journal entry or posting batch id is unknown
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Requested depletion exceeds what the batches can supply.
    ///
    /// ## User Workflow
    /// ```text
    /// Sell 12 × "Milk 1L"
    ///      │
    ///      ▼
    /// Available (Σ active batch on-hand) = 9
    ///      │
    ///      ▼
    /// InsufficientStock { product: "Milk 1L", available: 9, requested: 12 }
    /// ```
    #[error("Insufficient stock for {product}: available {available}, requested {requested}")]
    InsufficientStock {
        product: String,
        available: i64,
        requested: i64,
    },

    /// Operation is illegal for the current state.
    ///
    /// ## When This Occurs
    /// - Posting an already-posted entry
    /// - Reversing an entry inside a locked posting batch
    /// - Paying a cancelled or fully paid sale
    #[error("Invalid state: {reason}")]
    InvalidState { reason: String },

    /// Persisted data does not match what was just written.
    #[error("Conflict: {reason}")]
    Conflict { reason: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        CoreError::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Creates an InvalidState error.
    pub fn invalid_state(reason: impl Into<String>) -> Self {
        CoreError::InvalidState {
            reason: reason.into(),
        }
    }

    /// Creates a Conflict error.
    pub fn conflict(reason: impl Into<String>) -> Self {
        CoreError::Conflict {
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before any row is written; the enclosing transaction rolls back.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Value must be strictly positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must be zero or more.
    #[error("{field} must not be negative")]
    MustBeNonNegative { field: String },

    /// Value must not be zero.
    #[error("{field} must not be zero")]
    MustBeNonZero { field: String },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// The computation would produce a fractional minor unit.
    ///
    /// ## When This Occurs
    /// - Interest basis points that do not divide the total evenly
    /// - A decimal string with a fractional part for an integer currency
    #[error("{field} produces a fractional {currency} amount")]
    FractionalAmount { field: String, currency: String },

    /// Integer arithmetic overflowed.
    #[error("{field} overflows the supported range")]
    Overflow { field: String },

    /// Invalid format (e.g., unparsable amount, bad date range).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },
}

impl ValidationError {
    pub fn required(field: impl Into<String>) -> Self {
        ValidationError::Required {
            field: field.into(),
        }
    }

    pub fn overflow(field: impl Into<String>) -> Self {
        ValidationError::Overflow {
            field: field.into(),
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
