//! # Engine Error Type
//!
//! The one error type every service and orchestrator returns.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in the Engine                             │
//! │                                                                         │
//! │  Orchestrator (create_sale)                                            │
//! │       │                                                                 │
//! │       ├── ValidationError (tally-core)  ──────────► Validation          │
//! │       ├── CoreError::NotFound           ──────────► NotFound            │
//! │       ├── CoreError::InsufficientStock  ──────────► InsufficientStock   │
//! │       ├── CoreError::InvalidState       ──────────► InvalidState        │
//! │       ├── DbError::UniqueViolation      ──────────► Conflict            │
//! │       ├── DbError::NotFound             ──────────► NotFound            │
//! │       └── any other DbError             ──────────► Database            │
//! │                                                                         │
//! │  The transaction is dropped on every error path, so SQLite rolls       │
//! │  back everything the event wrote.                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Missing chart accounts and unbalanced journals never reach this type.
//! They come back as a skipped [`StepOutcome`](tally_core::StepOutcome).

use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::error::DbError;
use tally_core::{CoreError, ValidationError};

/// Machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    NotFound,
    InsufficientStock,
    InvalidState,
    Conflict,
    DatabaseError,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("Insufficient stock for {product}: available {available}, requested {requested}")]
    InsufficientStock {
        product: String,
        available: i64,
        requested: i64,
    },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(DbError),
}

impl EngineError {
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        EngineError::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    pub fn invalid_state(reason: impl Into<String>) -> Self {
        EngineError::InvalidState(reason.into())
    }

    pub fn conflict(reason: impl Into<String>) -> Self {
        EngineError::Conflict(reason.into())
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            EngineError::Validation(_) => ErrorCode::ValidationError,
            EngineError::NotFound { .. } => ErrorCode::NotFound,
            EngineError::InsufficientStock { .. } => ErrorCode::InsufficientStock,
            EngineError::InvalidState(_) => ErrorCode::InvalidState,
            EngineError::Conflict(_) => ErrorCode::Conflict,
            EngineError::Database(_) => ErrorCode::DatabaseError,
        }
    }
}

impl From<CoreError> for EngineError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NotFound { entity, id } => EngineError::NotFound { entity, id },
            CoreError::InsufficientStock {
                product,
                available,
                requested,
            } => EngineError::InsufficientStock {
                product,
                available,
                requested,
            },
            CoreError::InvalidState { reason } => EngineError::InvalidState(reason),
            CoreError::Conflict { reason } => EngineError::Conflict(reason),
            CoreError::Validation(e) => EngineError::Validation(e),
        }
    }
}

impl From<DbError> for EngineError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => EngineError::NotFound { entity, id },
            DbError::UniqueViolation { field, .. } => {
                EngineError::Conflict(format!("duplicate value for {}", field))
            }
            other => {
                error!(error = %other, "Database operation failed");
                EngineError::Database(other)
            }
        }
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        DbError::from(err).into()
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
