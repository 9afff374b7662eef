//! # tally-core: Pure Costing & Posting Logic for Tally
//!
//! This crate holds every rule of the costing and double-entry engine that
//! can be expressed without touching storage.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tally Architecture                               │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │            Callers (HTTP layer, CLI, seed binary)               │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ plain function calls                   │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │        tally-db: orchestrators ─► services ─► repositories      │   │
//! │  │        one SQLite transaction per business event                │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ tally-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐  │   │
//! │  │   │  money  │ │  fifo   │ │ journal │ │ pricing │ │reconcile│  │   │
//! │  │   └─────────┘ └─────────┘ └─────────┘ └─────────┘ └─────────┘  │   │
//! │  │   ┌─────────┐ ┌──────────┐ ┌──────────┐ ┌──────────┐          │   │
//! │  │   │  types  │ │accounting│ │ settings │ │validation│          │   │
//! │  │   └─────────┘ └──────────┘ └──────────┘ └──────────┘          │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • DETERMINISTIC                          │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - Integer money for a currency without sub-units
//! - [`types`] - Catalog, inventory, sale, purchase, payment and ledger types
//! - [`accounting`] - Accounts, journal entries, posting batches
//! - [`fifo`] - FEFO/FIFO depletion planning
//! - [`journal`] - Balanced entry builders per business event
//! - [`pricing`] - Document totals, interest, unit resolution, margin
//! - [`reconcile`] - Drift between cached aggregates and ledgers
//! - [`settings`] - Module toggles and account code overrides
//! - [`statements`] - Profit & loss and balance sheet over a trial balance
//! - [`validation`] - Input rules
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use chrono::NaiveDate;
//! use tally_core::fifo::{plan_depletion, BatchSlot};
//!
//! let batches = vec![
//!     BatchSlot::new(1, 5, 100, None),
//!     BatchSlot::new(2, 10, 120, NaiveDate::from_ymd_opt(2025, 1, 1)),
//! ];
//!
//! // The expiring batch goes first.
//! let plan = plan_depletion(&batches, 8).unwrap();
//! assert_eq!(plan.depletions[0].batch_id, 2);
//! assert_eq!(plan.total_cost.minor(), 960);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod accounting;
pub mod error;
pub mod fifo;
pub mod journal;
pub mod money;
pub mod pricing;
pub mod reconcile;
pub mod settings;
pub mod statements;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use settings::ModuleSettings;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Currency used when `currency.base` is not configured.
pub const BASE_CURRENCY: &str = "IQD";

/// Unit name used when a product has no configured units.
pub const DEFAULT_UNIT_NAME: &str = "piece";

/// Basis points in 100%.
pub const BPS_DENOMINATOR: i64 = 10_000;
