//! # tally-db: Storage, Posting & Orchestration for Tally
//!
//! SQLite persistence for the costing and posting engine, plus the
//! orchestrators that turn one business event into one transaction.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Tally Data Flow                                │
//! │                                                                         │
//! │  Caller (HTTP layer, CLI, seed binary)                                 │
//! │       │  engine.create_sale(request)                                    │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     tally-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   orchestrators   Engine: sale, purchase, payment, adjustment   │   │
//! │  │        │                                                        │   │
//! │  │        ▼                                                        │   │
//! │  │   services        FIFO, posting, posting manager, reconcile,   │   │
//! │  │        │          chart of accounts, audit                      │   │
//! │  │        ▼                                                        │   │
//! │  │   repository      one struct per table group, borrowed conn     │   │
//! │  │        │                                                        │   │
//! │  │        ▼                                                        │   │
//! │  │   pool / migrations                                             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (tally.db)                  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`config`] - Engine configuration (file + environment)
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Storage error types
//! - [`repository`] - SQL for every table
//! - [`services`] - FIFO, posting, reconciliation, audit
//! - [`orchestrators`] - The [`Engine`] and its business events
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tally_db::{Engine, EngineConfig};
//!
//! let engine = Engine::open(&EngineConfig::load(None)?).await?;
//! engine.chart().initialize().await?;
//!
//! let receipt = engine.create_sale(request).await?;
//! let drift = engine.reconciliation().reconcile_all().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod migrations;
pub mod orchestrators;
pub mod pool;
pub mod repository;
pub mod services;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{ConfigError, EngineConfig};
pub use error::{DbError, DbResult};
pub use orchestrators::{
    AdjustStockRequest, AdjustmentReceipt, CreatePurchaseRequest, CreateSaleRequest, Engine,
    LedgerAdjustmentRequest, PartyPaymentRequest, PaymentReceipt, PurchaseItemInput,
    PurchasePaymentRequest, PurchaseReceipt, SaleDiagnostics, SaleItemInput, SalePaymentRequest,
    SaleReceipt,
};
pub use pool::{Database, DbConfig};
pub use services::{
    ChartReport, EngineError, EngineResult, ErrorCode, PeriodPosting, Reversal,
    ReconciliationSummary,
};
