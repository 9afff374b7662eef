//! # Services
//!
//! Domain services built on the repositories.
//!
//! ```text
//! ┌──────────────────────────────┬─────────────────────────────────────────┐
//! │ Borrow a connection          │ Own a Database handle                   │
//! │ (run inside the caller's tx) │ (open their own transaction)            │
//! ├──────────────────────────────┼─────────────────────────────────────────┤
//! │ FifoService                  │ PostingManager                          │
//! │ PostingService               │ ReconciliationService                   │
//! │                              │ ChartOfAccounts                         │
//! │                              │ AuditLogger (after commit only)         │
//! └──────────────────────────────┴─────────────────────────────────────────┘
//! ```

pub mod audit;
pub mod chart;
pub mod error;
pub mod fifo;
pub mod posting;
pub mod posting_manager;
pub mod reconciliation;

pub use audit::AuditLogger;
pub use chart::{ChartOfAccounts, ChartReport};
pub use error::{EngineError, EngineResult, ErrorCode};
pub use fifo::FifoService;
pub use posting::PostingService;
pub use posting_manager::{PeriodPosting, PostingManager, Reversal};
pub use reconciliation::{ReconciliationService, ReconciliationSummary};
