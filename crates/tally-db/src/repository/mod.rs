//! # Repository Module
//!
//! SQL for every table lives here and nowhere else.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Borrowed-Connection Repositories                     │
//! │                                                                         │
//! │  Orchestrator                                                          │
//! │       │  let mut tx = db.begin().await?;                                │
//! │       │                                                                 │
//! │       │  ProductRepository::new(&mut tx).get_by_id(id)                  │
//! │       │  BatchRepository::new(&mut tx).fefo_batches(id)                │
//! │       │  MovementRepository::new(&mut tx).insert(&movement)             │
//! │       ▼                                                                 │
//! │  XRepository<'c> { conn: &'c mut SqliteConnection }                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite (inside the caller's transaction, or a pooled connection)      │
//! │                                                                         │
//! │  Every write joins whatever transaction the caller opened, so a       │
//! │  business event commits or rolls back as one unit.                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`SettingsRepository`] - key-value module settings
//! - [`AccountRepository`] - chart of accounts, balances, trial balance
//! - [`JournalRepository`] - journal entries and lines
//! - [`PostingBatchRepository`] - period posting batches and locks
//! - [`ProductRepository`] - products, units, stock cache
//! - [`BatchRepository`] - product batches (FEFO order)
//! - [`MovementRepository`] - append-only inventory movements
//! - [`PartyRepository`] - customers and suppliers
//! - [`PartyLedgerRepository`] - append-only customer / supplier ledgers
//! - [`PaymentRepository`] - payments
//! - [`SaleRepository`] - sales, items, depletions
//! - [`PurchaseRepository`] - purchases and items
//! - [`AuditRepository`] - audit log rows

pub mod account;
pub mod audit;
pub mod batch;
pub mod journal;
pub mod movement;
pub mod party;
pub mod party_ledger;
pub mod payment;
pub mod posting_batch;
pub mod product;
pub mod purchase;
pub mod sale;
pub mod settings;

pub use account::AccountRepository;
pub use audit::AuditRepository;
pub use batch::BatchRepository;
pub use journal::JournalRepository;
pub use movement::MovementRepository;
pub use party::PartyRepository;
pub use party_ledger::PartyLedgerRepository;
pub use payment::PaymentRepository;
pub use posting_batch::PostingBatchRepository;
pub use product::ProductRepository;
pub use purchase::PurchaseRepository;
pub use sale::SaleRepository;
pub use settings::SettingsRepository;
