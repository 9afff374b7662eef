//! # Transaction Orchestrators
//!
//! The composition root. Each business event is one method on [`Engine`].
//!
//! ## Two Phases
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  COMMIT PHASE (one SQLite transaction)                                 │
//! │                                                                         │
//! │   idempotency claim ─► validation ─► stock / batch mutation            │
//! │        ─► movements ─► payment row ─► journal entry ─► party ledger    │
//! │                                                                         │
//! │   any error ──► transaction dropped ──► nothing was written            │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │  SIDE-EFFECT PHASE (after commit)                                      │
//! │                                                                         │
//! │   audit row ──► failure is logged and swallowed                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Idempotency
//! Header rows carry a UNIQUE idempotency key and are inserted with
//! `ON CONFLICT DO NOTHING`. Losing the race means the insert returns no
//! row; the orchestrator rolls back and returns the committed record with
//! `replayed = true`. No audit row is written for a replay.

pub mod payment;
pub mod purchase;
pub mod sale;
pub mod stock;

pub use payment::{
    LedgerAdjustmentRequest, PartyPaymentRequest, PaymentReceipt, PurchasePaymentRequest,
    SalePaymentRequest,
};
pub use purchase::{CreatePurchaseRequest, PurchaseItemInput, PurchaseReceipt};
pub use sale::{CreateSaleRequest, SaleDiagnostics, SaleItemInput, SaleReceipt};
pub use stock::{AdjustStockRequest, AdjustmentReceipt};

use chrono::Utc;
use sqlx::SqliteConnection;
use tracing::info;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::pool::Database;
use crate::repository::party_ledger::NewLedgerEntry;
use crate::repository::{PartyLedgerRepository, PartyRepository, SettingsRepository};
use crate::services::error::{EngineError, EngineResult};
use crate::services::{
    AuditLogger, ChartOfAccounts, PostingManager, PostingService, ReconciliationService,
};
use tally_core::journal::JournalPlan;
use tally_core::{
    LedgerTransactionType, ModuleSettings, Money, PartyKind, SkipReason, StepOutcome,
};

// =============================================================================
// Engine
// =============================================================================

/// Entry point for every business event.
///
/// ```rust,ignore
/// let engine = Engine::open(&EngineConfig::load(None)?).await?;
/// engine.chart().initialize().await?;
///
/// let receipt = engine.create_sale(request).await?;
/// if !receipt.diagnostics.journal.created {
///     warn!(reason = ?receipt.diagnostics.journal.reason, "Sale has no journal entry");
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Engine {
    db: Database,
    audit: AuditLogger,
    fifo_enabled: bool,
}

impl Engine {
    /// Opens the database described by `config` and runs migrations.
    pub async fn open(config: &EngineConfig) -> EngineResult<Self> {
        let db = Database::new(config.db_config()).await?;
        info!(fifo_enabled = config.costing.fifo_enabled, "Engine ready");
        Ok(Engine::with_database(db, config.costing.fifo_enabled))
    }

    pub fn with_database(db: Database, fifo_enabled: bool) -> Self {
        Engine {
            audit: AuditLogger::new(db.clone()),
            db,
            fifo_enabled,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn fifo_enabled(&self) -> bool {
        self.fifo_enabled
    }

    pub fn posting(&self) -> PostingManager {
        PostingManager::new(self.db.clone(), self.audit.clone())
    }

    pub fn reconciliation(&self) -> ReconciliationService {
        ReconciliationService::new(self.db.clone())
    }

    pub fn chart(&self) -> ChartOfAccounts {
        ChartOfAccounts::new(self.db.clone())
    }

    /// Module toggles as currently stored.
    pub async fn settings(&self) -> EngineResult<ModuleSettings> {
        let mut conn = self.db.acquire().await?;
        Ok(SettingsRepository::new(&mut conn).module_settings().await?)
    }

    /// Writes one `settings` row.
    pub async fn set_setting(&self, key: &str, value: &str) -> EngineResult<()> {
        let mut conn = self.db.acquire().await?;
        SettingsRepository::new(&mut conn).set(key, value).await?;
        Ok(())
    }
}

// =============================================================================
// Shared Steps
// =============================================================================

/// `{prefix}-{yyyymmddHHMMSS}-{uuid8}`.
pub(crate) fn document_number(prefix: &str) -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{}-{}-{}", prefix, Utc::now().format("%Y%m%d%H%M%S"), &id[..8])
}

/// Key of the payment written together with a sale or purchase.
pub(crate) fn initial_payment_key(key: Option<&str>) -> Option<String> {
    key.map(|k| format!("{}:payment:initial", k))
}

pub(crate) async fn record_journal(
    conn: &mut SqliteConnection,
    plan: &JournalPlan,
    settings: &ModuleSettings,
    created_by: Option<i64>,
) -> EngineResult<StepOutcome> {
    PostingService::new(conn).record(plan, settings, created_by).await
}

pub(crate) async fn ensure_party(
    conn: &mut SqliteConnection,
    kind: PartyKind,
    party_id: i64,
) -> EngineResult<()> {
    if PartyRepository::new(conn).exists(kind, party_id).await? {
        Ok(())
    } else {
        Err(EngineError::not_found(kind.to_string(), party_id))
    }
}

/// One party-ledger row, or the reason there is none.
pub(crate) struct LedgerPosting {
    pub party_id: Option<i64>,
    pub transaction_type: LedgerTransactionType,
    /// Signed.
    pub amount: Money,
    pub document_id: Option<i64>,
    pub payment_id: Option<i64>,
    pub journal_entry_id: Option<i64>,
    pub notes: Option<String>,
    pub created_by: Option<i64>,
}

/// Appends to the party ledger when ledgers are on.
///
/// With ledgers off, payments still reduce the cached balance directly so
/// the party's balance stays right without a ledger.
pub(crate) async fn record_ledger(
    conn: &mut SqliteConnection,
    settings: &ModuleSettings,
    kind: PartyKind,
    posting: LedgerPosting,
) -> EngineResult<StepOutcome> {
    let Some(party_id) = posting.party_id else {
        return Ok(StepOutcome::skipped(SkipReason::NoParty));
    };

    if !settings.ledgers_enabled {
        if posting.transaction_type == LedgerTransactionType::Payment {
            let mut parties = PartyRepository::new(conn);
            let balance = parties.balance(kind, party_id).await?;
            parties
                .set_balance(kind, party_id, balance + posting.amount)
                .await?;
        }
        return Ok(StepOutcome::skipped(SkipReason::LedgersDisabled));
    }

    let entry = PartyLedgerRepository::new(conn, kind)
        .append(&NewLedgerEntry {
            party_id,
            transaction_type: posting.transaction_type,
            amount: posting.amount,
            document_id: posting.document_id,
            payment_id: posting.payment_id,
            journal_entry_id: posting.journal_entry_id,
            notes: posting.notes,
            created_by: posting.created_by,
        })
        .await?;

    Ok(StepOutcome::created(entry.id))
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Fixtures shared by the orchestrator tests.

    use super::*;
    use crate::pool::DbConfig;
    use crate::repository::batch::NewBatch;
    use crate::repository::product::NewProduct;
    use crate::repository::{BatchRepository, MovementRepository, ProductRepository};
    use chrono::NaiveDate;
    use tally_core::{MovementReason, MovementSource, MovementType, NewMovement};

    pub async fn engine() -> Engine {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let engine = Engine::with_database(db, true);
        engine.chart().initialize().await.unwrap();
        engine
    }

    /// File-backed engine with a real multi-connection pool. Keep `dir`
    /// alive for the length of the test.
    pub async fn file_engine(dir: &tempfile::TempDir, connections: u32) -> Engine {
        let config = DbConfig::new(dir.path().join("tally.db")).max_connections(connections);
        let db = Database::new(config).await.unwrap();
        let engine = Engine::with_database(db, true);
        engine.chart().initialize().await.unwrap();
        engine
    }

    pub async fn product(engine: &Engine, name: &str, cost: i64, price: i64) -> i64 {
        let mut conn = engine.database().acquire().await.unwrap();
        ProductRepository::new(&mut conn)
            .create(&NewProduct {
                name: name.into(),
                sku: None,
                cost_price: Money::from_minor(cost),
                selling_price: Money::from_minor(price),
            })
            .await
            .unwrap()
            .id
    }

    /// Receives a batch the way a purchase would: batch, `in` movement, cache.
    pub async fn receive(
        engine: &Engine,
        product_id: i64,
        batch_number: &str,
        qty: i64,
        cost: i64,
        expiry: Option<NaiveDate>,
    ) -> i64 {
        let mut conn = engine.database().acquire().await.unwrap();
        let batch = BatchRepository::new(&mut conn)
            .create(&NewBatch {
                product_id,
                batch_number: batch_number.into(),
                expiry_date: expiry,
                quantity: qty,
                cost_per_unit: Money::from_minor(cost),
                purchase_id: None,
                notes: None,
            })
            .await
            .unwrap();
        let (before, after) = ProductRepository::new(&mut conn)
            .adjust_stock(product_id, qty)
            .await
            .unwrap();
        MovementRepository::new(&mut conn)
            .insert(&NewMovement {
                product_id,
                batch_id: Some(batch.id),
                movement_type: MovementType::In,
                reason: MovementReason::Opening,
                quantity_base: qty,
                unit_name: "piece".into(),
                unit_factor: 1,
                stock_before: before,
                stock_after: after,
                cost_per_unit: Money::from_minor(cost),
                total_cost: Money::from_minor(cost * qty),
                source_type: Some(MovementSource::Adjustment),
                source_id: None,
                idempotency_key: None,
                notes: None,
                created_by: None,
            })
            .await
            .unwrap();
        batch.id
    }

    pub async fn customer(engine: &Engine, name: &str) -> i64 {
        let mut conn = engine.database().acquire().await.unwrap();
        PartyRepository::new(&mut conn)
            .create_customer(name, None)
            .await
            .unwrap()
            .id
    }

    pub async fn supplier(engine: &Engine, name: &str) -> i64 {
        let mut conn = engine.database().acquire().await.unwrap();
        PartyRepository::new(&mut conn)
            .create_supplier(name, None)
            .await
            .unwrap()
            .id
    }

    pub async fn count(engine: &Engine, table: &str) -> i64 {
        let mut conn = engine.database().acquire().await.unwrap();
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(&mut *conn)
            .await
            .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_number_shape() {
        let number = document_number("INV");
        let parts: Vec<&str> = number.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "INV");
        assert_eq!(parts[1].len(), 14);
        assert_eq!(parts[2].len(), 8);
    }

    #[test]
    fn test_initial_payment_key() {
        assert_eq!(
            initial_payment_key(Some("k-1")).as_deref(),
            Some("k-1:payment:initial")
        );
        assert_eq!(initial_payment_key(None), None);
    }
}
