//! # Posting Manager
//!
//! Period posting, single-entry post/unpost, reversal and batch locks, plus
//! the statements read off posted lines.
//!
//! ## Balance Rule
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  accounts.balance == Σ (debit − credit) over lines of POSTED entries    │
//! │                                                                         │
//! │  post        ──► + line.balance_delta() for every line                  │
//! │  unpost      ──► − line.balance_delta() for every line                  │
//! │  reverse     ──► unposted: flag only                                    │
//! │                  posted:   REV entry (swapped lines) posted + applied   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every operation runs in one transaction; the audit row follows commit.

use chrono::{NaiveDate, Utc};
use serde_json::json;
use sqlx::SqliteConnection;
use tracing::{info, warn};

use crate::pool::Database;
use crate::repository::journal::{NewJournalEntry, NewJournalLine};
use crate::repository::posting_batch::NewPostingBatch;
use crate::repository::{
    AccountRepository, JournalRepository, PostingBatchRepository, SettingsRepository,
};
use crate::services::audit::{actions, AuditLogger};
use crate::services::error::{EngineError, EngineResult};
use tally_core::accounting::{
    JournalEntry, JournalLine, PeriodType, PostingBatch, PostingBatchStatus, TrialBalanceRow,
};
use tally_core::journal::{reversal_entry_number, reversed_lines};
use tally_core::statements::{self, BalanceSheet, ProfitAndLoss};
use tally_core::validation::validate_period;
use tally_core::Money;

/// Result of a period post.
#[derive(Debug, Clone)]
pub struct PeriodPosting {
    pub batch: PostingBatch,
    pub entry_ids: Vec<i64>,
}

/// Result of a reversal. `reversal` is `None` when the entry was voided in place.
#[derive(Debug, Clone)]
pub struct Reversal {
    pub original: JournalEntry,
    pub reversal: Option<JournalEntry>,
}

#[derive(Debug, Clone)]
pub struct PostingManager {
    db: Database,
    audit: AuditLogger,
}

impl PostingManager {
    pub fn new(db: Database, audit: AuditLogger) -> Self {
        PostingManager { db, audit }
    }

    // =========================================================================
    // Period Posting
    // =========================================================================

    /// Posts every unposted entry dated inside the period, or none of them.
    pub async fn post_period(
        &self,
        period_type: PeriodType,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        posted_by: Option<i64>,
        notes: Option<String>,
    ) -> EngineResult<PeriodPosting> {
        let mut tx = self.db.begin().await?;

        let settings = SettingsRepository::new(&mut tx).module_settings().await?;
        if !settings.accounting_enabled {
            return Err(EngineError::invalid_state("accounting is disabled"));
        }
        let (start, end) = validate_period(start, end)?;

        let entries = JournalRepository::new(&mut tx)
            .find_unposted_in_range(start, end)
            .await?;
        if entries.is_empty() {
            return Err(EngineError::invalid_state(format!(
                "no unposted entries between {} and {}",
                start, end
            )));
        }

        if let Some(bad) = entries.iter().find(|e| !e.is_postable()) {
            warn!(
                entry_id = bad.id,
                entry_number = %bad.entry_number,
                debit = %bad.total_debit(),
                credit = %bad.total_credit(),
                "Period posting aborted"
            );
            return Err(EngineError::invalid_state(format!(
                "entry {} is unbalanced or has no lines",
                bad.entry_number
            )));
        }

        let total: Money = entries.iter().map(|e| e.total_amount).sum();
        let batch = PostingBatchRepository::new(&mut tx)
            .create_posted(&NewPostingBatch {
                period_type,
                period_start: start,
                period_end: end,
                entries_count: entries.len() as i64,
                total_amount: total,
                posted_by,
                notes,
            })
            .await?;

        for entry in &entries {
            JournalRepository::new(&mut tx)
                .mark_posted(entry.id, Some(batch.id))
                .await?;
            apply_lines(&mut tx, &entry.lines, false).await?;
        }

        tx.commit().await?;

        let entry_ids: Vec<i64> = entries.iter().map(|e| e.id).collect();
        info!(
            batch_id = batch.id,
            entries = entry_ids.len(),
            total = %batch.total_amount,
            "Period posted"
        );

        self.audit
            .record(
                posted_by,
                actions::JOURNAL_POST,
                "posting_batch",
                batch.id,
                format!("Posted {} entries from {} to {}", entry_ids.len(), start, end),
                json!({ "entryIds": entry_ids, "totalAmount": batch.total_amount }),
            )
            .await;

        Ok(PeriodPosting { batch, entry_ids })
    }

    // =========================================================================
    // Single Entries
    // =========================================================================

    pub async fn post_entry(&self, entry_id: i64, posted_by: Option<i64>) -> EngineResult<JournalEntry> {
        let mut tx = self.db.begin().await?;

        let entry = JournalRepository::new(&mut tx).get_by_id(entry_id).await?;
        if entry.is_posted {
            return Err(EngineError::invalid_state(format!(
                "entry {} is already posted",
                entry.entry_number
            )));
        }
        if entry.is_reversed {
            return Err(EngineError::invalid_state(format!(
                "entry {} is reversed",
                entry.entry_number
            )));
        }
        ensure_unlocked(&mut tx, &entry).await?;
        if !entry.is_postable() {
            return Err(EngineError::invalid_state(format!(
                "entry {} is unbalanced or has no lines",
                entry.entry_number
            )));
        }

        JournalRepository::new(&mut tx)
            .mark_posted(entry.id, entry.posting_batch_id)
            .await?;
        apply_lines(&mut tx, &entry.lines, false).await?;
        let posted = JournalRepository::new(&mut tx).get_by_id(entry.id).await?;
        tx.commit().await?;

        info!(entry_id, entry_number = %posted.entry_number, "Entry posted");
        self.audit
            .record(
                posted_by,
                actions::JOURNAL_POST,
                "journal_entry",
                posted.id,
                format!("Posted {}", posted.entry_number),
                json!({ "entryNumber": posted.entry_number }),
            )
            .await;

        Ok(posted)
    }

    /// Returns a posted entry to draft and takes its lines back out of the balances.
    pub async fn unpost_entry(&self, entry_id: i64) -> EngineResult<JournalEntry> {
        let mut tx = self.db.begin().await?;

        let entry = JournalRepository::new(&mut tx).get_by_id(entry_id).await?;
        if !entry.is_posted {
            return Err(EngineError::invalid_state(format!(
                "entry {} is not posted",
                entry.entry_number
            )));
        }
        if entry.is_reversed {
            return Err(EngineError::invalid_state(format!(
                "entry {} is reversed",
                entry.entry_number
            )));
        }
        ensure_unlocked(&mut tx, &entry).await?;

        JournalRepository::new(&mut tx).mark_unposted(entry.id).await?;
        apply_lines(&mut tx, &entry.lines, true).await?;
        let unposted = JournalRepository::new(&mut tx).get_by_id(entry.id).await?;
        tx.commit().await?;

        info!(entry_id, entry_number = %unposted.entry_number, "Entry unposted");
        Ok(unposted)
    }

    pub async fn reverse_entry(
        &self,
        entry_id: i64,
        reversed_by: Option<i64>,
        reason: Option<String>,
    ) -> EngineResult<Reversal> {
        let mut tx = self.db.begin().await?;

        let entry = JournalRepository::new(&mut tx).get_by_id(entry_id).await?;
        if entry.is_reversed {
            return Err(EngineError::invalid_state(format!(
                "entry {} is already reversed",
                entry.entry_number
            )));
        }
        ensure_unlocked(&mut tx, &entry).await?;

        let reversal = if entry.is_posted {
            let now = Utc::now();
            let lines: Vec<NewJournalLine> = reversed_lines(&entry.lines)
                .into_iter()
                .map(|line| NewJournalLine {
                    account_id: line.account_id,
                    debit: line.debit,
                    credit: line.credit,
                    description: line.description,
                })
                .collect();

            let created = JournalRepository::new(&mut tx)
                .insert(
                    &NewJournalEntry {
                        entry_number: reversal_entry_number(&entry.entry_number, now.timestamp_millis()),
                        entry_date: now.date_naive(),
                        description: format!("Reversal of {}", entry.entry_number),
                        source_type: entry.source_type,
                        source_id: entry.source_id,
                        is_posted: true,
                        reversal_of_id: Some(entry.id),
                        posting_batch_id: None,
                        total_amount: entry.total_amount,
                        currency: entry.currency.clone(),
                        notes: reason.clone(),
                        created_by: reversed_by,
                    },
                    &lines,
                )
                .await?;
            apply_lines(&mut tx, &created.lines, false).await?;
            Some(created)
        } else {
            None
        };

        JournalRepository::new(&mut tx).mark_reversed(entry.id).await?;
        let original = JournalRepository::new(&mut tx).get_by_id(entry.id).await?;
        tx.commit().await?;

        info!(
            entry_id,
            entry_number = %original.entry_number,
            counter_entry = reversal.as_ref().map(|r| r.id),
            "Entry reversed"
        );
        self.audit
            .record(
                reversed_by,
                actions::JOURNAL_REVERSE,
                "journal_entry",
                original.id,
                format!("Reversed {}", original.entry_number),
                json!({
                    "reversalId": reversal.as_ref().map(|r| r.id),
                    "reason": reason,
                }),
            )
            .await;

        Ok(Reversal { original, reversal })
    }

    // =========================================================================
    // Batch Locks
    // =========================================================================

    pub async fn lock_batch(&self, batch_id: i64) -> EngineResult<PostingBatch> {
        self.set_batch_status(batch_id, PostingBatchStatus::Locked).await
    }

    pub async fn unlock_batch(&self, batch_id: i64) -> EngineResult<PostingBatch> {
        self.set_batch_status(batch_id, PostingBatchStatus::Posted).await
    }

    async fn set_batch_status(
        &self,
        batch_id: i64,
        status: PostingBatchStatus,
    ) -> EngineResult<PostingBatch> {
        let mut conn = self.db.acquire().await?;
        let mut batches = PostingBatchRepository::new(&mut conn);
        batches.get_by_id(batch_id).await?;
        batches.set_status(batch_id, status).await?;
        let batch = batches.get_by_id(batch_id).await?;
        info!(batch_id, ?status, "Posting batch status changed");
        Ok(batch)
    }

    pub async fn get_batch(&self, batch_id: i64) -> EngineResult<PostingBatch> {
        let mut conn = self.db.acquire().await?;
        Ok(PostingBatchRepository::new(&mut conn).get_by_id(batch_id).await?)
    }

    pub async fn get_entry(&self, entry_id: i64) -> EngineResult<JournalEntry> {
        let mut conn = self.db.acquire().await?;
        Ok(JournalRepository::new(&mut conn).get_by_id(entry_id).await?)
    }

    /// Per-account totals over posted lines.
    pub async fn trial_balance(&self) -> EngineResult<Vec<TrialBalanceRow>> {
        let mut conn = self.db.acquire().await?;
        Ok(AccountRepository::new(&mut conn).trial_balance().await?)
    }

    /// Revenue against expenses over posted entries dated in `[from, to]`.
    pub async fn profit_and_loss(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> EngineResult<ProfitAndLoss> {
        if let (Some(from), Some(to)) = (from, to) {
            validate_period(Some(from), Some(to))?;
        }
        let mut conn = self.db.acquire().await?;
        let rows = AccountRepository::new(&mut conn)
            .trial_balance_between(from, to)
            .await?;
        Ok(statements::profit_and_loss(&rows))
    }

    /// Positions as of `as_of` (inclusive), or over every posted entry.
    pub async fn balance_sheet(&self, as_of: Option<NaiveDate>) -> EngineResult<BalanceSheet> {
        let mut conn = self.db.acquire().await?;
        let rows = AccountRepository::new(&mut conn)
            .trial_balance_between(None, as_of)
            .await?;
        let sheet = statements::balance_sheet(&rows);
        if !sheet.is_balanced() {
            warn!(difference = %sheet.difference, "Balance sheet does not balance");
        }
        Ok(sheet)
    }
}

// =============================================================================
// Helpers
// =============================================================================

async fn ensure_unlocked(conn: &mut SqliteConnection, entry: &JournalEntry) -> EngineResult<()> {
    if let Some(batch_id) = entry.posting_batch_id {
        if PostingBatchRepository::new(conn).is_locked(batch_id).await? {
            return Err(EngineError::invalid_state(format!(
                "entry {} belongs to locked batch {}",
                entry.entry_number, batch_id
            )));
        }
    }
    Ok(())
}

async fn apply_lines(conn: &mut SqliteConnection, lines: &[JournalLine], undo: bool) -> EngineResult<()> {
    let mut accounts = AccountRepository::new(conn);
    for line in lines {
        let delta = if undo { -line.balance_delta() } else { line.balance_delta() };
        accounts.apply_delta(line.account_id, delta).await?;
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::DbConfig;
    use crate::services::chart::ChartOfAccounts;
    use crate::services::posting::PostingService;
    use tally_core::journal::{sale_entry, SaleJournal};
    use tally_core::ModuleSettings;

    async fn setup() -> (Database, PostingManager) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        ChartOfAccounts::new(db.clone()).initialize().await.unwrap();
        let manager = PostingManager::new(db.clone(), AuditLogger::new(db.clone()));
        (db, manager)
    }

    async fn record_sale(db: &Database, sale_id: i64, total: i64) -> i64 {
        let mut conn = db.acquire().await.unwrap();
        let plan = sale_entry(&SaleJournal {
            sale_id,
            invoice_number: "INV",
            total: Money::from_minor(total),
            tax: Money::ZERO,
            paid: Money::from_minor(total),
            remaining: Money::ZERO,
            cogs: Money::ZERO,
        });
        PostingService::new(&mut conn)
            .record(&plan, &ModuleSettings::default(), None)
            .await
            .unwrap()
            .record_id
            .unwrap()
    }

    async fn balance_of(db: &Database, code: &str) -> Money {
        let mut conn = db.acquire().await.unwrap();
        AccountRepository::new(&mut conn)
            .find_by_code(code)
            .await
            .unwrap()
            .unwrap()
            .balance
    }

    fn today() -> Option<NaiveDate> {
        Some(Utc::now().date_naive())
    }

    #[tokio::test]
    async fn test_post_period_applies_balances() {
        let (db, manager) = setup().await;
        let e1 = record_sale(&db, 1, 500).await;
        let e2 = record_sale(&db, 2, 300).await;
        assert_eq!(balance_of(&db, "1001").await, Money::ZERO);

        let posted = manager
            .post_period(PeriodType::Day, today(), today(), Some(1), None)
            .await
            .unwrap();
        assert_eq!(posted.entry_ids, vec![e1, e2]);
        assert_eq!(posted.batch.entries_count, 2);
        assert_eq!(posted.batch.total_amount, Money::from_minor(800));
        assert_eq!(balance_of(&db, "1001").await, Money::from_minor(800));
        assert_eq!(balance_of(&db, "4001").await, Money::from_minor(-800));

        let stored = manager.get_batch(posted.batch.id).await.unwrap();
        assert_eq!(stored.status, PostingBatchStatus::Posted);
        assert_eq!(stored.entries_count, 2);

        let err = manager
            .post_period(PeriodType::Day, today(), today(), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_reverse_in_locked_batch_fails() {
        let (db, manager) = setup().await;
        let e1 = record_sale(&db, 1, 500).await;
        record_sale(&db, 2, 300).await;

        let posted = manager
            .post_period(PeriodType::Day, today(), today(), None, None)
            .await
            .unwrap();
        manager.lock_batch(posted.batch.id).await.unwrap();

        let err = manager.reverse_entry(e1, None, None).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));
        assert!(!manager.get_entry(e1).await.unwrap().is_reversed);

        let err = manager.unpost_entry(e1).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));

        manager.unlock_batch(posted.batch.id).await.unwrap();
        let reversal = manager.reverse_entry(e1, None, Some("typo".into())).await.unwrap();
        assert!(reversal.original.is_reversed);
        assert!(reversal.original.is_posted);

        let counter = reversal.reversal.unwrap();
        assert!(counter.is_posted);
        assert_eq!(counter.reversal_of_id, Some(e1));
        assert!(counter.entry_number.starts_with("REV-JE-SALE-1-"));
        assert_eq!(balance_of(&db, "1001").await, Money::from_minor(300));
    }

    #[tokio::test]
    async fn test_unposted_reversal_is_void_in_place() {
        let (db, manager) = setup().await;
        let e1 = record_sale(&db, 1, 500).await;

        let reversal = manager.reverse_entry(e1, None, None).await.unwrap();
        assert!(reversal.reversal.is_none());
        assert!(reversal.original.is_reversed);
        assert_eq!(balance_of(&db, "1001").await, Money::ZERO);

        let err = manager.post_entry(e1, None).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_post_unpost_and_trial_balance() {
        let (db, manager) = setup().await;
        let e1 = record_sale(&db, 1, 700).await;

        manager.post_entry(e1, None).await.unwrap();
        assert!(manager.post_entry(e1, None).await.is_err());

        let check = |rows: Vec<TrialBalanceRow>, cash: i64| {
            let row = rows.iter().find(|r| r.code == "1001").unwrap();
            assert_eq!(row.balance, Money::from_minor(cash));
            assert_eq!(row.debit_total - row.credit_total, row.balance);
        };
        check(manager.trial_balance().await.unwrap(), 700);
        assert_eq!(balance_of(&db, "1001").await, Money::from_minor(700));

        let unposted = manager.unpost_entry(e1).await.unwrap();
        assert!(!unposted.is_posted);
        check(manager.trial_balance().await.unwrap(), 0);
        assert_eq!(balance_of(&db, "1001").await, Money::ZERO);
    }

    #[tokio::test]
    async fn test_statements_follow_posted_entries() {
        let (db, manager) = setup().await;
        let entry = {
            let mut conn = db.acquire().await.unwrap();
            let plan = sale_entry(&SaleJournal {
                sale_id: 1,
                invoice_number: "INV",
                total: Money::from_minor(1_000),
                tax: Money::ZERO,
                paid: Money::from_minor(400),
                remaining: Money::from_minor(600),
                cogs: Money::from_minor(650),
            });
            PostingService::new(&mut conn)
                .record(&plan, &ModuleSettings::default(), None)
                .await
                .unwrap()
                .record_id
                .unwrap()
        };

        // Unposted entries are not on the books yet.
        let pl = manager.profit_and_loss(None, None).await.unwrap();
        assert_eq!(pl.net_income, Money::ZERO);
        assert!(pl.revenue.is_empty());

        manager.post_entry(entry, None).await.unwrap();
        let pl = manager.profit_and_loss(today(), today()).await.unwrap();
        assert_eq!(pl.total_revenue, Money::from_minor(1_000));
        assert_eq!(pl.total_expenses, Money::from_minor(650));
        assert_eq!(pl.net_income, Money::from_minor(350));

        let sheet = manager.balance_sheet(None).await.unwrap();
        assert_eq!(sheet.total_assets, Money::from_minor(350));
        assert_eq!(sheet.current_earnings, Money::from_minor(350));
        assert!(sheet.is_balanced());

        let yesterday = today().and_then(|d| d.pred_opt());
        let earlier = manager.profit_and_loss(None, yesterday).await.unwrap();
        assert_eq!(earlier.net_income, Money::ZERO);
        let before = manager.balance_sheet(yesterday).await.unwrap();
        assert_eq!(before.total_assets, Money::ZERO);

        manager.reverse_entry(entry, None, None).await.unwrap();
        let pl = manager.profit_and_loss(None, None).await.unwrap();
        assert_eq!(pl.net_income, Money::ZERO);
        assert!(manager.balance_sheet(None).await.unwrap().is_balanced());

        let err = manager.profit_and_loss(today(), yesterday).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn test_period_validation() {
        let (_db, manager) = setup().await;
        let err = manager
            .post_period(PeriodType::Month, None, today(), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let err = manager
            .post_period(PeriodType::Month, today(), today(), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));
    }
}
