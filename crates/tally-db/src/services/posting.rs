//! # Double-Entry Posting Service
//!
//! Turns a [`JournalPlan`] into a persisted, unposted journal entry, or
//! explains why it did not.
//!
//! ## Soft-Fail Ladder
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  record(plan)                                                           │
//! │     │                                                                   │
//! │     ├── accounting disabled?     ──► skipped: accounting-disabled       │
//! │     ├── no non-zero lines?       ──► skipped: empty-journal             │
//! │     ├── Σ debit ≠ Σ credit?      ──► skipped: unbalanced-journal:D!=C   │
//! │     ├── any role's code missing? ──► skipped: missing-chart-accounts    │
//! │     │                                 + missing_account_codes           │
//! │     ▼                                                                   │
//! │  INSERT journal_entries (is_posted = 0) + journal_lines                 │
//! │     └── created(entry_id)                                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//! None of the skips is an error: the sale or purchase that asked for the
//! entry still commits. Account balances are untouched until the entry is
//! posted.

use chrono::Utc;
use sqlx::SqliteConnection;
use tracing::{debug, warn};

use crate::repository::journal::{NewJournalEntry, NewJournalLine};
use crate::repository::{AccountRepository, JournalRepository};
use crate::services::error::{EngineError, EngineResult};
use tally_core::journal::JournalPlan;
use tally_core::{ModuleSettings, SkipReason, StepOutcome};

pub struct PostingService<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> PostingService<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        PostingService { conn }
    }

    /// Persists `plan` as an unposted entry when the books allow it.
    pub async fn record(
        &mut self,
        plan: &JournalPlan,
        settings: &ModuleSettings,
        created_by: Option<i64>,
    ) -> EngineResult<StepOutcome> {
        if !settings.accounting_enabled {
            debug!(entry_number = %plan.entry_number, "Accounting disabled, journal skipped");
            return Ok(StepOutcome::skipped(SkipReason::AccountingDisabled));
        }

        if plan.is_empty() {
            debug!(entry_number = %plan.entry_number, "Nothing to book, journal skipped");
            return Ok(StepOutcome::skipped(SkipReason::EmptyJournal));
        }

        if let Err(reason) = plan.check_balance() {
            warn!(
                entry_number = %plan.entry_number,
                debit = %plan.total_debit(),
                credit = %plan.total_credit(),
                reason = %reason,
                "Journal entry skipped"
            );
            return Ok(StepOutcome::skipped(reason));
        }

        let codes: Vec<&str> = plan
            .required_roles()
            .into_iter()
            .map(|role| settings.account_codes.code(role))
            .collect();

        let resolved = AccountRepository::new(&mut *self.conn)
            .active_ids_by_code(&codes)
            .await?;

        let missing: Vec<String> = codes
            .iter()
            .filter(|code| !resolved.contains_key(**code))
            .map(|code| code.to_string())
            .collect();

        if !missing.is_empty() {
            warn!(
                entry_number = %plan.entry_number,
                missing = ?missing,
                reason = %SkipReason::MissingChartAccounts,
                "Journal entry skipped"
            );
            return Ok(StepOutcome::missing_accounts(missing));
        }

        let mut lines = Vec::with_capacity(plan.lines.len());
        for line in &plan.lines {
            let code = settings.account_codes.code(line.role);
            let account_id = resolved
                .get(code)
                .copied()
                .ok_or_else(|| EngineError::not_found("Account", code))?;
            lines.push(NewJournalLine {
                account_id,
                debit: line.debit,
                credit: line.credit,
                description: Some(line.description.clone()),
            });
        }

        let entry = NewJournalEntry {
            entry_number: plan.entry_number.clone(),
            entry_date: Utc::now().date_naive(),
            description: plan.description.clone(),
            source_type: Some(plan.source_type),
            source_id: plan.source_id,
            is_posted: false,
            reversal_of_id: None,
            posting_batch_id: None,
            total_amount: plan.total_amount,
            currency: settings.base_currency.clone(),
            notes: None,
            created_by,
        };

        let created = JournalRepository::new(&mut *self.conn)
            .insert(&entry, &lines)
            .await?;

        debug!(
            entry_id = created.id,
            entry_number = %created.entry_number,
            total = %created.total_amount,
            "Journal entry recorded"
        );

        Ok(StepOutcome::created(created.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use tally_core::accounting::AccountType;
    use tally_core::journal::{sale_entry, SaleJournal};
    use tally_core::Money;

    fn cash_sale(total: i64, paid: i64) -> JournalPlan {
        sale_entry(&SaleJournal {
            sale_id: 1,
            invoice_number: "INV-1",
            total: Money::from_minor(total),
            tax: Money::ZERO,
            paid: Money::from_minor(paid),
            remaining: Money::from_minor((total - paid).max(0)),
            cogs: Money::ZERO,
        })
    }

    async fn seed(conn: &mut SqliteConnection, codes: &[(&str, AccountType)]) {
        let mut accounts = AccountRepository::new(conn);
        for (code, kind) in codes {
            accounts.create(code, code, *kind, true).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_balanced_sale_creates_unposted_entry() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.acquire().await.unwrap();
        seed(&mut conn, &[("1001", AccountType::Asset), ("4001", AccountType::Revenue)]).await;

        let outcome = PostingService::new(&mut conn)
            .record(&cash_sale(1_000, 1_000), &ModuleSettings::default(), None)
            .await
            .unwrap();
        assert!(outcome.created);

        let entry = JournalRepository::new(&mut conn)
            .get_by_id(outcome.record_id.unwrap())
            .await
            .unwrap();
        assert!(!entry.is_posted);
        assert_eq!(entry.lines.len(), 2);
        assert_eq!(entry.total_debit(), Money::from_minor(1_000));
        assert_eq!(entry.total_credit(), Money::from_minor(1_000));

        let cash = AccountRepository::new(&mut conn).find_by_code("1001").await.unwrap().unwrap();
        assert_eq!(cash.balance, Money::ZERO);
    }

    #[tokio::test]
    async fn test_missing_revenue_account_soft_fails() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.acquire().await.unwrap();
        seed(&mut conn, &[("1001", AccountType::Asset)]).await;

        let outcome = PostingService::new(&mut conn)
            .record(&cash_sale(1_000, 1_000), &ModuleSettings::default(), None)
            .await
            .unwrap();

        assert!(!outcome.created);
        assert_eq!(outcome.reason, Some(SkipReason::MissingChartAccounts));
        assert_eq!(outcome.missing_account_codes, vec!["4001".to_string()]);
    }

    #[tokio::test]
    async fn test_overpaid_sale_is_unbalanced() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.acquire().await.unwrap();

        let outcome = PostingService::new(&mut conn)
            .record(&cash_sale(1_000, 1_200), &ModuleSettings::default(), None)
            .await
            .unwrap();

        assert!(!outcome.created);
        assert_eq!(outcome.reason.unwrap().to_string(), "unbalanced-journal:1200!=1000");
    }

    #[tokio::test]
    async fn test_accounting_disabled() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.acquire().await.unwrap();

        let settings = ModuleSettings {
            accounting_enabled: false,
            ..ModuleSettings::default()
        };
        let outcome = PostingService::new(&mut conn)
            .record(&cash_sale(1_000, 1_000), &settings, None)
            .await
            .unwrap();
        assert_eq!(outcome.reason, Some(SkipReason::AccountingDisabled));
    }
}
