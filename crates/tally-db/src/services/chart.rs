//! # Chart of Accounts
//!
//! Seeds the eight system accounts the journal builders post to.
//!
//! ```text
//! ┌──────────────────────┬────────┬───────────┐
//! │ Role                 │ Code   │ Type      │
//! ├──────────────────────┼────────┼───────────┤
//! │ Cash                 │ 1001   │ asset     │
//! │ Accounts receivable  │ 1100   │ asset     │
//! │ Inventory            │ 1200   │ asset     │
//! │ VAT input            │ 1300   │ asset     │
//! │ Accounts payable     │ 2100   │ liability │
//! │ VAT output           │ 2200   │ liability │
//! │ Sales revenue        │ 4001   │ revenue   │
//! │ Cost of goods sold   │ 5001   │ expense   │
//! └──────────────────────┴────────┴───────────┘
//! ```
//! Codes are the defaults; `accounting.*AccountCode` settings override them.

use serde::Serialize;
use tracing::info;

use crate::pool::Database;
use crate::repository::{AccountRepository, SettingsRepository};
use crate::services::error::EngineResult;
use tally_core::accounting::AccountRole;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChartReport {
    pub accounting_enabled: bool,
    pub created: Vec<String>,
    pub existing: Vec<String>,
    pub missing: Vec<String>,
}

impl ChartReport {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ChartOfAccounts {
    db: Database,
}

impl ChartOfAccounts {
    pub fn new(db: Database) -> Self {
        ChartOfAccounts { db }
    }

    /// Creates every missing system account. Existing codes are left alone.
    pub async fn initialize(&self) -> EngineResult<ChartReport> {
        let mut tx = self.db.begin().await?;
        let settings = SettingsRepository::new(&mut tx).module_settings().await?;

        let mut report = ChartReport {
            accounting_enabled: settings.accounting_enabled,
            ..ChartReport::default()
        };

        for role in AccountRole::ALL {
            let code = settings.account_codes.code(role);
            let mut accounts = AccountRepository::new(&mut tx);
            if accounts.find_by_code(code).await?.is_some() {
                report.existing.push(code.to_string());
            } else if settings.accounting_enabled {
                accounts
                    .create(code, role.display_name(), role.account_type(), true)
                    .await?;
                report.created.push(code.to_string());
            } else {
                report.missing.push(code.to_string());
            }
        }

        if settings.accounting_enabled {
            SettingsRepository::new(&mut tx).mark_coa_seeded().await?;
        }
        tx.commit().await?;

        info!(
            created = report.created.len(),
            existing = report.existing.len(),
            missing = report.missing.len(),
            "Chart of accounts initialized"
        );
        Ok(report)
    }

    /// Reports which system accounts exist without writing anything.
    pub async fn status(&self) -> EngineResult<ChartReport> {
        let mut conn = self.db.acquire().await?;
        let settings = SettingsRepository::new(&mut conn).module_settings().await?;

        let mut report = ChartReport {
            accounting_enabled: settings.accounting_enabled,
            ..ChartReport::default()
        };

        let mut accounts = AccountRepository::new(&mut conn);
        for role in AccountRole::ALL {
            let code = settings.account_codes.code(role);
            match accounts.find_by_code(code).await? {
                Some(account) if account.is_active => report.existing.push(code.to_string()),
                _ => report.missing.push(code.to_string()),
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::DbConfig;

    #[tokio::test]
    async fn test_initialize_is_repeatable() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let chart = ChartOfAccounts::new(db.clone());

        let before = chart.status().await.unwrap();
        assert_eq!(before.missing.len(), 8);

        let first = chart.initialize().await.unwrap();
        assert_eq!(first.created.len(), 8);
        assert!(first.is_complete());

        let second = chart.initialize().await.unwrap();
        assert!(second.created.is_empty());
        assert_eq!(second.existing.len(), 8);

        assert!(chart.status().await.unwrap().is_complete());
    }

    #[tokio::test]
    async fn test_code_override_and_disabled_accounting() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        {
            let mut conn = db.acquire().await.unwrap();
            let mut settings = SettingsRepository::new(&mut conn);
            settings.set("accounting.cashAccountCode", "1010").await.unwrap();
            settings.set("accounting.enabled", "false").await.unwrap();
        }

        let chart = ChartOfAccounts::new(db.clone());
        let report = chart.initialize().await.unwrap();
        assert!(report.created.is_empty());
        assert!(report.missing.contains(&"1010".to_string()));

        {
            let mut conn = db.acquire().await.unwrap();
            SettingsRepository::new(&mut conn)
                .set("accounting.enabled", "true")
                .await
                .unwrap();
        }
        let report = chart.initialize().await.unwrap();
        assert!(report.created.contains(&"1010".to_string()));
        assert!(!report.created.contains(&"1001".to_string()));
    }
}
