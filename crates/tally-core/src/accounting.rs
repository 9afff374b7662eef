//! # Accounting Types
//!
//! Chart of accounts, journal entries and posting batches.
//!
//! ## Journal Entry Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   created ──► UNPOSTED ──── post / post period ────► POSTED             │
//! │                  │    ◄──────── unpost ─────────────    │               │
//! │                  │                                      │               │
//! │               reverse                                reverse            │
//! │             (void in place)                  (counter-entry, swapped)   │
//! │                  │                                      │               │
//! │                  ▼                                      ▼               │
//! │             REVERSED flag                  REVERSED flag + REV entry    │
//! │                                                                         │
//! │   Locked posting batch ⇒ no post / unpost / reverse of its entries     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Account balances move only while an entry is posted, so an unposted
//! entry can be voided without touching `Account::balance`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;

// =============================================================================
// Accounts
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Asset,
    Liability,
    Equity,
    Revenue,
    Expense,
}

impl AccountType {
    /// Asset and expense balances grow with debits.
    pub fn is_debit_normal(&self) -> bool {
        matches!(self, AccountType::Asset | AccountType::Expense)
    }
}

/// A ledger account. `balance` is stored as net debit (Σ debit − Σ credit).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Account {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    pub is_system: bool,
    pub is_active: bool,
    pub balance: Money,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Balance in the account's natural sign (credit-normal accounts negated).
    pub fn natural_balance(&self) -> Money {
        if self.account_type.is_debit_normal() {
            self.balance
        } else {
            -self.balance
        }
    }
}

// =============================================================================
// Account Codes
// =============================================================================

/// The eight account roles the posting builders need.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountRole {
    Cash,
    AccountsReceivable,
    Inventory,
    VatInput,
    AccountsPayable,
    VatOutput,
    SalesRevenue,
    CostOfGoodsSold,
}

impl AccountRole {
    pub const ALL: [AccountRole; 8] = [
        AccountRole::Cash,
        AccountRole::AccountsReceivable,
        AccountRole::Inventory,
        AccountRole::VatInput,
        AccountRole::AccountsPayable,
        AccountRole::VatOutput,
        AccountRole::SalesRevenue,
        AccountRole::CostOfGoodsSold,
    ];

    pub fn default_code(&self) -> &'static str {
        match self {
            AccountRole::Cash => "1001",
            AccountRole::AccountsReceivable => "1100",
            AccountRole::Inventory => "1200",
            AccountRole::VatInput => "1300",
            AccountRole::AccountsPayable => "2100",
            AccountRole::VatOutput => "2200",
            AccountRole::SalesRevenue => "4001",
            AccountRole::CostOfGoodsSold => "5001",
        }
    }

    pub fn account_type(&self) -> AccountType {
        match self {
            AccountRole::Cash
            | AccountRole::AccountsReceivable
            | AccountRole::Inventory
            | AccountRole::VatInput => AccountType::Asset,
            AccountRole::AccountsPayable | AccountRole::VatOutput => AccountType::Liability,
            AccountRole::SalesRevenue => AccountType::Revenue,
            AccountRole::CostOfGoodsSold => AccountType::Expense,
        }
    }

    /// Display name used when seeding the chart.
    pub fn display_name(&self) -> &'static str {
        match self {
            AccountRole::Cash => "Cash on Hand",
            AccountRole::AccountsReceivable => "Accounts Receivable",
            AccountRole::Inventory => "Inventory",
            AccountRole::VatInput => "VAT Input",
            AccountRole::AccountsPayable => "Accounts Payable",
            AccountRole::VatOutput => "VAT Output",
            AccountRole::SalesRevenue => "Sales Revenue",
            AccountRole::CostOfGoodsSold => "Cost of Goods Sold",
        }
    }

    /// Settings key that overrides the default code.
    pub fn setting_key(&self) -> &'static str {
        match self {
            AccountRole::Cash => "accounting.cashAccountCode",
            AccountRole::AccountsReceivable => "accounting.arAccountCode",
            AccountRole::Inventory => "accounting.inventoryAccountCode",
            AccountRole::VatInput => "accounting.vatInputAccountCode",
            AccountRole::AccountsPayable => "accounting.apAccountCode",
            AccountRole::VatOutput => "accounting.vatOutputAccountCode",
            AccountRole::SalesRevenue => "accounting.salesRevenueAccountCode",
            AccountRole::CostOfGoodsSold => "accounting.cogsAccountCode",
        }
    }
}

/// Resolved account code per role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountCodes {
    pub cash: String,
    pub accounts_receivable: String,
    pub inventory: String,
    pub vat_input: String,
    pub accounts_payable: String,
    pub vat_output: String,
    pub sales_revenue: String,
    pub cost_of_goods_sold: String,
}

impl AccountCodes {
    pub fn code(&self, role: AccountRole) -> &str {
        match role {
            AccountRole::Cash => &self.cash,
            AccountRole::AccountsReceivable => &self.accounts_receivable,
            AccountRole::Inventory => &self.inventory,
            AccountRole::VatInput => &self.vat_input,
            AccountRole::AccountsPayable => &self.accounts_payable,
            AccountRole::VatOutput => &self.vat_output,
            AccountRole::SalesRevenue => &self.sales_revenue,
            AccountRole::CostOfGoodsSold => &self.cost_of_goods_sold,
        }
    }

    fn code_mut(&mut self, role: AccountRole) -> &mut String {
        match role {
            AccountRole::Cash => &mut self.cash,
            AccountRole::AccountsReceivable => &mut self.accounts_receivable,
            AccountRole::Inventory => &mut self.inventory,
            AccountRole::VatInput => &mut self.vat_input,
            AccountRole::AccountsPayable => &mut self.accounts_payable,
            AccountRole::VatOutput => &mut self.vat_output,
            AccountRole::SalesRevenue => &mut self.sales_revenue,
            AccountRole::CostOfGoodsSold => &mut self.cost_of_goods_sold,
        }
    }

    /// Replaces the code for `role`. Blank values keep the current code.
    pub fn with_code(mut self, role: AccountRole, code: &str) -> Self {
        let code = code.trim();
        if !code.is_empty() {
            *self.code_mut(role) = code.to_string();
        }
        self
    }
}

impl Default for AccountCodes {
    fn default() -> Self {
        AccountCodes {
            cash: AccountRole::Cash.default_code().to_string(),
            accounts_receivable: AccountRole::AccountsReceivable.default_code().to_string(),
            inventory: AccountRole::Inventory.default_code().to_string(),
            vat_input: AccountRole::VatInput.default_code().to_string(),
            accounts_payable: AccountRole::AccountsPayable.default_code().to_string(),
            vat_output: AccountRole::VatOutput.default_code().to_string(),
            sales_revenue: AccountRole::SalesRevenue.default_code().to_string(),
            cost_of_goods_sold: AccountRole::CostOfGoodsSold.default_code().to_string(),
        }
    }
}

// =============================================================================
// Journal Entries
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum JournalSourceType {
    Sale,
    Purchase,
    Payment,
    Adjustment,
    Manual,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct JournalEntry {
    pub id: i64,
    pub entry_number: String,
    pub entry_date: NaiveDate,
    pub description: String,
    pub source_type: Option<JournalSourceType>,
    pub source_id: Option<i64>,
    pub is_posted: bool,
    pub is_reversed: bool,
    pub reversal_of_id: Option<i64>,
    pub posting_batch_id: Option<i64>,
    pub total_amount: Money,
    pub currency: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<i64>,
    #[cfg_attr(feature = "sqlx", sqlx(skip))]
    #[serde(default)]
    pub lines: Vec<JournalLine>,
}

impl JournalEntry {
    pub fn total_debit(&self) -> Money {
        self.lines.iter().map(|l| l.debit).sum()
    }

    pub fn total_credit(&self) -> Money {
        self.lines.iter().map(|l| l.credit).sum()
    }

    /// Postable means at least one line and Σ debit == Σ credit.
    pub fn is_postable(&self) -> bool {
        !self.lines.is_empty() && self.total_debit() == self.total_credit()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct JournalLine {
    pub id: i64,
    pub journal_entry_id: i64,
    pub account_id: i64,
    pub debit: Money,
    pub credit: Money,
    pub description: Option<String>,
}

impl JournalLine {
    /// Effect on the account's stored (net debit) balance.
    pub fn balance_delta(&self) -> Money {
        self.debit - self.credit
    }
}

// =============================================================================
// Posting Batches
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum PeriodType {
    Day,
    Month,
    Year,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum PostingBatchStatus {
    Draft,
    Posted,
    /// Write-protects every entry in the batch.
    Locked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct PostingBatch {
    pub id: i64,
    pub period_type: PeriodType,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub entries_count: i64,
    pub total_amount: Money,
    pub status: PostingBatchStatus,
    pub posted_at: Option<DateTime<Utc>>,
    pub posted_by: Option<i64>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PostingBatch {
    pub fn is_locked(&self) -> bool {
        self.status == PostingBatchStatus::Locked
    }
}

impl TrialBalanceRow {
    /// Net balance in the account's natural sign.
    pub fn natural_balance(&self) -> Money {
        if self.account_type.is_debit_normal() {
            self.balance
        } else {
            -self.balance
        }
    }
}

/// One account's totals over posted entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct TrialBalanceRow {
    pub account_id: i64,
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    pub debit_total: Money,
    pub credit_total: Money,
    pub balance: Money,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_codes() {
        let codes = AccountCodes::default();
        assert_eq!(codes.code(AccountRole::Cash), "1001");
        assert_eq!(codes.code(AccountRole::AccountsPayable), "2100");
        assert_eq!(codes.code(AccountRole::CostOfGoodsSold), "5001");
    }

    #[test]
    fn test_blank_override_keeps_default() {
        let codes = AccountCodes::default()
            .with_code(AccountRole::Cash, "  ")
            .with_code(AccountRole::SalesRevenue, " 4100 ");
        assert_eq!(codes.cash, "1001");
        assert_eq!(codes.sales_revenue, "4100");
    }

    #[test]
    fn test_role_types() {
        assert_eq!(AccountRole::VatOutput.account_type(), AccountType::Liability);
        assert_eq!(AccountRole::CostOfGoodsSold.account_type(), AccountType::Expense);
        assert!(AccountType::Asset.is_debit_normal());
        assert!(!AccountType::Revenue.is_debit_normal());
    }

    #[test]
    fn test_postable_requires_lines_and_balance() {
        let now = Utc::now();
        let mut entry = JournalEntry {
            id: 1,
            entry_number: "JE-SALE-1".to_string(),
            entry_date: now.date_naive(),
            description: "Sale".to_string(),
            source_type: Some(JournalSourceType::Sale),
            source_id: Some(1),
            is_posted: false,
            is_reversed: false,
            reversal_of_id: None,
            posting_batch_id: None,
            total_amount: Money::from_minor(500),
            currency: "IQD".to_string(),
            notes: None,
            created_at: now,
            created_by: None,
            lines: Vec::new(),
        };
        assert!(!entry.is_postable());

        let line = |account_id, debit, credit| JournalLine {
            id: 0,
            journal_entry_id: 1,
            account_id,
            debit: Money::from_minor(debit),
            credit: Money::from_minor(credit),
            description: None,
        };
        entry.lines = vec![line(1, 500, 0), line(2, 0, 400)];
        assert!(!entry.is_postable());

        entry.lines.push(line(3, 0, 100));
        assert!(entry.is_postable());
    }
}
