//! # Financial Statements
//!
//! Profit & loss and balance sheet, folded from trial balance rows.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  trial balance (posted lines only)                                      │
//! │       │                                                                 │
//! │       ├── revenue, expense ──► ProfitAndLoss                            │
//! │       │                          net_income = revenue − expenses        │
//! │       │                                                                 │
//! │       └── every type ────────► BalanceSheet                             │
//! │                                  equity += current earnings             │
//! │                                  difference = A − L − E  (0 when sound) │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Amounts are in each account's natural sign, so a healthy revenue or
//! liability line reads positive.

use serde::{Deserialize, Serialize};

use crate::accounting::{AccountType, TrialBalanceRow};
use crate::money::Money;

/// One account's contribution to a statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementLine {
    pub account_id: i64,
    pub code: String,
    pub name: String,
    pub amount: Money,
}

impl StatementLine {
    fn from_row(row: &TrialBalanceRow) -> Self {
        StatementLine {
            account_id: row.account_id,
            code: row.code.clone(),
            name: row.name.clone(),
            amount: row.natural_balance(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfitAndLoss {
    pub revenue: Vec<StatementLine>,
    pub expenses: Vec<StatementLine>,
    pub total_revenue: Money,
    pub total_expenses: Money,
    pub net_income: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceSheet {
    pub assets: Vec<StatementLine>,
    pub liabilities: Vec<StatementLine>,
    pub equity: Vec<StatementLine>,
    pub total_assets: Money,
    pub total_liabilities: Money,
    /// Σ equity accounts, before current earnings.
    pub equity_accounts: Money,
    /// Revenue − expenses not yet closed into equity.
    pub current_earnings: Money,
    pub total_equity: Money,
    /// `total_assets − total_liabilities − total_equity`.
    pub difference: Money,
}

impl BalanceSheet {
    pub fn is_balanced(&self) -> bool {
        self.difference.is_zero()
    }
}

/// Accounts with no posted activity are left out.
fn lines_of(rows: &[TrialBalanceRow], account_type: AccountType) -> Vec<StatementLine> {
    rows.iter()
        .filter(|r| r.account_type == account_type)
        .filter(|r| !(r.debit_total.is_zero() && r.credit_total.is_zero()))
        .map(StatementLine::from_row)
        .collect()
}

fn total(lines: &[StatementLine]) -> Money {
    lines.iter().map(|l| l.amount).sum()
}

/// Revenue and expense accounts over the rows' period.
///
/// ## Example
/// ```rust
/// use tally_core::accounting::{AccountType, TrialBalanceRow};
/// use tally_core::statements::profit_and_loss;
/// use tally_core::Money;
///
/// let row = |id, code: &str, account_type, debit, credit| TrialBalanceRow {
///     account_id: id,
///     code: code.to_string(),
///     name: code.to_string(),
///     account_type,
///     debit_total: Money::from_minor(debit),
///     credit_total: Money::from_minor(credit),
///     balance: Money::from_minor(debit - credit),
/// };
/// let rows = vec![
///     row(1, "4001", AccountType::Revenue, 0, 1_000),
///     row(2, "5001", AccountType::Expense, 600, 0),
/// ];
///
/// let pl = profit_and_loss(&rows);
/// assert_eq!(pl.net_income.minor(), 400);
/// ```
pub fn profit_and_loss(rows: &[TrialBalanceRow]) -> ProfitAndLoss {
    let revenue = lines_of(rows, AccountType::Revenue);
    let expenses = lines_of(rows, AccountType::Expense);
    let total_revenue = total(&revenue);
    let total_expenses = total(&expenses);

    ProfitAndLoss {
        revenue,
        expenses,
        total_revenue,
        total_expenses,
        net_income: total_revenue - total_expenses,
    }
}

pub fn balance_sheet(rows: &[TrialBalanceRow]) -> BalanceSheet {
    let assets = lines_of(rows, AccountType::Asset);
    let liabilities = lines_of(rows, AccountType::Liability);
    let equity = lines_of(rows, AccountType::Equity);

    let total_assets = total(&assets);
    let total_liabilities = total(&liabilities);
    let equity_accounts = total(&equity);
    let current_earnings = profit_and_loss(rows).net_income;
    let total_equity = equity_accounts + current_earnings;

    BalanceSheet {
        assets,
        liabilities,
        equity,
        total_assets,
        total_liabilities,
        equity_accounts,
        current_earnings,
        total_equity,
        difference: total_assets - total_liabilities - total_equity,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: i64, account_type: AccountType, debit: i64, credit: i64) -> TrialBalanceRow {
        TrialBalanceRow {
            account_id: id,
            code: format!("{}", 1000 + id),
            name: format!("Account {}", id),
            account_type,
            debit_total: Money::from_minor(debit),
            credit_total: Money::from_minor(credit),
            balance: Money::from_minor(debit - credit),
        }
    }

    /// Cash sale of 1000 with 600 cost, a 300 credit purchase and 200 of
    /// owner capital.
    fn books() -> Vec<TrialBalanceRow> {
        vec![
            row(1, AccountType::Asset, 1_200, 0),
            row(2, AccountType::Asset, 300, 600),
            row(3, AccountType::Liability, 0, 300),
            row(4, AccountType::Equity, 0, 200),
            row(5, AccountType::Revenue, 0, 1_000),
            row(6, AccountType::Expense, 600, 0),
            row(7, AccountType::Expense, 0, 0),
        ]
    }

    #[test]
    fn test_profit_and_loss_uses_natural_signs() {
        let pl = profit_and_loss(&books());

        assert_eq!(pl.revenue.len(), 1);
        assert_eq!(pl.revenue[0].amount, Money::from_minor(1_000));
        // Accounts without activity are omitted.
        assert_eq!(pl.expenses.len(), 1);
        assert_eq!(pl.total_expenses, Money::from_minor(600));
        assert_eq!(pl.net_income, Money::from_minor(400));
    }

    #[test]
    fn test_balance_sheet_folds_in_current_earnings() {
        let sheet = balance_sheet(&books());

        assert_eq!(sheet.total_assets, Money::from_minor(900));
        assert_eq!(sheet.total_liabilities, Money::from_minor(300));
        assert_eq!(sheet.equity_accounts, Money::from_minor(200));
        assert_eq!(sheet.current_earnings, Money::from_minor(400));
        assert_eq!(sheet.total_equity, Money::from_minor(600));
        assert!(sheet.is_balanced());
    }

    #[test]
    fn test_one_sided_books_show_difference() {
        let rows = vec![row(1, AccountType::Asset, 500, 0)];
        let sheet = balance_sheet(&rows);
        assert_eq!(sheet.difference, Money::from_minor(500));
        assert!(!sheet.is_balanced());

        let empty = profit_and_loss(&[]);
        assert_eq!(empty.net_income, Money::ZERO);
        assert!(empty.revenue.is_empty());
    }
}
