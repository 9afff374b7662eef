//! # Journal Builders
//!
//! Turns a business event into a planned double-entry journal.
//!
//! ## Line Shapes
//! ```text
//! ┌──────────────────┬──────────────────────────────┬──────────────────────────────┐
//! │ Event            │ Debit                        │ Credit                       │
//! ├──────────────────┼──────────────────────────────┼──────────────────────────────┤
//! │ Sale             │ Cash (paid)                  │ Revenue (total − tax)        │
//! │                  │ AR (remaining)               │ VAT output (tax)             │
//! │                  │ COGS (cost)                  │ Inventory (cost)             │
//! │ Purchase         │ Inventory (total − tax)      │ Cash (paid)                  │
//! │                  │ VAT input (tax)              │ AP (remaining)               │
//! │ Sale payment     │ Cash                         │ AR                           │
//! │ Purchase payment │ AP                           │ Cash                         │
//! │ Stock loss       │ COGS                         │ Inventory                    │
//! │ Stock gain       │ Inventory                    │ Revenue                      │
//! └──────────────────┴──────────────────────────────┴──────────────────────────────┘
//! ```
//!
//! Lines are planned against [`AccountRole`]s. The posting service resolves
//! roles to account ids and skips the entry (without failing the business
//! event) when an account is missing or the plan does not balance.

use serde::{Deserialize, Serialize};

use crate::accounting::{AccountRole, JournalLine, JournalSourceType};
use crate::money::Money;
use crate::types::SkipReason;

// =============================================================================
// Plan Types
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedLine {
    pub role: AccountRole,
    pub debit: Money,
    pub credit: Money,
    pub description: String,
}

impl PlannedLine {
    pub fn debit(role: AccountRole, amount: Money, description: &str) -> Self {
        PlannedLine {
            role,
            debit: amount,
            credit: Money::ZERO,
            description: description.to_string(),
        }
    }

    pub fn credit(role: AccountRole, amount: Money, description: &str) -> Self {
        PlannedLine {
            role,
            debit: Money::ZERO,
            credit: amount,
            description: description.to_string(),
        }
    }
}

/// A journal entry that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalPlan {
    pub entry_number: String,
    pub description: String,
    pub source_type: JournalSourceType,
    pub source_id: Option<i64>,
    pub total_amount: Money,
    pub lines: Vec<PlannedLine>,
}

impl JournalPlan {
    pub fn total_debit(&self) -> Money {
        self.lines.iter().map(|l| l.debit).sum()
    }

    pub fn total_credit(&self) -> Money {
        self.lines.iter().map(|l| l.credit).sum()
    }

    /// Zero-amount lines are never planned, so a zero-value event plans none.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Roles the chart must contain, in first-use order.
    pub fn required_roles(&self) -> Vec<AccountRole> {
        let mut roles = Vec::new();
        for line in &self.lines {
            if !roles.contains(&line.role) {
                roles.push(line.role);
            }
        }
        roles
    }

    /// Σ debit must equal Σ credit.
    pub fn check_balance(&self) -> Result<(), SkipReason> {
        check_balance(self.total_debit(), self.total_credit())
    }
}

pub fn check_balance(debit: Money, credit: Money) -> Result<(), SkipReason> {
    if debit == credit {
        Ok(())
    } else {
        Err(SkipReason::UnbalancedJournal { debit, credit })
    }
}

// =============================================================================
// Event Inputs
// =============================================================================

#[derive(Debug, Clone)]
pub struct SaleJournal<'a> {
    pub sale_id: i64,
    pub invoice_number: &'a str,
    pub total: Money,
    pub tax: Money,
    pub paid: Money,
    pub remaining: Money,
    pub cogs: Money,
}

#[derive(Debug, Clone)]
pub struct PurchaseJournal<'a> {
    pub purchase_id: i64,
    pub invoice_number: &'a str,
    pub total: Money,
    pub tax: Money,
    pub paid: Money,
    pub remaining: Money,
}

/// Which balance a standalone payment settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentPosting {
    /// Payment against a sale (`JE-PAY`).
    Sale,
    /// Payment against a purchase (`JE-PPAY`).
    Purchase,
    /// Customer paying down their balance (`JE-CPAY`).
    Customer,
    /// Paying a supplier's balance (`JE-SPAY`).
    Supplier,
}

impl PaymentPosting {
    fn prefix(&self) -> &'static str {
        match self {
            PaymentPosting::Sale => "JE-PAY",
            PaymentPosting::Purchase => "JE-PPAY",
            PaymentPosting::Customer => "JE-CPAY",
            PaymentPosting::Supplier => "JE-SPAY",
        }
    }

    fn is_receipt(&self) -> bool {
        matches!(self, PaymentPosting::Sale | PaymentPosting::Customer)
    }
}

// =============================================================================
// Builders
// =============================================================================

/// Plans the entry for a committed sale.
///
/// The revenue line is always present, so revenue is always a required
/// account. Every other line appears only when its amount is positive.
///
/// ## Example
/// ```rust
/// use tally_core::journal::{sale_entry, SaleJournal};
/// use tally_core::Money;
///
/// let plan = sale_entry(&SaleJournal {
///     sale_id: 7,
///     invoice_number: "INV-1",
///     total: Money::from_minor(1000),
///     tax: Money::ZERO,
///     paid: Money::from_minor(1000),
///     remaining: Money::ZERO,
///     cogs: Money::ZERO,
/// });
///
/// assert_eq!(plan.entry_number, "JE-SALE-7");
/// assert_eq!(plan.lines.len(), 2);
/// assert!(plan.check_balance().is_ok());
/// ```
pub fn sale_entry(sale: &SaleJournal<'_>) -> JournalPlan {
    let mut lines = Vec::new();

    let revenue = sale.total - sale.tax.clamp_non_negative();
    if revenue.is_positive() {
        lines.push(PlannedLine::credit(AccountRole::SalesRevenue, revenue, "Sales revenue"));
    }
    if sale.tax.is_positive() {
        lines.push(PlannedLine::credit(AccountRole::VatOutput, sale.tax, "VAT output"));
    }
    if sale.paid.is_positive() {
        lines.push(PlannedLine::debit(AccountRole::Cash, sale.paid, "Cash received"));
    }
    if sale.remaining.is_positive() {
        lines.push(PlannedLine::debit(
            AccountRole::AccountsReceivable,
            sale.remaining,
            "Customer receivable",
        ));
    }
    if sale.cogs.is_positive() {
        lines.push(PlannedLine::debit(
            AccountRole::CostOfGoodsSold,
            sale.cogs,
            "Cost of goods sold",
        ));
        lines.push(PlannedLine::credit(AccountRole::Inventory, sale.cogs, "Inventory relieved"));
    }

    JournalPlan {
        entry_number: format!("JE-SALE-{}", sale.sale_id),
        description: format!("Sale #{}", sale.invoice_number),
        source_type: JournalSourceType::Sale,
        source_id: Some(sale.sale_id),
        total_amount: sale.total,
        lines,
    }
}

/// Plans the entry for a received purchase.
pub fn purchase_entry(purchase: &PurchaseJournal<'_>) -> JournalPlan {
    let mut lines = Vec::new();

    let received = purchase.total - purchase.tax.clamp_non_negative();
    if received.is_positive() {
        lines.push(PlannedLine::debit(AccountRole::Inventory, received, "Inventory received"));
    }
    if purchase.tax.is_positive() {
        lines.push(PlannedLine::debit(AccountRole::VatInput, purchase.tax, "VAT input"));
    }
    if purchase.paid.is_positive() {
        lines.push(PlannedLine::credit(AccountRole::Cash, purchase.paid, "Cash paid"));
    }
    if purchase.remaining.is_positive() {
        lines.push(PlannedLine::credit(
            AccountRole::AccountsPayable,
            purchase.remaining,
            "Supplier payable",
        ));
    }

    JournalPlan {
        entry_number: format!("JE-PUR-{}", purchase.purchase_id),
        description: format!("Purchase #{}", purchase.invoice_number),
        source_type: JournalSourceType::Purchase,
        source_id: Some(purchase.purchase_id),
        total_amount: purchase.total,
        lines,
    }
}

/// Plans the entry for a payment row.
///
/// Receipts debit cash and credit AR; disbursements debit AP and credit cash.
pub fn payment_entry(kind: PaymentPosting, payment_id: i64, amount: Money) -> JournalPlan {
    let lines = if kind.is_receipt() {
        vec![
            PlannedLine::debit(AccountRole::Cash, amount, "Cash received"),
            PlannedLine::credit(AccountRole::AccountsReceivable, amount, "Receivable settled"),
        ]
    } else {
        vec![
            PlannedLine::debit(AccountRole::AccountsPayable, amount, "Payable settled"),
            PlannedLine::credit(AccountRole::Cash, amount, "Cash paid"),
        ]
    };

    JournalPlan {
        entry_number: format!("{}-{}", kind.prefix(), payment_id),
        description: format!("Payment #{}", payment_id),
        source_type: JournalSourceType::Payment,
        source_id: Some(payment_id),
        total_amount: amount,
        lines,
    }
}

/// Plans the entry for a stock adjustment movement.
///
/// `value` is the absolute cost of the adjusted quantity; `increase`
/// selects the gain shape.
pub fn adjustment_entry(movement_id: i64, value: Money, increase: bool) -> JournalPlan {
    let lines = if increase {
        vec![
            PlannedLine::debit(AccountRole::Inventory, value, "Stock gain"),
            PlannedLine::credit(AccountRole::SalesRevenue, value, "Stock gain"),
        ]
    } else {
        vec![
            PlannedLine::debit(AccountRole::CostOfGoodsSold, value, "Stock loss"),
            PlannedLine::credit(AccountRole::Inventory, value, "Stock loss"),
        ]
    };

    JournalPlan {
        entry_number: format!("JE-ADJ-{}", movement_id),
        description: format!("Stock adjustment #{}", movement_id),
        source_type: JournalSourceType::Adjustment,
        source_id: Some(movement_id),
        total_amount: value,
        lines,
    }
}

// =============================================================================
// Reversal
// =============================================================================

/// Counter-lines for a posted entry: same accounts, sides swapped.
pub fn reversed_lines(lines: &[JournalLine]) -> Vec<JournalLine> {
    lines
        .iter()
        .map(|line| JournalLine {
            id: 0,
            journal_entry_id: 0,
            account_id: line.account_id,
            debit: line.credit,
            credit: line.debit,
            description: line.description.clone(),
        })
        .collect()
}

pub fn reversal_entry_number(original: &str, unix_ms: i64) -> String {
    format!("REV-{}-{}", original, unix_ms)
}

// =============================================================================
// Unit Tests
// =============================================================================
