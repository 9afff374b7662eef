//! # Domain Types
//!
//! Inventory, document and party types shared by every layer.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │  ProductBatch   │   │InventoryMovement│       │
//! │  │  stock (cache)  │◄──│  on_hand        │──►│  append-only    │       │
//! │  │  cost_price     │   │  expiry, cost   │   │  in/out/adjust  │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │   Sale          │   │   Purchase      │   │   Payment       │       │
//! │  │  items          │   │  items          │   │  idempotency    │       │
//! │  │  paid/remaining │   │  paid/remaining │   │  key (unique)   │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────────────────────────┐         │
//! │  │Customer/Supplier│◄──│  PartyLedgerEntry (balance_after)   │         │
//! │  │  cached balance │   │  append-only chain per party        │         │
//! │  └─────────────────┘   └─────────────────────────────────────┘         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Cache vs. Truth
//! `Product::stock`, `Customer::total_debt` and `Supplier::current_balance`
//! are projections. The movement table and the party ledgers are the
//! truth they are reconciled against.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::money::Money;

// =============================================================================
// Enumerations
// =============================================================================

/// How a payment was tendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    Cash,
    /// Requires a reference number.
    Card,
    BankTransfer,
    /// Requires a customer (or supplier) to carry the balance.
    Credit,
}

/// Settlement shape of a sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum PaymentType {
    #[default]
    Cash,
    Credit,
    Mixed,
}

impl PaymentType {
    /// Interest only applies to sales that leave a balance on account.
    pub fn carries_interest(&self) -> bool {
        matches!(self, PaymentType::Credit | PaymentType::Mixed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Completed,
    Voided,
    Refunded,
}

/// Status shared by sales and purchases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    /// Something is still owed.
    #[default]
    Pending,
    /// Fully settled.
    Completed,
    Cancelled,
}

impl DocumentStatus {
    /// Status implied by the outstanding amount.
    pub fn for_remaining(remaining: Money) -> Self {
        if remaining.is_positive() {
            DocumentStatus::Pending
        } else {
            DocumentStatus::Completed
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    #[default]
    Active,
    Expired,
    Depleted,
    Recalled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum MovementType {
    In,
    Out,
    /// Signed quantity.
    Adjust,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum MovementReason {
    Sale,
    Purchase,
    Return,
    Damage,
    Manual,
    Opening,
}

/// Document that caused a movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum MovementSource {
    Sale,
    Purchase,
    Adjustment,
    Return,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum LedgerTransactionType {
    Invoice,
    Payment,
    Return,
    Adjustment,
    Opening,
}

/// Which side of the business a party ledger belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartyKind {
    Customer,
    Supplier,
}

impl fmt::Display for PartyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartyKind::Customer => write!(f, "Customer"),
            PartyKind::Supplier => write!(f, "Supplier"),
        }
    }
}

// =============================================================================
// Catalog & Inventory
// =============================================================================

/// A sellable product.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub sku: Option<String>,
    /// Fallback unit cost for the non-FIFO path and adjustments.
    pub cost_price: Money,
    pub selling_price: Money,
    /// Cached projection of Σ active batch on-hand.
    pub stock: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A packaging unit with a conversion factor to the base unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ProductUnit {
    pub id: i64,
    pub product_id: i64,
    pub unit_name: String,
    pub factor_to_base: i64,
    /// Server-authoritative price for this unit.
    pub selling_price: Option<Money>,
    pub is_default: bool,
    pub is_active: bool,
}

/// A received lot of a product with its own cost and expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ProductBatch {
    pub id: i64,
    pub product_id: i64,
    pub batch_number: String,
    pub expiry_date: Option<NaiveDate>,
    pub quantity_received: i64,
    pub quantity_on_hand: i64,
    pub cost_per_unit: Money,
    pub purchase_id: Option<i64>,
    pub status: BatchStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Look-ahead window for expiry alerts when the caller gives none.
pub const DEFAULT_EXPIRY_ALERT_DAYS: u32 = 30;

/// A batch with stock on hand that expires inside the alert window, or
/// already has.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct ExpiryAlert {
    pub batch_id: i64,
    pub product_id: i64,
    pub product_name: String,
    pub batch_number: String,
    pub expiry_date: NaiveDate,
    pub quantity_on_hand: i64,
    /// Whole days from the as-of date to expiry. Zero on the expiry day,
    /// negative once expired.
    pub days_remaining: i64,
}

impl ExpiryAlert {
    pub fn is_expired(&self) -> bool {
        self.days_remaining < 0
    }
}

/// Immutable record of one stock change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct InventoryMovement {
    pub id: i64,
    pub product_id: i64,
    pub batch_id: Option<i64>,
    pub movement_type: MovementType,
    pub reason: MovementReason,
    /// Always positive for `in`/`out`; signed for `adjust`.
    pub quantity_base: i64,
    pub unit_name: String,
    pub unit_factor: i64,
    pub stock_before: i64,
    pub stock_after: i64,
    pub cost_per_unit: Money,
    pub total_cost: Money,
    pub source_type: Option<MovementSource>,
    pub source_id: Option<i64>,
    pub idempotency_key: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<i64>,
}

/// Insert payload for an inventory movement.
#[derive(Debug, Clone)]
pub struct NewMovement {
    pub product_id: i64,
    pub batch_id: Option<i64>,
    pub movement_type: MovementType,
    pub reason: MovementReason,
    pub quantity_base: i64,
    pub unit_name: String,
    pub unit_factor: i64,
    pub stock_before: i64,
    pub stock_after: i64,
    pub cost_per_unit: Money,
    pub total_cost: Money,
    pub source_type: Option<MovementSource>,
    pub source_id: Option<i64>,
    pub idempotency_key: Option<String>,
    pub notes: Option<String>,
    pub created_by: Option<i64>,
}

// =============================================================================
// Parties
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Customer {
    pub id: i64,
    pub name: String,
    pub phone: Option<String>,
    /// Cached projection of the last customer-ledger `balance_after`.
    pub total_debt: Money,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Supplier {
    pub id: i64,
    pub name: String,
    pub phone: Option<String>,
    /// Cached projection of the last supplier-ledger `balance_after`.
    pub current_balance: Money,
    pub created_at: DateTime<Utc>,
}

/// One row of a customer or supplier ledger.
///
/// `document_id` is the sale id for customers and the purchase id for
/// suppliers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct PartyLedgerEntry {
    pub id: i64,
    pub party_id: i64,
    pub transaction_type: LedgerTransactionType,
    /// Signed: invoices increase the balance, payments decrease it.
    pub amount: Money,
    pub balance_after: Money,
    pub document_id: Option<i64>,
    pub payment_id: Option<i64>,
    pub journal_entry_id: Option<i64>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<i64>,
}

// =============================================================================
// Payments
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Payment {
    pub id: i64,
    pub sale_id: Option<i64>,
    pub purchase_id: Option<i64>,
    pub customer_id: Option<i64>,
    pub supplier_id: Option<i64>,
    pub amount: Money,
    pub currency: String,
    pub payment_method: PaymentMethod,
    pub reference_number: Option<String>,
    pub idempotency_key: Option<String>,
    pub status: PaymentStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<i64>,
}

/// Insert payload for a payment.
#[derive(Debug, Clone, Default)]
pub struct NewPayment {
    pub sale_id: Option<i64>,
    pub purchase_id: Option<i64>,
    pub customer_id: Option<i64>,
    pub supplier_id: Option<i64>,
    pub amount: Money,
    pub currency: String,
    pub payment_method: PaymentMethod,
    pub reference_number: Option<String>,
    pub idempotency_key: Option<String>,
    pub notes: Option<String>,
    pub created_by: Option<i64>,
}

// =============================================================================
// Sales
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Sale {
    pub id: i64,
    pub invoice_number: String,
    pub customer_id: Option<i64>,
    /// Σ line subtotals (after per-item discounts).
    pub subtotal: Money,
    pub discount: Money,
    pub tax: Money,
    /// Includes interest.
    pub total: Money,
    pub currency: String,
    pub payment_type: PaymentType,
    pub paid_amount: Money,
    pub remaining_amount: Money,
    pub status: DocumentStatus,
    pub interest_rate_bps: i64,
    pub interest_amount: Money,
    pub idempotency_key: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<i64>,
    #[cfg_attr(feature = "sqlx", sqlx(skip))]
    #[serde(default)]
    pub items: Vec<SaleItem>,
}

/// A sold line, frozen at sale time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SaleItem {
    pub id: i64,
    pub sale_id: i64,
    pub product_id: i64,
    pub product_name: String,
    pub quantity: i64,
    pub unit_name: String,
    pub unit_factor: i64,
    pub quantity_base: i64,
    pub batch_id: Option<i64>,
    pub unit_price: Money,
    /// Per-unit discount.
    pub discount: Money,
    pub subtotal: Money,
}

/// Which batch a sold line was costed from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SaleItemDepletion {
    pub id: i64,
    pub sale_id: i64,
    pub sale_item_id: i64,
    pub product_id: i64,
    pub batch_id: i64,
    pub quantity_base: i64,
    pub cost_per_unit: Money,
    pub total_cost: Money,
}

// =============================================================================
// Purchases
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Purchase {
    pub id: i64,
    pub invoice_number: String,
    pub supplier_id: Option<i64>,
    pub subtotal: Money,
    pub discount: Money,
    pub tax: Money,
    pub total: Money,
    pub currency: String,
    pub paid_amount: Money,
    pub remaining_amount: Money,
    pub status: DocumentStatus,
    pub idempotency_key: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<i64>,
    #[cfg_attr(feature = "sqlx", sqlx(skip))]
    #[serde(default)]
    pub items: Vec<PurchaseItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct PurchaseItem {
    pub id: i64,
    pub purchase_id: i64,
    pub product_id: i64,
    pub product_name: String,
    pub quantity: i64,
    pub unit_cost: Money,
    /// Line-level discount.
    pub discount: Money,
    pub subtotal: Money,
    pub batch_id: Option<i64>,
    pub expiry_date: Option<NaiveDate>,
}

// =============================================================================
// Audit
// =============================================================================

/// A post-commit audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct AuditEvent {
    pub id: i64,
    pub event_id: String,
    pub user_id: i64,
    /// e.g. `sale:create`, `journal:reverse`
    pub action: String,
    pub entity_type: String,
    pub entity_id: i64,
    pub description: Option<String>,
    /// JSON object.
    pub metadata: Option<String>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Step Outcomes
// =============================================================================

/// Why an optional step did not write anything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SkipReason {
    AccountingDisabled,
    LedgersDisabled,
    MissingChartAccounts,
    UnbalancedJournal { debit: Money, credit: Money },
    NoParty,
    NothingOutstanding,
    NoPayment,
    IdempotencyHit,
    EmptyJournal,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::AccountingDisabled => write!(f, "accounting-disabled"),
            SkipReason::LedgersDisabled => write!(f, "ledgers-disabled"),
            SkipReason::MissingChartAccounts => write!(f, "missing-chart-accounts"),
            SkipReason::UnbalancedJournal { debit, credit } => {
                write!(f, "unbalanced-journal:{}!={}", debit, credit)
            }
            SkipReason::NoParty => write!(f, "no-party"),
            SkipReason::NothingOutstanding => write!(f, "remaining<=0"),
            SkipReason::NoPayment => write!(f, "paidAmount<=0"),
            SkipReason::IdempotencyHit => write!(f, "idempotency-hit"),
            SkipReason::EmptyJournal => write!(f, "empty-journal"),
        }
    }
}

/// Result of an optional, soft-failing step (journal, ledger, payment).
///
/// ## Why Not an Error?
/// ```text
/// Sale committed ──► journal step ──► chart incomplete
///                                        │
///                                        ▼
///                 StepOutcome { created: false,
///                               reason: MissingChartAccounts,
///                               missing_account_codes: ["4001"] }
/// ```
/// The sale still succeeds; callers inspect the outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub created: bool,
    pub record_id: Option<i64>,
    pub reason: Option<SkipReason>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_account_codes: Vec<String>,
}

impl StepOutcome {
    pub fn created(record_id: i64) -> Self {
        StepOutcome {
            created: true,
            record_id: Some(record_id),
            reason: None,
            missing_account_codes: Vec::new(),
        }
    }

    pub fn skipped(reason: SkipReason) -> Self {
        StepOutcome {
            created: false,
            record_id: None,
            reason: Some(reason),
            missing_account_codes: Vec::new(),
        }
    }

    pub fn missing_accounts(codes: Vec<String>) -> Self {
        StepOutcome {
            created: false,
            record_id: None,
            reason: Some(SkipReason::MissingChartAccounts),
            missing_account_codes: codes,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
