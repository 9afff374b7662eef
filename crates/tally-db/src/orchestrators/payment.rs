//! # Payments
//!
//! ```text
//! ┌───────────────────────────┬──────────────┬───────────────────────────────┐
//! │ Operation                 │ Journal      │ Ledger row                    │
//! ├───────────────────────────┼──────────────┼───────────────────────────────┤
//! │ add_sale_payment          │ JE-PAY-{id}  │ customer  payment  −applied   │
//! │ add_purchase_payment      │ JE-PPAY-{id} │ supplier  payment  −applied   │
//! │ record_customer_payment   │ JE-CPAY-{id} │ customer  payment  −amount    │
//! │ record_supplier_payment   │ JE-SPAY-{id} │ supplier  payment  −amount    │
//! │ add_*_ledger_adjustment   │ none         │ adjustment, signed            │
//! └───────────────────────────┴──────────────┴───────────────────────────────┘
//! ```
//!
//! A document payment applies at most the remaining balance; the payment row
//! records the applied amount.

use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::pool::PoolConnection;
use sqlx::{Sqlite, SqliteConnection};
use tracing::{debug, info};

use crate::orchestrators::{ensure_party, record_journal, record_ledger, Engine, LedgerPosting};
use crate::repository::party_ledger::NewLedgerEntry;
use crate::repository::{
    PartyLedgerRepository, PaymentRepository, PurchaseRepository, SaleRepository,
    SettingsRepository,
};
use crate::services::audit::actions;
use crate::services::error::{EngineError, EngineResult};
use tally_core::journal::{payment_entry, PaymentPosting};
use tally_core::validation::{
    normalize_reference, validate_method_requirements, validate_payment_amount,
};
use tally_core::{
    DocumentStatus, LedgerTransactionType, ModuleSettings, Money, NewPayment, PartyKind,
    PartyLedgerEntry, Payment, PaymentMethod, Purchase, Sale, SkipReason, StepOutcome,
    ValidationError,
};

// =============================================================================
// Requests
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalePaymentRequest {
    pub sale_id: i64,
    pub amount: Money,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub reference_number: Option<String>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub user_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchasePaymentRequest {
    pub purchase_id: i64,
    pub amount: Money,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub reference_number: Option<String>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub user_id: Option<i64>,
}

/// A payment against a customer or supplier balance, not tied to a document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyPaymentRequest {
    pub party_id: i64,
    pub amount: Money,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub reference_number: Option<String>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub user_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerAdjustmentRequest {
    pub party_id: i64,
    /// Signed. Positive raises the balance.
    pub amount: Money,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub user_id: Option<i64>,
}

/// `document` is the sale or purchase after the payment, or the party
/// ledger row for standalone payments.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReceipt<D> {
    pub document: D,
    pub payment: Payment,
    pub replayed: bool,
    pub journal: StepOutcome,
    pub ledger: StepOutcome,
}

impl<D> PaymentReceipt<D> {
    fn replayed(document: D, payment: Payment) -> Self {
        PaymentReceipt {
            document,
            payment,
            replayed: true,
            journal: StepOutcome::skipped(SkipReason::IdempotencyHit),
            ledger: StepOutcome::skipped(SkipReason::IdempotencyHit),
        }
    }
}

/// Common fields of every payment request.
struct PaymentInput<'a> {
    amount: Money,
    method: PaymentMethod,
    reference: Option<&'a str>,
    key: Option<&'a str>,
    notes: Option<&'a str>,
    user_id: Option<i64>,
}

// =============================================================================
// Shared Steps
// =============================================================================

async fn find_payment(conn: &mut SqliteConnection, key: Option<&str>) -> EngineResult<Option<Payment>> {
    match key {
        Some(key) => Ok(PaymentRepository::new(conn).find_by_idempotency_key(key).await?),
        None => Ok(None),
    }
}

/// The document a replayed payment was recorded against. A key first used
/// for another kind of payment is a conflict, not a replay.
fn replayed_document(payment: &Payment, linked: Option<i64>, document: &str) -> EngineResult<i64> {
    linked.ok_or_else(|| {
        EngineError::conflict(format!(
            "idempotency key of payment #{} was not used for a {} payment",
            payment.id, document
        ))
    })
}

/// How much of `amount` a document with `remaining` outstanding accepts.
fn applied_amount(
    entity: &str,
    id: i64,
    status: DocumentStatus,
    remaining: Money,
    amount: Money,
) -> EngineResult<Money> {
    if status == DocumentStatus::Cancelled {
        return Err(EngineError::invalid_state(format!("{} {} is cancelled", entity, id)));
    }
    if !remaining.is_positive() {
        return Err(EngineError::invalid_state(format!("{} {} is fully paid", entity, id)));
    }
    Ok(amount.min(remaining))
}

fn new_payment(input: &PaymentInput<'_>, amount: Money, settings: &ModuleSettings) -> NewPayment {
    NewPayment {
        amount,
        currency: settings.base_currency.clone(),
        payment_method: input.method,
        reference_number: normalize_reference(input.reference),
        idempotency_key: input.key.map(str::to_string),
        notes: input.notes.map(str::to_string),
        created_by: input.user_id,
        ..NewPayment::default()
    }
}

// =============================================================================
// Orchestrators
// =============================================================================

impl Engine {
    pub async fn add_sale_payment(
        &self,
        request: SalePaymentRequest,
    ) -> EngineResult<PaymentReceipt<Sale>> {
        let input = PaymentInput {
            amount: request.amount,
            method: request.payment_method,
            reference: request.reference_number.as_deref(),
            key: request.idempotency_key.as_deref(),
            notes: request.notes.as_deref(),
            user_id: request.user_id,
        };
        validate_payment_amount(input.amount)?;

        let mut tx = self.db.begin().await?;
        if let Some(existing) = find_payment(&mut tx, input.key).await? {
            let sale_id = replayed_document(&existing, existing.sale_id, "sale")?;
            let sale = SaleRepository::new(&mut tx).get_by_id(sale_id).await?;
            tx.rollback().await?;
            return Ok(PaymentReceipt::replayed(sale, existing));
        }

        let settings = SettingsRepository::new(&mut tx).module_settings().await?;
        let sale = SaleRepository::new(&mut tx).get_by_id(request.sale_id).await?;
        validate_method_requirements(input.method, input.reference, sale.customer_id.is_some())?;
        let applied = applied_amount("sale", sale.id, sale.status, sale.remaining_amount, input.amount)?;

        let payment = PaymentRepository::new(&mut tx)
            .insert(&NewPayment {
                sale_id: Some(sale.id),
                customer_id: sale.customer_id,
                ..new_payment(&input, applied, &settings)
            })
            .await?;
        let Some(payment) = payment else {
            tx.rollback().await?;
            return self.replay_sale_payment(input.key).await;
        };

        let paid = sale.paid_amount.checked_add(applied, "paidAmount")?;
        let remaining = sale.remaining_amount - applied;
        SaleRepository::new(&mut tx)
            .update_payment(sale.id, paid, remaining, DocumentStatus::for_remaining(remaining))
            .await?;

        let plan = payment_entry(PaymentPosting::Sale, payment.id, applied);
        let journal = record_journal(&mut tx, &plan, &settings, input.user_id).await?;
        let ledger = record_ledger(
            &mut tx,
            &settings,
            PartyKind::Customer,
            LedgerPosting {
                party_id: sale.customer_id,
                transaction_type: LedgerTransactionType::Payment,
                amount: -applied,
                document_id: Some(sale.id),
                payment_id: Some(payment.id),
                journal_entry_id: journal.record_id,
                notes: Some(format!("Payment for {}", sale.invoice_number)),
                created_by: input.user_id,
            },
        )
        .await?;

        let sale = SaleRepository::new(&mut tx).get_by_id(sale.id).await?;
        tx.commit().await?;

        info!(sale_id = sale.id, payment_id = payment.id, applied = %applied, "Sale payment committed");
        self.audit_payment(&payment, "sale", sale.id).await;

        Ok(PaymentReceipt {
            document: sale,
            payment,
            replayed: false,
            journal,
            ledger,
        })
    }

    pub async fn add_purchase_payment(
        &self,
        request: PurchasePaymentRequest,
    ) -> EngineResult<PaymentReceipt<Purchase>> {
        let input = PaymentInput {
            amount: request.amount,
            method: request.payment_method,
            reference: request.reference_number.as_deref(),
            key: request.idempotency_key.as_deref(),
            notes: request.notes.as_deref(),
            user_id: request.user_id,
        };
        validate_payment_amount(input.amount)?;

        let mut tx = self.db.begin().await?;
        if let Some(existing) = find_payment(&mut tx, input.key).await? {
            let purchase_id = replayed_document(&existing, existing.purchase_id, "purchase")?;
            let purchase = PurchaseRepository::new(&mut tx).get_by_id(purchase_id).await?;
            tx.rollback().await?;
            return Ok(PaymentReceipt::replayed(purchase, existing));
        }

        let settings = SettingsRepository::new(&mut tx).module_settings().await?;
        let purchase = PurchaseRepository::new(&mut tx)
            .get_by_id(request.purchase_id)
            .await?;
        if input.method == PaymentMethod::Credit && purchase.supplier_id.is_none() {
            return Err(ValidationError::required("supplierId").into());
        }
        validate_method_requirements(input.method, input.reference, true)?;
        let applied = applied_amount(
            "purchase",
            purchase.id,
            purchase.status,
            purchase.remaining_amount,
            input.amount,
        )?;

        let payment = PaymentRepository::new(&mut tx)
            .insert(&NewPayment {
                purchase_id: Some(purchase.id),
                supplier_id: purchase.supplier_id,
                ..new_payment(&input, applied, &settings)
            })
            .await?;
        let Some(payment) = payment else {
            tx.rollback().await?;
            return self.replay_purchase_payment(input.key).await;
        };

        let paid = purchase.paid_amount.checked_add(applied, "paidAmount")?;
        let remaining = purchase.remaining_amount - applied;
        PurchaseRepository::new(&mut tx)
            .update_payment(purchase.id, paid, remaining, DocumentStatus::for_remaining(remaining))
            .await?;

        let plan = payment_entry(PaymentPosting::Purchase, payment.id, applied);
        let journal = record_journal(&mut tx, &plan, &settings, input.user_id).await?;
        let ledger = record_ledger(
            &mut tx,
            &settings,
            PartyKind::Supplier,
            LedgerPosting {
                party_id: purchase.supplier_id,
                transaction_type: LedgerTransactionType::Payment,
                amount: -applied,
                document_id: Some(purchase.id),
                payment_id: Some(payment.id),
                journal_entry_id: journal.record_id,
                notes: Some(format!("Payment for {}", purchase.invoice_number)),
                created_by: input.user_id,
            },
        )
        .await?;

        let purchase = PurchaseRepository::new(&mut tx).get_by_id(purchase.id).await?;
        tx.commit().await?;

        info!(purchase_id = purchase.id, payment_id = payment.id, applied = %applied, "Purchase payment committed");
        self.audit_payment(&payment, "purchase", purchase.id).await;

        Ok(PaymentReceipt {
            document: purchase,
            payment,
            replayed: false,
            journal,
            ledger,
        })
    }

    pub async fn record_customer_payment(
        &self,
        request: PartyPaymentRequest,
    ) -> EngineResult<PaymentReceipt<Option<PartyLedgerEntry>>> {
        self.record_party_payment(PartyKind::Customer, request).await
    }

    pub async fn record_supplier_payment(
        &self,
        request: PartyPaymentRequest,
    ) -> EngineResult<PaymentReceipt<Option<PartyLedgerEntry>>> {
        self.record_party_payment(PartyKind::Supplier, request).await
    }

    async fn record_party_payment(
        &self,
        kind: PartyKind,
        request: PartyPaymentRequest,
    ) -> EngineResult<PaymentReceipt<Option<PartyLedgerEntry>>> {
        let input = PaymentInput {
            amount: request.amount,
            method: request.payment_method,
            reference: request.reference_number.as_deref(),
            key: request.idempotency_key.as_deref(),
            notes: request.notes.as_deref(),
            user_id: request.user_id,
        };
        validate_payment_amount(input.amount)?;
        validate_method_requirements(input.method, input.reference, true)?;

        let mut tx = self.db.begin().await?;
        if let Some(existing) = find_payment(&mut tx, input.key).await? {
            let row = PartyLedgerRepository::new(&mut tx, kind)
                .find_by_payment_id(existing.id)
                .await?;
            tx.rollback().await?;
            return Ok(PaymentReceipt::replayed(row, existing));
        }

        let settings = SettingsRepository::new(&mut tx).module_settings().await?;
        ensure_party(&mut tx, kind, request.party_id).await?;

        let (new_payment, posting) = match kind {
            PartyKind::Customer => (
                NewPayment {
                    customer_id: Some(request.party_id),
                    ..new_payment(&input, input.amount, &settings)
                },
                PaymentPosting::Customer,
            ),
            PartyKind::Supplier => (
                NewPayment {
                    supplier_id: Some(request.party_id),
                    ..new_payment(&input, input.amount, &settings)
                },
                PaymentPosting::Supplier,
            ),
        };

        let payment = PaymentRepository::new(&mut tx).insert(&new_payment).await?;
        let Some(payment) = payment else {
            tx.rollback().await?;
            return self.replay_party_payment(kind, input.key).await;
        };

        let plan = payment_entry(posting, payment.id, input.amount);
        let journal = record_journal(&mut tx, &plan, &settings, input.user_id).await?;
        let ledger = record_ledger(
            &mut tx,
            &settings,
            kind,
            LedgerPosting {
                party_id: Some(request.party_id),
                transaction_type: LedgerTransactionType::Payment,
                amount: -input.amount,
                document_id: None,
                payment_id: Some(payment.id),
                journal_entry_id: journal.record_id,
                notes: request.notes.clone(),
                created_by: input.user_id,
            },
        )
        .await?;

        let row = match ledger.record_id {
            Some(_) => {
                PartyLedgerRepository::new(&mut tx, kind)
                    .find_by_payment_id(payment.id)
                    .await?
            }
            None => None,
        };
        tx.commit().await?;

        info!(party = %kind, party_id = request.party_id, payment_id = payment.id, amount = %input.amount, "Party payment committed");
        let entity = match kind {
            PartyKind::Customer => "customer",
            PartyKind::Supplier => "supplier",
        };
        self.audit_payment(&payment, entity, request.party_id).await;

        Ok(PaymentReceipt {
            document: row,
            payment,
            replayed: false,
            journal,
            ledger,
        })
    }

    pub async fn add_customer_ledger_adjustment(
        &self,
        request: LedgerAdjustmentRequest,
    ) -> EngineResult<PartyLedgerEntry> {
        self.add_ledger_adjustment(PartyKind::Customer, request).await
    }

    pub async fn add_supplier_ledger_adjustment(
        &self,
        request: LedgerAdjustmentRequest,
    ) -> EngineResult<PartyLedgerEntry> {
        self.add_ledger_adjustment(PartyKind::Supplier, request).await
    }

    /// Writes a signed `adjustment` row. The cached balance follows it.
    pub async fn add_ledger_adjustment(
        &self,
        kind: PartyKind,
        request: LedgerAdjustmentRequest,
    ) -> EngineResult<PartyLedgerEntry> {
        if request.amount.is_zero() {
            return Err(ValidationError::MustBeNonZero {
                field: "amount".to_string(),
            }
            .into());
        }

        let mut tx = self.db.begin().await?;
        let settings = SettingsRepository::new(&mut tx).module_settings().await?;
        if !settings.ledgers_enabled {
            return Err(EngineError::invalid_state("party ledgers are disabled"));
        }
        ensure_party(&mut tx, kind, request.party_id).await?;

        let entry = PartyLedgerRepository::new(&mut tx, kind)
            .append(&NewLedgerEntry {
                party_id: request.party_id,
                transaction_type: LedgerTransactionType::Adjustment,
                amount: request.amount,
                document_id: None,
                payment_id: None,
                journal_entry_id: None,
                notes: request.notes,
                created_by: request.user_id,
            })
            .await?;
        tx.commit().await?;

        info!(
            party = %kind,
            party_id = request.party_id,
            amount = %entry.amount,
            balance_after = %entry.balance_after,
            "Ledger adjustment committed"
        );
        Ok(entry)
    }

    pub async fn list_party_ledger(
        &self,
        kind: PartyKind,
        party_id: i64,
    ) -> EngineResult<Vec<PartyLedgerEntry>> {
        let mut conn = self.db.acquire().await?;
        ensure_party(&mut conn, kind, party_id).await?;
        Ok(PartyLedgerRepository::new(&mut conn, kind).list(party_id).await?)
    }

    // -------------------------------------------------------------------------
    // Replay / audit helpers
    // -------------------------------------------------------------------------

    /// The payment that won the insert race, plus a connection to load its context.
    async fn replayed_payment(
        &self,
        key: Option<&str>,
    ) -> EngineResult<(Payment, PoolConnection<Sqlite>)> {
        let key = key.ok_or_else(|| EngineError::conflict("payment insert returned no row"))?;
        let mut conn = self.db.acquire().await?;
        let payment = PaymentRepository::new(&mut conn)
            .find_by_idempotency_key(key)
            .await?
            .ok_or_else(|| EngineError::not_found("Payment", key))?;
        debug!(payment_id = payment.id, key, "Payment replayed after losing insert race");
        Ok((payment, conn))
    }

    async fn replay_sale_payment(&self, key: Option<&str>) -> EngineResult<PaymentReceipt<Sale>> {
        let (payment, mut conn) = self.replayed_payment(key).await?;
        let sale_id = replayed_document(&payment, payment.sale_id, "sale")?;
        let sale = SaleRepository::new(&mut conn).get_by_id(sale_id).await?;
        Ok(PaymentReceipt::replayed(sale, payment))
    }

    async fn replay_purchase_payment(
        &self,
        key: Option<&str>,
    ) -> EngineResult<PaymentReceipt<Purchase>> {
        let (payment, mut conn) = self.replayed_payment(key).await?;
        let purchase_id = replayed_document(&payment, payment.purchase_id, "purchase")?;
        let purchase = PurchaseRepository::new(&mut conn).get_by_id(purchase_id).await?;
        Ok(PaymentReceipt::replayed(purchase, payment))
    }

    async fn replay_party_payment(
        &self,
        kind: PartyKind,
        key: Option<&str>,
    ) -> EngineResult<PaymentReceipt<Option<PartyLedgerEntry>>> {
        let (payment, mut conn) = self.replayed_payment(key).await?;
        let row = PartyLedgerRepository::new(&mut conn, kind)
            .find_by_payment_id(payment.id)
            .await?;
        Ok(PaymentReceipt::replayed(row, payment))
    }

    async fn audit_payment(&self, payment: &Payment, entity_type: &str, entity_id: i64) {
        self.audit
            .record(
                payment.created_by,
                actions::PAYMENT_CREATE,
                entity_type,
                entity_id,
                format!("Payment #{} of {}", payment.id, payment.amount),
                json!({
                    "paymentId": payment.id,
                    "amount": payment.amount,
                    "method": payment.payment_method,
                }),
            )
            .await;
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrators::test_support::*;
    use crate::orchestrators::{
        CreatePurchaseRequest, CreateSaleRequest, PurchaseItemInput, SaleItemInput,
    };
    use crate::repository::{PartyRepository, PaymentRepository};
    use tally_core::PaymentType;

    async fn credit_sale(engine: &Engine, customer_id: i64, total: i64) -> Sale {
        let p = product(engine, "Phone", 0, total).await;
        receive(engine, p, "PH-1", 5, 0, None).await;
        engine
            .create_sale(CreateSaleRequest {
                customer_id: Some(customer_id),
                items: vec![SaleItemInput {
                    product_id: p,
                    quantity: 1,
                    ..SaleItemInput::default()
                }],
                payment_type: PaymentType::Credit,
                payment_method: PaymentMethod::Credit,
                ..CreateSaleRequest::default()
            })
            .await
            .unwrap()
            .sale
    }

    fn pay_sale(sale_id: i64, amount: i64) -> SalePaymentRequest {
        SalePaymentRequest {
            sale_id,
            amount: Money::from_minor(amount),
            ..SalePaymentRequest::default()
        }
    }

    async fn debt(engine: &Engine, customer_id: i64) -> Money {
        let mut conn = engine.database().acquire().await.unwrap();
        PartyRepository::new(&mut conn)
            .get_customer(customer_id)
            .await
            .unwrap()
            .total_debt
    }

    #[tokio::test]
    async fn test_sale_payment_caps_at_remaining() {
        let engine = engine().await;
        let c = customer(&engine, "Ali").await;
        let sale = credit_sale(&engine, c, 5_000).await;
        assert_eq!(debt(&engine, c).await, Money::from_minor(5_000));

        let first = engine.add_sale_payment(pay_sale(sale.id, 2_000)).await.unwrap();
        assert_eq!(first.document.remaining_amount, Money::from_minor(3_000));
        assert_eq!(first.document.status, DocumentStatus::Pending);
        assert!(first.journal.created);
        assert!(first.ledger.created);
        assert_eq!(debt(&engine, c).await, Money::from_minor(3_000));

        let second = engine.add_sale_payment(pay_sale(sale.id, 9_000)).await.unwrap();
        assert_eq!(second.payment.amount, Money::from_minor(3_000));
        assert_eq!(second.document.status, DocumentStatus::Completed);
        assert_eq!(debt(&engine, c).await, Money::ZERO);

        let err = engine.add_sale_payment(pay_sale(sale.id, 1)).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));

        let err = engine.add_sale_payment(pay_sale(9_999, 1)).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));

        let mut conn = engine.database().acquire().await.unwrap();
        let amounts: Vec<Money> = PaymentRepository::new(&mut conn)
            .list_for_sale(sale.id)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.amount)
            .filter(|a| a.is_positive())
            .collect();
        assert_eq!(amounts, vec![Money::from_minor(2_000), Money::from_minor(3_000)]);
        drop(conn);

        assert!(engine.reconciliation().reconcile_all().await.unwrap().is_clean());
    }

    #[tokio::test]
    async fn test_sale_payment_replay_and_validation() {
        let engine = engine().await;
        let c = customer(&engine, "Sara").await;
        let sale = credit_sale(&engine, c, 1_000).await;

        let mut request = pay_sale(sale.id, 400);
        request.idempotency_key = Some("pay-1".into());
        let first = engine.add_sale_payment(request.clone()).await.unwrap();
        let again = engine.add_sale_payment(request).await.unwrap();
        assert!(again.replayed);
        assert_eq!(first.payment.id, again.payment.id);
        assert_eq!(again.document.remaining_amount, Money::from_minor(600));
        assert_eq!(count(&engine, "payments").await, 1);

        let err = engine.add_sale_payment(pay_sale(sale.id, 0)).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let mut card = pay_sale(sale.id, 100);
        card.payment_method = PaymentMethod::Card;
        let err = engine.add_sale_payment(card).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn test_replayed_key_returns_the_sale_it_paid() {
        let engine = engine().await;
        let c = customer(&engine, "Huda").await;
        let first_sale = credit_sale(&engine, c, 1_000).await;
        let other_sale = credit_sale(&engine, c, 2_000).await;

        let mut request = pay_sale(first_sale.id, 400);
        request.idempotency_key = Some("pay-shared".into());
        let first = engine.add_sale_payment(request.clone()).await.unwrap();

        request.sale_id = other_sale.id;
        let again = engine.add_sale_payment(request).await.unwrap();
        assert!(again.replayed);
        assert_eq!(again.payment.id, first.payment.id);
        assert_eq!(again.document.id, first_sale.id);
        assert_eq!(again.document.remaining_amount, Money::from_minor(600));

        let mut conn = engine.database().acquire().await.unwrap();
        let untouched = SaleRepository::new(&mut conn).get_by_id(other_sale.id).await.unwrap();
        assert_eq!(untouched.remaining_amount, Money::from_minor(2_000));
    }

    #[tokio::test]
    async fn test_key_from_party_payment_is_not_a_sale_replay() {
        let engine = engine().await;
        let c = customer(&engine, "Nadia").await;
        let sale = credit_sale(&engine, c, 1_000).await;

        engine
            .record_customer_payment(PartyPaymentRequest {
                party_id: c,
                amount: Money::from_minor(100),
                idempotency_key: Some("pay-party".into()),
                ..PartyPaymentRequest::default()
            })
            .await
            .unwrap();

        let mut request = pay_sale(sale.id, 100);
        request.idempotency_key = Some("pay-party".into());
        let err = engine.add_sale_payment(request).await.unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_payments_with_one_key_post_once() {
        let dir = tempfile::tempdir().unwrap();
        let engine = file_engine(&dir, 4).await;
        let c = customer(&engine, "Karim").await;
        let sale = credit_sale(&engine, c, 1_000).await;

        let tables = ["payments", "journal_entries", "customer_ledger"];
        let mut before = Vec::new();
        for table in tables {
            before.push(count(&engine, table).await);
        }

        let mut request = pay_sale(sale.id, 300);
        request.idempotency_key = Some("pay-race".into());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let engine = engine.clone();
            let request = request.clone();
            handles.push(tokio::spawn(async move { engine.add_sale_payment(request).await }));
        }

        let mut receipts = Vec::new();
        for handle in handles {
            receipts.push(handle.await.unwrap().unwrap());
        }
        assert_eq!(receipts.iter().filter(|r| r.replayed).count(), 3);
        assert!(receipts.iter().all(|r| r.payment.id == receipts[0].payment.id));
        assert!(receipts.iter().all(|r| r.document.remaining_amount == Money::from_minor(700)));

        for (table, before) in tables.into_iter().zip(before) {
            assert_eq!(count(&engine, table).await, before + 1, "{table}");
        }
        assert_eq!(debt(&engine, c).await, Money::from_minor(700));
        assert!(engine.reconciliation().reconcile_all().await.unwrap().is_clean());
    }

    #[tokio::test]
    async fn test_ledgers_disabled_reduces_cached_debt() {
        let engine = engine().await;
        let c = customer(&engine, "Omar").await;
        let sale = credit_sale(&engine, c, 1_000).await;
        engine.set_setting("ledgers.enabled", "false").await.unwrap();

        let receipt = engine.add_sale_payment(pay_sale(sale.id, 300)).await.unwrap();
        assert_eq!(receipt.ledger.reason, Some(SkipReason::LedgersDisabled));
        assert_eq!(debt(&engine, c).await, Money::from_minor(700));

        let drift = engine.reconciliation().reconcile_party(PartyKind::Customer).await.unwrap();
        assert_eq!(drift.total_drift(), 300);

        let err = engine
            .add_customer_ledger_adjustment(LedgerAdjustmentRequest {
                party_id: c,
                amount: Money::from_minor(50),
                ..LedgerAdjustmentRequest::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_purchase_and_supplier_payments() {
        let engine = engine().await;
        let s = supplier(&engine, "Mill Co").await;
        let p = product(&engine, "Flour", 0, 0).await;
        let purchase = engine
            .create_purchase(CreatePurchaseRequest {
                supplier_id: Some(s),
                items: vec![PurchaseItemInput {
                    product_id: p,
                    quantity: 10,
                    unit_cost: Money::from_minor(100),
                    ..PurchaseItemInput::default()
                }],
                payment_method: PaymentMethod::Credit,
                ..CreatePurchaseRequest::default()
            })
            .await
            .unwrap()
            .purchase;

        let paid = engine
            .add_purchase_payment(PurchasePaymentRequest {
                purchase_id: purchase.id,
                amount: Money::from_minor(400),
                ..PurchasePaymentRequest::default()
            })
            .await
            .unwrap();
        assert_eq!(paid.document.remaining_amount, Money::from_minor(600));
        assert!(paid.journal.created);

        let request = PartyPaymentRequest {
            party_id: s,
            amount: Money::from_minor(250),
            idempotency_key: Some("spay-1".into()),
            ..PartyPaymentRequest::default()
        };
        let standalone = engine.record_supplier_payment(request.clone()).await.unwrap();
        let row = standalone.document.clone().unwrap();
        assert_eq!(row.amount, Money::from_minor(-250));
        assert_eq!(row.balance_after, Money::from_minor(350));

        let replay = engine.record_supplier_payment(request).await.unwrap();
        assert!(replay.replayed);
        assert_eq!(replay.document.map(|r| r.id), Some(row.id));

        let adjusted = engine
            .add_supplier_ledger_adjustment(LedgerAdjustmentRequest {
                party_id: s,
                amount: Money::from_minor(-50),
                notes: Some("rounding".into()),
                user_id: None,
            })
            .await
            .unwrap();
        assert_eq!(adjusted.balance_after, Money::from_minor(300));

        let ledger = engine.list_party_ledger(PartyKind::Supplier, s).await.unwrap();
        assert_eq!(ledger.len(), 4);
        assert!(engine.reconciliation().reconcile_all().await.unwrap().is_clean());
    }

    #[tokio::test]
    async fn test_customer_payment_requires_existing_party() {
        let engine = engine().await;
        let err = engine
            .record_customer_payment(PartyPaymentRequest {
                party_id: 42,
                amount: Money::from_minor(10),
                ..PartyPaymentRequest::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));

        let err = engine
            .add_customer_ledger_adjustment(LedgerAdjustmentRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }
}
