//! # Create Purchase
//!
//! Receives stock from a supplier. Every line becomes its own product batch,
//! so later sales can cost it through FEFO.
//!
//! ```text
//! line 1 ──► batch PUR-{id}-1 ──► `in` movement ──► stock += qty
//! line 2 ──► batch PUR-{id}-2 ──► `in` movement ──► stock += qty
//!                 │
//!                 ▼
//! payment (paid > 0) ─► JE-PUR-{id} ─► supplier ledger (remaining > 0)
//! ```

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::orchestrators::{
    document_number, ensure_party, initial_payment_key, record_journal, record_ledger, Engine,
    LedgerPosting,
};
use crate::repository::batch::NewBatch;
use crate::repository::purchase::{NewPurchase, NewPurchaseItem};
use crate::repository::{
    BatchRepository, MovementRepository, PaymentRepository, ProductRepository,
    PurchaseRepository, SettingsRepository,
};
use crate::services::audit::actions;
use crate::services::error::{EngineError, EngineResult};
use tally_core::journal::{purchase_entry, PurchaseJournal};
use tally_core::pricing::{purchase_line_subtotal, purchase_totals, TotalsInput};
use tally_core::validation::{
    normalize_reference, validate_method_requirements, validate_non_empty_items,
};
use tally_core::{
    LedgerTransactionType, Money, MovementReason, MovementSource, MovementType, NewMovement,
    NewPayment, PartyKind, PaymentMethod, Purchase, SkipReason, StepOutcome, ValidationError,
    DEFAULT_UNIT_NAME,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseItemInput {
    pub product_id: i64,
    /// Base units.
    pub quantity: i64,
    pub unit_cost: Money,
    /// Whole line.
    #[serde(default)]
    pub discount: Money,
    #[serde(default)]
    pub batch_number: Option<String>,
    #[serde(default)]
    pub expiry_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePurchaseRequest {
    #[serde(default)]
    pub supplier_id: Option<i64>,
    /// Supplier's invoice number. Generated when absent.
    #[serde(default)]
    pub invoice_number: Option<String>,
    pub items: Vec<PurchaseItemInput>,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub reference_number: Option<String>,
    #[serde(default)]
    pub discount: Money,
    #[serde(default)]
    pub tax: Money,
    #[serde(default)]
    pub paid_amount: Money,
    #[serde(default)]
    pub idempotency_key: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub user_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseReceipt {
    pub purchase: Purchase,
    pub replayed: bool,
    pub movements_created: usize,
    /// One per line, in request order.
    pub batch_ids: Vec<i64>,
    pub payment: StepOutcome,
    pub journal: StepOutcome,
    pub ledger: StepOutcome,
}

impl PurchaseReceipt {
    fn replayed(purchase: Purchase) -> Self {
        let batch_ids = purchase.items.iter().filter_map(|i| i.batch_id).collect();
        PurchaseReceipt {
            purchase,
            replayed: true,
            movements_created: 0,
            batch_ids,
            payment: StepOutcome::skipped(SkipReason::IdempotencyHit),
            journal: StepOutcome::skipped(SkipReason::IdempotencyHit),
            ledger: StepOutcome::skipped(SkipReason::IdempotencyHit),
        }
    }
}

fn default_batch_number(purchase_id: i64, line: usize) -> String {
    format!("PUR-{}-{}", purchase_id, line + 1)
}

impl Engine {
    pub async fn create_purchase(
        &self,
        request: CreatePurchaseRequest,
    ) -> EngineResult<PurchaseReceipt> {
        validate_non_empty_items(request.items.len())?;
        if request.payment_method == PaymentMethod::Credit && request.supplier_id.is_none() {
            return Err(ValidationError::required("supplierId").into());
        }
        validate_method_requirements(
            request.payment_method,
            request.reference_number.as_deref(),
            true,
        )?;

        let mut tx = self.db.begin().await?;

        if let Some(key) = request.idempotency_key.as_deref() {
            if let Some(existing) = PurchaseRepository::new(&mut tx)
                .find_by_idempotency_key(key)
                .await?
            {
                tx.rollback().await?;
                debug!(purchase_id = existing.id, key, "Purchase replayed from idempotency key");
                return Ok(PurchaseReceipt::replayed(existing));
            }
        }

        let settings = SettingsRepository::new(&mut tx).module_settings().await?;
        if let Some(supplier_id) = request.supplier_id {
            ensure_party(&mut tx, PartyKind::Supplier, supplier_id).await?;
        }

        let mut products = Vec::with_capacity(request.items.len());
        let mut subtotals = Vec::with_capacity(request.items.len());
        for input in &request.items {
            let product = ProductRepository::new(&mut tx)
                .get_by_id(input.product_id)
                .await?;
            subtotals.push(purchase_line_subtotal(
                input.quantity,
                input.unit_cost,
                input.discount,
            )?);
            products.push(product);
        }

        let totals = purchase_totals(
            &subtotals,
            &TotalsInput {
                discount: request.discount,
                tax: request.tax,
                paid: request.paid_amount,
            },
        )?;

        let invoice_number = request
            .invoice_number
            .as_deref()
            .and_then(|n| normalize_reference(Some(n)))
            .unwrap_or_else(|| document_number("PUR"));

        let inserted = PurchaseRepository::new(&mut tx)
            .insert(&NewPurchase {
                invoice_number,
                supplier_id: request.supplier_id,
                subtotal: totals.subtotal,
                discount: totals.discount,
                tax: totals.tax,
                total: totals.total,
                currency: settings.base_currency.clone(),
                paid_amount: totals.paid,
                remaining_amount: totals.remaining,
                status: totals.status,
                idempotency_key: request.idempotency_key.clone(),
                notes: request.notes.clone(),
                created_by: request.user_id,
            })
            .await?;

        let Some(purchase) = inserted else {
            tx.rollback().await?;
            return self.replay_purchase(request.idempotency_key.as_deref()).await;
        };

        // Batches, movements, stock
        let mut batch_ids = Vec::with_capacity(request.items.len());
        for (line, ((input, product), subtotal)) in request
            .items
            .iter()
            .zip(&products)
            .zip(&subtotals)
            .enumerate()
        {
            let batch_number = input
                .batch_number
                .as_deref()
                .and_then(|n| normalize_reference(Some(n)))
                .unwrap_or_else(|| default_batch_number(purchase.id, line));

            let batch = BatchRepository::new(&mut tx)
                .create(&NewBatch {
                    product_id: product.id,
                    batch_number,
                    expiry_date: input.expiry_date,
                    quantity: input.quantity,
                    cost_per_unit: input.unit_cost,
                    purchase_id: Some(purchase.id),
                    notes: None,
                })
                .await?;

            let stock = ProductRepository::new(&mut tx)
                .adjust_stock(product.id, input.quantity)
                .await?;
            MovementRepository::new(&mut tx)
                .insert(&NewMovement {
                    product_id: product.id,
                    batch_id: Some(batch.id),
                    movement_type: MovementType::In,
                    reason: MovementReason::Purchase,
                    quantity_base: input.quantity,
                    unit_name: DEFAULT_UNIT_NAME.to_string(),
                    unit_factor: 1,
                    stock_before: stock.0,
                    stock_after: stock.1,
                    cost_per_unit: input.unit_cost,
                    total_cost: input.unit_cost.checked_mul_qty(input.quantity, "totalCost")?,
                    source_type: Some(MovementSource::Purchase),
                    source_id: Some(purchase.id),
                    idempotency_key: None,
                    notes: None,
                    created_by: request.user_id,
                })
                .await?;

            PurchaseRepository::new(&mut tx)
                .insert_item(
                    purchase.id,
                    &NewPurchaseItem {
                        product_id: product.id,
                        product_name: product.name.clone(),
                        quantity: input.quantity,
                        unit_cost: input.unit_cost,
                        discount: input.discount,
                        subtotal: *subtotal,
                        batch_id: Some(batch.id),
                        expiry_date: input.expiry_date,
                    },
                )
                .await?;
            batch_ids.push(batch.id);
        }

        // Payment
        let payment = if totals.paid.is_positive() {
            let created = PaymentRepository::new(&mut tx)
                .insert(&NewPayment {
                    purchase_id: Some(purchase.id),
                    supplier_id: request.supplier_id,
                    amount: totals.paid,
                    currency: settings.base_currency.clone(),
                    payment_method: request.payment_method,
                    reference_number: normalize_reference(request.reference_number.as_deref()),
                    idempotency_key: initial_payment_key(request.idempotency_key.as_deref()),
                    created_by: request.user_id,
                    ..NewPayment::default()
                })
                .await?;
            match created {
                Some(p) => StepOutcome::created(p.id),
                None => StepOutcome::skipped(SkipReason::IdempotencyHit),
            }
        } else {
            StepOutcome::skipped(SkipReason::NoPayment)
        };

        let plan = purchase_entry(&PurchaseJournal {
            purchase_id: purchase.id,
            invoice_number: &purchase.invoice_number,
            total: totals.total,
            tax: totals.tax,
            paid: totals.paid,
            remaining: totals.remaining,
        });
        let journal = record_journal(&mut tx, &plan, &settings, request.user_id).await?;

        let ledger = if totals.remaining.is_positive() {
            record_ledger(
                &mut tx,
                &settings,
                PartyKind::Supplier,
                LedgerPosting {
                    party_id: request.supplier_id,
                    transaction_type: LedgerTransactionType::Invoice,
                    amount: totals.remaining,
                    document_id: Some(purchase.id),
                    payment_id: None,
                    journal_entry_id: journal.record_id,
                    notes: Some(format!("Purchase {}", purchase.invoice_number)),
                    created_by: request.user_id,
                },
            )
            .await?
        } else {
            StepOutcome::skipped(SkipReason::NothingOutstanding)
        };

        let purchase = PurchaseRepository::new(&mut tx).get_by_id(purchase.id).await?;
        tx.commit().await?;

        info!(
            purchase_id = purchase.id,
            invoice = %purchase.invoice_number,
            total = %purchase.total,
            batches = batch_ids.len(),
            "Purchase committed"
        );

        self.audit
            .record(
                request.user_id,
                actions::PURCHASE_CREATE,
                "purchase",
                purchase.id,
                format!("Purchase {}", purchase.invoice_number),
                json!({
                    "total": purchase.total,
                    "items": purchase.items.len(),
                    "supplierId": purchase.supplier_id,
                    "journalCreated": journal.created,
                }),
            )
            .await;

        Ok(PurchaseReceipt {
            movements_created: batch_ids.len(),
            purchase,
            replayed: false,
            batch_ids,
            payment,
            journal,
            ledger,
        })
    }

    pub async fn get_purchase(&self, purchase_id: i64) -> EngineResult<Purchase> {
        let mut conn = self.db.acquire().await?;
        Ok(PurchaseRepository::new(&mut conn).get_by_id(purchase_id).await?)
    }

    async fn replay_purchase(&self, key: Option<&str>) -> EngineResult<PurchaseReceipt> {
        let key = key.ok_or_else(|| EngineError::conflict("purchase insert returned no row"))?;
        let mut conn = self.db.acquire().await?;
        let purchase = PurchaseRepository::new(&mut conn)
            .find_by_idempotency_key(key)
            .await?
            .ok_or_else(|| EngineError::not_found("Purchase", key))?;
        Ok(PurchaseReceipt::replayed(purchase))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrators::test_support::*;
    use crate::orchestrators::{CreateSaleRequest, SaleItemInput};
    use crate::repository::{AccountRepository, PartyRepository};
    use tally_core::DocumentStatus;

    fn line(product_id: i64, quantity: i64, unit_cost: i64) -> PurchaseItemInput {
        PurchaseItemInput {
            product_id,
            quantity,
            unit_cost: Money::from_minor(unit_cost),
            ..PurchaseItemInput::default()
        }
    }

    #[tokio::test]
    async fn test_credit_purchase_creates_batches_and_payable() {
        let engine = engine().await;
        let p = product(&engine, "Flour", 0, 0).await;
        let q = product(&engine, "Sugar", 0, 0).await;
        let s = supplier(&engine, "Mill Co").await;

        let mut named = line(q, 4, 250);
        named.batch_number = Some("SUG-7".into());
        named.expiry_date = NaiveDate::from_ymd_opt(2026, 6, 1);

        let receipt = engine
            .create_purchase(CreatePurchaseRequest {
                supplier_id: Some(s),
                items: vec![line(p, 10, 100), named],
                payment_method: PaymentMethod::Credit,
                tax: Money::from_minor(100),
                paid_amount: Money::from_minor(1_000),
                ..CreatePurchaseRequest::default()
            })
            .await
            .unwrap();

        let purchase = &receipt.purchase;
        assert_eq!(purchase.total, Money::from_minor(2_100));
        assert_eq!(purchase.remaining_amount, Money::from_minor(1_100));
        assert_eq!(purchase.status, DocumentStatus::Pending);
        assert_eq!(receipt.movements_created, 2);
        assert!(receipt.payment.created);
        assert!(receipt.journal.created);
        assert!(receipt.ledger.created);

        let mut conn = engine.database().acquire().await.unwrap();
        let mut batches = BatchRepository::new(&mut conn);
        let first = batches.get_by_id(receipt.batch_ids[0]).await.unwrap();
        assert_eq!(first.batch_number, format!("PUR-{}-1", purchase.id));
        assert_eq!(first.quantity_on_hand, 10);
        assert_eq!(first.purchase_id, Some(purchase.id));
        let second = batches.get_by_id(receipt.batch_ids[1]).await.unwrap();
        assert_eq!(second.batch_number, "SUG-7");
        assert_eq!(second.expiry_date, NaiveDate::from_ymd_opt(2026, 6, 1));

        assert_eq!(ProductRepository::new(&mut conn).get_by_id(p).await.unwrap().stock, 10);
        let balance = PartyRepository::new(&mut conn).get_supplier(s).await.unwrap().current_balance;
        assert_eq!(balance, Money::from_minor(1_100));
        drop(conn);

        let stored = engine.get_purchase(purchase.id).await.unwrap();
        assert_eq!(stored.remaining_amount, Money::from_minor(1_100));
    }

    #[tokio::test]
    async fn test_purchased_batch_feeds_sale_costing() {
        let engine = engine().await;
        let p = product(&engine, "Oil", 0, 500).await;
        engine
            .create_purchase(CreatePurchaseRequest {
                items: vec![line(p, 6, 320)],
                paid_amount: Money::from_minor(1_920),
                ..CreatePurchaseRequest::default()
            })
            .await
            .unwrap();

        let sale = engine
            .create_sale(CreateSaleRequest {
                items: vec![SaleItemInput {
                    product_id: p,
                    quantity: 2,
                    ..SaleItemInput::default()
                }],
                paid_amount: Money::from_minor(1_000),
                ..CreateSaleRequest::default()
            })
            .await
            .unwrap();
        assert_eq!(sale.diagnostics.cogs, Money::from_minor(640));
        assert!(engine.reconciliation().reconcile_all().await.unwrap().is_clean());
    }

    #[tokio::test]
    async fn test_idempotent_purchase_and_validation() {
        let engine = engine().await;
        let p = product(&engine, "Salt", 0, 0).await;

        let request = CreatePurchaseRequest {
            items: vec![line(p, 3, 50)],
            paid_amount: Money::from_minor(150),
            idempotency_key: Some("pur-1".into()),
            ..CreatePurchaseRequest::default()
        };
        let first = engine.create_purchase(request.clone()).await.unwrap();
        let second = engine.create_purchase(request).await.unwrap();
        assert!(second.replayed);
        assert_eq!(first.purchase.id, second.purchase.id);
        assert_eq!(second.batch_ids, first.batch_ids);
        assert_eq!(count(&engine, "product_batches").await, 1);
        assert_eq!(count(&engine, "payments").await, 1);

        let credit = CreatePurchaseRequest {
            items: vec![line(p, 1, 10)],
            payment_method: PaymentMethod::Credit,
            ..CreatePurchaseRequest::default()
        };
        assert!(matches!(
            engine.create_purchase(credit).await.unwrap_err(),
            EngineError::Validation(_)
        ));

        let zero = CreatePurchaseRequest {
            items: vec![line(p, 0, 10)],
            ..CreatePurchaseRequest::default()
        };
        assert!(matches!(
            engine.create_purchase(zero).await.unwrap_err(),
            EngineError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn test_accounting_disabled_skips_journal() {
        let engine = engine().await;
        engine.set_setting("accounting.enabled", "false").await.unwrap();
        let p = product(&engine, "Rice", 0, 0).await;

        let receipt = engine
            .create_purchase(CreatePurchaseRequest {
                items: vec![line(p, 2, 100)],
                paid_amount: Money::from_minor(200),
                ..CreatePurchaseRequest::default()
            })
            .await
            .unwrap();
        assert_eq!(receipt.journal.reason, Some(SkipReason::AccountingDisabled));
        assert_eq!(count(&engine, "journal_entries").await, 0);

        let mut conn = engine.database().acquire().await.unwrap();
        let inventory = AccountRepository::new(&mut conn)
            .find_by_code("1200")
            .await
            .unwrap()
            .unwrap();
        assert!(inventory.balance.is_zero());
    }
}
