//! # Create Sale
//!
//! ## Steps
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. Validate       items, payment method, customer                      │
//! │  2. Resolve units  server price + factor per line                       │
//! │  3. Stock check    per product, summed over lines                       │
//! │  4. Totals         subtotal − discount + tax + interest                 │
//! │  5. Claim key      INSERT sales … ON CONFLICT DO NOTHING                │
//! │  6. Per line       FIFO: deplete ─► depletion rows ─► `out` per batch   │
//! │                    legacy: one `out` at product cost                    │
//! │  7. Payment        when paid > 0                                        │
//! │  8. Journal        JE-SALE-{id}            (soft-fail)                  │
//! │  9. Ledger         customer invoice row    (soft-fail)                  │
//! │ 10. Commit, then audit `sale:create`                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::SqliteConnection;
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::orchestrators::{
    document_number, ensure_party, initial_payment_key, record_journal, record_ledger, Engine,
    LedgerPosting,
};
use crate::repository::sale::{NewSale, NewSaleItem};
use crate::repository::{
    BatchRepository, MovementRepository, PaymentRepository, ProductRepository, SaleRepository,
    SettingsRepository,
};
use crate::services::audit::actions;
use crate::services::error::{EngineError, EngineResult};
use crate::services::FifoService;
use tally_core::journal::{sale_entry, SaleJournal};
use tally_core::pricing::{
    profit_and_margin, quantity_base, resolve_unit, sale_line_subtotal, sale_totals, ResolvedUnit,
    TotalsInput, UnitRequest,
};
use tally_core::validation::{
    normalize_reference, validate_credit_party, validate_method_requirements,
    validate_non_empty_items,
};
use tally_core::{
    LedgerTransactionType, ModuleSettings, Money, MovementReason, MovementSource, MovementType,
    NewMovement, NewPayment, PartyKind, PaymentMethod, PaymentType, Product, Sale, SkipReason,
    StepOutcome,
};

// =============================================================================
// Request / Response
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleItemInput {
    pub product_id: i64,
    pub quantity: i64,
    #[serde(default)]
    pub unit_name: Option<String>,
    /// Ignored when the product has configured units.
    #[serde(default)]
    pub unit_factor: Option<i64>,
    /// Ignored when the resolved unit has its own price.
    #[serde(default)]
    pub unit_price: Option<Money>,
    /// Per unit.
    #[serde(default)]
    pub discount: Money,
    /// Only used by the legacy (non-FIFO) path.
    #[serde(default)]
    pub batch_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSaleRequest {
    #[serde(default)]
    pub customer_id: Option<i64>,
    pub items: Vec<SaleItemInput>,
    #[serde(default)]
    pub payment_type: PaymentType,
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
    pub interest_rate_bps: i64,
    #[serde(default)]
    pub idempotency_key: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub user_id: Option<i64>,
}

/// What the sale did besides writing its own rows.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleDiagnostics {
    pub movements_created: usize,
    pub fifo_used: bool,
    pub cogs: Money,
    pub profit: Money,
    pub margin_bps: i64,
    pub payment: StepOutcome,
    pub journal: StepOutcome,
    pub ledger: StepOutcome,
}

impl SaleDiagnostics {
    fn replayed() -> Self {
        SaleDiagnostics {
            movements_created: 0,
            fifo_used: false,
            cogs: Money::ZERO,
            profit: Money::ZERO,
            margin_bps: 0,
            payment: StepOutcome::skipped(SkipReason::IdempotencyHit),
            journal: StepOutcome::skipped(SkipReason::IdempotencyHit),
            ledger: StepOutcome::skipped(SkipReason::IdempotencyHit),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleReceipt {
    pub sale: Sale,
    /// The key was already used; `sale` is the earlier result.
    pub replayed: bool,
    pub diagnostics: SaleDiagnostics,
}

impl SaleReceipt {
    fn replayed(sale: Sale) -> Self {
        SaleReceipt {
            sale,
            replayed: true,
            diagnostics: SaleDiagnostics::replayed(),
        }
    }
}

/// A request line after unit resolution.
struct PricedLine<'a> {
    input: &'a SaleItemInput,
    product: Product,
    unit: ResolvedUnit,
    quantity_base: i64,
    subtotal: Money,
}

/// Costing result of one line.
struct LineCost {
    cogs: Money,
    movements: usize,
}

// =============================================================================
// Orchestrator
// =============================================================================

impl Engine {
    pub async fn create_sale(&self, request: CreateSaleRequest) -> EngineResult<SaleReceipt> {
        validate_non_empty_items(request.items.len())?;
        validate_method_requirements(
            request.payment_method,
            request.reference_number.as_deref(),
            request.customer_id.is_some(),
        )?;

        let mut tx = self.db.begin().await?;

        if let Some(key) = request.idempotency_key.as_deref() {
            if let Some(existing) = SaleRepository::new(&mut tx).find_by_idempotency_key(key).await? {
                tx.rollback().await?;
                debug!(sale_id = existing.id, key, "Sale replayed from idempotency key");
                return Ok(SaleReceipt::replayed(existing));
            }
        }

        let settings = SettingsRepository::new(&mut tx).module_settings().await?;
        if let Some(customer_id) = request.customer_id {
            ensure_party(&mut tx, PartyKind::Customer, customer_id).await?;
        }

        let lines = price_lines(&mut tx, &request, &settings).await?;
        self.check_stock(&mut tx, &lines).await?;

        let subtotals: Vec<Money> = lines.iter().map(|l| l.subtotal).collect();
        let totals = sale_totals(
            &subtotals,
            &TotalsInput {
                discount: request.discount,
                tax: request.tax,
                paid: request.paid_amount,
            },
            request.payment_type,
            request.interest_rate_bps,
            &settings.base_currency,
        )?;
        validate_credit_party(
            request.payment_type,
            totals.remaining,
            request.customer_id.is_some(),
        )?;

        let inserted = SaleRepository::new(&mut tx)
            .insert(&NewSale {
                invoice_number: document_number("INV"),
                customer_id: request.customer_id,
                subtotal: totals.subtotal,
                discount: totals.discount,
                tax: totals.tax,
                total: totals.total,
                currency: settings.base_currency.clone(),
                payment_type: request.payment_type,
                paid_amount: totals.paid,
                remaining_amount: totals.remaining,
                status: totals.status,
                interest_rate_bps: totals.interest_rate_bps,
                interest_amount: totals.interest_amount,
                idempotency_key: request.idempotency_key.clone(),
                notes: request.notes.clone(),
                created_by: request.user_id,
            })
            .await?;

        let Some(sale) = inserted else {
            tx.rollback().await?;
            return self.replay_sale(request.idempotency_key.as_deref()).await;
        };

        // Items, depletions, movements
        let mut cogs = Money::ZERO;
        let mut movements_created = 0;
        for line in &lines {
            let cost = if self.fifo_enabled {
                cost_line_fifo(&mut tx, sale.id, line, request.user_id).await?
            } else {
                cost_line_legacy(&mut tx, sale.id, line, request.user_id).await?
            };
            cogs = cogs.checked_add(cost.cogs, "cogs")?;
            movements_created += cost.movements;
        }

        let stored_items = SaleRepository::new(&mut tx).items(sale.id).await?;
        if stored_items.len() != lines.len() {
            return Err(EngineError::conflict(format!(
                "sale {} stored {} items, expected {}",
                sale.id,
                stored_items.len(),
                lines.len()
            )));
        }

        // Payment
        let payment = if totals.paid.is_positive() {
            let created = PaymentRepository::new(&mut tx)
                .insert(&NewPayment {
                    sale_id: Some(sale.id),
                    customer_id: request.customer_id,
                    amount: totals.paid,
                    currency: settings.base_currency.clone(),
                    payment_method: request.payment_method,
                    reference_number: normalize_reference(request.reference_number.as_deref()),
                    idempotency_key: initial_payment_key(request.idempotency_key.as_deref()),
                    notes: None,
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

        // Journal
        let plan = sale_entry(&SaleJournal {
            sale_id: sale.id,
            invoice_number: &sale.invoice_number,
            total: totals.total,
            tax: totals.tax,
            paid: totals.paid,
            remaining: totals.remaining,
            cogs,
        });
        let journal = record_journal(&mut tx, &plan, &settings, request.user_id).await?;

        // Customer ledger
        let ledger = if totals.remaining.is_positive() {
            record_ledger(
                &mut tx,
                &settings,
                PartyKind::Customer,
                LedgerPosting {
                    party_id: request.customer_id,
                    transaction_type: LedgerTransactionType::Invoice,
                    amount: totals.remaining,
                    document_id: Some(sale.id),
                    payment_id: None,
                    journal_entry_id: journal.record_id,
                    notes: Some(format!("Invoice {}", sale.invoice_number)),
                    created_by: request.user_id,
                },
            )
            .await?
        } else {
            StepOutcome::skipped(SkipReason::NothingOutstanding)
        };

        let sale = SaleRepository::new(&mut tx).get_by_id(sale.id).await?;
        tx.commit().await?;

        let (profit, margin_bps) = profit_and_margin(sale.total, cogs);
        info!(
            sale_id = sale.id,
            invoice = %sale.invoice_number,
            total = %sale.total,
            cogs = %cogs,
            journal = journal.created,
            "Sale committed"
        );

        self.audit
            .record(
                request.user_id,
                actions::SALE_CREATE,
                "sale",
                sale.id,
                format!("Sale {}", sale.invoice_number),
                json!({
                    "total": sale.total,
                    "items": sale.items.len(),
                    "paymentType": sale.payment_type,
                    "journalCreated": journal.created,
                }),
            )
            .await;

        Ok(SaleReceipt {
            sale,
            replayed: false,
            diagnostics: SaleDiagnostics {
                movements_created,
                fifo_used: self.fifo_enabled,
                cogs,
                profit,
                margin_bps,
                payment,
                journal,
                ledger,
            },
        })
    }

    pub async fn get_sale(&self, sale_id: i64) -> EngineResult<Sale> {
        let mut conn = self.db.acquire().await?;
        Ok(SaleRepository::new(&mut conn).get_by_id(sale_id).await?)
    }

    async fn replay_sale(&self, key: Option<&str>) -> EngineResult<SaleReceipt> {
        let key = key.ok_or_else(|| EngineError::conflict("sale insert returned no row"))?;
        let mut conn = self.db.acquire().await?;
        let sale = SaleRepository::new(&mut conn)
            .find_by_idempotency_key(key)
            .await?
            .ok_or_else(|| EngineError::not_found("Sale", key))?;
        debug!(sale_id = sale.id, key, "Sale replayed after losing insert race");
        Ok(SaleReceipt::replayed(sale))
    }

    /// Requested base quantity per product against what can be sold.
    async fn check_stock(&self, conn: &mut SqliteConnection, lines: &[PricedLine<'_>]) -> EngineResult<()> {
        let mut needed: BTreeMap<i64, (i64, &Product)> = BTreeMap::new();
        for line in lines {
            let slot = needed.entry(line.product.id).or_insert((0, &line.product));
            slot.0 = slot
                .0
                .checked_add(line.quantity_base)
                .ok_or_else(|| tally_core::ValidationError::overflow("quantityBase"))?;
        }

        for (product_id, (requested, product)) in needed {
            let available = if self.fifo_enabled {
                FifoService::new(&mut *conn).available_stock(product_id).await?
            } else {
                product.stock
            };
            if requested > available {
                return Err(EngineError::InsufficientStock {
                    product: product.name.clone(),
                    available,
                    requested,
                });
            }
        }
        Ok(())
    }
}

// =============================================================================
// Line Helpers
// =============================================================================

async fn price_lines<'a>(
    conn: &mut SqliteConnection,
    request: &'a CreateSaleRequest,
    settings: &ModuleSettings,
) -> EngineResult<Vec<PricedLine<'a>>> {
    let mut lines = Vec::with_capacity(request.items.len());
    for input in &request.items {
        tally_core::validation::validate_quantity("quantity", input.quantity)?;

        let mut products = ProductRepository::new(&mut *conn);
        let product = products.get_by_id(input.product_id).await?;
        let units = if settings.units_enabled {
            products.units(product.id).await?
        } else {
            Vec::new()
        };

        let unit = resolve_unit(
            &units,
            &UnitRequest {
                unit_name: input.unit_name.as_deref(),
                unit_factor: input.unit_factor,
                unit_price: input.unit_price,
            },
            product.selling_price,
        )?;
        let base = quantity_base(input.quantity, unit.factor)?;
        let subtotal = sale_line_subtotal(input.quantity, unit.unit_price, input.discount)?;

        lines.push(PricedLine {
            input,
            product,
            unit,
            quantity_base: base,
            subtotal,
        });
    }
    Ok(lines)
}

fn new_item(line: &PricedLine<'_>, batch_id: Option<i64>) -> NewSaleItem {
    NewSaleItem {
        product_id: line.product.id,
        product_name: line.product.name.clone(),
        quantity: line.input.quantity,
        unit_name: line.unit.unit_name.clone(),
        unit_factor: line.unit.factor,
        quantity_base: line.quantity_base,
        batch_id,
        unit_price: line.unit.unit_price,
        discount: line.input.discount,
        subtotal: line.subtotal,
    }
}

#[allow(clippy::too_many_arguments)]
fn out_movement(
    line: &PricedLine<'_>,
    sale_id: i64,
    batch_id: Option<i64>,
    quantity: i64,
    stock: (i64, i64),
    cost_per_unit: Money,
    total_cost: Money,
    created_by: Option<i64>,
) -> NewMovement {
    NewMovement {
        product_id: line.product.id,
        batch_id,
        movement_type: MovementType::Out,
        reason: MovementReason::Sale,
        quantity_base: quantity,
        unit_name: line.unit.unit_name.clone(),
        unit_factor: line.unit.factor,
        stock_before: stock.0,
        stock_after: stock.1,
        cost_per_unit,
        total_cost,
        source_type: Some(MovementSource::Sale),
        source_id: Some(sale_id),
        idempotency_key: None,
        notes: None,
        created_by,
    }
}

/// Draws the line from batches in FEFO order, one movement per batch.
async fn cost_line_fifo(
    conn: &mut SqliteConnection,
    sale_id: i64,
    line: &PricedLine<'_>,
    created_by: Option<i64>,
) -> EngineResult<LineCost> {
    let plan = FifoService::new(&mut *conn)
        .deplete(line.product.id, line.quantity_base)
        .await?;
    if !plan.is_complete() {
        return Err(EngineError::InsufficientStock {
            product: line.product.name.clone(),
            available: plan.allocated(),
            requested: line.quantity_base,
        });
    }

    let single_batch = match plan.depletions.as_slice() {
        [only] => Some(only.batch_id),
        _ => None,
    };
    let item = SaleRepository::new(&mut *conn)
        .insert_item(sale_id, &new_item(line, single_batch))
        .await?;

    for depletion in &plan.depletions {
        SaleRepository::new(&mut *conn)
            .insert_depletion(sale_id, item.id, line.product.id, depletion)
            .await?;
        let stock = ProductRepository::new(&mut *conn)
            .adjust_stock(line.product.id, -depletion.quantity)
            .await?;
        MovementRepository::new(&mut *conn)
            .insert(&out_movement(
                line,
                sale_id,
                Some(depletion.batch_id),
                depletion.quantity,
                stock,
                depletion.cost_per_unit,
                depletion.total_cost,
                created_by,
            ))
            .await?;
    }

    Ok(LineCost {
        cogs: plan.total_cost,
        movements: plan.depletions.len(),
    })
}

/// Costs the line at the product's cost price. A named batch is drawn down too.
async fn cost_line_legacy(
    conn: &mut SqliteConnection,
    sale_id: i64,
    line: &PricedLine<'_>,
    created_by: Option<i64>,
) -> EngineResult<LineCost> {
    if let Some(batch_id) = line.input.batch_id {
        let mut batches = BatchRepository::new(&mut *conn);
        let batch = batches.get_by_id(batch_id).await?;
        if batch.product_id != line.product.id {
            return Err(EngineError::invalid_state(format!(
                "batch {} does not belong to product {}",
                batch_id, line.product.id
            )));
        }
        let left = batch.quantity_on_hand - line.quantity_base;
        if left < 0 {
            return Err(EngineError::InsufficientStock {
                product: line.product.name.clone(),
                available: batch.quantity_on_hand,
                requested: line.quantity_base,
            });
        }
        batches.set_on_hand(batch_id, left).await?;
    }

    SaleRepository::new(&mut *conn)
        .insert_item(sale_id, &new_item(line, line.input.batch_id))
        .await?;

    let cost = line
        .product
        .cost_price
        .checked_mul_qty(line.quantity_base, "cogs")?;
    let stock = ProductRepository::new(&mut *conn)
        .adjust_stock(line.product.id, -line.quantity_base)
        .await?;
    MovementRepository::new(&mut *conn)
        .insert(&out_movement(
            line,
            sale_id,
            line.input.batch_id,
            line.quantity_base,
            stock,
            line.product.cost_price,
            cost,
            created_by,
        ))
        .await?;

    Ok(LineCost {
        cogs: cost,
        movements: 1,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrators::test_support::*;
    use crate::pool::{Database, DbConfig};
    use crate::repository::product::NewProductUnit;
    use crate::repository::{AccountRepository, PartyRepository};
    use chrono::NaiveDate;
    use tally_core::DocumentStatus;

    fn item(product_id: i64, quantity: i64) -> SaleItemInput {
        SaleItemInput {
            product_id,
            quantity,
            ..SaleItemInput::default()
        }
    }

    fn cash_sale(product_id: i64, quantity: i64, paid: i64) -> CreateSaleRequest {
        CreateSaleRequest {
            items: vec![item(product_id, quantity)],
            paid_amount: Money::from_minor(paid),
            ..CreateSaleRequest::default()
        }
    }

    #[tokio::test]
    async fn test_fifo_sale_costs_expiring_batch_first() {
        let engine = engine().await;
        let p = product(&engine, "Yogurt", 100, 250).await;
        let a = receive(&engine, p, "A", 5, 100, None).await;
        let b = receive(&engine, p, "B", 10, 120, NaiveDate::from_ymd_opt(2025, 1, 1)).await;

        let receipt = engine.create_sale(cash_sale(p, 8, 2_000)).await.unwrap();
        let d = &receipt.diagnostics;
        assert!(d.fifo_used);
        assert_eq!(d.movements_created, 1);
        assert_eq!(d.cogs, Money::from_minor(960));
        assert_eq!(d.profit, Money::from_minor(1_040));
        assert_eq!(d.margin_bps, 5_200);
        assert!(d.payment.created);
        assert!(d.journal.created);
        assert_eq!(d.ledger.reason, Some(SkipReason::NothingOutstanding));

        let sale = &receipt.sale;
        assert!(sale.invoice_number.starts_with("INV-"));
        assert_eq!(sale.status, DocumentStatus::Completed);
        assert_eq!(sale.items[0].batch_id, Some(b));

        let mut conn = engine.database().acquire().await.unwrap();
        let mut batches = BatchRepository::new(&mut conn);
        assert_eq!(batches.get_by_id(b).await.unwrap().quantity_on_hand, 2);
        assert_eq!(batches.get_by_id(a).await.unwrap().quantity_on_hand, 5);
        assert_eq!(ProductRepository::new(&mut conn).get_by_id(p).await.unwrap().stock, 7);
        assert_eq!(SaleRepository::new(&mut conn).depletions(sale.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_idempotent_sale_writes_once() {
        let engine = engine().await;
        let p = product(&engine, "Tea", 50, 100).await;
        receive(&engine, p, "T1", 20, 50, None).await;

        let mut request = cash_sale(p, 2, 200);
        request.idempotency_key = Some("sale-42".into());

        let first = engine.create_sale(request.clone()).await.unwrap();
        let second = engine.create_sale(request).await.unwrap();

        assert!(!first.replayed);
        assert!(second.replayed);
        assert_eq!(first.sale.id, second.sale.id);
        assert_eq!(second.diagnostics.journal.reason, Some(SkipReason::IdempotencyHit));

        assert_eq!(count(&engine, "sales").await, 1);
        assert_eq!(count(&engine, "payments").await, 1);
        assert_eq!(count(&engine, "journal_entries").await, 1);
        assert_eq!(count(&engine, "audit_logs").await, 1);

        let stored = engine.get_sale(first.sale.id).await.unwrap();
        assert_eq!(stored.invoice_number, first.sale.invoice_number);
        assert!(matches!(
            engine.get_sale(first.sale.id + 100).await.unwrap_err(),
            EngineError::NotFound { .. }
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sales_with_one_key_write_once() {
        let dir = tempfile::tempdir().unwrap();
        let engine = file_engine(&dir, 4).await;
        let p = product(&engine, "Rice", 50, 100).await;
        receive(&engine, p, "R1", 100, 50, None).await;
        let c = customer(&engine, "Bilal").await;

        let request = CreateSaleRequest {
            customer_id: Some(c),
            items: vec![item(p, 2)],
            payment_type: PaymentType::Mixed,
            paid_amount: Money::from_minor(80),
            idempotency_key: Some("sale-race".into()),
            ..CreateSaleRequest::default()
        };

        let mut handles = Vec::new();
        for _ in 0..4 {
            let engine = engine.clone();
            let request = request.clone();
            handles.push(tokio::spawn(async move { engine.create_sale(request).await }));
        }
        let mut receipts = Vec::new();
        for handle in handles {
            receipts.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(receipts.iter().filter(|r| r.replayed).count(), 3);
        assert!(receipts.iter().all(|r| r.sale.id == receipts[0].sale.id));
        for table in ["sales", "payments", "journal_entries", "customer_ledger", "audit_logs"] {
            assert_eq!(count(&engine, table).await, 1, "{table}");
        }

        let mut conn = engine.database().acquire().await.unwrap();
        assert_eq!(ProductRepository::new(&mut conn).get_by_id(p).await.unwrap().stock, 98);
        drop(conn);
        assert!(engine.reconciliation().reconcile_all().await.unwrap().is_clean());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_unkeyed_sales_all_commit() {
        let dir = tempfile::tempdir().unwrap();
        let engine = file_engine(&dir, 4).await;
        let p = product(&engine, "Salt", 10, 30).await;
        receive(&engine, p, "S1", 10, 10, None).await;

        let mut handles = Vec::new();
        for _ in 0..4 {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move { engine.create_sale(cash_sale(p, 2, 60)).await }));
        }
        for handle in handles {
            assert!(!handle.await.unwrap().unwrap().replayed);
        }

        assert_eq!(count(&engine, "sales").await, 4);
        let mut conn = engine.database().acquire().await.unwrap();
        assert_eq!(ProductRepository::new(&mut conn).get_by_id(p).await.unwrap().stock, 2);
        drop(conn);
        assert!(engine.reconciliation().reconcile_all().await.unwrap().is_clean());
    }

    #[tokio::test]
    async fn test_zero_total_sale_books_no_zero_lines() {
        let engine = engine().await;
        let free = product(&engine, "Sample", 0, 0).await;
        receive(&engine, free, "F1", 5, 0, None).await;

        let receipt = engine.create_sale(cash_sale(free, 1, 0)).await.unwrap();
        assert_eq!(receipt.sale.total, Money::ZERO);
        assert_eq!(receipt.diagnostics.journal.reason, Some(SkipReason::EmptyJournal));
        assert_eq!(count(&engine, "journal_entries").await, 0);

        let gift = product(&engine, "Gift", 40, 0).await;
        receive(&engine, gift, "G1", 5, 40, None).await;
        let receipt = engine.create_sale(cash_sale(gift, 2, 0)).await.unwrap();
        assert!(receipt.diagnostics.journal.created);
        assert_eq!(count(&engine, "journal_lines").await, 2);
        let zero_lines: i64 = {
            let mut conn = engine.database().acquire().await.unwrap();
            sqlx::query_scalar("SELECT COUNT(*) FROM journal_lines WHERE debit = 0 AND credit = 0")
                .fetch_one(&mut *conn)
                .await
                .unwrap()
        };
        assert_eq!(zero_lines, 0);
    }

    #[tokio::test]
    async fn test_missing_revenue_account_still_sells() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let engine = Engine::with_database(db, true);
        {
            let mut conn = engine.database().acquire().await.unwrap();
            AccountRepository::new(&mut conn)
                .create("1001", "Cash", tally_core::accounting::AccountType::Asset, true)
                .await
                .unwrap();
        }
        let p = product(&engine, "Bread", 0, 1_000).await;
        receive(&engine, p, "B1", 3, 0, None).await;

        let receipt = engine.create_sale(cash_sale(p, 1, 1_000)).await.unwrap();
        let journal = &receipt.diagnostics.journal;
        assert!(!journal.created);
        assert_eq!(journal.reason, Some(SkipReason::MissingChartAccounts));
        assert!(journal.missing_account_codes.contains(&"4001".to_string()));
        assert_eq!(count(&engine, "sales").await, 1);
        assert_eq!(count(&engine, "journal_entries").await, 0);
    }

    #[tokio::test]
    async fn test_insufficient_stock_rolls_back() {
        let engine = engine().await;
        let p = product(&engine, "Milk", 80, 100).await;
        let batch = receive(&engine, p, "M1", 3, 80, None).await;

        let request = CreateSaleRequest {
            items: vec![item(p, 2), item(p, 2)],
            ..CreateSaleRequest::default()
        };
        let err = engine.create_sale(request).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::InsufficientStock { available: 3, requested: 4, .. }
        ));

        assert_eq!(count(&engine, "sales").await, 0);
        let mut conn = engine.database().acquire().await.unwrap();
        assert_eq!(BatchRepository::new(&mut conn).get_by_id(batch).await.unwrap().quantity_on_hand, 3);
    }

    #[tokio::test]
    async fn test_credit_sale_with_units_and_interest() {
        let engine = engine().await;
        let p = product(&engine, "Water", 40, 60).await;
        receive(&engine, p, "W1", 48, 40, None).await;
        {
            let mut conn = engine.database().acquire().await.unwrap();
            ProductRepository::new(&mut conn)
                .add_unit(
                    p,
                    &NewProductUnit {
                        unit_name: "carton".into(),
                        factor_to_base: 12,
                        selling_price: Some(Money::from_minor(600)),
                        is_default: false,
                    },
                )
                .await
                .unwrap();
        }
        let c = customer(&engine, "Ali").await;

        let request = CreateSaleRequest {
            customer_id: Some(c),
            items: vec![SaleItemInput {
                product_id: p,
                quantity: 2,
                unit_name: Some("carton".into()),
                unit_price: Some(Money::from_minor(1)),
                ..SaleItemInput::default()
            }],
            payment_type: PaymentType::Credit,
            payment_method: PaymentMethod::Credit,
            paid_amount: Money::from_minor(200),
            interest_rate_bps: 1_000,
            ..CreateSaleRequest::default()
        };
        let receipt = engine.create_sale(request).await.unwrap();
        let sale = &receipt.sale;

        assert_eq!(sale.items[0].quantity_base, 24);
        assert_eq!(sale.items[0].unit_price, Money::from_minor(600));
        assert_eq!(sale.interest_amount, Money::from_minor(120));
        assert_eq!(sale.total, Money::from_minor(1_320));
        assert_eq!(sale.remaining_amount, Money::from_minor(1_120));
        assert_eq!(sale.status, DocumentStatus::Pending);
        assert!(receipt.diagnostics.ledger.created);

        let mut conn = engine.database().acquire().await.unwrap();
        let debt = PartyRepository::new(&mut conn).get_customer(c).await.unwrap().total_debt;
        assert_eq!(debt, Money::from_minor(1_120));
    }

    #[tokio::test]
    async fn test_validation_failures() {
        let engine = engine().await;
        let p = product(&engine, "Soap", 10, 20).await;
        receive(&engine, p, "S1", 10, 10, None).await;

        let err = engine.create_sale(CreateSaleRequest::default()).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let mut card = cash_sale(p, 1, 20);
        card.payment_method = PaymentMethod::Card;
        assert!(matches!(engine.create_sale(card).await.unwrap_err(), EngineError::Validation(_)));

        let mut credit = cash_sale(p, 1, 0);
        credit.payment_type = PaymentType::Credit;
        assert!(matches!(engine.create_sale(credit).await.unwrap_err(), EngineError::Validation(_)));

        let mut uneven = cash_sale(p, 1, 0);
        uneven.customer_id = Some(customer(&engine, "Sara").await);
        uneven.payment_type = PaymentType::Mixed;
        uneven.interest_rate_bps = 3;
        assert!(matches!(engine.create_sale(uneven).await.unwrap_err(), EngineError::Validation(_)));

        let missing = cash_sale(999, 1, 0);
        assert!(matches!(engine.create_sale(missing).await.unwrap_err(), EngineError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_legacy_costing_path() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let engine = Engine::with_database(db, false);
        engine.chart().initialize().await.unwrap();
        let p = product(&engine, "Rice", 70, 100).await;
        let batch = receive(&engine, p, "R1", 10, 70, None).await;

        let mut request = cash_sale(p, 4, 400);
        request.items[0].batch_id = Some(batch);
        let receipt = engine.create_sale(request).await.unwrap();

        assert!(!receipt.diagnostics.fifo_used);
        assert_eq!(receipt.diagnostics.cogs, Money::from_minor(280));
        assert_eq!(receipt.diagnostics.movements_created, 1);

        let mut conn = engine.database().acquire().await.unwrap();
        assert_eq!(BatchRepository::new(&mut conn).get_by_id(batch).await.unwrap().quantity_on_hand, 6);
        assert_eq!(ProductRepository::new(&mut conn).get_by_id(p).await.unwrap().stock, 6);
    }
}
