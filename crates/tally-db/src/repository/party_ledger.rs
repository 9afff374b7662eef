//! # Party Ledger Repository
//!
//! Append-only customer and supplier ledgers.
//!
//! ## Balance Chain
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  customer_ledger (customer 7)                                           │
//! │                                                                         │
//! │  id  type      amount   balance_after                                   │
//! │  ──  ────────  ──────   ─────────────                                   │
//! │  1   invoice   +7,000         7,000     ◄── sale on credit             │
//! │  2   payment   −2,000         5,000     ◄── customer pays              │
//! │  3   invoice   +1,000         6,000                                     │
//! │                                                                         │
//! │  balance_after(n) = balance_after(n−1) + amount(n), starting at 0      │
//! │  customers.total_debt mirrors the last balance_after                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Rows are never updated. Corrections are new `adjustment` rows.

use chrono::Utc;
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::DbResult;
use crate::repository::party::PartyRepository;
use tally_core::{LedgerTransactionType, Money, PartyKind, PartyLedgerEntry};

/// Insert payload for a ledger row. `balance_after` is computed.
#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    pub party_id: i64,
    pub transaction_type: LedgerTransactionType,
    /// Signed.
    pub amount: Money,
    /// Sale id for customers, purchase id for suppliers.
    pub document_id: Option<i64>,
    pub payment_id: Option<i64>,
    pub journal_entry_id: Option<i64>,
    pub notes: Option<String>,
    pub created_by: Option<i64>,
}

/// Table, party column and document column for a ledger.
fn columns(kind: PartyKind) -> (&'static str, &'static str, &'static str) {
    match kind {
        PartyKind::Customer => ("customer_ledger", "customer_id", "sale_id"),
        PartyKind::Supplier => ("supplier_ledger", "supplier_id", "purchase_id"),
    }
}

fn select_sql(kind: PartyKind) -> String {
    let (table, party, document) = columns(kind);
    format!(
        "SELECT id, {party} AS party_id, transaction_type, amount, balance_after, \
         {document} AS document_id, payment_id, journal_entry_id, notes, created_at, created_by \
         FROM {table}"
    )
}

pub struct PartyLedgerRepository<'c> {
    conn: &'c mut SqliteConnection,
    kind: PartyKind,
}

impl<'c> PartyLedgerRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection, kind: PartyKind) -> Self {
        PartyLedgerRepository { conn, kind }
    }

    /// Last `balance_after` for a party, or zero when it has no rows.
    pub async fn last_balance(&mut self, party_id: i64) -> DbResult<Money> {
        let (table, party, _) = columns(self.kind);
        let sql = format!("SELECT balance_after FROM {table} WHERE {party} = ?1 ORDER BY id DESC LIMIT 1");
        let last: Option<Money> = sqlx::query_scalar(&sql)
            .bind(party_id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(last.unwrap_or(Money::ZERO))
    }

    /// Appends a row chained onto the last balance and refreshes the
    /// party's cached balance to match.
    pub async fn append(&mut self, entry: &NewLedgerEntry) -> DbResult<PartyLedgerEntry> {
        let last = self.last_balance(entry.party_id).await?;
        let balance_after = last + entry.amount;

        debug!(
            party = %self.kind,
            party_id = entry.party_id,
            amount = %entry.amount,
            balance_after = %balance_after,
            "Appending party ledger row"
        );

        let (table, party, document) = columns(self.kind);
        let sql = format!(
            "INSERT INTO {table} ({party}, transaction_type, amount, balance_after, {document}, \
             payment_id, journal_entry_id, notes, created_at, created_by) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10) \
             RETURNING id, {party} AS party_id, transaction_type, amount, balance_after, \
             {document} AS document_id, payment_id, journal_entry_id, notes, created_at, created_by"
        );

        let created = sqlx::query_as::<_, PartyLedgerEntry>(&sql)
            .bind(entry.party_id)
            .bind(entry.transaction_type)
            .bind(entry.amount)
            .bind(balance_after)
            .bind(entry.document_id)
            .bind(entry.payment_id)
            .bind(entry.journal_entry_id)
            .bind(&entry.notes)
            .bind(Utc::now())
            .bind(entry.created_by)
            .fetch_one(&mut *self.conn)
            .await?;

        PartyRepository::new(&mut *self.conn)
            .set_balance(self.kind, entry.party_id, balance_after)
            .await?;

        Ok(created)
    }

    pub async fn find_by_payment_id(&mut self, payment_id: i64) -> DbResult<Option<PartyLedgerEntry>> {
        let sql = format!("{} WHERE payment_id = ?1 ORDER BY id LIMIT 1", select_sql(self.kind));
        let entry = sqlx::query_as::<_, PartyLedgerEntry>(&sql)
            .bind(payment_id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(entry)
    }

    pub async fn list(&mut self, party_id: i64) -> DbResult<Vec<PartyLedgerEntry>> {
        let (_, party, _) = columns(self.kind);
        let sql = format!("{} WHERE {party} = ?1 ORDER BY id", select_sql(self.kind));
        let entries = sqlx::query_as::<_, PartyLedgerEntry>(&sql)
            .bind(party_id)
            .fetch_all(&mut *self.conn)
            .await?;
        Ok(entries)
    }

    /// `(party_id, last balance_after)` for every party that has rows.
    pub async fn tail_balances(&mut self) -> DbResult<Vec<(i64, Money)>> {
        let (table, party, _) = columns(self.kind);
        let sql = format!(
            "SELECT l.{party}, l.balance_after FROM {table} l \
             WHERE l.id = (SELECT MAX(id) FROM {table} WHERE {party} = l.{party}) \
             ORDER BY l.{party}"
        );
        let rows: Vec<(i64, Money)> = sqlx::query_as(&sql).fetch_all(&mut *self.conn).await?;
        Ok(rows)
    }
}
