//! # Party Repository
//!
//! Customers and suppliers. Both carry one cached balance column, so most
//! operations take a [`PartyKind`] and pick the table from it.
//!
//! ```text
//! PartyKind::Customer → customers.total_debt
//! PartyKind::Supplier → suppliers.current_balance
//! ```

use chrono::Utc;
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::{DbError, DbResult};
use tally_core::{Customer, Money, PartyKind, Supplier};

/// Table and balance column for a party kind.
fn columns(kind: PartyKind) -> (&'static str, &'static str) {
    match kind {
        PartyKind::Customer => ("customers", "total_debt"),
        PartyKind::Supplier => ("suppliers", "current_balance"),
    }
}

pub struct PartyRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> PartyRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        PartyRepository { conn }
    }

    pub async fn create_customer(&mut self, name: &str, phone: Option<&str>) -> DbResult<Customer> {
        debug!(name = %name, "Creating customer");

        let customer = sqlx::query_as::<_, Customer>(
            r#"
            INSERT INTO customers (name, phone, total_debt, created_at)
            VALUES (?1, ?2, 0, ?3)
            RETURNING *
            "#,
        )
        .bind(name)
        .bind(phone)
        .bind(Utc::now())
        .fetch_one(&mut *self.conn)
        .await?;

        Ok(customer)
    }

    pub async fn create_supplier(&mut self, name: &str, phone: Option<&str>) -> DbResult<Supplier> {
        debug!(name = %name, "Creating supplier");

        let supplier = sqlx::query_as::<_, Supplier>(
            r#"
            INSERT INTO suppliers (name, phone, current_balance, created_at)
            VALUES (?1, ?2, 0, ?3)
            RETURNING *
            "#,
        )
        .bind(name)
        .bind(phone)
        .bind(Utc::now())
        .fetch_one(&mut *self.conn)
        .await?;

        Ok(supplier)
    }

    pub async fn get_customer(&mut self, id: i64) -> DbResult<Customer> {
        sqlx::query_as::<_, Customer>("SELECT * FROM customers WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?
            .ok_or_else(|| DbError::not_found("Customer", id))
    }

    pub async fn get_supplier(&mut self, id: i64) -> DbResult<Supplier> {
        sqlx::query_as::<_, Supplier>("SELECT * FROM suppliers WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?
            .ok_or_else(|| DbError::not_found("Supplier", id))
    }

    pub async fn exists(&mut self, kind: PartyKind, id: i64) -> DbResult<bool> {
        let (table, _) = columns(kind);
        let sql = format!("SELECT COUNT(*) FROM {table} WHERE id = ?1");
        let count: i64 = sqlx::query_scalar(&sql)
            .bind(id)
            .fetch_one(&mut *self.conn)
            .await?;
        Ok(count > 0)
    }

    /// Cached balance of one party.
    pub async fn balance(&mut self, kind: PartyKind, id: i64) -> DbResult<Money> {
        let (table, column) = columns(kind);
        let sql = format!("SELECT {column} FROM {table} WHERE id = ?1");
        let balance: Option<Money> = sqlx::query_scalar(&sql)
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?;
        balance.ok_or_else(|| DbError::not_found(kind.to_string(), id))
    }

    /// Overwrites the cached balance.
    pub async fn set_balance(&mut self, kind: PartyKind, id: i64, balance: Money) -> DbResult<()> {
        let (table, column) = columns(kind);
        debug!(party = %kind, id, balance = %balance, "Setting cached party balance");

        let sql = format!("UPDATE {table} SET {column} = ?1 WHERE id = ?2");
        let result = sqlx::query(&sql)
            .bind(balance)
            .bind(id)
            .execute(&mut *self.conn)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found(kind.to_string(), id));
        }
        Ok(())
    }

    /// `(party_id, cached balance)` for every party of a kind.
    pub async fn balances(&mut self, kind: PartyKind) -> DbResult<Vec<(i64, Money)>> {
        let (table, column) = columns(kind);
        let sql = format!("SELECT id, {column} FROM {table} ORDER BY id");
        let rows: Vec<(i64, Money)> = sqlx::query_as(&sql).fetch_all(&mut *self.conn).await?;
        Ok(rows)
    }
}
