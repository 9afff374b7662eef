//! # Account Repository
//!
//! Chart of accounts and the cached per-account balance.
//!
//! ## Balance Sign
//! ```text
//! accounts.balance = Σ debit − Σ credit   (over posted lines only)
//!
//!   Cash      +5,000   (debit-normal, positive is normal)
//!   Revenue   −5,000   (credit-normal, negative is normal)
//! ```
//! `Account::natural_balance()` flips the sign for credit-normal accounts.

use chrono::{NaiveDate, Utc};
use sqlx::SqliteConnection;
use std::collections::HashMap;
use tracing::debug;

use crate::error::{DbError, DbResult};
use tally_core::accounting::{Account, AccountType, TrialBalanceRow};
use tally_core::Money;

pub struct AccountRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> AccountRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        AccountRepository { conn }
    }

    /// Creates an account with a zero balance.
    pub async fn create(
        &mut self,
        code: &str,
        name: &str,
        account_type: AccountType,
        is_system: bool,
    ) -> DbResult<Account> {
        debug!(code = %code, name = %name, "Creating account");

        let account = sqlx::query_as::<_, Account>(
            r#"
            INSERT INTO accounts (code, name, account_type, is_system, is_active, balance, created_at)
            VALUES (?1, ?2, ?3, ?4, 1, 0, ?5)
            RETURNING *
            "#,
        )
        .bind(code)
        .bind(name)
        .bind(account_type)
        .bind(is_system)
        .bind(Utc::now())
        .fetch_one(&mut *self.conn)
        .await?;

        Ok(account)
    }

    pub async fn get_by_id(&mut self, id: i64) -> DbResult<Account> {
        sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?
            .ok_or_else(|| DbError::not_found("Account", id))
    }

    pub async fn find_by_code(&mut self, code: &str) -> DbResult<Option<Account>> {
        let account = sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE code = ?1")
            .bind(code)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(account)
    }

    pub async fn list(&mut self) -> DbResult<Vec<Account>> {
        let accounts = sqlx::query_as::<_, Account>("SELECT * FROM accounts ORDER BY code")
            .fetch_all(&mut *self.conn)
            .await?;
        Ok(accounts)
    }

    /// Maps each of `codes` to the id of an *active* account with that code.
    ///
    /// Codes with no active account are simply absent from the map.
    pub async fn active_ids_by_code(&mut self, codes: &[&str]) -> DbResult<HashMap<String, i64>> {
        let mut found = HashMap::with_capacity(codes.len());
        for code in codes {
            let id: Option<i64> =
                sqlx::query_scalar("SELECT id FROM accounts WHERE code = ?1 AND is_active = 1")
                    .bind(*code)
                    .fetch_optional(&mut *self.conn)
                    .await?;
            if let Some(id) = id {
                found.insert((*code).to_string(), id);
            }
        }
        Ok(found)
    }

    /// Adds `delta` (debit − credit) to the cached balance.
    pub async fn apply_delta(&mut self, account_id: i64, delta: Money) -> DbResult<()> {
        if delta.is_zero() {
            return Ok(());
        }

        let result = sqlx::query("UPDATE accounts SET balance = balance + ?1 WHERE id = ?2")
            .bind(delta)
            .bind(account_id)
            .execute(&mut *self.conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Account", account_id));
        }
        Ok(())
    }

    /// Per-account totals over posted journal lines.
    ///
    /// `balance` is recomputed from lines, so comparing it with
    /// `accounts.balance` verifies the cache.
    pub async fn trial_balance(&mut self) -> DbResult<Vec<TrialBalanceRow>> {
        self.trial_balance_between(None, None).await
    }

    /// Per-account totals over posted entries dated inside `[from, to]`.
    /// An open bound is unbounded.
    pub async fn trial_balance_between(
        &mut self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> DbResult<Vec<TrialBalanceRow>> {
        let rows = sqlx::query_as::<_, TrialBalanceRow>(
            r#"
            SELECT
                a.id AS account_id,
                a.code AS code,
                a.name AS name,
                a.account_type AS account_type,
                COALESCE(SUM(p.debit), 0) AS debit_total,
                COALESCE(SUM(p.credit), 0) AS credit_total,
                COALESCE(SUM(p.debit - p.credit), 0) AS balance
            FROM accounts a
            LEFT JOIN (
                SELECT l.account_id, l.debit, l.credit
                FROM journal_lines l
                JOIN journal_entries e ON e.id = l.journal_entry_id
                WHERE e.is_posted = 1
                  AND (?1 IS NULL OR e.entry_date >= ?1)
                  AND (?2 IS NULL OR e.entry_date <= ?2)
            ) p ON p.account_id = a.id
            GROUP BY a.id, a.code, a.name, a.account_type
            ORDER BY a.code
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&mut *self.conn)
        .await?;

        Ok(rows)
    }
}
