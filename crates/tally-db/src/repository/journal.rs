//! # Journal Repository
//!
//! Journal entries and their lines.
//!
//! ## Entry Lifecycle
//! ```text
//! ┌──────────────┐  post   ┌──────────────┐ reverse ┌──────────────────────┐
//! │  unposted    │────────►│   posted     │────────►│ posted, is_reversed  │
//! │ batch = NULL │◄────────│ batch = B    │         │ + REV-… entry posted │
//! └──────────────┘ unpost  └──────────────┘         └──────────────────────┘
//! ```
//! Status flips live here; the balance side effects live in the posting
//! manager.

use chrono::{NaiveDate, Utc};
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::{DbError, DbResult};
use tally_core::accounting::{JournalEntry, JournalLine, JournalSourceType};
use tally_core::Money;

/// Insert payload for a journal entry.
#[derive(Debug, Clone)]
pub struct NewJournalEntry {
    pub entry_number: String,
    pub entry_date: NaiveDate,
    pub description: String,
    pub source_type: Option<JournalSourceType>,
    pub source_id: Option<i64>,
    pub is_posted: bool,
    pub reversal_of_id: Option<i64>,
    pub posting_batch_id: Option<i64>,
    pub total_amount: Money,
    pub currency: String,
    pub notes: Option<String>,
    pub created_by: Option<i64>,
}

/// Insert payload for one line; `account_id` is already resolved.
#[derive(Debug, Clone)]
pub struct NewJournalLine {
    pub account_id: i64,
    pub debit: Money,
    pub credit: Money,
    pub description: Option<String>,
}

pub struct JournalRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> JournalRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        JournalRepository { conn }
    }

    /// Inserts the header and all lines, returning the entry with lines.
    pub async fn insert(
        &mut self,
        entry: &NewJournalEntry,
        lines: &[NewJournalLine],
    ) -> DbResult<JournalEntry> {
        debug!(
            entry_number = %entry.entry_number,
            lines = lines.len(),
            posted = entry.is_posted,
            "Inserting journal entry"
        );

        let mut created = sqlx::query_as::<_, JournalEntry>(
            r#"
            INSERT INTO journal_entries (
                entry_number, entry_date, description, source_type, source_id,
                is_posted, is_reversed, reversal_of_id, posting_batch_id,
                total_amount, currency, notes, created_at, created_by
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            RETURNING *
            "#,
        )
        .bind(&entry.entry_number)
        .bind(entry.entry_date)
        .bind(&entry.description)
        .bind(entry.source_type)
        .bind(entry.source_id)
        .bind(entry.is_posted)
        .bind(entry.reversal_of_id)
        .bind(entry.posting_batch_id)
        .bind(entry.total_amount)
        .bind(&entry.currency)
        .bind(&entry.notes)
        .bind(Utc::now())
        .bind(entry.created_by)
        .fetch_one(&mut *self.conn)
        .await?;

        let mut inserted = Vec::with_capacity(lines.len());
        for line in lines {
            let row = sqlx::query_as::<_, JournalLine>(
                r#"
                INSERT INTO journal_lines (journal_entry_id, account_id, debit, credit, description)
                VALUES (?1, ?2, ?3, ?4, ?5)
                RETURNING *
                "#,
            )
            .bind(created.id)
            .bind(line.account_id)
            .bind(line.debit)
            .bind(line.credit)
            .bind(&line.description)
            .fetch_one(&mut *self.conn)
            .await?;
            inserted.push(row);
        }

        created.lines = inserted;
        Ok(created)
    }

    /// Fetches an entry with its lines.
    pub async fn get_by_id(&mut self, id: i64) -> DbResult<JournalEntry> {
        let mut entry = sqlx::query_as::<_, JournalEntry>("SELECT * FROM journal_entries WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?
            .ok_or_else(|| DbError::not_found("JournalEntry", id))?;

        entry.lines = self.lines_for(id).await?;
        Ok(entry)
    }

    pub async fn lines_for(&mut self, entry_id: i64) -> DbResult<Vec<JournalLine>> {
        let lines = sqlx::query_as::<_, JournalLine>(
            "SELECT * FROM journal_lines WHERE journal_entry_id = ?1 ORDER BY id",
        )
        .bind(entry_id)
        .fetch_all(&mut *self.conn)
        .await?;
        Ok(lines)
    }

    /// Unposted, unreversed entries dated within `[start, end]`, oldest first.
    pub async fn find_unposted_in_range(
        &mut self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> DbResult<Vec<JournalEntry>> {
        let entries = sqlx::query_as::<_, JournalEntry>(
            r#"
            SELECT * FROM journal_entries
            WHERE is_posted = 0 AND is_reversed = 0
              AND entry_date >= ?1 AND entry_date <= ?2
            ORDER BY entry_date, id
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&mut *self.conn)
        .await?;

        let mut with_lines = Vec::with_capacity(entries.len());
        for mut entry in entries {
            entry.lines = self.lines_for(entry.id).await?;
            with_lines.push(entry);
        }
        Ok(with_lines)
    }

    pub async fn mark_posted(&mut self, id: i64, batch_id: Option<i64>) -> DbResult<()> {
        self.update_flags(
            "UPDATE journal_entries SET is_posted = 1, posting_batch_id = ?2 WHERE id = ?1",
            id,
            batch_id,
        )
        .await
    }

    pub async fn mark_unposted(&mut self, id: i64) -> DbResult<()> {
        self.update_flags(
            "UPDATE journal_entries SET is_posted = 0, posting_batch_id = ?2 WHERE id = ?1",
            id,
            None,
        )
        .await
    }

    pub async fn mark_reversed(&mut self, id: i64) -> DbResult<()> {
        let result = sqlx::query("UPDATE journal_entries SET is_reversed = 1 WHERE id = ?1")
            .bind(id)
            .execute(&mut *self.conn)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("JournalEntry", id));
        }
        Ok(())
    }

    async fn update_flags(&mut self, sql: &str, id: i64, batch_id: Option<i64>) -> DbResult<()> {
        let result = sqlx::query(sql)
            .bind(id)
            .bind(batch_id)
            .execute(&mut *self.conn)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("JournalEntry", id));
        }
        Ok(())
    }

    /// Number of entries recorded for one source document.
    pub async fn count_by_source(
        &mut self,
        source_type: JournalSourceType,
        source_id: i64,
    ) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM journal_entries WHERE source_type = ?1 AND source_id = ?2",
        )
        .bind(source_type)
        .bind(source_id)
        .fetch_one(&mut *self.conn)
        .await?;
        Ok(count)
    }
}
