//! # Posting Batch Repository
//!
//! A posting batch groups the entries posted for one period. A `locked`
//! batch freezes its entries against unpost and reversal.

use chrono::{NaiveDate, Utc};
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::{DbError, DbResult};
use tally_core::accounting::{PeriodType, PostingBatch, PostingBatchStatus};
use tally_core::Money;

#[derive(Debug, Clone)]
pub struct NewPostingBatch {
    pub period_type: PeriodType,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub entries_count: i64,
    pub total_amount: Money,
    pub posted_by: Option<i64>,
    pub notes: Option<String>,
}

pub struct PostingBatchRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> PostingBatchRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        PostingBatchRepository { conn }
    }

    /// Creates a batch already in `posted` status.
    pub async fn create_posted(&mut self, batch: &NewPostingBatch) -> DbResult<PostingBatch> {
        debug!(
            start = %batch.period_start,
            end = %batch.period_end,
            entries = batch.entries_count,
            "Creating posting batch"
        );

        let now = Utc::now();
        let created = sqlx::query_as::<_, PostingBatch>(
            r#"
            INSERT INTO posting_batches (
                period_type, period_start, period_end, entries_count, total_amount,
                status, posted_at, posted_by, notes, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?7)
            RETURNING *
            "#,
        )
        .bind(batch.period_type)
        .bind(batch.period_start)
        .bind(batch.period_end)
        .bind(batch.entries_count)
        .bind(batch.total_amount)
        .bind(PostingBatchStatus::Posted)
        .bind(now)
        .bind(batch.posted_by)
        .bind(&batch.notes)
        .fetch_one(&mut *self.conn)
        .await?;

        Ok(created)
    }

    pub async fn get_by_id(&mut self, id: i64) -> DbResult<PostingBatch> {
        sqlx::query_as::<_, PostingBatch>("SELECT * FROM posting_batches WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?
            .ok_or_else(|| DbError::not_found("PostingBatch", id))
    }

    pub async fn set_status(&mut self, id: i64, status: PostingBatchStatus) -> DbResult<()> {
        debug!(batch_id = id, ?status, "Updating posting batch status");

        let result = sqlx::query("UPDATE posting_batches SET status = ?1 WHERE id = ?2")
            .bind(status)
            .bind(id)
            .execute(&mut *self.conn)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("PostingBatch", id));
        }
        Ok(())
    }

    /// `false` for a missing batch.
    pub async fn is_locked(&mut self, id: i64) -> DbResult<bool> {
        let status: Option<PostingBatchStatus> =
            sqlx::query_scalar("SELECT status FROM posting_batches WHERE id = ?1")
                .bind(id)
                .fetch_optional(&mut *self.conn)
                .await?;
        Ok(status == Some(PostingBatchStatus::Locked))
    }
}
