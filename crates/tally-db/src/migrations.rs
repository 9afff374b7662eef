//! # Database Migrations
//!
//! Embedded SQL migrations for Tally.
//!
//! ```text
//! Database::new()
//!      │
//!      ▼
//! _sqlx_migrations ──► compare with embedded set ──► apply pending in order
//!      │
//!      └── 001_initial_schema.sql   ledger, inventory, documents, audit
//! ```
//!
//! A database that has applied migrations this build does not know about was
//! written by a newer engine. Opening it is refused rather than risking
//! writes against a schema the repositories were not written for.
//!
//! ## Adding New Migrations
//!
//! 1. Create `migrations/sqlite/NNN_description.sql` with the next number
//! 2. **NEVER** modify an applied migration; add a new one

use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::error::{DbError, DbResult};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/sqlite");

/// Embedded vs applied migration counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationStatus {
    pub embedded: usize,
    pub applied: usize,
}

impl MigrationStatus {
    pub fn pending(&self) -> usize {
        self.embedded.saturating_sub(self.applied)
    }

    /// The database carries migrations from a newer build.
    pub fn is_ahead(&self) -> bool {
        self.applied > self.embedded
    }
}

/// Applies every pending migration, refusing databases from a newer build.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    let before = migration_status(pool).await?;
    if before.is_ahead() {
        warn!(
            embedded = before.embedded,
            applied = before.applied,
            "Database schema is newer than this build"
        );
        return Err(DbError::MigrationFailed(format!(
            "database has {} applied migrations, this build knows {}",
            before.applied, before.embedded
        )));
    }

    MIGRATOR.run(pool).await?;

    info!(applied = before.pending(), "Migrations up to date");
    Ok(())
}

/// Reads the migration bookkeeping table. A fresh database reports zero
/// applied migrations.
pub async fn migration_status(pool: &SqlitePool) -> DbResult<MigrationStatus> {
    let table_exists: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations'",
    )
    .fetch_one(pool)
    .await?;

    let applied = if table_exists == 0 {
        0
    } else {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1")
            .fetch_one(pool)
            .await?
    };

    Ok(MigrationStatus {
        embedded: MIGRATOR.migrations.len(),
        applied: usize::try_from(applied).unwrap_or(0),
    })
}
