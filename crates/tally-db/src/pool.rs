//! # Database Pool Management
//!
//! SQLite pool setup plus the two entry points every caller uses:
//! [`Database::begin`] for a business event and [`Database::acquire`] for
//! reads.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  EngineConfig::db_config()                                              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Database::new(config) ──► SqlitePool (WAL, foreign keys, busy wait)    │
//! │       │                    └── run_migrations                           │
//! │       │                                                                 │
//! │       ├── begin()   ──► Transaction    CreateSale, AddPayment, ...      │
//! │       └── acquire() ──► PoolConnection reconciliation, listings, audit  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! SQLite admits one writer at a time. WAL lets reconciliation read while an
//! orchestrator holds the write lock. Every [`Database::begin`] is
//! `BEGIN IMMEDIATE`, and `busy_timeout` makes a second writer wait at BEGIN
//! instead of failing with `SQLITE_BUSY`.

use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::migrations::{self, MigrationStatus};

// =============================================================================
// Configuration
// =============================================================================

/// Pool settings.
///
/// ```rust,ignore
/// let config = DbConfig::new("/var/lib/tally/tally.db")
///     .max_connections(8)
///     .busy_timeout(Duration::from_secs(10));
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub database_path: PathBuf,
    pub in_memory: bool,
    pub max_connections: u32,
    /// How long `acquire`/`begin` wait for a free connection.
    pub acquire_timeout: Duration,
    /// How long a writer waits on SQLite's file lock.
    pub busy_timeout: Duration,
    pub run_migrations: bool,
}

impl DbConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            in_memory: false,
            max_connections: 5,
            acquire_timeout: Duration::from_secs(30),
            busy_timeout: Duration::from_secs(5),
            run_migrations: true,
        }
    }

    /// Private in-memory database.
    ///
    /// The schema lives in the one connection, so the pool is capped at one
    /// and callers must never hold a transaction while acquiring again.
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(":memory:"),
            in_memory: true,
            max_connections: 1,
            acquire_timeout: Duration::from_secs(5),
            busy_timeout: Duration::from_secs(1),
            run_migrations: true,
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        if !self.in_memory {
            self.max_connections = max.max(1);
        }
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn without_migrations(mut self) -> Self {
        self.run_migrations = false;
        self
    }

    fn connect_options(&self) -> SqliteConnectOptions {
        let options = if self.in_memory {
            SqliteConnectOptions::new().in_memory(true)
        } else {
            SqliteConnectOptions::new()
                .filename(&self.database_path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
        };

        options
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(self.busy_timeout)
    }
}

// =============================================================================
// Database
// =============================================================================

/// Shared handle to the pool. Cheap to clone.
///
/// Repositories borrow a connection instead of owning the pool, so the same
/// repository call works inside a transaction and on a plain connection:
///
/// ```rust,ignore
/// let mut tx = db.begin().await?;
/// let product = ProductRepository::new(&mut tx).get_by_id(7).await?;
/// BatchRepository::new(&mut tx).set_on_hand(batch_id, 0).await?;
/// tx.commit().await?;
/// ```
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens the pool and brings the schema up to date.
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(
            path = %config.database_path.display(),
            max_connections = config.max_connections,
            "Opening database"
        );

        let options = config.connect_options();
        debug!(busy_timeout_ms = config.busy_timeout.as_millis() as u64, "Connect options ready");

        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout);
        if config.in_memory {
            // Dropping the last connection would drop the schema with it.
            pool_options = pool_options
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        let db = Database { pool };
        if config.run_migrations {
            migrations::run_migrations(&db.pool).await?;
        }
        Ok(db)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Starts the write transaction that one business event commits or
    /// rolls back.
    ///
    /// Opens with `BEGIN IMMEDIATE`, so the write lock is taken at BEGIN and
    /// a concurrent writer waits out `busy_timeout` there. Under WAL a
    /// deferred transaction that has already read cannot wait for the lock;
    /// its first write fails with `SQLITE_BUSY`.
    pub async fn begin(&self) -> DbResult<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin_with("BEGIN IMMEDIATE").await?)
    }

    /// Acquires a pooled connection for reads outside a transaction.
    pub async fn acquire(&self) -> DbResult<PoolConnection<Sqlite>> {
        Ok(self.pool.acquire().await?)
    }

    /// Migration bookkeeping for health endpoints and startup logs.
    pub async fn schema_status(&self) -> DbResult<MigrationStatus> {
        migrations::migration_status(&self.pool).await
    }

    pub async fn close(&self) {
        info!("Closing database pool");
        self.pool.close().await;
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
