// crates/db/src/lib.rs
//! Embedded SQLite store for tactical-memory.
//!
//! One store per process, many handles: the pool runs in WAL mode so
//! readers never block and writers serialize. All multi-statement
//! mutations (summary ⇄ tier, project prune) run inside transactions.

pub mod entities;
pub mod fts;
pub mod indexer;
mod migrations;
mod queries;
mod row_types;
#[cfg(test)]
pub(crate) mod test_support;

pub use fts::{escape_fts5, FtsHit};
pub use indexer::{auto_ingest, IngestReport};
pub use queries::jobs::NewJob;
pub use queries::knowledge::{NewKnowledge, PruneCounts};
pub use queries::stats::StoreStats;
pub use queries::summaries::NewSummary;
pub use row_types::{JobRow, KnowledgeRow, MessageRow, SessionRow, SummaryRow};

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Failed to determine state directory")]
    NoStateDir,

    #[error("Failed to create database directory: {0}")]
    CreateDir(#[from] std::io::Error),
}

pub type DbResult<T> = Result<T, DbError>;

/// Main store handle wrapping a SQLite connection pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    db_path: PathBuf,
}

impl Database {
    /// Open (or create) the store at the given path and run migrations.
    pub async fn new(path: &Path) -> DbResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(std::time::Duration::from_secs(30));

        // Sized past the largest worker pool so every background task can
        // hold its own connection.
        let pool = SqlitePoolOptions::new()
            .max_connections(16)
            .connect_with(options)
            .await?;

        let db = Self {
            pool,
            db_path: path.to_owned(),
        };
        db.run_migrations().await?;

        info!("store opened at {}", path.display());
        Ok(db)
    }

    /// Create an in-memory store (for testing).
    ///
    /// `shared_cache(true)` makes all pool connections see the same
    /// database; without it each connection would get its own.
    pub async fn new_in_memory() -> DbResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?
            .shared_cache(true)
            .foreign_keys(true)
            .busy_timeout(std::time::Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        let db = Self {
            pool,
            db_path: PathBuf::new(),
        };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Open the store at the default location: `~/.tactical/memory.sqlite`.
    pub async fn open_default() -> DbResult<Self> {
        let path = tactical_memory_core::paths::db_path().ok_or(DbError::NoStateDir)?;
        Self::new(&path).await
    }

    /// Run all inline migrations.
    ///
    /// A `_migrations` table tracks which versions have been applied so
    /// non-idempotent statements run exactly once.
    async fn run_migrations(&self) -> DbResult<()> {
        sqlx::query("CREATE TABLE IF NOT EXISTS _migrations (version INTEGER PRIMARY KEY)")
            .execute(&self.pool)
            .await?;

        let row: (i64,) = sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM _migrations")
            .fetch_one(&self.pool)
            .await?;
        let current_version = row.0 as usize;

        for (i, migration) in migrations::MIGRATIONS.iter().enumerate() {
            let version = i + 1; // 1-based
            if version <= current_version {
                continue;
            }
            // Multi-statement migrations (FTS table + sync triggers) go
            // through raw_sql, which executes a whole script.
            if migration.contains("BEGIN;") {
                sqlx::raw_sql(migration).execute(&self.pool).await?;
            } else {
                sqlx::query(migration).execute(&self.pool).await?;
            }
            sqlx::query("INSERT INTO _migrations (version) VALUES (?)")
                .bind(version as i64)
                .execute(&self.pool)
                .await?;
        }

        Ok(())
    }

    /// The underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Path of the store file; empty for in-memory stores.
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}
