//! Storage layer for the AgentHive indexer.
//!
//! This module provides database operations for:
//! - Chain state (indexer checkpoint)
//! - Accounts (stake, eligibility, activity counters)
//! - Content (indexed posts and replies, curator votes)
//! - Participation scores
//! - Payout runs and payout lines

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tracing::info;

pub mod accounts;
pub mod chain;
pub mod content;
pub mod payouts;
pub mod scores;
pub mod types;

pub use types::*;

/// Database storage shared by the indexer, the scorer and the distributor.
#[derive(Debug, Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    /// Connect to the given database URL, creating the file if needed.
    ///
    /// # Example
    /// ```no_run
    /// # use agenthive_indexer::storage::Storage;
    /// # async fn example() -> anyhow::Result<()> {
    /// let storage = Storage::new("sqlite://agenthive.db", None, None).await?;
    /// storage.run_migrations().await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn new(
        database_url: &str,
        max_connections: Option<u32>,
        min_connections: Option<u32>,
    ) -> Result<Self> {
        info!(url = %database_url, "Connecting to database");

        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("Invalid database URL: {}", database_url))?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.unwrap_or(5))
            .min_connections(min_connections.unwrap_or(1))
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        info!("Database connection established");

        Ok(Self { pool })
    }

    /// Connect to a SQLite file at `path`.
    pub async fn new_with_path<P: AsRef<Path>>(
        path: P,
        max_connections: Option<u32>,
        min_connections: Option<u32>,
    ) -> Result<Self> {
        let database_url = format!("sqlite://{}", path.as_ref().display());
        Self::new(&database_url, max_connections, min_connections).await
    }

    /// Bring the schema up to date. Safe to call on every start.
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;

        info!("Migrations completed successfully");

        Ok(())
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the database connection pool.
    pub async fn close(&self) {
        info!("Closing database connection");
        self.pool.close().await;
    }

    /// Row counts and checkpoint, for the `status` command.
    pub async fn stats(&self) -> Result<DatabaseStats> {
        let account_count = self.count_rows("accounts").await?;
        let content_count = self.count_rows("content").await?;
        let score_count = self.count_rows("participation_scores").await?;
        let payout_run_count = self.count_rows("payout_runs").await?;

        let chain_state = self.get_chain_state().await?;

        Ok(DatabaseStats {
            account_count: account_count as u64,
            content_count: content_count as u64,
            score_count: score_count as u64,
            payout_run_count: payout_run_count as u64,
            last_indexed_block: chain_state.last_indexed,
            last_irreversible_block: chain_state.last_irreversible,
        })
    }

    async fn count_rows(&self, table: &'static str) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", table);
        sqlx::query_scalar::<_, i64>(&sql)
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("Failed to count {}", table))
    }

    /// Check database health.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("Database health check failed")?;

        Ok(())
    }
}

/// Database statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseStats {
    pub account_count: u64,
    pub content_count: u64,
    pub score_count: u64,
    pub payout_run_count: u64,
    pub last_indexed_block: Option<u64>,
    pub last_irreversible_block: u64,
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::Storage;
    use tempfile::NamedTempFile;

    pub async fn setup_storage() -> (Storage, NamedTempFile) {
        let temp_db = NamedTempFile::new().unwrap();
        let storage = Storage::new_with_path(temp_db.path(), None, None)
            .await
            .unwrap();
        storage.run_migrations().await.unwrap();
        (storage, temp_db)
    }
}
