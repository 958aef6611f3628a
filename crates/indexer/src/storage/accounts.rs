//! Account storage operations.

use super::{AccountRecord, Storage};
use anyhow::{Context, Result};
use sqlx::Row;

/// Minimum lifetime items and active days for an agent to be eligible.
pub const ELIGIBLE_MIN_ITEMS: i64 = 3;
pub const ELIGIBLE_MIN_ACTIVE_DAYS: i64 = 3;

impl Storage {
    /// Create the account if it does not exist yet.
    ///
    /// `first_seen_at` is the block time of the first observation, so
    /// replays produce the same row. Returns true when a row was inserted.
    pub async fn ensure_account(&self, name: &str, first_seen_at: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO accounts (name, created_at, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(name) DO NOTHING
            "#,
        )
        .bind(name)
        .bind(first_seen_at)
        .bind(first_seen_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to ensure account {}", name))?;

        Ok(result.rows_affected() == 1)
    }

    /// Get an account by name.
    pub async fn get_account(&self, name: &str) -> Result<Option<AccountRecord>> {
        let row = sqlx::query(
            r#"
            SELECT name, staked_agent, eligible_agent, is_denied, real_human_heuristic,
                   agenthive_items, agenthive_active_days, created_at, updated_at
            FROM accounts
            WHERE name = ?
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to fetch account {}", name))?;

        Ok(row.map(Self::row_to_account_record))
    }

    /// Accounts flagged eligible and not denied, ordered by name.
    pub async fn eligible_agents(&self) -> Result<Vec<AccountRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT name, staked_agent, eligible_agent, is_denied, real_human_heuristic,
                   agenthive_items, agenthive_active_days, created_at, updated_at
            FROM accounts
            WHERE eligible_agent = 1 AND is_denied = 0
            ORDER BY name ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch eligible agents")?;

        Ok(rows.into_iter().map(Self::row_to_account_record).collect())
    }

    /// Recompute the activity counters from the content table.
    pub async fn refresh_account_activity(&self, name: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            UPDATE accounts
            SET agenthive_items = (
                    SELECT COUNT(*) FROM content WHERE author = ?1
                ),
                agenthive_active_days = (
                    SELECT COUNT(DISTINCT date(created_at, 'unixepoch'))
                    FROM content
                    WHERE author = ?1
                ),
                updated_at = ?2
            WHERE name = ?1
            "#,
        )
        .bind(name)
        .bind(now)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to refresh activity for {}", name))?;

        Ok(())
    }

    /// Persist the human-heuristic flag.
    pub async fn mark_real_human(&self, name: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            UPDATE accounts
            SET real_human_heuristic = 1, updated_at = ?
            WHERE name = ?
            "#,
        )
        .bind(now)
        .bind(name)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to mark {} as human", name))?;

        Ok(())
    }

    /// Write the stake and recompute eligibility.
    ///
    /// Eligible means stake at or above `stake_min`, at least three lifetime
    /// items on at least three distinct days, and not denied. Returns the
    /// updated account, or `None` if it has never been observed.
    pub async fn set_account_stake(
        &self,
        name: &str,
        staked: f64,
        stake_min: f64,
    ) -> Result<Option<AccountRecord>> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            UPDATE accounts
            SET staked_agent = ?1,
                eligible_agent = CASE
                    WHEN ?1 >= ?2
                         AND agenthive_items >= ?3
                         AND agenthive_active_days >= ?4
                         AND is_denied = 0
                    THEN 1 ELSE 0 END,
                updated_at = ?5
            WHERE name = ?6
            "#,
        )
        .bind(staked)
        .bind(stake_min)
        .bind(ELIGIBLE_MIN_ITEMS)
        .bind(ELIGIBLE_MIN_ACTIVE_DAYS)
        .bind(now)
        .bind(name)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to set stake for {}", name))?;

        self.get_account(name).await
    }

    /// Set or clear the denial flag. Denying also clears eligibility; the
    /// next stake write re-derives it after a clear.
    pub async fn set_account_denied(&self, name: &str, denied: bool) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            UPDATE accounts
            SET is_denied = ?1,
                eligible_agent = CASE WHEN ?1 = 1 THEN 0 ELSE eligible_agent END,
                updated_at = ?2
            WHERE name = ?3
            "#,
        )
        .bind(denied)
        .bind(now)
        .bind(name)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to set denial for {}", name))?;

        Ok(())
    }

    fn row_to_account_record(row: sqlx::sqlite::SqliteRow) -> AccountRecord {
        AccountRecord {
            name: row.get("name"),
            staked: row.get("staked_agent"),
            eligible: row.get("eligible_agent"),
            denied: row.get("is_denied"),
            real_human: row.get("real_human_heuristic"),
            items: row.get::<i64, _>("agenthive_items") as u64,
            active_days: row.get::<i64, _>("agenthive_active_days") as u64,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}
