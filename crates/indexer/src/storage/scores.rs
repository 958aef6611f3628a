//! Participation score storage operations.

use super::{ScoreRecord, Storage};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use sqlx::Row;

impl Storage {
    /// Insert or replace the score for `(account, date)`.
    pub async fn upsert_score(
        &self,
        account: &str,
        date: NaiveDate,
        score: f64,
        details: &serde_json::Value,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let details = serde_json::to_string(details)?;

        sqlx::query(
            r#"
            INSERT INTO participation_scores (account, date, score, details_json, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(account, date) DO UPDATE SET
                score = excluded.score,
                details_json = excluded.details_json,
                created_at = excluded.created_at
            "#,
        )
        .bind(account)
        .bind(date.to_string())
        .bind(score)
        .bind(details)
        .bind(now)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to store score for {} on {}", account, date))?;

        Ok(())
    }

    /// All scores for a day, ordered by account.
    pub async fn scores_for_date(&self, date: NaiveDate) -> Result<Vec<ScoreRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT account, date, score, details_json, created_at
            FROM participation_scores
            WHERE date = ?
            ORDER BY account ASC
            "#,
        )
        .bind(date.to_string())
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to fetch scores for {}", date))?;

        rows.into_iter().map(Self::row_to_score_record).collect()
    }

    /// One account's score for a day.
    pub async fn get_score(&self, account: &str, date: NaiveDate) -> Result<Option<ScoreRecord>> {
        let row = sqlx::query(
            r#"
            SELECT account, date, score, details_json, created_at
            FROM participation_scores
            WHERE account = ? AND date = ?
            "#,
        )
        .bind(account)
        .bind(date.to_string())
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to fetch score for {} on {}", account, date))?;

        row.map(Self::row_to_score_record).transpose()
    }

    fn row_to_score_record(row: sqlx::sqlite::SqliteRow) -> Result<ScoreRecord> {
        let details: String = row.get("details_json");

        Ok(ScoreRecord {
            account: row.get("account"),
            date: row.get("date"),
            score: row.get("score"),
            details: serde_json::from_str(&details).context("Corrupt score details")?,
            created_at: row.get("created_at"),
        })
    }
}
