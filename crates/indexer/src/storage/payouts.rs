//! Payout run and payout line storage operations.

use super::{PayoutRecord, PayoutRunRecord, Storage};
use agenthive_core::{PayoutKind, PayoutStatus};
use anyhow::{Context, Result};
use sqlx::Row;

impl Storage {
    /// Open a new run in the `planned` state.
    pub async fn create_payout_run(
        &self,
        run_id: &str,
        kind: PayoutKind,
        period_start: i64,
        period_end: i64,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO payout_runs (
                run_id, kind, period_start, period_end, status,
                report_json, executed_tx_ids, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, '{}', '[]', ?, ?)
            "#,
        )
        .bind(run_id)
        .bind(kind.as_str())
        .bind(period_start)
        .bind(period_end)
        .bind(PayoutStatus::Planned.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to create payout run {}", run_id))?;

        Ok(())
    }

    /// Move a run to its final state with its report and transfer ids.
    pub async fn finish_payout_run(
        &self,
        run_id: &str,
        status: PayoutStatus,
        report: &serde_json::Value,
        executed_tx_ids: &[String],
    ) -> Result<()> {
        if !status.is_terminal() {
            anyhow::bail!("Cannot finish payout run {} as {}", run_id, status.as_str());
        }

        let now = chrono::Utc::now().timestamp();
        let report = serde_json::to_string(report)?;
        let tx_ids = serde_json::to_string(executed_tx_ids)?;

        let result = sqlx::query(
            r#"
            UPDATE payout_runs
            SET status = ?, report_json = ?, executed_tx_ids = ?, updated_at = ?
            WHERE run_id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(report)
        .bind(tx_ids)
        .bind(now)
        .bind(run_id)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to update payout run {}", run_id))?;

        if result.rows_affected() == 0 {
            anyhow::bail!("Payout run {} does not exist", run_id);
        }

        Ok(())
    }

    /// Get a run by id.
    pub async fn get_payout_run(&self, run_id: &str) -> Result<Option<PayoutRunRecord>> {
        let row = sqlx::query(
            r#"
            SELECT run_id, kind, period_start, period_end, status,
                   report_json, executed_tx_ids, created_at, updated_at
            FROM payout_runs
            WHERE run_id = ?
            "#,
        )
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to fetch payout run {}", run_id))?;

        row.map(Self::row_to_payout_run).transpose()
    }

    /// Most recently created run, if any.
    pub async fn latest_payout_run(&self) -> Result<Option<PayoutRunRecord>> {
        let row = sqlx::query(
            r#"
            SELECT run_id, kind, period_start, period_end, status,
                   report_json, executed_tx_ids, created_at, updated_at
            FROM payout_runs
            ORDER BY created_at DESC, run_id DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch latest payout run")?;

        row.map(Self::row_to_payout_run).transpose()
    }

    /// Insert or replace the payout line for `(run_id, account)`.
    pub async fn record_payout(&self, payout: &PayoutRecord) -> Result<()> {
        let metadata = serde_json::to_string(&payout.metadata)?;

        sqlx::query(
            r#"
            INSERT INTO payouts (run_id, account, amount, reason, metadata_json)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(run_id, account) DO UPDATE SET
                amount = excluded.amount,
                reason = excluded.reason,
                metadata_json = excluded.metadata_json
            "#,
        )
        .bind(&payout.run_id)
        .bind(&payout.account)
        .bind(payout.amount)
        .bind(&payout.reason)
        .bind(metadata)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to record payout for {} in {}", payout.account, payout.run_id))?;

        Ok(())
    }

    /// Payout lines of a run, ordered by account.
    pub async fn payouts_for_run(&self, run_id: &str) -> Result<Vec<PayoutRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT run_id, account, amount, reason, metadata_json
            FROM payouts
            WHERE run_id = ?
            ORDER BY account ASC
            "#,
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to fetch payouts for {}", run_id))?;

        rows.into_iter()
            .map(|row| {
                let metadata: String = row.get("metadata_json");
                Ok(PayoutRecord {
                    run_id: row.get("run_id"),
                    account: row.get("account"),
                    amount: row.get("amount"),
                    reason: row.get("reason"),
                    metadata: serde_json::from_str(&metadata).context("Corrupt payout metadata")?,
                })
            })
            .collect()
    }

    fn row_to_payout_run(row: sqlx::sqlite::SqliteRow) -> Result<PayoutRunRecord> {
        let kind: String = row.get("kind");
        let status: String = row.get("status");
        let report: String = row.get("report_json");
        let tx_ids: String = row.get("executed_tx_ids");

        Ok(PayoutRunRecord {
            run_id: row.get("run_id"),
            kind: kind.parse()?,
            period_start: row.get("period_start"),
            period_end: row.get("period_end"),
            status: status.parse()?,
            report: serde_json::from_str(&report).context("Corrupt payout report")?,
            executed_tx_ids: serde_json::from_str(&tx_ids).context("Corrupt transfer ids")?,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}
