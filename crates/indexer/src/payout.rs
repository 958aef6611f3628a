//! Payout Distributor: daily participation and weekly curated token payouts.
//!
//! Every run follows the same lifecycle. A `planned` row is written before
//! anything is computed; the run then ends `executed` with its report, or
//! `failed` with `{"error": ...}` and the error handed back to the caller.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Datelike, Duration as ChronoDuration, NaiveDate, Utc, Weekday};
use serde_json::json;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

use agenthive_core::{PayoutKind, PayoutStatus};
use agenthive_engine::allocation::{CURATED_SHARE, GRANTS_SHARE, N_CURATED, PARTICIPATION_SHARE};
use agenthive_engine::{
    allocate_curated, allocate_participation, daily_emissions, rank_curated, weekly_emissions,
    ScoreEntry,
};

use crate::config::PayoutConfig;
use crate::schedule::{
    day_bounds, days_since, last_sunday, next_daily_run, previous_day, sleep_or_shutdown, until,
};
use crate::storage::{PayoutRecord, Storage};

/// Outbound token transfer backend.
///
/// Only called in live mode. Returns the ledger transaction id.
#[async_trait]
pub trait TokenTransfer: Send + Sync {
    async fn transfer(&self, account: &str, amount: f64, symbol: &str, memo: &str) -> Result<String>;
}

/// What a finished run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct PayoutOutcome {
    pub run_id: String,
    pub kind: PayoutKind,
    pub recipients: usize,
    pub pool_size: f64,
    pub total_paid: f64,
    pub tx_ids: Vec<String>,
}

/// Everything the lifecycle wrapper needs back from a run body.
struct RunResult {
    report: serde_json::Value,
    recipients: usize,
    pool_size: f64,
    total_paid: f64,
    tx_ids: Vec<String>,
}

/// A planned transfer.
struct Transfer {
    account: String,
    amount: f64,
}

/// Computes and records payout runs.
pub struct PayoutDistributor {
    storage: Storage,
    config: PayoutConfig,
    transfer: Option<Arc<dyn TokenTransfer>>,
    last_run_millis: AtomicI64,
}

impl PayoutDistributor {
    pub fn new(storage: Storage, config: PayoutConfig) -> Self {
        Self {
            storage,
            config,
            transfer: None,
            last_run_millis: AtomicI64::new(0),
        }
    }

    /// Attach a transfer backend used when dry-run is off.
    pub fn with_transfer(mut self, transfer: Arc<dyn TokenTransfer>) -> Self {
        self.transfer = Some(transfer);
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.config.dry_run
    }

    /// `pr-{kind}-{unix_millis}`, strictly increasing within this process.
    fn next_run_id(&self, kind: PayoutKind) -> String {
        let now = Utc::now().timestamp_millis();
        let mut last = self.last_run_millis.load(Ordering::SeqCst);
        loop {
            let candidate = if now > last { now } else { last + 1 };
            match self.last_run_millis.compare_exchange(
                last,
                candidate,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return format!("pr-{}-{}", kind.as_str(), candidate),
                Err(actual) => last = actual,
            }
        }
    }

    /// Pay the participation pool of `date` out pro rata to that day's scores.
    pub async fn run_daily_participation(&self, date: NaiveDate) -> Result<PayoutOutcome> {
        let (start, end) = day_bounds(date);
        let run_id = self.next_run_id(PayoutKind::DailyParticipation);
        info!(%run_id, %date, dry_run = self.config.dry_run, "participation_payout_start");

        self.storage
            .create_payout_run(&run_id, PayoutKind::DailyParticipation, start, end)
            .await?;

        let result = self.daily_participation_inner(&run_id, date).await;
        let outcome = self
            .finish(&run_id, PayoutKind::DailyParticipation, result)
            .await?;

        info!(
            %run_id,
            %date,
            recipients = outcome.recipients,
            pool_size = outcome.pool_size,
            total_paid = outcome.total_paid,
            "participation_payout_complete"
        );
        Ok(outcome)
    }

    async fn daily_participation_inner(&self, run_id: &str, date: NaiveDate) -> Result<RunResult> {
        let emissions = daily_emissions(days_since(self.config.launch_date, date));
        let pool = emissions * PARTICIPATION_SHARE;

        let scores: Vec<ScoreEntry> = self
            .storage
            .scores_for_date(date)
            .await?
            .into_iter()
            .map(|record| ScoreEntry {
                account: record.account,
                score: record.score,
            })
            .collect();
        let total_score: f64 = scores.iter().map(|entry| entry.score).sum();

        let allocations = allocate_participation(&scores, pool)?;
        let paid: Vec<_> = allocations.iter().filter(|a| a.amount > 0.0).collect();

        for allocation in &paid {
            self.storage
                .record_payout(&PayoutRecord {
                    run_id: run_id.to_string(),
                    account: allocation.account.clone(),
                    amount: allocation.amount,
                    reason: PayoutKind::DailyParticipation.as_str().to_string(),
                    metadata: json!({
                        "date": date.to_string(),
                        "score": allocation.score,
                        "share": allocation.share,
                    }),
                })
                .await?;
        }

        let transfers: Vec<Transfer> = paid
            .iter()
            .map(|a| Transfer {
                account: a.account.clone(),
                amount: a.amount,
            })
            .collect();
        let memo = format!("AgentHive daily participation {}", date);
        let tx_ids = self
            .execute_transfers("participation", &memo, &transfers)
            .await?;

        let payouts: Vec<_> = paid
            .iter()
            .map(|a| json!({ "account": a.account, "amount": a.amount }))
            .collect();
        let total_paid = paid.iter().map(|a| a.amount).sum::<f64>();

        Ok(RunResult {
            report: json!({
                "date": date.to_string(),
                "dailyEmissions": emissions,
                "poolSize": pool,
                "grantsReserve": emissions * GRANTS_SHARE,
                "totalScore": total_score,
                "recipients": paid.len(),
                "payouts": payouts,
                "dryRun": self.config.dry_run,
            }),
            recipients: paid.len(),
            pool_size: pool,
            total_paid,
            tx_ids,
        })
    }

    /// Pay the curated pool for the seven days ending on `week_end`.
    ///
    /// Emissions are priced at the rate of `as_of` for every day of the week.
    pub async fn run_weekly_curated(&self, week_end: NaiveDate, as_of: NaiveDate) -> Result<PayoutOutcome> {
        let week_start = week_end - ChronoDuration::days(6);
        let (start, _) = day_bounds(week_start);
        let (_, end) = day_bounds(week_end);
        let run_id = self.next_run_id(PayoutKind::WeeklyCurated);
        info!(%run_id, %week_start, %week_end, dry_run = self.config.dry_run, "curated_payout_start");

        self.storage
            .create_payout_run(&run_id, PayoutKind::WeeklyCurated, start, end)
            .await?;

        let result = self
            .weekly_curated_inner(&run_id, week_start, week_end, as_of)
            .await;
        let outcome = self.finish(&run_id, PayoutKind::WeeklyCurated, result).await?;

        info!(
            %run_id,
            %week_start,
            %week_end,
            recipients = outcome.recipients,
            pool_size = outcome.pool_size,
            total_paid = outcome.total_paid,
            "curated_payout_complete"
        );
        Ok(outcome)
    }

    async fn weekly_curated_inner(
        &self,
        run_id: &str,
        week_start: NaiveDate,
        week_end: NaiveDate,
        as_of: NaiveDate,
    ) -> Result<RunResult> {
        let (start, _) = day_bounds(week_start);
        let (_, end) = day_bounds(week_end);

        let votes = self.storage.curator_votes_in_window(start, end).await?;
        let items = rank_curated(&votes, N_CURATED);
        let total_votes: u64 = items.iter().map(|item| item.votes()).sum();

        let emissions = weekly_emissions(days_since(self.config.launch_date, as_of));
        let pool = emissions * CURATED_SHARE;

        let payouts = allocate_curated(&items, pool)?;
        let paid: Vec<_> = payouts.iter().filter(|p| p.amount > 0.0).collect();

        for payout in &paid {
            self.storage
                .record_payout(&PayoutRecord {
                    run_id: run_id.to_string(),
                    account: payout.account.clone(),
                    amount: payout.amount,
                    reason: PayoutKind::WeeklyCurated.as_str().to_string(),
                    metadata: json!({
                        "weekStart": week_start.to_string(),
                        "weekEnd": week_end.to_string(),
                        "details": payout.details,
                    }),
                })
                .await?;
        }

        let transfers: Vec<Transfer> = paid
            .iter()
            .map(|p| Transfer {
                account: p.account.clone(),
                amount: p.amount,
            })
            .collect();
        let memo = format!("AgentHive curated rewards {} to {}", week_start, week_end);
        let tx_ids = self.execute_transfers("curated", &memo, &transfers).await?;

        let report_payouts: Vec<_> = paid
            .iter()
            .map(|p| json!({ "account": p.account, "amount": p.amount }))
            .collect();
        let total_paid = paid.iter().map(|p| p.amount).sum::<f64>();

        Ok(RunResult {
            report: json!({
                "weekStart": week_start.to_string(),
                "weekEnd": week_end.to_string(),
                "weeklyEmissions": emissions,
                "poolSize": pool,
                "contentCount": items.len(),
                "totalVotes": total_votes,
                "recipients": paid.len(),
                "payouts": report_payouts,
                "dryRun": self.config.dry_run,
            }),
            recipients: paid.len(),
            pool_size: pool,
            total_paid,
            tx_ids,
        })
    }

    /// Close the run according to how its body went.
    async fn finish(
        &self,
        run_id: &str,
        kind: PayoutKind,
        result: Result<RunResult>,
    ) -> Result<PayoutOutcome> {
        match result {
            Ok(run) => {
                self.storage
                    .finish_payout_run(run_id, PayoutStatus::Executed, &run.report, &run.tx_ids)
                    .await?;
                Ok(PayoutOutcome {
                    run_id: run_id.to_string(),
                    kind,
                    recipients: run.recipients,
                    pool_size: run.pool_size,
                    total_paid: run.total_paid,
                    tx_ids: run.tx_ids,
                })
            }
            Err(e) => {
                let message = format!("{:#}", e);
                error!(%run_id, kind = kind.as_str(), error = %message, "Payout run failed");
                if let Err(mark_err) = self
                    .storage
                    .finish_payout_run(run_id, PayoutStatus::Failed, &json!({ "error": message }), &[])
                    .await
                {
                    warn!(%run_id, error = %format!("{:#}", mark_err), "Failed to mark payout run as failed");
                }
                Err(e)
            }
        }
    }

    async fn execute_transfers(&self, label: &str, memo: &str, transfers: &[Transfer]) -> Result<Vec<String>> {
        if transfers.is_empty() {
            return Ok(Vec::new());
        }

        if self.config.dry_run {
            for t in transfers {
                info!(
                    account = %t.account,
                    amount = t.amount,
                    symbol = %self.config.token_symbol,
                    "Dry run: transfer skipped"
                );
            }
            return Ok(Vec::new());
        }

        let Some(backend) = &self.transfer else {
            warn!(
                label,
                count = transfers.len(),
                symbol = %self.config.token_symbol,
                "{}_transfers_skipped",
                label
            );
            return Ok(Vec::new());
        };

        let mut tx_ids = Vec::with_capacity(transfers.len());
        for t in transfers {
            let tx_id = backend
                .transfer(&t.account, t.amount, &self.config.token_symbol, memo)
                .await
                .with_context(|| format!("Transfer of {} {} to {} failed", t.amount, self.config.token_symbol, t.account))?;
            info!(account = %t.account, amount = t.amount, %tx_id, "Transfer executed");
            tx_ids.push(tx_id);
        }

        Ok(tx_ids)
    }

    /// Run the daily participation payout for yesterday every day at the
    /// payout hour, and the weekly curated payout on Mondays.
    pub async fn run_scheduled(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(
            run_hour = self.config.run_hour,
            dry_run = self.config.dry_run,
            token = %self.config.token_symbol,
            "payout_distributor_start"
        );

        loop {
            let now = Utc::now();
            let next = next_daily_run(now, self.config.run_hour);
            info!(next_run = %next, delay_ms = until(now, next).as_millis() as u64, "payout_scheduled");

            if sleep_or_shutdown(until(now, next), &mut shutdown).await {
                break;
            }

            let now = Utc::now();
            let yesterday = previous_day(now);
            if let Err(e) = self.run_daily_participation(yesterday).await {
                error!(date = %yesterday, error = %format!("{:#}", e), "Daily participation payout failed");
            }

            let today = now.date_naive();
            if today.weekday() == Weekday::Mon {
                let week_end = last_sunday(today);
                if let Err(e) = self.run_weekly_curated(week_end, today).await {
                    error!(%week_end, error = %format!("{:#}", e), "Weekly curated payout failed");
                }
            }
        }

        info!("payout_distributor_shutdown");
        Ok(())
    }
}
