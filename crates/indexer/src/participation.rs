//! Participation Scorer: daily Unique Counterparty Scores for eligible agents.

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use tokio::sync::watch;
use tracing::{error, info, warn};

use agenthive_engine::{compute_ucs, is_concentrated, is_probable_human, screen_activity, ScoringParams, UcsBreakdown};

use crate::config::ParticipationConfig;
use crate::schedule::{day_bounds, next_daily_run, previous_day, sleep_or_shutdown, until, SECONDS_PER_DAY};
use crate::storage::Storage;

/// Days of reply history the concentration guard looks at, including the
/// scored day.
pub const CONCENTRATION_WINDOW_DAYS: i64 = 7;

/// Totals of one scoring run.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringSummary {
    pub date: NaiveDate,
    pub eligible: usize,
    pub scored: usize,
    pub failed: usize,
    pub total_score: f64,
}

impl ScoringSummary {
    pub fn average_score(&self) -> f64 {
        if self.scored == 0 {
            0.0
        } else {
            self.total_score / self.scored as f64
        }
    }
}

/// Computes and stores daily participation scores.
pub struct ParticipationScorer {
    storage: Storage,
    params: ScoringParams,
    run_hour: u32,
    shutdown: Option<watch::Receiver<bool>>,
}

impl ParticipationScorer {
    pub fn new(storage: Storage, config: &ParticipationConfig) -> Self {
        Self {
            storage,
            params: ScoringParams::with_stake_min(config.stake_min),
            run_hour: config.run_hour,
            shutdown: None,
        }
    }

    /// Stop between agents once `shutdown` flips to true.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    fn stop_requested(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Score every eligible agent for the UTC day `date`.
    ///
    /// Failing to load the agent set fails the run; a failure for a single
    /// agent is logged and the run moves on.
    pub async fn score_day(&self, date: NaiveDate) -> Result<ScoringSummary> {
        let (start, end) = day_bounds(date);
        info!(%date, start, end, "participation_scoring_start");

        let agents = self
            .storage
            .eligible_agents()
            .await
            .context("Failed to load eligible agents")?;
        info!(count = agents.len(), "participation_eligible_agents");

        let mut summary = ScoringSummary {
            date,
            eligible: agents.len(),
            scored: 0,
            failed: 0,
            total_score: 0.0,
        };

        for agent in &agents {
            if self.stop_requested() {
                warn!(%date, scored = summary.scored, "Scoring interrupted by shutdown");
                break;
            }

            match self.score_agent(&agent.name, agent.staked, date).await {
                Ok(breakdown) => {
                    summary.scored += 1;
                    summary.total_score += breakdown.s_final;
                    info!(
                        account = %agent.name,
                        %date,
                        score = breakdown.s_final,
                        u = breakdown.u,
                        p = breakdown.p,
                        w = breakdown.w,
                        "participation_score_calculated"
                    );
                }
                Err(e) => {
                    summary.failed += 1;
                    error!(account = %agent.name, %date, error = %format!("{:#}", e), "Failed to score agent");
                }
            }
        }

        info!(
            %date,
            scored = summary.scored,
            failed = summary.failed,
            total_score = summary.total_score,
            average_score = summary.average_score(),
            "participation_scoring_complete"
        );

        Ok(summary)
    }

    /// Score one agent for `date` and persist the result.
    pub async fn score_agent(&self, name: &str, staked: f64, date: NaiveDate) -> Result<UcsBreakdown> {
        let (start, end) = day_bounds(date);

        let activity = self.storage.author_activity(name, start, end).await?;
        let screening = screen_activity(name, &activity, &self.params);

        let mut eligible = Vec::with_capacity(screening.candidates.len());
        for candidate in &screening.candidates {
            if self.is_eligible_counterparty(candidate, end).await? {
                eligible.push(candidate.clone());
            }
        }

        let trailing_start = end - CONCENTRATION_WINDOW_DAYS * SECONDS_PER_DAY;
        let trailing = self
            .storage
            .reply_counts_by_parent(name, trailing_start, end)
            .await?;
        let concentrated = is_concentrated(&trailing, self.params.concentration_threshold);

        let breakdown = compute_ucs(&screening, &eligible, concentrated, staked, &self.params);

        let details = serde_json::to_value(&breakdown)?;
        self.storage
            .upsert_score(name, date, breakdown.s_final, &details)
            .await?;

        Ok(breakdown)
    }

    /// Whether `name` counts as a genuine counterparty as of `as_of`.
    ///
    /// Flagged agents and flagged humans qualify directly. Otherwise the
    /// human heuristic is evaluated and, when it holds, the flag is
    /// persisted so the next lookup is direct.
    pub async fn is_eligible_counterparty(&self, name: &str, as_of: i64) -> Result<bool> {
        let Some(account) = self.storage.get_account(name).await? else {
            return Ok(false);
        };

        if account.eligible || account.real_human {
            return Ok(true);
        }

        let age_days = (as_of - account.created_at) as f64 / SECONDS_PER_DAY as f64;
        if is_probable_human(age_days, account.items, account.active_days) {
            self.storage.mark_real_human(name).await?;
            info!(account = %name, age_days, items = account.items, "Promoted account to human");
            return Ok(true);
        }

        Ok(false)
    }

    /// Score the previous UTC day every day at the configured hour until
    /// shutdown.
    pub async fn run_scheduled(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(run_hour = self.run_hour, stake_min = self.params.stake_min, "participation_scorer_start");

        loop {
            let now = Utc::now();
            let next = next_daily_run(now, self.run_hour);
            info!(next_run = %next, delay_ms = until(now, next).as_millis() as u64, "participation_scheduled");

            if sleep_or_shutdown(until(now, next), &mut shutdown).await {
                break;
            }

            let date = previous_day(Utc::now());
            if let Err(e) = self.score_day(date).await {
                error!(%date, error = %format!("{:#}", e), "Participation scoring run failed");
            }
        }

        info!("participation_scorer_shutdown");
        Ok(())
    }
}
