//! Unique Counterparty Score (UCS).
//!
//! For one agent and one UTC day:
//!
//! ```text
//! U = unique eligible counterparties replied to (cap 10, forced to 0 when concentrated)
//! P = root posts (cap 2)
//! S = min(U, 10) + 0.5 * min(P, 2)
//! W = sqrt(min(stake, 100 * S_MIN) / S_MIN)
//! S_final = S * W
//! ```
//!
//! Farming filters:
//! - Rate limits: only the first `max_posts_day` posts and `max_replies_day`
//!   replies of the day are looked at
//! - Self-replies never count
//! - Pair spam: after `pair_spam_threshold` counted replies to the same
//!   counterparty, further replies to it are ignored
//! - Concentration: if the top 3 parent authors take more than
//!   `concentration_threshold` of the trailing 7-day replies, U = 0
//!
//! Counterparty eligibility needs storage (and may promote an account), so it
//! is resolved by the caller between [`screen_activity`] and [`compute_ucs`].

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Minimum account age (days) for the human heuristic.
pub const HUMAN_MIN_AGE_DAYS: f64 = 30.0;

/// Lifetime content count that qualifies an old account as human.
pub const HUMAN_MIN_ITEMS: u64 = 30;

/// Lifetime distinct active days that qualify an old account as human.
pub const HUMAN_MIN_ACTIVE_DAYS: u64 = 10;

/// Tunables for the scoring run.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringParams {
    /// Cap on unique counterparties.
    pub u_cap: u32,
    /// Cap on counted root posts.
    pub p_cap: u32,
    /// Root posts looked at per day.
    pub max_posts_day: usize,
    /// Replies looked at per day.
    pub max_replies_day: usize,
    /// Counted replies allowed per (author, counterparty) pair per pass.
    pub pair_spam_threshold: u32,
    /// Share of trailing replies the top 3 parents may take before U is zeroed.
    pub concentration_threshold: f64,
    /// Minimum stake (`S_MIN`); the stake cap is `100 * S_MIN`.
    pub stake_min: f64,
}

impl Default for ScoringParams {
    fn default() -> Self {
        Self {
            u_cap: 10,
            p_cap: 2,
            max_posts_day: 3,
            max_replies_day: 30,
            pair_spam_threshold: 5,
            concentration_threshold: 0.70,
            stake_min: 1000.0,
        }
    }
}

impl ScoringParams {
    /// Default params with a different minimum stake.
    pub fn with_stake_min(stake_min: f64) -> Self {
        Self {
            stake_min,
            ..Self::default()
        }
    }

    /// Stake beyond this adds no weight.
    pub fn stake_cap(&self) -> f64 {
        100.0 * self.stake_min
    }
}

/// One piece of the agent's own content inside the scoring window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityItem {
    /// `@author/permlink`
    pub content_id: String,
    /// Author of the parent, `None` for root posts.
    pub parent_author: Option<String>,
    /// Root post flag as indexed.
    pub is_root: bool,
    /// Creation time (unix seconds).
    pub created_at: i64,
}

/// Result of the storage-free part of scoring.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Screening {
    /// Posts kept after the rate limit.
    pub counted_posts: usize,
    /// Replies kept after the rate limit.
    pub counted_replies: usize,
    /// Distinct counterparties that passed the self-reply and pair-spam
    /// filters, in order of first admission. Eligibility is still unchecked.
    pub candidates: Vec<String>,
    /// Replies dropped as self-replies.
    pub self_replies: usize,
    /// Replies dropped by the pair-spam guard.
    pub pair_spam_skipped: usize,
}

/// Audit record persisted with every score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UcsBreakdown {
    /// Unique eligible counterparties, zero when concentrated (uncapped).
    pub u: u32,
    /// Counted posts (uncapped).
    pub p: u32,
    /// `min(u, u_cap)`
    pub capped_u: u32,
    /// `min(p, p_cap)`
    pub capped_p: u32,
    /// Base score.
    pub s: f64,
    /// Stake weight.
    pub w: f64,
    /// Final score.
    pub s_final: f64,
    /// Stake the weight was computed from.
    pub staked: f64,
    /// Eligible counterparties counted in this pass.
    pub unique_counterparties: Vec<String>,
    /// Concentration guard fired.
    pub is_concentrated: bool,
    /// Posts considered after rate limiting.
    pub counted_posts: usize,
    /// Replies considered after rate limiting.
    pub counted_replies: usize,
}

fn pair_key<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Apply rate limits, the self-reply filter and the pair-spam guard.
///
/// `activity` is expected in creation order; it is stably re-sorted by
/// `created_at` so out-of-order input gives the same answer.
pub fn screen_activity(author: &str, activity: &[ActivityItem], params: &ScoringParams) -> Screening {
    let mut ordered: Vec<&ActivityItem> = activity.iter().collect();
    ordered.sort_by_key(|item| item.created_at);

    let posts: Vec<&ActivityItem> = ordered
        .iter()
        .copied()
        .filter(|item| item.is_root)
        .take(params.max_posts_day)
        .collect();

    let replies: Vec<(&ActivityItem, &str)> = ordered
        .iter()
        .copied()
        .filter(|item| !item.is_root)
        .filter_map(|item| item.parent_author.as_deref().map(|parent| (item, parent)))
        .take(params.max_replies_day)
        .collect();

    let mut screening = Screening {
        counted_posts: posts.len(),
        counted_replies: replies.len(),
        ..Screening::default()
    };

    let mut pair_counts: HashMap<(&str, &str), u32> = HashMap::new();
    let mut seen: HashSet<&str> = HashSet::new();

    for (_, parent) in replies {
        if parent == author {
            screening.self_replies += 1;
            continue;
        }

        let count = pair_counts.entry(pair_key(author, parent)).or_insert(0);
        if *count >= params.pair_spam_threshold {
            screening.pair_spam_skipped += 1;
            continue;
        }
        *count += 1;

        if seen.insert(parent) {
            screening.candidates.push(parent.to_string());
        }
    }

    screening
}

/// Concentration guard over trailing reply counts grouped by parent author.
///
/// True when the three largest counterparties take strictly more than
/// `threshold` of all replies. No replies means not concentrated.
pub fn is_concentrated(reply_counts: &[(String, u64)], threshold: f64) -> bool {
    let total: u64 = reply_counts.iter().map(|(_, count)| count).sum();
    if total == 0 {
        return false;
    }

    let mut counts: Vec<u64> = reply_counts.iter().map(|(_, count)| *count).collect();
    counts.sort_unstable_by(|a, b| b.cmp(a));
    let top3: u64 = counts.iter().take(3).sum();

    (top3 as f64 / total as f64) > threshold
}

/// Diminishing-returns stake weight `sqrt(min(stake, cap) / S_MIN)`.
pub fn stake_weight(stake: f64, params: &ScoringParams) -> f64 {
    if params.stake_min.is_nan() || params.stake_min <= 0.0 || !stake.is_finite() {
        return 0.0;
    }
    let effective = stake.max(0.0).min(params.stake_cap());
    (effective / params.stake_min).sqrt()
}

/// Human heuristic: old enough and active enough over its lifetime.
pub fn is_probable_human(account_age_days: f64, lifetime_items: u64, active_days: u64) -> bool {
    account_age_days >= HUMAN_MIN_AGE_DAYS
        && (lifetime_items >= HUMAN_MIN_ITEMS || active_days >= HUMAN_MIN_ACTIVE_DAYS)
}

/// Combine the screened activity, the eligible subset of its candidates and
/// the concentration verdict into the final score.
///
/// Counterparties in `eligible` that are not screening candidates are ignored.
pub fn compute_ucs(
    screening: &Screening,
    eligible: &[String],
    concentrated: bool,
    stake: f64,
    params: &ScoringParams,
) -> UcsBreakdown {
    let mut unique_counterparties: Vec<String> = Vec::new();
    for candidate in &screening.candidates {
        if eligible.contains(candidate) && !unique_counterparties.contains(candidate) {
            unique_counterparties.push(candidate.clone());
        }
    }

    let u = if concentrated {
        0
    } else {
        unique_counterparties.len() as u32
    };
    let p = screening.counted_posts as u32;

    let capped_u = u.min(params.u_cap);
    let capped_p = p.min(params.p_cap);

    let s = capped_u as f64 + 0.5 * capped_p as f64;
    let w = stake_weight(stake, params);

    UcsBreakdown {
        u,
        p,
        capped_u,
        capped_p,
        s,
        w,
        s_final: s * w,
        staked: stake,
        unique_counterparties,
        is_concentrated: concentrated,
        counted_posts: screening.counted_posts,
        counted_replies: screening.counted_replies,
    }
}
