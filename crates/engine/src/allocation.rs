//! Payout allocation.
//!
//! Daily participation: the participation pool is split pro rata by score.
//! Weekly curated: the top content by distinct curator votes shares the
//! curated pool pro rata by votes; each item's reward goes 80% to the author
//! and 20% split evenly across its curators.
//!
//! Every individual amount is truncated (floored) to 3 decimal places, so the
//! distributed total never exceeds the pool.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Share of daily emissions paid for participation.
pub const PARTICIPATION_SHARE: f64 = 0.30;

/// Share of emissions paid to curated content.
pub const CURATED_SHARE: f64 = 0.60;

/// Share of emissions reserved for grants. Reported, never distributed.
pub const GRANTS_SHARE: f64 = 0.10;

/// Author part of a curated content reward.
pub const AUTHOR_SHARE: f64 = 0.80;

/// Curator part of a curated content reward.
pub const CURATOR_SHARE: f64 = 0.20;

/// Number of content items rewarded per curated run.
pub const N_CURATED: usize = 200;

/// Allocation input errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AllocationError {
    /// Pool is negative or not a number.
    #[error("invalid pool size: {0}")]
    InvalidPool(f64),

    /// A score is negative or not a number.
    #[error("invalid score {score} for account {account}")]
    InvalidScore {
        /// Account holding the score.
        account: String,
        /// Offending value.
        score: f64,
    },
}

/// Floor an amount to 3 decimal places.
///
/// Values within `1e-9` milli-units below a boundary are treated as on it,
/// so representation error like `29.999999999999996` is not floored to
/// `29.999`. Anything further below still floors down.
pub fn truncate_amount(amount: f64) -> f64 {
    if !amount.is_finite() || amount <= 0.0 {
        return 0.0;
    }
    (amount * 1000.0 + 1e-9).floor() / 1000.0
}

/// Sum amounts that are already multiples of 0.001 without drift.
fn sum_amounts(amounts: impl Iterator<Item = f64>) -> f64 {
    let milli: i64 = amounts.map(|a| (a * 1000.0).round() as i64).sum();
    milli as f64 / 1000.0
}

fn check_pool(pool: f64) -> Result<(), AllocationError> {
    if pool.is_nan() || pool < 0.0 || pool.is_infinite() {
        return Err(AllocationError::InvalidPool(pool));
    }
    Ok(())
}

/// One account's persisted score for the day.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreEntry {
    /// Account name.
    pub account: String,
    /// Final score.
    pub score: f64,
}

/// Daily participation allocation for one account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipationAllocation {
    /// Account name.
    pub account: String,
    /// Truncated token amount.
    pub amount: f64,
    /// Score the share came from.
    pub score: f64,
    /// `score / total_score`
    pub share: f64,
}

/// Split `pool` across `scores` pro rata.
///
/// Every score gets a row (zero scores get zero). When the total score is
/// zero nobody receives anything.
pub fn allocate_participation(
    scores: &[ScoreEntry],
    pool: f64,
) -> Result<Vec<ParticipationAllocation>, AllocationError> {
    check_pool(pool)?;
    for entry in scores {
        if !entry.score.is_finite() || entry.score < 0.0 {
            return Err(AllocationError::InvalidScore {
                account: entry.account.clone(),
                score: entry.score,
            });
        }
    }

    let total: f64 = scores.iter().map(|entry| entry.score).sum();

    Ok(scores
        .iter()
        .map(|entry| {
            let share = if total > 0.0 { entry.score / total } else { 0.0 };
            ParticipationAllocation {
                account: entry.account.clone(),
                amount: truncate_amount(pool * share),
                score: entry.score,
                share,
            }
        })
        .collect())
}

/// One curator vote row (already restricted to the week and to burn-valid content).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CuratorVote {
    /// `@author/permlink`
    pub content_id: String,
    /// Content author.
    pub author: String,
    /// Voting curator.
    pub curator: String,
}

/// A content item selected for the curated payout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CuratedItem {
    /// `@author/permlink`
    pub content_id: String,
    /// Content author.
    pub author: String,
    /// Distinct curators, sorted.
    pub curators: Vec<String>,
}

impl CuratedItem {
    /// Distinct curator vote count.
    pub fn votes(&self) -> u64 {
        self.curators.len() as u64
    }
}

/// Group votes by content, count distinct curators, keep the top `limit`.
///
/// Ordered by vote count descending, then content id ascending.
pub fn rank_curated(votes: &[CuratorVote], limit: usize) -> Vec<CuratedItem> {
    let mut grouped: BTreeMap<&str, (&str, BTreeSet<&str>)> = BTreeMap::new();
    for vote in votes {
        grouped
            .entry(vote.content_id.as_str())
            .or_insert_with(|| (vote.author.as_str(), BTreeSet::new()))
            .1
            .insert(vote.curator.as_str());
    }

    let mut items: Vec<CuratedItem> = grouped
        .into_iter()
        .map(|(content_id, (author, curators))| CuratedItem {
            content_id: content_id.to_string(),
            author: author.to_string(),
            curators: curators.into_iter().map(str::to_string).collect(),
        })
        .collect();

    items.sort_by(|a, b| {
        b.votes()
            .cmp(&a.votes())
            .then_with(|| a.content_id.cmp(&b.content_id))
    });
    items.truncate(limit);
    items
}

/// Why an account is paid in a curated run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutSource {
    /// Author of rewarded content.
    CuratedAuthor,
    /// Curator of rewarded content.
    CuratedCurator,
}

/// One contribution to an account's curated payout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutLine {
    /// Source of the amount.
    pub reason: PayoutSource,
    /// Content the amount was earned on.
    pub content_id: String,
    /// Truncated amount.
    pub amount: f64,
}

/// Aggregated curated payout for one account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountPayout {
    /// Account name.
    pub account: String,
    /// Sum of `details`.
    pub amount: f64,
    /// Per-source breakdown.
    pub details: Vec<PayoutLine>,
}

/// Split one content reward: 80% to the author, 20% evenly across curators.
///
/// With no curators the curator part is not paid out.
pub fn split_content_reward(
    reward: f64,
    content_id: &str,
    author: &str,
    curators: &[String],
) -> Vec<(String, PayoutLine)> {
    let mut lines = vec![(
        author.to_string(),
        PayoutLine {
            reason: PayoutSource::CuratedAuthor,
            content_id: content_id.to_string(),
            amount: truncate_amount(reward * AUTHOR_SHARE),
        },
    )];

    if !curators.is_empty() {
        let each = truncate_amount(reward * CURATOR_SHARE / curators.len() as f64);
        for curator in curators {
            lines.push((
                curator.clone(),
                PayoutLine {
                    reason: PayoutSource::CuratedCurator,
                    content_id: content_id.to_string(),
                    amount: each,
                },
            ));
        }
    }

    lines
}

/// Split `pool` across ranked items by vote share and aggregate per account.
///
/// An account that is both author and curator gets one combined entry.
/// Output is sorted by account name.
pub fn allocate_curated(
    items: &[CuratedItem],
    pool: f64,
) -> Result<Vec<AccountPayout>, AllocationError> {
    check_pool(pool)?;

    let total_votes: u64 = items.iter().map(CuratedItem::votes).sum();
    if total_votes == 0 {
        return Ok(Vec::new());
    }

    let mut by_account: BTreeMap<String, Vec<PayoutLine>> = BTreeMap::new();
    for item in items {
        let reward = pool * (item.votes() as f64 / total_votes as f64);
        for (account, line) in
            split_content_reward(reward, &item.content_id, &item.author, &item.curators)
        {
            by_account.entry(account).or_default().push(line);
        }
    }

    Ok(by_account
        .into_iter()
        .map(|(account, details)| AccountPayout {
            amount: sum_amounts(details.iter().map(|line| line.amount)),
            account,
            details,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(account: &str, score: f64) -> ScoreEntry {
        ScoreEntry {
            account: account.to_string(),
            score,
        }
    }

    fn vote(content_id: &str, author: &str, curator: &str) -> CuratorVote {
        CuratorVote {
            content_id: content_id.to_string(),
            author: author.to_string(),
            curator: curator.to_string(),
        }
    }

    #[test]
    fn shares_do_not_exceed_emissions() {
        assert!((PARTICIPATION_SHARE + CURATED_SHARE + GRANTS_SHARE - 1.0).abs() < 1e-12);
        assert!((AUTHOR_SHARE + CURATOR_SHARE - 1.0).abs() < 1e-12);
    }

    #[test]
    fn participation_splits_pro_rata() {
        let result = allocate_participation(&[score("a", 3.0), score("b", 1.0)], 40.0).unwrap();
        assert_eq!(result[0].amount, 30.0);
        assert_eq!(result[1].amount, 10.0);
        assert_eq!(result[0].share, 0.75);
    }

    #[test]
    fn participation_truncates_remainders() {
        let result = allocate_participation(
            &[score("a", 1.0), score("b", 1.0), score("c", 1.0)],
            10.0,
        )
        .unwrap();
        for allocation in &result {
            assert_eq!(allocation.amount, 3.333);
        }
        let distributed = sum_amounts(result.iter().map(|a| a.amount));
        assert_eq!(distributed, 9.999);
        assert!(distributed <= 10.0);

        // 2/3 of 1 floors rather than rounds
        let result = allocate_participation(&[score("a", 2.0), score("b", 1.0)], 1.0).unwrap();
        assert_eq!(result[0].amount, 0.666);
        assert_eq!(result[1].amount, 0.333);
    }

    #[test]
    fn participation_with_zero_total_pays_nothing() {
        let result = allocate_participation(&[score("a", 0.0)], 3000.0).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].amount, 0.0);

        assert!(allocate_participation(&[], 3000.0).unwrap().is_empty());
    }

    #[test]
    fn participation_rejects_bad_inputs() {
        assert_eq!(
            allocate_participation(&[score("a", 1.0)], -1.0),
            Err(AllocationError::InvalidPool(-1.0))
        );
        assert!(matches!(
            allocate_participation(&[score("a", f64::NAN)], 1.0),
            Err(AllocationError::InvalidScore { .. })
        ));
    }

    #[test]
    fn content_reward_splits_eighty_twenty() {
        let curators = vec!["c1".to_string(), "c2".to_string()];
        let lines = split_content_reward(100.0, "@a/p", "a", &curators);

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].0, "a");
        assert_eq!(lines[0].1.amount, 80.0);
        assert_eq!(lines[0].1.reason, PayoutSource::CuratedAuthor);
        assert_eq!(lines[1].1.amount, 10.0);
        assert_eq!(lines[2].1.amount, 10.0);
        assert_eq!(lines[2].1.reason, PayoutSource::CuratedCurator);
    }

    #[test]
    fn ranking_counts_distinct_curators_and_breaks_ties() {
        let votes = vec![
            vote("@b/x", "b", "c1"),
            vote("@a/x", "a", "c1"),
            vote("@a/x", "a", "c2"),
            vote("@a/x", "a", "c2"),
            vote("@c/x", "c", "c3"),
        ];

        let ranked = rank_curated(&votes, 10);
        assert_eq!(ranked.len(), 3);
        assert_eq!(ranked[0].content_id, "@a/x");
        assert_eq!(ranked[0].votes(), 2);
        // Tie on one vote: content id ascending
        assert_eq!(ranked[1].content_id, "@b/x");
        assert_eq!(ranked[2].content_id, "@c/x");

        let top = rank_curated(&votes, 1);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].content_id, "@a/x");
    }

    #[test]
    fn curated_aggregates_author_and_curator_roles() {
        let votes = vec![
            vote("@alice/post", "alice", "bob"),
            vote("@alice/post", "alice", "carol"),
            vote("@bob/post", "bob", "alice"),
            vote("@bob/post", "bob", "carol"),
        ];
        let ranked = rank_curated(&votes, N_CURATED);

        // Two items with two votes each: 100 per item
        let payouts = allocate_curated(&ranked, 200.0).unwrap();
        let names: Vec<&str> = payouts.iter().map(|p| p.account.as_str()).collect();
        assert_eq!(names, vec!["alice", "bob", "carol"]);

        // alice: 80 as author + 10 as curator of bob's post
        assert_eq!(payouts[0].amount, 90.0);
        assert_eq!(payouts[0].details.len(), 2);
        assert_eq!(payouts[1].amount, 90.0);
        assert_eq!(payouts[2].amount, 20.0);

        let total = sum_amounts(payouts.iter().map(|p| p.amount));
        assert!(total <= 200.0);
    }

    #[test]
    fn curated_without_votes_is_empty() {
        assert!(allocate_curated(&[], 6000.0).unwrap().is_empty());
    }

    #[test]
    fn truncate_amount_floors() {
        assert_eq!(truncate_amount(1.23456), 1.234);
        assert_eq!(truncate_amount(0.0009), 0.0);
        assert_eq!(truncate_amount(-4.0), 0.0);
        assert_eq!(truncate_amount(100.0 * 0.3), 30.0);
    }

    #[test]
    fn truncate_amount_only_absorbs_representation_error() {
        assert_eq!(truncate_amount(29.999999999999996), 30.0);
        assert_eq!(truncate_amount(1.0009999), 1.0);
        assert_eq!(truncate_amount(2.9999999), 2.999);
        assert_eq!(truncate_amount(0.0009999999), 0.0);
    }
}
