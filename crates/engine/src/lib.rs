//! AgentHive reward engine.
//!
//! Pure, deterministic functions shared by the participation scorer and the
//! payout distributor. Nothing here touches storage or the network; the
//! services load rows, call into this crate, and persist the results.
//!
//! - [`ucs`]: Unique Counterparty Score with its anti-farming filters
//!   (rate limits, self-replies, pair spam, concentration) and stake weight
//! - [`emissions`]: tiered daily token emissions since launch
//! - [`allocation`]: daily participation split and weekly curated split

#![warn(missing_docs)]

pub mod allocation;
pub mod emissions;
pub mod ucs;

pub use allocation::{
    allocate_curated, allocate_participation, rank_curated, split_content_reward,
    truncate_amount, AccountPayout, AllocationError, CuratedItem, CuratorVote, PayoutLine,
    PayoutSource, ParticipationAllocation, ScoreEntry,
};
pub use emissions::{daily_emissions, weekly_emissions};
pub use ucs::{
    compute_ucs, is_concentrated, is_probable_human, screen_activity, stake_weight,
    ActivityItem, Screening, ScoringParams, UcsBreakdown,
};
