//! Ledger indexing, participation scoring and payout distribution for AgentHive.
//!
//! This crate provides:
//! - The Chain Indexer: follows the ledger up to the last irreversible block
//!   and stores AgentHive content with its auto-burn verdict
//! - The Participation Scorer: daily Unique Counterparty Scores for eligible
//!   agents
//! - The Payout Distributor: daily participation and weekly curated token
//!   payouts, dry-run by default
//!
//! # Architecture
//!
//! ```text
//!        Ledger RPC (get_dynamic_global_properties, get_block)
//!                │
//!   ┌────────────▼─────────────┐
//!   │  SyncEngine (tokio task) │  retry + endpoint rotation
//!   │  checkpoint per block    │
//!   └────────────┬─────────────┘
//!                │ accounts, content, chain_state
//!          ┌─────▼──────┐
//!          │   SQLite   │ ◄── set-stake (eligibility rule)
//!          └─────┬──────┘
//!       ┌────────┴─────────┐
//!       │                  │
//! ┌─────▼───────────┐ ┌────▼──────────────┐
//! │ Participation   │ │ PayoutDistributor │
//! │ Scorer (daily)  │ │ daily + weekly    │
//! │ → scores        │ │ → runs, payouts   │
//! └─────────────────┘ └────┬──────────────┘
//!                          │ live mode only
//!                          ▼
//!                    TokenTransfer
//! ```
//!
//! Each writer owns its own tables, so the three services can run in one
//! process (`run`) or as separate invocations against the same database.
//! The pure scoring and allocation math lives in `agenthive-engine`.

#![warn(clippy::all)]

pub mod config;
pub mod listener;
pub mod participation;
pub mod payout;
pub mod retry;
pub mod schedule;
pub mod storage;

pub use config::Config;
pub use participation::{ParticipationScorer, ScoringSummary};
pub use payout::{PayoutDistributor, PayoutOutcome, TokenTransfer};
pub use storage::Storage;
