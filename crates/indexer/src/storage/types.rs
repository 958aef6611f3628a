//! Database types for the indexer storage layer.

use agenthive_core::{ContentId, PayoutKind, PayoutStatus};
use serde::{Deserialize, Serialize};

/// Indexer checkpoint, stored as a singleton row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainState {
    /// Last irreversible block height observed from the ledger.
    pub last_irreversible: u64,

    /// Last fully processed block height. `None` until the first run seeds it.
    pub last_indexed: Option<u64>,

    /// When the checkpoint was last written (unix seconds).
    pub updated_at: i64,
}

/// A participant account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub name: String,
    pub staked: f64,
    pub eligible: bool,
    pub denied: bool,
    pub real_human: bool,

    /// Lifetime count of indexed items authored by this account.
    pub items: u64,

    /// Distinct UTC days on which this account authored indexed items.
    pub active_days: u64,

    /// Block time at which the account was first observed (unix seconds).
    pub created_at: i64,
    pub updated_at: i64,
}

/// An indexed post or reply.
///
/// Optional text fields are `None` when the ledger supplied an empty string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub content_id: ContentId,
    pub author: String,
    pub permlink: String,
    pub parent_author: Option<String>,
    pub parent_permlink: Option<String>,

    /// Block time (unix seconds).
    pub created_at: i64,
    pub title: Option<String>,
    pub body: Option<String>,

    /// Lowercase hex sha256 of the body (empty body hashes the empty string).
    pub body_hash: String,
    pub json_metadata: serde_json::Value,
    pub tags: Vec<String>,
    pub app: Option<String>,
    pub agent_kind: Option<String>,
    pub url: String,

    /// `None` when the check was not performed.
    pub burn_valid: Option<bool>,
}

impl ContentRecord {
    /// Root posts have no parent author.
    pub fn is_root(&self) -> bool {
        self.parent_author.is_none()
    }
}

/// A stored daily participation score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub account: String,

    /// UTC day in `YYYY-MM-DD` form.
    pub date: String,
    pub score: f64,
    pub details: serde_json::Value,
    pub created_at: i64,
}

/// A payout run and its lifecycle state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutRunRecord {
    pub run_id: String,
    pub kind: PayoutKind,
    pub period_start: i64,
    pub period_end: i64,
    pub status: PayoutStatus,
    pub report: serde_json::Value,
    pub executed_tx_ids: Vec<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// One planned payout line within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutRecord {
    pub run_id: String,
    pub account: String,
    pub amount: f64,
    pub reason: String,
    pub metadata: serde_json::Value,
}
