//! Ledger client capability and the block shapes the indexer reads.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Subset of the dynamic global properties the indexer needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainHead {
    pub last_irreversible_block_num: u64,
    #[serde(default)]
    pub head_block_number: u64,
}

/// A block as returned by `condenser_api.get_block`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerBlock {
    /// Ledger time, UTC without zone suffix (`2026-02-01T12:00:00`).
    pub timestamp: String,
    #[serde(default)]
    pub transactions: Vec<LedgerTransaction>,
}

/// A transaction; operations stay untyped until the indexer picks them apart.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    #[serde(default)]
    pub operations: Vec<serde_json::Value>,
}

impl LedgerBlock {
    /// Block time as unix seconds.
    pub fn unix_timestamp(&self) -> Result<i64> {
        Ok(self.timestamp_utc()?.timestamp())
    }

    /// Block time, accepting the ledger format with or without a `Z` suffix.
    pub fn timestamp_utc(&self) -> Result<DateTime<Utc>> {
        let raw = self.timestamp.trim().trim_end_matches('Z');
        let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
            .with_context(|| format!("Invalid block timestamp: {}", self.timestamp))?;
        Ok(naive.and_utc())
    }
}

/// Read access to the ledger.
///
/// Implementations are shared across tasks; `reconnect` lets the sync
/// engine ask for a fresh connection (or another endpoint) after an error.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Current head and last irreversible height.
    async fn get_chain_head(&self) -> Result<ChainHead>;

    /// Block at `height`. A block that is not available yet is an error.
    async fn get_block(&self, height: u64) -> Result<LedgerBlock>;

    /// Drop the current connection and use the next one.
    async fn reconnect(&self) {}

    /// Short description of the active endpoint, for logs.
    fn endpoint(&self) -> String;

    /// Every endpoint the client may rotate through.
    fn endpoints(&self) -> Vec<String> {
        vec![self.endpoint()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_block_deserializes_from_condenser_shape() {
        let raw = json!({
            "previous": "0000",
            "timestamp": "2026-02-01T12:00:03",
            "witness": "someone",
            "transactions": [{
                "ref_block_num": 1,
                "operations": [["comment", {"author": "alice", "permlink": "p"}]],
                "signatures": []
            }],
            "transaction_ids": ["abc"]
        });

        let block: LedgerBlock = serde_json::from_value(raw).unwrap();
        assert_eq!(block.transactions.len(), 1);
        assert_eq!(block.transactions[0].operations[0][0], "comment");
        assert_eq!(block.unix_timestamp().unwrap(), 1_769_904_000 + 12 * 3_600 + 3);
    }

    #[test]
    fn test_block_timestamp_with_zone_suffix() {
        let block = LedgerBlock {
            timestamp: "2026-02-01T00:00:00Z".to_string(),
            transactions: vec![],
        };
        assert_eq!(block.unix_timestamp().unwrap(), 1_769_904_000);

        let bad = LedgerBlock {
            timestamp: "yesterday".to_string(),
            transactions: vec![],
        };
        assert!(bad.unix_timestamp().is_err());
    }
}
