//! In-memory ledger for tests and local replays.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;

use super::client::{ChainHead, LedgerBlock, LedgerClient};

#[derive(Debug, Default)]
struct MemoryLedgerState {
    last_irreversible: u64,
    blocks: BTreeMap<u64, LedgerBlock>,
    failing_head_calls: u32,
    failing_block_calls: u32,
    block_requests: Vec<u64>,
    reconnects: u32,
}

/// Ledger backed by a map of blocks, with injectable transient failures.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: Mutex<MemoryLedgerState>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a block and raise the irreversible height to include it.
    pub fn push_block(&self, height: u64, block: LedgerBlock) {
        let mut state = self.lock();
        state.blocks.insert(height, block);
        state.last_irreversible = state.last_irreversible.max(height);
    }

    /// Add a block without touching the irreversible height.
    pub fn insert_block(&self, height: u64, block: LedgerBlock) {
        self.lock().blocks.insert(height, block);
    }

    pub fn set_last_irreversible(&self, height: u64) {
        self.lock().last_irreversible = height;
    }

    /// Fail the next `n` head queries.
    pub fn fail_next_head_calls(&self, n: u32) {
        self.lock().failing_head_calls = n;
    }

    /// Fail the next `n` block fetches.
    pub fn fail_next_block_calls(&self, n: u32) {
        self.lock().failing_block_calls = n;
    }

    pub fn reconnect_count(&self) -> u32 {
        self.lock().reconnects
    }

    /// Heights requested through `get_block`, in order.
    pub fn block_requests(&self) -> Vec<u64> {
        self.lock().block_requests.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryLedgerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl LedgerClient for MemoryLedger {
    async fn get_chain_head(&self) -> Result<ChainHead> {
        let mut state = self.lock();
        if state.failing_head_calls > 0 {
            state.failing_head_calls -= 1;
            anyhow::bail!("injected chain head failure");
        }
        Ok(ChainHead {
            last_irreversible_block_num: state.last_irreversible,
            head_block_number: state.last_irreversible,
        })
    }

    async fn get_block(&self, height: u64) -> Result<LedgerBlock> {
        let mut state = self.lock();
        state.block_requests.push(height);
        if state.failing_block_calls > 0 {
            state.failing_block_calls -= 1;
            anyhow::bail!("injected failure fetching block {}", height);
        }
        match state.blocks.get(&height) {
            Some(block) => Ok(block.clone()),
            None => anyhow::bail!("Block {} not available yet", height),
        }
    }

    async fn reconnect(&self) {
        self.lock().reconnects += 1;
    }

    fn endpoint(&self) -> String {
        "memory".to_string()
    }
}
