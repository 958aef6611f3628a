//! Chain Indexer: ledger access and the block-walking sync engine.
//!
//! This module provides:
//! - The [`LedgerClient`] capability with JSON-RPC and in-memory implementations
//! - Comment filtering (inclusion policy, auto-burn check) and field extraction
//! - The sync engine that checkpoints progress block by block

pub mod client;
pub mod memory;
pub mod operations;
pub mod rpc;
pub mod sync;

pub use client::{ChainHead, LedgerBlock, LedgerClient, LedgerTransaction};
pub use memory::MemoryLedger;
pub use rpc::RpcLedgerClient;
pub use sync::{BlockSummary, StepOutcome, SyncEngine};
