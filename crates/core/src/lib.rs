//! # AgentHive Core
//!
//! Shared vocabulary for the AgentHive ingest-to-reward pipeline.
//!
//! This crate is used by the indexer, the participation scorer and the payout
//! distributor so that every component agrees on:
//!
//! - **Constants**: the canonical application id, the burn sink identity and
//!   the ledger operation names the indexer looks for
//! - **Content ids**: `@author/permlink` identifiers and their URL-safe form
//! - **Payout vocabulary**: run kinds and lifecycle states with stable
//!   database string forms

#![warn(missing_docs)]

pub mod constants;
pub mod error;
pub mod types;

// Re-export commonly used items
pub use constants::*;
pub use error::{CoreError, Result};
pub use types::*;
