//! Sync engine: walks irreversible blocks and indexes AgentHive comments.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use agenthive_core::OP_COMMENT;

use super::client::{LedgerBlock, LedgerClient};
use super::operations::{
    as_operation, build_content_record, check_auto_burn, is_included, parse_metadata, BurnCheck,
    CommentOp,
};
use crate::config::{PolicyConfig, SyncConfig};
use crate::retry::{with_retry, RetryPolicy};
use crate::schedule::sleep_or_shutdown;
use crate::storage::Storage;

/// What one iteration of the loop did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Nothing new below the irreversible height.
    Idle { indexed: u64, last_irreversible: u64 },
    /// Blocks `from..=to` were processed and checkpointed.
    Advanced { from: u64, to: u64, last_irreversible: u64 },
    /// Shutdown was requested part way; `indexed` is the last checkpoint.
    Interrupted { indexed: u64, last_irreversible: u64 },
}

/// Per-block counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockSummary {
    pub comments_seen: usize,
    pub indexed: usize,
    pub burn_invalid: usize,
    pub malformed: usize,
}

/// Sync engine indexes irreversible blocks and keeps the checkpoint.
pub struct SyncEngine {
    ledger: Arc<dyn LedgerClient>,
    storage: Storage,
    sync: SyncConfig,
    policy: PolicyConfig,
    head_retry: RetryPolicy,
    block_retry: RetryPolicy,
}

impl SyncEngine {
    /// Create a new sync engine.
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        storage: Storage,
        sync: SyncConfig,
        policy: PolicyConfig,
    ) -> Self {
        Self {
            ledger,
            storage,
            sync,
            policy,
            head_retry: RetryPolicy::chain_head(),
            block_retry: RetryPolicy::block(),
        }
    }

    /// Override the retry policies for head and block calls.
    pub fn with_retry_policies(mut self, head: RetryPolicy, block: RetryPolicy) -> Self {
        self.head_retry = head;
        self.block_retry = block;
        self
    }

    /// Run until shutdown is signalled.
    ///
    /// Errors never escape the loop: they are logged, the ledger client is
    /// asked to reconnect, and the next iteration starts after the poll
    /// interval from the last checkpoint.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(
            endpoint = %self.ledger.endpoint(),
            poll_ms = self.sync.poll_interval_ms,
            batch_size = self.sync.batch_size,
            accept_tags = self.policy.accept_tags,
            auto_burn_enforced = self.policy.auto_burn_enforced,
            "indexer_start"
        );

        let poll = Duration::from_millis(self.sync.poll_interval_ms);

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.step(&shutdown).await {
                Ok(outcome) => debug!(?outcome, "Indexer iteration finished"),
                Err(e) => {
                    error!(error = %format!("{:#}", e), "indexer_loop_error");
                    self.ledger.reconnect().await;
                }
            }

            if sleep_or_shutdown(poll, &mut shutdown).await {
                break;
            }
        }

        info!("Indexer stopped");
        Ok(())
    }

    /// One iteration: read the irreversible height, process up to
    /// `batch_size` blocks above the checkpoint, checkpoint after each one.
    pub async fn step(&self, shutdown: &watch::Receiver<bool>) -> Result<StepOutcome> {
        let head = with_retry(&self.head_retry, "get_chain_head", shutdown, |_| {
            self.ledger.get_chain_head()
        })
        .await
        .context("Failed to read chain head")?;
        let lib = head.last_irreversible_block_num;

        let state = self.storage.get_chain_state().await?;
        let indexed = match state.last_indexed {
            Some(height) => height,
            None => {
                let seeded = lib.saturating_sub(self.sync.bootstrap_lag);
                info!(lib, seeded, lag = self.sync.bootstrap_lag, "Seeding indexer checkpoint");
                seeded
            }
        }
        .max(1);

        let target = lib.min(indexed.saturating_add(self.sync.batch_size));
        if target <= indexed {
            self.storage.update_chain_state(lib, indexed).await?;
            return Ok(StepOutcome::Idle {
                indexed,
                last_irreversible: lib,
            });
        }

        for height in indexed + 1..=target {
            if *shutdown.borrow() {
                return Ok(StepOutcome::Interrupted {
                    indexed: height - 1,
                    last_irreversible: lib,
                });
            }

            let block = with_retry(&self.block_retry, "get_block", shutdown, |_| {
                self.ledger.get_block(height)
            })
            .await
            .with_context(|| format!("Failed to fetch block {}", height))?;

            if self.sync.heartbeat_every > 0 && height % self.sync.heartbeat_every == 0 {
                info!(
                    height,
                    lib,
                    endpoint = %self.ledger.endpoint(),
                    endpoints = ?self.ledger.endpoints(),
                    "indexer_heartbeat"
                );
            }

            let summary = self
                .process_block(height, &block)
                .await
                .with_context(|| format!("Failed to index block {}", height))?;
            if summary.comments_seen > 0 {
                debug!(height, ?summary, "Block indexed");
            }

            self.storage.update_chain_state(lib, height).await?;
        }

        Ok(StepOutcome::Advanced {
            from: indexed + 1,
            to: target,
            last_irreversible: lib,
        })
    }

    /// Index the AgentHive comments of one block.
    ///
    /// Every write is an upsert keyed on the content id, so processing the
    /// same block again converges to the same rows.
    pub async fn process_block(&self, height: u64, block: &LedgerBlock) -> Result<BlockSummary> {
        let created_at = block.unix_timestamp()?;
        let mut summary = BlockSummary::default();

        for tx in &block.transactions {
            for op in &tx.operations {
                let Some((kind, body)) = as_operation(op) else {
                    continue;
                };
                if kind != OP_COMMENT {
                    continue;
                }
                summary.comments_seen += 1;

                let comment: CommentOp = match serde_json::from_value(body.clone()) {
                    Ok(comment) => comment,
                    Err(e) => {
                        summary.malformed += 1;
                        warn!(height, error = %e, "Skipping malformed comment operation");
                        continue;
                    }
                };
                if comment.author.is_empty() || comment.permlink.is_empty() {
                    summary.malformed += 1;
                    warn!(height, "Skipping comment without author or permlink");
                    continue;
                }

                let metadata = parse_metadata(&comment.json_metadata);
                if !is_included(&metadata, &self.policy) {
                    continue;
                }

                let burn = check_auto_burn(&comment, tx, &self.policy);
                match &burn {
                    BurnCheck::MissingOptions => warn!(
                        author = %comment.author,
                        permlink = %comment.permlink,
                        "auto_burn_reject_no_options"
                    ),
                    BurnCheck::Invalid {
                        beneficiaries,
                        total_weight,
                    } => warn!(
                        author = %comment.author,
                        permlink = %comment.permlink,
                        beneficiaries = %serde_json::to_string(beneficiaries).unwrap_or_default(),
                        total_weight,
                        "auto_burn_reject_invalid"
                    ),
                    BurnCheck::Valid | BurnCheck::NotEnforced => {}
                }
                if !burn.is_valid() {
                    summary.burn_invalid += 1;
                }

                self.storage.ensure_account(&comment.author, created_at).await?;

                let record = build_content_record(&comment, metadata, created_at, burn.is_valid());
                self.storage.upsert_content(&record).await?;
                self.storage.refresh_account_activity(&comment.author).await?;

                summary.indexed += 1;
            }
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::client::LedgerTransaction;
    use crate::listener::memory::MemoryLedger;
    use crate::storage::test_support::setup_storage;
    use agenthive_core::ContentId;
    use serde_json::{json, Value};

    fn comment_op(author: &str, permlink: &str, parent: &str, meta: Value) -> Value {
        let (parent_permlink, title) = if parent.is_empty() {
            ("agenthive", "A post")
        } else {
            ("root", "")
        };
        json!(["comment", {
            "parent_author": parent,
            "parent_permlink": parent_permlink,
            "author": author,
            "permlink": permlink,
            "title": title,
            "body": format!("body of {}", permlink),
            "json_metadata": meta.to_string(),
        }])
    }

    fn app_meta() -> Value {
        json!({"app": "agenthive/1.0", "tags": ["agenthive"]})
    }

    fn block(timestamp: &str, ops: Vec<Value>) -> LedgerBlock {
        LedgerBlock {
            timestamp: timestamp.to_string(),
            transactions: vec![LedgerTransaction { operations: ops }],
        }
    }

    fn empty_block() -> LedgerBlock {
        block("2026-02-01T00:00:00", vec![])
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            retries: 1,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
            max_jitter: Duration::ZERO,
        }
    }

    fn engine(ledger: Arc<MemoryLedger>, storage: Storage, sync: SyncConfig, policy: PolicyConfig) -> SyncEngine {
        SyncEngine::new(ledger, storage, sync, policy).with_retry_policies(fast_retry(), fast_retry())
    }

    fn sync_config(batch_size: u64, bootstrap_lag: u64) -> SyncConfig {
        SyncConfig {
            batch_size,
            bootstrap_lag,
            ..SyncConfig::default()
        }
    }

    #[tokio::test]
    async fn test_first_run_bootstraps_behind_lib() {
        let (storage, _temp_db) = setup_storage().await;
        let ledger = Arc::new(MemoryLedger::new());
        for height in 1..=100 {
            ledger.push_block(height, empty_block());
        }
        let (_tx, rx) = watch::channel(false);

        let engine = engine(ledger.clone(), storage.clone(), sync_config(50, 10), PolicyConfig::default());
        let outcome = engine.step(&rx).await.unwrap();

        assert_eq!(
            outcome,
            StepOutcome::Advanced {
                from: 91,
                to: 100,
                last_irreversible: 100
            }
        );
        assert_eq!(ledger.block_requests(), (91..=100).collect::<Vec<_>>());

        let state = storage.get_chain_state().await.unwrap();
        assert_eq!(state.last_indexed, Some(100));
        assert_eq!(state.last_irreversible, 100);

        // Caught up: the next step is idle and still checkpoints.
        let outcome = engine.step(&rx).await.unwrap();
        assert_eq!(
            outcome,
            StepOutcome::Idle {
                indexed: 100,
                last_irreversible: 100
            }
        );

        storage.close().await;
    }

    #[tokio::test]
    async fn test_bootstrap_floor_is_one() {
        let (storage, _temp_db) = setup_storage().await;
        let ledger = Arc::new(MemoryLedger::new());
        for height in 1..=5 {
            ledger.push_block(height, empty_block());
        }
        let (_tx, rx) = watch::channel(false);

        let engine = engine(ledger.clone(), storage.clone(), sync_config(50, 50), PolicyConfig::default());
        let outcome = engine.step(&rx).await.unwrap();

        assert_eq!(
            outcome,
            StepOutcome::Advanced {
                from: 2,
                to: 5,
                last_irreversible: 5
            }
        );

        storage.close().await;
    }

    #[tokio::test]
    async fn test_batches_never_pass_lib() {
        let (storage, _temp_db) = setup_storage().await;
        let ledger = Arc::new(MemoryLedger::new());
        for height in 1..=30 {
            ledger.insert_block(height, empty_block());
        }
        ledger.set_last_irreversible(12);
        storage.update_chain_state(0, 1).await.unwrap();
        let (_tx, rx) = watch::channel(false);

        let engine = engine(ledger.clone(), storage.clone(), sync_config(4, 0), PolicyConfig::default());

        assert_eq!(
            engine.step(&rx).await.unwrap(),
            StepOutcome::Advanced { from: 2, to: 5, last_irreversible: 12 }
        );
        assert_eq!(
            engine.step(&rx).await.unwrap(),
            StepOutcome::Advanced { from: 6, to: 9, last_irreversible: 12 }
        );
        assert_eq!(
            engine.step(&rx).await.unwrap(),
            StepOutcome::Advanced { from: 10, to: 12, last_irreversible: 12 }
        );
        assert!(matches!(engine.step(&rx).await.unwrap(), StepOutcome::Idle { .. }));
        assert!(ledger.block_requests().iter().all(|h| *h <= 12));

        storage.close().await;
    }

    #[tokio::test]
    async fn test_indexes_only_app_comments() {
        let (storage, _temp_db) = setup_storage().await;
        let ledger = Arc::new(MemoryLedger::new());
        ledger.push_block(
            2,
            block(
                "2026-02-01T10:00:00",
                vec![
                    comment_op("alice", "hello", "", app_meta()),
                    comment_op("bob", "other-app", "", json!({"app": "peakd/1.0", "tags": ["agenthive"]})),
                    comment_op("carol", "broken", "", json!(null)),
                    json!(["vote", {"voter": "dave", "author": "alice", "permlink": "hello", "weight": 10000}]),
                    json!(["comment", {"author": 42}]),
                ],
            ),
        );
        storage.update_chain_state(1, 1).await.unwrap();
        let (_tx, rx) = watch::channel(false);

        let engine = engine(ledger.clone(), storage.clone(), sync_config(50, 0), PolicyConfig::default());
        engine.step(&rx).await.unwrap();

        let stats = storage.stats().await.unwrap();
        assert_eq!(stats.content_count, 1);
        assert_eq!(stats.account_count, 1);

        let item = storage
            .get_content(&ContentId::new("alice", "hello"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(item.created_at, 1_769_940_000);
        assert_eq!(item.burn_valid, Some(true));
        assert_eq!(item.title.as_deref(), Some("A post"));

        let account = storage.get_account("alice").await.unwrap().unwrap();
        assert_eq!(account.created_at, 1_769_940_000);
        assert_eq!(account.items, 1);
        assert_eq!(account.active_days, 1);

        storage.close().await;
    }

    #[tokio::test]
    async fn test_tag_acceptance_and_burn_flags() {
        let (storage, _temp_db) = setup_storage().await;
        let ledger = Arc::new(MemoryLedger::new());
        let burn_ok = json!(["comment_options", {
            "author": "alice",
            "permlink": "burned",
            "extensions": [["comment_payout_beneficiaries", {"beneficiaries": [{"account": "null", "weight": 10000}]}]]
        }]);
        ledger.push_block(
            2,
            LedgerBlock {
                timestamp: "2026-02-01T10:00:00".to_string(),
                transactions: vec![
                    LedgerTransaction {
                        operations: vec![comment_op("alice", "burned", "", app_meta()), burn_ok],
                    },
                    LedgerTransaction {
                        operations: vec![comment_op(
                            "bob",
                            "tagged",
                            "",
                            json!({"app": "peakd/1.0", "tags": ["agenthive"]}),
                        )],
                    },
                ],
            },
        );
        storage.update_chain_state(1, 1).await.unwrap();
        let (_tx, rx) = watch::channel(false);

        let policy = PolicyConfig {
            accept_tags: true,
            tag_whitelist: vec!["agenthive".to_string()],
            auto_burn_enforced: true,
        };
        let engine = engine(ledger.clone(), storage.clone(), sync_config(50, 0), policy);
        engine.step(&rx).await.unwrap();

        let burned = storage
            .get_content(&ContentId::new("alice", "burned"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(burned.burn_valid, Some(true));

        // Included through the tag, flagged because it has no options.
        let tagged = storage
            .get_content(&ContentId::new("bob", "tagged"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tagged.burn_valid, Some(false));

        storage.close().await;
    }

    #[tokio::test]
    async fn test_replaying_a_block_is_idempotent() {
        let (storage, _temp_db) = setup_storage().await;
        let ledger = Arc::new(MemoryLedger::new());
        let engine = engine(ledger, storage.clone(), sync_config(50, 0), PolicyConfig::default());

        let first = block(
            "2026-02-01T10:00:00",
            vec![
                comment_op("alice", "hello", "", app_meta()),
                comment_op("bob", "re-hello", "alice", app_meta()),
            ],
        );

        let summary = engine.process_block(2, &first).await.unwrap();
        assert_eq!(summary.indexed, 2);
        let alice_before = storage.get_content(&ContentId::new("alice", "hello")).await.unwrap();
        let bob_before = storage.get_account("bob").await.unwrap().unwrap();

        engine.process_block(2, &first).await.unwrap();
        engine.process_block(2, &first).await.unwrap();

        assert_eq!(storage.stats().await.unwrap().content_count, 2);
        assert_eq!(
            storage.get_content(&ContentId::new("alice", "hello")).await.unwrap(),
            alice_before
        );
        let bob_after = storage.get_account("bob").await.unwrap().unwrap();
        assert_eq!(bob_after.items, bob_before.items);
        assert_eq!(bob_after.created_at, bob_before.created_at);

        storage.close().await;
    }

    #[tokio::test]
    async fn test_failed_block_keeps_checkpoint_then_resumes() {
        let (storage, _temp_db) = setup_storage().await;
        let ledger = Arc::new(MemoryLedger::new());
        for height in 2..=6 {
            ledger.push_block(
                height,
                block(
                    "2026-02-01T10:00:00",
                    vec![comment_op("alice", &format!("p{}", height), "", app_meta())],
                ),
            );
        }
        storage.update_chain_state(1, 1).await.unwrap();
        let (_tx, rx) = watch::channel(false);
        let engine = engine(ledger.clone(), storage.clone(), sync_config(50, 0), PolicyConfig::default());

        // Block 2 succeeds, then block 3 fails beyond the retry budget.
        ledger.insert_block(3, LedgerBlock {
            timestamp: "not a time".to_string(),
            transactions: vec![],
        });
        assert!(engine.step(&rx).await.is_err());
        assert_eq!(storage.get_chain_state().await.unwrap().last_indexed, Some(2));

        // Transient failures within the retry budget are absorbed.
        ledger.insert_block(
            3,
            block(
                "2026-02-01T10:00:03",
                vec![comment_op("alice", "p3", "", app_meta())],
            ),
        );
        ledger.fail_next_block_calls(1);
        let outcome = engine.step(&rx).await.unwrap();
        assert_eq!(
            outcome,
            StepOutcome::Advanced { from: 3, to: 6, last_irreversible: 6 }
        );
        assert_eq!(storage.stats().await.unwrap().content_count, 5);

        storage.close().await;
    }

    #[tokio::test]
    async fn test_head_failure_surfaces_after_retries() {
        let (storage, _temp_db) = setup_storage().await;
        let ledger = Arc::new(MemoryLedger::new());
        ledger.push_block(5, empty_block());
        ledger.fail_next_head_calls(2);
        let (_tx, rx) = watch::channel(false);

        let engine = engine(ledger.clone(), storage.clone(), sync_config(50, 0), PolicyConfig::default());
        assert!(engine.step(&rx).await.is_err());
        assert_eq!(storage.get_chain_state().await.unwrap().last_indexed, None);

        storage.close().await;
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_between_blocks() {
        let (storage, _temp_db) = setup_storage().await;
        let ledger = Arc::new(MemoryLedger::new());
        for height in 1..=10 {
            ledger.push_block(height, empty_block());
        }
        storage.update_chain_state(1, 1).await.unwrap();
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let engine = engine(ledger.clone(), storage.clone(), sync_config(50, 0), PolicyConfig::default());
        let outcome = engine.step(&rx).await.unwrap();

        assert_eq!(
            outcome,
            StepOutcome::Interrupted { indexed: 1, last_irreversible: 10 }
        );
        assert!(ledger.block_requests().is_empty());

        storage.close().await;
    }

    #[tokio::test]
    async fn test_run_reconnects_after_errors_and_stops_on_shutdown() {
        let (storage, _temp_db) = setup_storage().await;
        let ledger = Arc::new(MemoryLedger::new());
        ledger.push_block(3, empty_block());
        ledger.fail_next_head_calls(4);
        let (tx, rx) = watch::channel(false);

        let sync = SyncConfig {
            poll_interval_ms: 5,
            ..sync_config(50, 0)
        };
        let engine = engine(ledger.clone(), storage.clone(), sync, PolicyConfig::default());
        let handle = tokio::spawn(async move { engine.run(rx).await });

        tokio::time::sleep(Duration::from_millis(300)).await;
        tx.send(true).unwrap();
        handle.await.unwrap().unwrap();

        assert!(ledger.reconnect_count() >= 2);
        // Once the ledger recovers the checkpoint is seeded.
        assert_eq!(storage.get_chain_state().await.unwrap().last_indexed, Some(3));

        storage.close().await;
    }
}
