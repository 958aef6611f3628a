//! Chain state (indexer checkpoint) storage operations.

use super::{ChainState, Storage};
use anyhow::{Context, Result};
use sqlx::Row;

impl Storage {
    /// Get the current checkpoint.
    pub async fn get_chain_state(&self) -> Result<ChainState> {
        let row = sqlx::query(
            r#"
            SELECT last_irreversible_block_num, last_indexed_block_num, updated_at
            FROM chain_state
            WHERE id = 1
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .context("Failed to fetch chain state")?;

        Ok(ChainState {
            last_irreversible: row.get::<i64, _>("last_irreversible_block_num") as u64,
            last_indexed: row
                .get::<Option<i64>, _>("last_indexed_block_num")
                .map(|height| height as u64),
            updated_at: row.get("updated_at"),
        })
    }

    /// Record progress.
    ///
    /// Both heights only ever move forward: a write with a lower height than
    /// the stored one keeps the stored value.
    pub async fn update_chain_state(&self, last_irreversible: u64, last_indexed: u64) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            UPDATE chain_state
            SET last_irreversible_block_num = MAX(last_irreversible_block_num, ?),
                last_indexed_block_num = MAX(COALESCE(last_indexed_block_num, 0), ?),
                updated_at = ?
            WHERE id = 1
            "#,
        )
        .bind(last_irreversible as i64)
        .bind(last_indexed as i64)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to update chain state")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::test_support::setup_storage;

    #[tokio::test]
    async fn test_initial_chain_state_is_unseeded() {
        let (storage, _temp_db) = setup_storage().await;

        let state = storage.get_chain_state().await.unwrap();
        assert_eq!(state.last_irreversible, 0);
        assert_eq!(state.last_indexed, None);

        storage.close().await;
    }

    #[tokio::test]
    async fn test_chain_state_never_moves_backwards() {
        let (storage, _temp_db) = setup_storage().await;

        storage.update_chain_state(1_000, 950).await.unwrap();
        let state = storage.get_chain_state().await.unwrap();
        assert_eq!(state.last_irreversible, 1_000);
        assert_eq!(state.last_indexed, Some(950));
        assert!(state.updated_at > 0);

        // A lagging endpoint reports older heights.
        storage.update_chain_state(990, 940).await.unwrap();
        let state = storage.get_chain_state().await.unwrap();
        assert_eq!(state.last_irreversible, 1_000);
        assert_eq!(state.last_indexed, Some(950));

        storage.update_chain_state(1_010, 1_000).await.unwrap();
        let state = storage.get_chain_state().await.unwrap();
        assert_eq!(state.last_irreversible, 1_010);
        assert_eq!(state.last_indexed, Some(1_000));

        storage.close().await;
    }
}
