//! Content and curator vote storage operations.

use super::{ContentRecord, Storage};
use agenthive_core::ContentId;
use agenthive_engine::{ActivityItem, CuratorVote};
use anyhow::{Context, Result};
use sqlx::Row;

impl Storage {
    /// Insert or replace an indexed item.
    ///
    /// Keyed by content id; a replayed block rewrites the same values.
    pub async fn upsert_content(&self, record: &ContentRecord) -> Result<()> {
        let metadata = serde_json::to_string(&record.json_metadata)?;
        let tags = serde_json::to_string(&record.tags)?;

        sqlx::query(
            r#"
            INSERT INTO content (
                content_id, author, permlink, parent_author, parent_permlink,
                created_at, is_root, title, body, body_hash, json_metadata,
                tags, app, agent_kind, url, burn_valid
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(content_id) DO UPDATE SET
                parent_author = excluded.parent_author,
                parent_permlink = excluded.parent_permlink,
                created_at = excluded.created_at,
                is_root = excluded.is_root,
                title = excluded.title,
                body = excluded.body,
                body_hash = excluded.body_hash,
                json_metadata = excluded.json_metadata,
                tags = excluded.tags,
                app = excluded.app,
                agent_kind = excluded.agent_kind,
                url = excluded.url,
                burn_valid = excluded.burn_valid
            "#,
        )
        .bind(record.content_id.as_str())
        .bind(&record.author)
        .bind(&record.permlink)
        .bind(&record.parent_author)
        .bind(&record.parent_permlink)
        .bind(record.created_at)
        .bind(record.is_root())
        .bind(&record.title)
        .bind(&record.body)
        .bind(&record.body_hash)
        .bind(metadata)
        .bind(tags)
        .bind(&record.app)
        .bind(&record.agent_kind)
        .bind(&record.url)
        .bind(record.burn_valid)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to upsert content {}", record.content_id))?;

        Ok(())
    }

    /// Get an item by id.
    pub async fn get_content(&self, content_id: &ContentId) -> Result<Option<ContentRecord>> {
        let row = sqlx::query(
            r#"
            SELECT content_id, author, permlink, parent_author, parent_permlink,
                   created_at, title, body, body_hash, json_metadata, tags,
                   app, agent_kind, url, burn_valid
            FROM content
            WHERE content_id = ?
            "#,
        )
        .bind(content_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to fetch content {}", content_id))?;

        match row {
            Some(row) => Ok(Some(Self::row_to_content_record(row)?)),
            None => Ok(None),
        }
    }

    /// The author's own items created in `[start, end)`, oldest first.
    ///
    /// Items whose burn check failed are left out; unchecked items count.
    pub async fn author_activity(&self, author: &str, start: i64, end: i64) -> Result<Vec<ActivityItem>> {
        let rows = sqlx::query(
            r#"
            SELECT content_id, parent_author, is_root, created_at
            FROM content
            WHERE author = ?
              AND created_at >= ?
              AND created_at < ?
              AND (burn_valid IS NULL OR burn_valid = 1)
            ORDER BY created_at ASC, content_id ASC
            "#,
        )
        .bind(author)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to fetch activity for {}", author))?;

        Ok(rows
            .into_iter()
            .map(|row| ActivityItem {
                content_id: row.get("content_id"),
                parent_author: row.get("parent_author"),
                is_root: row.get("is_root"),
                created_at: row.get("created_at"),
            })
            .collect())
    }

    /// Replies by `author` in `[start, end)` grouped by the parent's author.
    ///
    /// Self-replies are included, grouped under the author's own name.
    /// Sorted by count descending, then name.
    pub async fn reply_counts_by_parent(&self, author: &str, start: i64, end: i64) -> Result<Vec<(String, u64)>> {
        let rows = sqlx::query(
            r#"
            SELECT parent_author, COUNT(*) AS replies
            FROM content
            WHERE author = ?1
              AND parent_author IS NOT NULL
              AND created_at >= ?2
              AND created_at < ?3
            GROUP BY parent_author
            ORDER BY replies DESC, parent_author ASC
            "#,
        )
        .bind(author)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to fetch reply counts for {}", author))?;

        Ok(rows
            .into_iter()
            .map(|row| {
                (
                    row.get::<String, _>("parent_author"),
                    row.get::<i64, _>("replies") as u64,
                )
            })
            .collect())
    }

    /// Record a curator vote. Repeated votes by the same curator are ignored.
    pub async fn insert_curator_vote(&self, content_id: &ContentId, curator: &str, created_at: i64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO curator_votes (content_id, curator, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT(content_id, curator) DO NOTHING
            "#,
        )
        .bind(content_id.as_str())
        .bind(curator)
        .bind(created_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to record vote on {}", content_id))?;

        Ok(())
    }

    /// Votes cast in `[start, end)` on content that passed the burn check.
    pub async fn curator_votes_in_window(&self, start: i64, end: i64) -> Result<Vec<CuratorVote>> {
        let rows = sqlx::query(
            r#"
            SELECT v.content_id, c.author, v.curator
            FROM curator_votes v
            JOIN content c ON c.content_id = v.content_id
            WHERE v.created_at >= ?
              AND v.created_at < ?
              AND c.burn_valid = 1
            ORDER BY v.content_id ASC, v.curator ASC
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch curator votes")?;

        Ok(rows
            .into_iter()
            .map(|row| CuratorVote {
                content_id: row.get("content_id"),
                author: row.get("author"),
                curator: row.get("curator"),
            })
            .collect())
    }

    fn row_to_content_record(row: sqlx::sqlite::SqliteRow) -> Result<ContentRecord> {
        let content_id: String = row.get("content_id");
        let metadata: String = row.get("json_metadata");
        let tags: String = row.get("tags");

        Ok(ContentRecord {
            content_id: ContentId::parse(&content_id)?,
            author: row.get("author"),
            permlink: row.get("permlink"),
            parent_author: row.get("parent_author"),
            parent_permlink: row.get("parent_permlink"),
            created_at: row.get("created_at"),
            title: row.get("title"),
            body: row.get("body"),
            body_hash: row.get("body_hash"),
            json_metadata: serde_json::from_str(&metadata)
                .with_context(|| format!("Corrupt metadata for {}", content_id))?,
            tags: serde_json::from_str(&tags)
                .with_context(|| format!("Corrupt tags for {}", content_id))?,
            app: row.get("app"),
            agent_kind: row.get("agent_kind"),
            url: row.get("url"),
            burn_valid: row.get("burn_valid"),
        })
    }
}
