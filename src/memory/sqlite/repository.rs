use super::SqliteMetadataStore;
use super::codec::{
    HistoryRow, RECORD_COLUMNS, RecordRow, history_from_row, parse_state, record_from_row,
};
use crate::memory::store::MetadataStore;
use crate::memory::types::{
    AccessKind, MemoryRecord, MemoryState, MemoryUpdate, StatusChange, format_timestamp,
};
use crate::memory::vector::vec_to_bytes;
use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqliteConnection;
use std::collections::HashMap;

async fn append_history(
    conn: &mut SqliteConnection,
    memory_id: &str,
    old_state: Option<MemoryState>,
    new_state: MemoryState,
    reason: &str,
) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO memory_status_history (memory_id, old_state, new_state, changed_at, reason)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )
    .bind(memory_id)
    .bind(old_state.map(|s| s.to_string()))
    .bind(new_state.to_string())
    .bind(format_timestamp(&Utc::now()))
    .bind(reason)
    .execute(conn)
    .await
    .context("append status history")?;
    Ok(())
}

async fn load_categories(conn: &mut SqliteConnection, id: &str) -> anyhow::Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT category FROM memory_categories WHERE memory_id = ?1 ORDER BY category",
    )
    .bind(id)
    .fetch_all(conn)
    .await
    .context("load categories")?;
    Ok(rows.into_iter().map(|(category,)| category).collect())
}

async fn fetch_record(conn: &mut SqliteConnection, id: &str) -> anyhow::Result<Option<MemoryRecord>> {
    let row: Option<RecordRow> =
        sqlx::query_as(&format!("SELECT {RECORD_COLUMNS} FROM memories WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
            .context("fetch memory row")?;
    let Some(row) = row else {
        return Ok(None);
    };
    let mut record = record_from_row(row)?;
    record.categories = load_categories(conn, id).await?;
    Ok(Some(record))
}

async fn fetch_live(conn: &mut SqliteConnection, id: &str) -> anyhow::Result<MemoryRecord> {
    let record = fetch_record(conn, id)
        .await?
        .with_context(|| format!("memory {id} does not exist"))?;
    anyhow::ensure!(record.state.is_live(), "memory {id} is not live");
    Ok(record)
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn insert(&self, record: &MemoryRecord) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await.context("begin insert")?;
        sqlx::query(
            "INSERT INTO memories (id, owner, text, embedding, state, created_at, updated_at, source)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(&record.id)
        .bind(&record.owner)
        .bind(&record.text)
        .bind(vec_to_bytes(&record.embedding))
        .bind(record.state.to_string())
        .bind(format_timestamp(&record.created_at))
        .bind(format_timestamp(&record.updated_at))
        .bind(&record.source)
        .execute(&mut *tx)
        .await
        .context("insert memory row")?;
        append_history(&mut tx, &record.id, None, record.state, &record.source).await?;
        tx.commit().await.context("commit insert")?;
        Ok(())
    }

    async fn activate(&self, id: &str) -> anyhow::Result<MemoryRecord> {
        let mut tx = self.pool.begin().await.context("begin activate")?;
        let current = fetch_record(&mut tx, id)
            .await?
            .with_context(|| format!("memory {id} does not exist"))?;
        anyhow::ensure!(
            current.state == MemoryState::Pending,
            "memory {id} is {}, not pending",
            current.state
        );
        sqlx::query("UPDATE memories SET state = ?1 WHERE id = ?2")
            .bind(MemoryState::Active.to_string())
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("activate memory row")?;
        append_history(
            &mut tx,
            id,
            Some(MemoryState::Pending),
            MemoryState::Active,
            &current.source,
        )
        .await?;
        tx.commit().await.context("commit activate")?;
        Ok(MemoryRecord {
            state: MemoryState::Active,
            ..current
        })
    }

    async fn pending(&self, owner: &str) -> anyhow::Result<Vec<MemoryRecord>> {
        let rows: Vec<RecordRow> = sqlx::query_as(&format!(
            "SELECT {RECORD_COLUMNS} FROM memories
             WHERE owner = ?1 AND state = 'pending'
             ORDER BY created_at, id"
        ))
        .bind(owner)
        .fetch_all(&self.pool)
        .await
        .context("list pending memories")?;
        rows.into_iter().map(record_from_row).collect()
    }

    async fn update(&self, id: &str, update: &MemoryUpdate) -> anyhow::Result<MemoryRecord> {
        let mut tx = self.pool.begin().await.context("begin update")?;
        let current = fetch_live(&mut tx, id).await?;
        sqlx::query(
            "UPDATE memories
             SET text = ?1, embedding = ?2, state = ?3, updated_at = ?4, source = ?5
             WHERE id = ?6",
        )
        .bind(&update.text)
        .bind(vec_to_bytes(&update.embedding))
        .bind(MemoryState::Updated.to_string())
        .bind(format_timestamp(&update.updated_at))
        .bind(&update.source)
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("update memory row")?;
        append_history(
            &mut tx,
            id,
            Some(current.state),
            MemoryState::Updated,
            &update.source,
        )
        .await?;
        let updated = fetch_live(&mut tx, id).await?;
        tx.commit().await.context("commit update")?;
        Ok(updated)
    }

    async fn tombstone(&self, id: &str, source: &str) -> anyhow::Result<MemoryRecord> {
        let mut tx = self.pool.begin().await.context("begin tombstone")?;
        let current = fetch_live(&mut tx, id).await?;
        sqlx::query("UPDATE memories SET state = ?1, updated_at = ?2, source = ?3 WHERE id = ?4")
            .bind(MemoryState::Deleted.to_string())
            .bind(format_timestamp(&Utc::now()))
            .bind(source)
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("tombstone memory row")?;
        append_history(&mut tx, id, Some(current.state), MemoryState::Deleted, source).await?;
        let tombstoned = fetch_record(&mut tx, id)
            .await?
            .with_context(|| format!("memory {id} vanished during tombstone"))?;
        tx.commit().await.context("commit tombstone")?;
        Ok(tombstoned)
    }

    async fn get(&self, id: &str) -> anyhow::Result<Option<MemoryRecord>> {
        let mut conn = self.pool.acquire().await.context("acquire connection")?;
        fetch_record(&mut conn, id).await
    }

    async fn list_active(&self, owner: &str) -> anyhow::Result<Vec<MemoryRecord>> {
        let rows: Vec<RecordRow> = sqlx::query_as(&format!(
            "SELECT {RECORD_COLUMNS} FROM memories
             WHERE owner = ?1 AND state IN ('active', 'updated')
             ORDER BY updated_at DESC, id ASC"
        ))
        .bind(owner)
        .fetch_all(&self.pool)
        .await
        .context("list live memories")?;
        let mut records = rows
            .into_iter()
            .map(record_from_row)
            .collect::<anyhow::Result<Vec<_>>>()?;

        let tags: Vec<(String, String)> = sqlx::query_as(
            "SELECT c.memory_id, c.category
             FROM memory_categories c JOIN memories m ON m.id = c.memory_id
             WHERE m.owner = ?1 AND m.state IN ('active', 'updated')
             ORDER BY c.category",
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await
        .context("list categories")?;
        let mut by_memory: HashMap<String, Vec<String>> = HashMap::new();
        for (memory_id, category) in tags {
            by_memory.entry(memory_id).or_default().push(category);
        }
        for record in &mut records {
            if let Some(categories) = by_memory.remove(&record.id) {
                record.categories = categories;
            }
        }
        Ok(records)
    }

    async fn discard(&self, id: &str) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await.context("begin discard")?;
        sqlx::query("DELETE FROM memory_status_history WHERE memory_id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("discard status history")?;
        sqlx::query("DELETE FROM memory_access_log WHERE memory_id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("discard access log")?;
        sqlx::query("DELETE FROM memory_categories WHERE memory_id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("discard categories")?;
        sqlx::query("DELETE FROM memories WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("discard memory row")?;
        tx.commit().await.context("commit discard")?;
        Ok(())
    }

    async fn restore(&self, snapshot: &MemoryRecord) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await.context("begin restore")?;
        let current_state: Option<(String,)> =
            sqlx::query_as("SELECT state FROM memories WHERE id = ?1")
                .bind(&snapshot.id)
                .fetch_optional(&mut *tx)
                .await
                .context("read state before restore")?;
        let old_state = current_state
            .map(|(raw,)| parse_state(&raw))
            .transpose()?;

        sqlx::query(
            "INSERT INTO memories (id, owner, text, embedding, state, created_at, updated_at, source)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                text = excluded.text,
                embedding = excluded.embedding,
                state = excluded.state,
                updated_at = excluded.updated_at,
                source = excluded.source",
        )
        .bind(&snapshot.id)
        .bind(&snapshot.owner)
        .bind(&snapshot.text)
        .bind(vec_to_bytes(&snapshot.embedding))
        .bind(snapshot.state.to_string())
        .bind(format_timestamp(&snapshot.created_at))
        .bind(format_timestamp(&snapshot.updated_at))
        .bind(&snapshot.source)
        .execute(&mut *tx)
        .await
        .context("restore memory row")?;

        if old_state != Some(snapshot.state) {
            append_history(&mut tx, &snapshot.id, old_state, snapshot.state, "restore").await?;
        }
        tx.commit().await.context("commit restore")?;
        Ok(())
    }

    async fn add_categories(&self, id: &str, categories: &[String]) -> anyhow::Result<()> {
        if categories.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await.context("begin categorize")?;
        for category in categories {
            sqlx::query(
                "INSERT OR IGNORE INTO memory_categories (memory_id, category) VALUES (?1, ?2)",
            )
            .bind(id)
            .bind(category)
            .execute(&mut *tx)
            .await
            .context("tag memory")?;
        }
        tx.commit().await.context("commit categorize")?;
        Ok(())
    }

    async fn owners(&self) -> anyhow::Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT owner FROM memories WHERE state != 'pending' ORDER BY owner",
        )
                .fetch_all(&self.pool)
                .await
                .context("list owners")?;
        Ok(rows.into_iter().map(|(owner,)| owner).collect())
    }

    async fn record_access(
        &self,
        owner: &str,
        memory_ids: &[String],
        kind: AccessKind,
    ) -> anyhow::Result<()> {
        if memory_ids.is_empty() {
            return Ok(());
        }
        let accessed_at = format_timestamp(&Utc::now());
        let access_type = kind.to_string();
        let mut tx = self.pool.begin().await.context("begin access log")?;
        for memory_id in memory_ids {
            sqlx::query(
                "INSERT INTO memory_access_log (memory_id, owner, access_type, accessed_at)
                 VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(memory_id)
            .bind(owner)
            .bind(&access_type)
            .bind(&accessed_at)
            .execute(&mut *tx)
            .await
            .context("append access log")?;
        }
        tx.commit().await.context("commit access log")?;
        Ok(())
    }

    async fn status_history(&self, id: &str) -> anyhow::Result<Vec<StatusChange>> {
        let rows: Vec<HistoryRow> = sqlx::query_as(
            "SELECT memory_id, old_state, new_state, changed_at, reason
             FROM memory_status_history WHERE memory_id = ?1 ORDER BY history_id",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .context("read status history")?;
        rows.into_iter().map(history_from_row).collect()
    }

    async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}
