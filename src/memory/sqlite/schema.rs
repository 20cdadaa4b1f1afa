use anyhow::Context;
use sqlx::SqlitePool;

pub(super) async fn init_schema(pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::raw_sql(
        "-- Authoritative memory rows; tombstones stay with state = 'deleted'
        CREATE TABLE IF NOT EXISTS memories (
            id          TEXT PRIMARY KEY,
            owner       TEXT NOT NULL,
            text        TEXT NOT NULL,
            embedding   BLOB,
            state       TEXT NOT NULL CHECK (state IN ('pending', 'active', 'updated', 'deleted')),
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL,
            source      TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_memories_owner_state
            ON memories(owner, state, updated_at DESC);

        -- Append-only ledger of state transitions
        CREATE TABLE IF NOT EXISTS memory_status_history (
            history_id  INTEGER PRIMARY KEY AUTOINCREMENT,
            memory_id   TEXT NOT NULL,
            old_state   TEXT,
            new_state   TEXT NOT NULL,
            changed_at  TEXT NOT NULL,
            reason      TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_status_history_memory
            ON memory_status_history(memory_id, history_id);

        -- Topical tags; only ever added to, never rewritten
        CREATE TABLE IF NOT EXISTS memory_categories (
            memory_id   TEXT NOT NULL,
            category    TEXT NOT NULL,
            PRIMARY KEY (memory_id, category)
        );
        CREATE INDEX IF NOT EXISTS idx_categories_name ON memory_categories(category);

        -- Read-path access log
        CREATE TABLE IF NOT EXISTS memory_access_log (
            access_id   INTEGER PRIMARY KEY AUTOINCREMENT,
            memory_id   TEXT NOT NULL,
            owner       TEXT NOT NULL,
            access_type TEXT NOT NULL,
            accessed_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_access_log_memory ON memory_access_log(memory_id);",
    )
    .execute(pool)
    .await
    .context("init metadata schema")?;
    Ok(())
}
