use crate::memory::types::{MemoryRecord, MemoryState, StatusChange, parse_timestamp};
use crate::memory::vector::bytes_to_vec;
use anyhow::Context;
use std::str::FromStr;

pub(super) const RECORD_COLUMNS: &str =
    "id, owner, text, embedding, state, created_at, updated_at, source";

pub(super) type RecordRow = (
    String,
    String,
    String,
    Option<Vec<u8>>,
    String,
    String,
    String,
    String,
);

pub(super) type HistoryRow = (String, Option<String>, String, String, String);

pub(super) fn parse_state(raw: &str) -> anyhow::Result<MemoryState> {
    MemoryState::from_str(raw).with_context(|| format!("unknown memory state '{raw}'"))
}

pub(super) fn record_from_row(row: RecordRow) -> anyhow::Result<MemoryRecord> {
    let (id, owner, text, embedding, state, created_at, updated_at, source) = row;
    Ok(MemoryRecord {
        state: parse_state(&state)?,
        created_at: parse_timestamp(&created_at)
            .with_context(|| format!("bad created_at on memory {id}"))?,
        updated_at: parse_timestamp(&updated_at)
            .with_context(|| format!("bad updated_at on memory {id}"))?,
        embedding: embedding.as_deref().map(bytes_to_vec).unwrap_or_default(),
        id,
        owner,
        text,
        source,
        categories: Vec::new(),
    })
}

pub(super) fn history_from_row(row: HistoryRow) -> anyhow::Result<StatusChange> {
    let (memory_id, old_state, new_state, changed_at, reason) = row;
    Ok(StatusChange {
        old_state: old_state.as_deref().map(parse_state).transpose()?,
        new_state: parse_state(&new_state)?,
        changed_at: parse_timestamp(&changed_at)?,
        memory_id,
        reason,
    })
}
