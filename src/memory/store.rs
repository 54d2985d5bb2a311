//! Storage engine for sessions and memory entries.
//!
//! [`MemoryStore`] owns a [`ConnectionPool`] over the memory database. Every
//! mutating call runs inside one transaction; errors roll back and are
//! returned to the caller, which decides how to degrade.

use std::path::Path;
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};

use super::stats::{self, SessionSummary};
use super::types::{
    char_len, clamp_importance, format_timestamp, now, parse_timestamp, EntryChunk, MemoryEntry,
    Metadata, NewEntry, Session,
};
use super::{decode_json, like_pattern, tag_suffix};
use crate::config::MnemoConfig;
use crate::db::{ConnectionPool, StoreKind};
use crate::error::{MemoryError, Result};

const ENTRY_COLUMNS: &str =
    "id, session_id, content, content_type, importance, tags, metadata, created_at, updated_at";

const RANKING: &str = "ORDER BY importance DESC, created_at DESC, id DESC";

/// Knobs for splitting large entries into bulk-retrieval chunks.
#[derive(Debug, Clone, Copy)]
pub struct StoreSettings {
    /// Entries longer than this many characters are also stored as chunks.
    pub entry_chunk_threshold: usize,
    /// Characters per chunk.
    pub entry_chunk_size: usize,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            entry_chunk_threshold: 1000,
            entry_chunk_size: 500,
        }
    }
}

pub struct MemoryStore {
    pool: ConnectionPool,
    settings: StoreSettings,
}

impl MemoryStore {
    pub fn open(
        path: impl AsRef<Path>,
        idle_timeout: Duration,
        settings: StoreSettings,
    ) -> Result<Self> {
        let pool = ConnectionPool::open(path, StoreKind::Memory, idle_timeout)?;
        Ok(Self { pool, settings })
    }

    pub fn from_config(config: &MnemoConfig) -> Result<Self> {
        Self::open(
            config.memory_db_path(),
            config.idle_connection_timeout(),
            StoreSettings {
                entry_chunk_threshold: config.memory.entry_chunk_threshold,
                entry_chunk_size: config.memory.entry_chunk_size,
            },
        )
    }

    pub fn path(&self) -> &Path {
        self.pool.path()
    }

    /// Create a session. Returns `false` if it already exists.
    pub fn create_session(
        &self,
        session_id: &str,
        project_path: &str,
        metadata: Option<&Metadata>,
    ) -> Result<bool> {
        let metadata_json = serde_json::to_string(&metadata.cloned().unwrap_or_default())?;
        self.pool.with_transaction(|tx| {
            let created = insert_session(tx, session_id, project_path, &metadata_json)?;
            if created {
                tracing::debug!(session_id, project_path, "session created");
            }
            Ok(created)
        })
    }

    pub fn session_exists(&self, session_id: &str) -> Result<bool> {
        self.pool.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) > 0 FROM sessions WHERE session_id = ?1",
                params![session_id],
                |row| row.get(0),
            )?)
        })
    }

    pub fn get_session(&self, session_id: &str) -> Result<Option<Session>> {
        self.pool.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT session_id, project_path, created_at, updated_at, metadata \
                     FROM sessions WHERE session_id = ?1",
                    params![session_id],
                    row_to_session,
                )
                .optional()?)
        })
    }

    /// Sessions whose id starts with `prefix`, newest first.
    pub fn list_sessions(&self, prefix: &str) -> Result<Vec<Session>> {
        self.pool.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT session_id, project_path, created_at, updated_at, metadata \
                 FROM sessions WHERE substr(session_id, 1, ?2) = ?1 \
                 ORDER BY created_at DESC, session_id DESC",
            )?;
            let sessions = stmt
                .query_map(params![prefix, char_len(prefix) as i64], row_to_session)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(sessions)
        })
    }

    /// Persist one entry, creating its session on first write.
    ///
    /// Content longer than the chunk threshold is additionally split into
    /// fixed-size chunks in `memory_chunks`.
    pub fn add_memory_entry(&self, session_id: &str, entry: &NewEntry) -> Result<i64> {
        let importance = clamp_importance(entry.importance);
        let tags_json = serde_json::to_string(&entry.tags)?;
        let metadata_json = serde_json::to_string(&entry.metadata)?;
        let project_path = current_project_path();
        let settings = self.settings;

        self.pool.with_transaction(|tx| {
            if insert_session(tx, session_id, &project_path, "{}")? {
                tracing::debug!(session_id, "session auto-created on first write");
            }

            let ts = format_timestamp(&now());
            tx.execute(
                "INSERT INTO memory_entries \
                 (session_id, content, content_type, importance, tags, metadata, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                params![
                    session_id,
                    entry.content,
                    entry.content_type,
                    importance,
                    tags_json,
                    metadata_json,
                    ts,
                ],
            )?;
            let entry_id = tx.last_insert_rowid();

            tx.execute(
                "UPDATE sessions SET updated_at = ?1 WHERE session_id = ?2",
                params![ts, session_id],
            )?;

            if settings.entry_chunk_size > 0 && char_len(&entry.content) > settings.entry_chunk_threshold {
                let stored = store_entry_chunks(tx, entry_id, &entry.content, settings.entry_chunk_size, &ts)?;
                tracing::debug!(entry_id, chunks = stored, "large entry chunked");
            }

            Ok(entry_id)
        })
    }

    /// Entries ranked by importance, then recency, newest id first on ties.
    pub fn get_memory_entries(
        &self,
        session_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<MemoryEntry>> {
        self.pool.with_conn(|conn| {
            let sql = format!(
                "SELECT {ENTRY_COLUMNS} FROM memory_entries WHERE session_id = ?1 {RANKING} LIMIT ?2 OFFSET ?3"
            );
            query_entries(conn, &sql, params![session_id, to_sql_limit(limit), offset as i64])
        })
    }

    /// Every entry of a session, in ranking order.
    pub fn all_memory_entries(&self, session_id: &str) -> Result<Vec<MemoryEntry>> {
        self.pool.with_conn(|conn| {
            let sql =
                format!("SELECT {ENTRY_COLUMNS} FROM memory_entries WHERE session_id = ?1 {RANKING}");
            query_entries(conn, &sql, params![session_id])
        })
    }

    /// Case-insensitive substring search over content and metadata.
    pub fn search_memory(
        &self,
        session_id: &str,
        query: &str,
        content_type: Option<&str>,
        limit: usize,
    ) -> Result<Vec<MemoryEntry>> {
        let pattern = like_pattern(query);
        self.pool.with_conn(|conn| {
            let sql = format!(
                "SELECT {ENTRY_COLUMNS} FROM memory_entries \
                 WHERE session_id = ?1 \
                 AND (content LIKE ?2 ESCAPE '\\' OR metadata LIKE ?2 ESCAPE '\\') \
                 AND (?3 IS NULL OR content_type = ?3) \
                 {RANKING} LIMIT ?4"
            );
            query_entries(
                conn,
                &sql,
                params![session_id, pattern, content_type, to_sql_limit(limit)],
            )
        })
    }

    /// Plain-text context built from the highest-ranked entries.
    ///
    /// One line per entry: `[TYPE - timestamp [Tags: ...]] content`. Used when
    /// the context manager cannot answer.
    pub fn get_session_context(
        &self,
        session_id: &str,
        max_entries: usize,
        include_types: Option<&[String]>,
    ) -> Result<String> {
        let entries = self.get_memory_entries(session_id, max_entries, 0)?;
        let lines: Vec<String> = entries
            .iter()
            .filter(|e| include_types.map_or(true, |types| types.contains(&e.content_type)))
            .map(|e| {
                format!(
                    "[{} - {}{}] {}",
                    e.content_type.to_uppercase(),
                    format_timestamp(&e.created_at),
                    tag_suffix(&e.tags),
                    e.content
                )
            })
            .collect();
        Ok(lines.join("\n"))
    }

    /// Bulk-retrieval chunks of one entry, in order.
    pub fn entry_chunks(&self, entry_id: i64) -> Result<Vec<EntryChunk>> {
        self.pool.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, entry_id, chunk_index, content, created_at \
                 FROM memory_chunks WHERE entry_id = ?1 ORDER BY chunk_index",
            )?;
            let chunks = stmt
                .query_map(params![entry_id], |row| {
                    let created_at: String = row.get(4)?;
                    Ok(EntryChunk {
                        id: row.get(0)?,
                        entry_id: row.get(1)?,
                        chunk_index: row.get::<_, i64>(2)? as usize,
                        content: row.get(3)?,
                        created_at: parse_timestamp(&created_at),
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(chunks)
        })
    }

    pub fn delete_memory_entry(&self, entry_id: i64) -> Result<bool> {
        self.pool.with_transaction(|tx| {
            let rows = tx.execute("DELETE FROM memory_entries WHERE id = ?1", params![entry_id])?;
            Ok(rows > 0)
        })
    }

    /// Delete every entry (and entry chunk) of a session. The session row is kept.
    pub fn delete_session_memory(&self, session_id: &str) -> Result<bool> {
        self.pool.with_transaction(|tx| {
            let rows = tx.execute(
                "DELETE FROM memory_entries WHERE session_id = ?1",
                params![session_id],
            )?;
            tracing::info!(session_id, deleted = rows, "session memory deleted");
            Ok(rows > 0)
        })
    }

    pub fn get_session_summary(&self, session_id: &str) -> Result<SessionSummary> {
        self.pool.with_conn(|conn| stats::session_summary(conn, session_id))
    }

    /// Drop idle pooled connections.
    /// Copy every entry of `from` (oldest first, with its timestamps and
    /// bulk chunks) into the new session `to`, in one transaction.
    ///
    /// Fails with [`MemoryError::SessionExists`] if `to` already exists; on
    /// any failure nothing of `to` is left behind.
    pub fn copy_session_entries(&self, from: &str, to: &str, project_path: &str) -> Result<usize> {
        self.pool.with_transaction(|tx| {
            if !insert_session(tx, to, project_path, "{}")? {
                return Err(MemoryError::SessionExists(to.to_string()));
            }

            let source_ids: Vec<i64> = {
                let mut stmt = tx.prepare(
                    "SELECT id FROM memory_entries WHERE session_id = ?1 ORDER BY created_at ASC, id ASC",
                )?;
                let ids = stmt
                    .query_map(params![from], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                ids
            };

            let mut copy_entry = tx.prepare(
                "INSERT INTO memory_entries \
                 (session_id, content, content_type, importance, tags, metadata, created_at, updated_at) \
                 SELECT ?1, content, content_type, importance, tags, metadata, created_at, updated_at \
                 FROM memory_entries WHERE id = ?2",
            )?;
            let mut copy_chunks = tx.prepare(
                "INSERT INTO memory_chunks (entry_id, chunk_index, content, created_at) \
                 SELECT ?1, chunk_index, content, created_at FROM memory_chunks WHERE entry_id = ?2",
            )?;
            for source_id in &source_ids {
                copy_entry.execute(params![to, source_id])?;
                let copy_id = tx.last_insert_rowid();
                copy_chunks.execute(params![copy_id, source_id])?;
            }

            tracing::debug!(from, to, entries = source_ids.len(), "session entries copied");
            Ok(source_ids.len())
        })
    }

    pub fn close(&self) {
        self.pool.close();
    }
}

fn insert_session(
    tx: &Transaction<'_>,
    session_id: &str,
    project_path: &str,
    metadata_json: &str,
) -> Result<bool> {
    let ts = format_timestamp(&now());
    let rows = tx.execute(
        "INSERT OR IGNORE INTO sessions (session_id, project_path, created_at, updated_at, metadata) \
         VALUES (?1, ?2, ?3, ?3, ?4)",
        params![session_id, project_path, ts, metadata_json],
    )?;
    Ok(rows == 1)
}

fn store_entry_chunks(
    tx: &Transaction<'_>,
    entry_id: i64,
    content: &str,
    chunk_size: usize,
    ts: &str,
) -> Result<usize> {
    let chunks = split_fixed(content, chunk_size);
    let mut stmt = tx.prepare(
        "INSERT INTO memory_chunks (entry_id, chunk_index, content, created_at) VALUES (?1, ?2, ?3, ?4)",
    )?;
    for (index, chunk) in chunks.iter().enumerate() {
        stmt.execute(params![entry_id, index as i64, chunk, ts])?;
    }
    Ok(chunks.len())
}

/// Split into consecutive, non-overlapping windows of `size` characters.
pub(crate) fn split_fixed(content: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = content.chars().collect();
    chars
        .chunks(size.max(1))
        .map(|window| window.iter().collect())
        .collect()
}

fn query_entries(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<MemoryEntry>> {
    let mut stmt = conn.prepare(sql)?;
    let entries = stmt
        .query_map(params, row_to_entry)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(entries)
}

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<MemoryEntry> {
    let tags: String = row.get(5)?;
    let metadata: String = row.get(6)?;
    let created_at: String = row.get(7)?;
    let updated_at: String = row.get(8)?;
    Ok(MemoryEntry {
        id: row.get(0)?,
        session_id: row.get(1)?,
        content: row.get(2)?,
        content_type: row.get(3)?,
        importance: row.get(4)?,
        tags: decode_json(5, &tags)?,
        metadata: decode_json(6, &metadata)?,
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
    })
}

fn row_to_session(row: &Row<'_>) -> rusqlite::Result<Session> {
    let created_at: String = row.get(2)?;
    let updated_at: String = row.get(3)?;
    let metadata: String = row.get(4)?;
    Ok(Session {
        session_id: row.get(0)?,
        project_path: row.get(1)?,
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
        metadata: decode_json(4, &metadata)?,
    })
}

/// SQLite treats a negative LIMIT as "no limit".
fn to_sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(-1)
}

fn current_project_path() -> String {
    std::env::current_dir()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|_| ".".into())
}
