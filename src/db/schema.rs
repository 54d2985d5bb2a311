//! SQL DDL for both stores.
//!
//! The memory store holds `sessions`, `memory_entries`, and `memory_chunks`;
//! the context store holds `context_chunks`. Both carry a `schema_meta`
//! table. All DDL uses `IF NOT EXISTS` for idempotent initialization.

use rusqlite::Connection;

use super::StoreKind;

const MEMORY_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS sessions (
    session_id TEXT PRIMARY KEY,
    project_path TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}'
);

CREATE TABLE IF NOT EXISTS memory_entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL REFERENCES sessions(session_id),
    content TEXT NOT NULL,
    content_type TEXT NOT NULL DEFAULT 'text',
    importance REAL NOT NULL DEFAULT 1.0 CHECK(importance >= 0.0 AND importance <= 1.0),
    tags TEXT NOT NULL DEFAULT '[]',
    metadata TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_memory_entries_session ON memory_entries(session_id);
CREATE INDEX IF NOT EXISTS idx_memory_entries_type ON memory_entries(content_type);
CREATE INDEX IF NOT EXISTS idx_memory_entries_created ON memory_entries(created_at);

-- Fixed-size slices of large entries, for bulk retrieval
CREATE TABLE IF NOT EXISTS memory_chunks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entry_id INTEGER NOT NULL REFERENCES memory_entries(id) ON DELETE CASCADE,
    chunk_index INTEGER NOT NULL,
    content TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_memory_chunks_entry ON memory_chunks(entry_id);

CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

const CONTEXT_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS context_chunks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL,
    content TEXT NOT NULL,
    content_type TEXT NOT NULL DEFAULT 'text',
    importance REAL NOT NULL DEFAULT 1.0 CHECK(importance >= 0.0 AND importance <= 1.0),
    tags TEXT NOT NULL DEFAULT '[]',
    metadata TEXT NOT NULL DEFAULT '{}',
    embedding BLOB,
    content_hash TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_chunks_session_hash ON context_chunks(session_id, content_hash);
CREATE INDEX IF NOT EXISTS idx_chunks_session ON context_chunks(session_id);
CREATE INDEX IF NOT EXISTS idx_chunks_type ON context_chunks(content_type);
CREATE INDEX IF NOT EXISTS idx_chunks_importance ON context_chunks(importance);

CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initialize all tables for the given store. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection, kind: StoreKind) -> rusqlite::Result<()> {
    match kind {
        StoreKind::Memory => conn.execute_batch(MEMORY_SCHEMA_SQL)?,
        StoreKind::Context => conn.execute_batch(CONTEXT_SCHEMA_SQL)?,
    }

    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}
