//! Context manager: the retrieval core.
//!
//! Content is split into overlapping chunks, each chunk is embedded when the
//! [`Embedder`] can, and chunks are stored in the context database keyed by
//! `(session_id, content_hash)` so re-indexing the same text is a no-op.
//! Retrieval ranks chunks by cosine similarity and falls back to keyword
//! matching whenever the query cannot be embedded.

pub mod chunk;
pub mod search;
pub mod stats;

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use serde::Serialize;

use crate::config::MnemoConfig;
use crate::db::{migrations, ConnectionPool, StoreKind};
use crate::embedding::{embedding_to_blob, Embedder};
use crate::error::Result;
use crate::memory::types::{clamp_importance, format_timestamp, now, parse_timestamp};
use crate::memory::{decode_json, Metadata, NewEntry};

pub use chunk::{chunk_text, content_hash};
pub use search::ChunkHit;
pub use stats::ContextStats;

/// One stored retrieval chunk.
#[derive(Debug, Clone, Serialize)]
pub struct ContextChunk {
    pub id: i64,
    pub session_id: String,
    pub content: String,
    pub content_type: String,
    pub importance: f64,
    pub tags: Vec<String>,
    pub metadata: Metadata,
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Chunking and assembly knobs.
#[derive(Debug, Clone, Copy)]
pub struct ChunkSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Upper bound on assembled context, in estimated tokens (chars / 4). `0` disables it.
    pub token_budget: usize,
}

impl Default for ChunkSettings {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
            token_budget: 4000,
        }
    }
}

pub struct ContextManager {
    pool: ConnectionPool,
    embedder: Arc<Embedder>,
    settings: ChunkSettings,
    model_checked: AtomicBool,
}

impl ContextManager {
    pub fn open(
        path: impl AsRef<Path>,
        idle_timeout: Duration,
        embedder: Arc<Embedder>,
        settings: ChunkSettings,
    ) -> Result<Self> {
        let pool = ConnectionPool::open(path, StoreKind::Context, idle_timeout)?;
        Ok(Self {
            pool,
            embedder,
            settings,
            model_checked: AtomicBool::new(false),
        })
    }

    pub fn from_config(config: &MnemoConfig, embedder: Arc<Embedder>) -> Result<Self> {
        Self::open(
            config.context_db_path(),
            config.idle_connection_timeout(),
            embedder,
            ChunkSettings {
                chunk_size: config.retrieval.chunk_size,
                chunk_overlap: config.retrieval.chunk_overlap,
                token_budget: config.retrieval.context_token_budget,
            },
        )
    }

    pub fn path(&self) -> &Path {
        self.pool.path()
    }

    pub fn embedder(&self) -> &Embedder {
        &self.embedder
    }

    pub fn settings(&self) -> ChunkSettings {
        self.settings
    }

    /// Chunk with the configured size and overlap.
    pub fn chunk_text(&self, text: &str) -> Vec<String> {
        chunk_text(text, self.settings.chunk_size, self.settings.chunk_overlap)
    }

    /// Chunk, embed, and store `entry` under `session_id`.
    ///
    /// Returns the ids of newly inserted chunks. Chunks whose hash is already
    /// stored for the session are skipped without being embedded again.
    pub fn add_content(&self, session_id: &str, entry: &NewEntry) -> Result<Vec<i64>> {
        if entry.content.is_empty() {
            return Ok(Vec::new());
        }

        let importance = clamp_importance(entry.importance);
        let tags_json = serde_json::to_string(&entry.tags)?;
        let metadata_json = serde_json::to_string(&entry.metadata)?;

        let mut seen = self.existing_hashes(session_id)?;
        let pending: Vec<(String, String, Option<Vec<u8>>)> = self
            .chunk_text(&entry.content)
            .into_iter()
            .filter_map(|text| {
                let hash = content_hash(&text);
                if !seen.insert(hash.clone()) {
                    tracing::debug!(session_id, hash = %hash, "duplicate chunk skipped");
                    return None;
                }
                let blob = self.embedder.embed(&text).map(|v| embedding_to_blob(&v));
                Some((text, hash, blob))
            })
            .collect();

        if pending.is_empty() {
            return Ok(Vec::new());
        }
        if pending.iter().any(|(_, _, blob)| blob.is_some()) {
            self.check_model_once();
        }

        let ts = format_timestamp(&now());
        let ids = self.pool.with_transaction(|tx| {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO context_chunks \
                 (session_id, content, content_type, importance, tags, metadata, embedding, content_hash, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
            )?;
            let mut ids = Vec::with_capacity(pending.len());
            for (text, hash, blob) in &pending {
                let inserted = stmt.execute(params![
                    session_id,
                    text,
                    entry.content_type,
                    importance,
                    tags_json,
                    metadata_json,
                    blob,
                    hash,
                    ts,
                ])?;
                // A concurrent writer may have stored the same chunk since the hash lookup
                if inserted == 0 {
                    tracing::debug!(session_id, hash = %hash, "duplicate chunk skipped");
                    continue;
                }
                ids.push(tx.last_insert_rowid());
            }
            Ok(ids)
        })?;

        tracing::debug!(session_id, stored = ids.len(), "content indexed");
        Ok(ids)
    }

    /// Remove every chunk of a session. Returns whether anything was deleted.
    pub fn delete_session_content(&self, session_id: &str) -> Result<bool> {
        self.pool.with_transaction(|tx| {
            let rows = tx.execute(
                "DELETE FROM context_chunks WHERE session_id = ?1",
                params![session_id],
            )?;
            tracing::info!(session_id, deleted = rows, "session context deleted");
            Ok(rows > 0)
        })
    }

    /// Drop idle pooled connections.
    pub fn close(&self) {
        self.pool.close();
    }

    fn existing_hashes(&self, session_id: &str) -> Result<HashSet<String>> {
        self.pool.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT content_hash FROM context_chunks WHERE session_id = ?1")?;
            let hashes = stmt
                .query_map(params![session_id], |row| row.get(0))?
                .collect::<rusqlite::Result<HashSet<String>>>()?;
            Ok(hashes)
        })
    }

    /// Record the embedding model on first use and warn when stored vectors
    /// came from a different one.
    fn check_model_once(&self) {
        if self.model_checked.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(model) = self.embedder.model_name() else {
            return;
        };
        let result = self.pool.with_conn(|conn| {
            let stored = migrations::get_embedding_model(conn)?;
            if stored.as_deref() == Some(model) {
                return Ok(());
            }
            let embedded: i64 = conn.query_row(
                "SELECT COUNT(*) FROM context_chunks WHERE embedding IS NOT NULL",
                [],
                |row| row.get(0),
            )?;
            if embedded > 0 {
                tracing::warn!(
                    stored = stored.as_deref().unwrap_or("unknown"),
                    current = model,
                    embedded,
                    "context store holds embeddings from another model, similarity scores may be meaningless"
                );
            } else {
                migrations::set_embedding_model(conn, model)?;
            }
            Ok(())
        });
        if let Err(e) = result {
            tracing::debug!(error = %e, "could not check stored embedding model");
        }
    }
}

const CHUNK_COLUMNS: &str =
    "id, session_id, content, content_type, importance, tags, metadata, content_hash, created_at";

fn row_to_chunk(row: &Row<'_>) -> rusqlite::Result<ContextChunk> {
    let tags: String = row.get(5)?;
    let metadata: String = row.get(6)?;
    let created_at: String = row.get(8)?;
    Ok(ContextChunk {
        id: row.get(0)?,
        session_id: row.get(1)?,
        content: row.get(2)?,
        content_type: row.get(3)?,
        importance: row.get(4)?,
        tags: decode_json(5, &tags)?,
        metadata: decode_json(6, &metadata)?,
        content_hash: row.get(7)?,
        created_at: parse_timestamp(&created_at),
    })
}
