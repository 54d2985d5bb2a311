//! Ranked retrieval over stored chunks and context assembly.

use std::cmp::Ordering;

use rusqlite::params;
use serde::Serialize;

use super::{row_to_chunk, ContextChunk, ContextManager, CHUNK_COLUMNS};
use crate::embedding::blob_to_embedding;
use crate::error::Result;
use crate::memory::types::{char_len, format_timestamp};
use crate::memory::{like_pattern, tag_suffix};

/// A retrieved chunk. `score` is the cosine similarity on the embedding path
/// and `None` when the keyword path answered.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkHit {
    pub chunk: ContextChunk,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

impl ContextManager {
    /// Rank the session's embedded chunks by similarity to `query`.
    ///
    /// Falls back to [`keyword_search`](Self::keyword_search) when the query
    /// cannot be embedded.
    pub fn search_by_similarity(
        &self,
        session_id: &str,
        query: &str,
        top_k: usize,
        min_similarity: f32,
    ) -> Result<Vec<ChunkHit>> {
        self.search_filtered(session_id, query, None, top_k, min_similarity)
    }

    /// [`search_by_similarity`](Self::search_by_similarity) restricted to one content type.
    pub fn search_filtered(
        &self,
        session_id: &str,
        query: &str,
        content_type: Option<&str>,
        top_k: usize,
        min_similarity: f32,
    ) -> Result<Vec<ChunkHit>> {
        let Some(query_vec) = self.embedder.embed(query) else {
            tracing::debug!(session_id, "query not embedded, using keyword search");
            return self.keyword_search(session_id, query, content_type, top_k);
        };

        let candidates = self.pool.with_conn(|conn| {
            let sql = format!(
                "SELECT {CHUNK_COLUMNS}, embedding FROM context_chunks \
                 WHERE session_id = ?1 AND embedding IS NOT NULL \
                 AND (?2 IS NULL OR content_type = ?2) ORDER BY id"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![session_id, content_type], |row| {
                    Ok((row_to_chunk(row)?, row.get::<_, Vec<u8>>(9)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;

        let scanned = candidates.len();
        let mut hits: Vec<ChunkHit> = candidates
            .into_iter()
            .filter_map(|(chunk, blob)| {
                let Some(stored) = blob_to_embedding(&blob) else {
                    tracing::debug!(chunk_id = chunk.id, "malformed embedding blob skipped");
                    return None;
                };
                let score = self.embedder.similarity(&query_vec, &stored);
                (score >= min_similarity).then_some(ChunkHit {
                    chunk,
                    score: Some(score),
                })
            })
            .collect();

        // Stable: equal scores keep scan order
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
        });
        hits.truncate(top_k);

        tracing::debug!(session_id, scanned, returned = hits.len(), "similarity search");
        Ok(hits)
    }

    /// Case-insensitive substring match, ranked by importance then recency.
    pub fn keyword_search(
        &self,
        session_id: &str,
        query: &str,
        content_type: Option<&str>,
        top_k: usize,
    ) -> Result<Vec<ChunkHit>> {
        let pattern = like_pattern(query);
        self.pool.with_conn(|conn| {
            let sql = format!(
                "SELECT {CHUNK_COLUMNS} FROM context_chunks \
                 WHERE session_id = ?1 AND content LIKE ?2 ESCAPE '\\' \
                 AND (?3 IS NULL OR content_type = ?3) \
                 ORDER BY importance DESC, created_at DESC, id DESC LIMIT ?4"
            );
            let mut stmt = conn.prepare(&sql)?;
            let hits = stmt
                .query_map(
                    params![session_id, pattern, content_type, sql_limit(top_k)],
                    |row| {
                        Ok(ChunkHit {
                            chunk: row_to_chunk(row)?,
                            score: None,
                        })
                    },
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(hits)
        })
    }

    /// Assemble the session's top chunks into prompt context.
    ///
    /// Chunks are ranked by importance then recency and rendered as
    /// `[TYPE - timestamp [Tags: ...]]` followed by the content on the next
    /// line, separated by blank lines. Assembly stops once the estimated token
    /// count would exceed the configured budget; the first chunk is always
    /// included.
    pub fn get_context_for_session(
        &self,
        session_id: &str,
        max_chunks: usize,
        content_types: Option<&[String]>,
    ) -> Result<String> {
        let types_json = content_types
            .filter(|types| !types.is_empty())
            .map(serde_json::to_string)
            .transpose()?;

        let chunks = self.pool.with_conn(|conn| {
            let sql = format!(
                "SELECT {CHUNK_COLUMNS} FROM context_chunks \
                 WHERE session_id = ?1 \
                 AND (?2 IS NULL OR content_type IN (SELECT value FROM json_each(?2))) \
                 ORDER BY importance DESC, created_at DESC, id DESC LIMIT ?3"
            );
            let mut stmt = conn.prepare(&sql)?;
            let chunks = stmt
                .query_map(
                    params![session_id, types_json, sql_limit(max_chunks)],
                    row_to_chunk,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(chunks)
        })?;

        let budget = self.settings.token_budget;
        let mut parts: Vec<String> = Vec::with_capacity(chunks.len());
        let mut used = 0;
        for chunk in &chunks {
            let part = render_chunk(chunk);
            let cost = estimate_tokens(&part);
            if budget > 0 && !parts.is_empty() && used + cost > budget {
                tracing::debug!(
                    session_id,
                    included = parts.len(),
                    available = chunks.len(),
                    budget,
                    "context truncated at token budget"
                );
                break;
            }
            used += cost;
            parts.push(part);
        }

        Ok(parts.join("\n\n"))
    }
}

fn render_chunk(chunk: &ContextChunk) -> String {
    format!(
        "[{} - {}{}]\n{}",
        chunk.content_type.to_uppercase(),
        format_timestamp(&chunk.created_at),
        tag_suffix(&chunk.tags),
        chunk.content
    )
}

/// Rough token estimate: four characters per token.
pub fn estimate_tokens(text: &str) -> usize {
    char_len(text).div_ceil(4)
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(-1)
}
