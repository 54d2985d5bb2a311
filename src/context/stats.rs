use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::Serialize;

use super::ContextManager;
use crate::error::Result;
use crate::memory::types::parse_timestamp;

/// Aggregate view of one session in the context store.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ContextStats {
    pub total_chunks: u64,
    /// Chunks carrying a stored embedding.
    pub embedded_chunks: u64,
    pub average_importance: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_created: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    pub by_content_type: BTreeMap<String, u64>,
}

impl ContextManager {
    pub fn get_session_stats(&self, session_id: &str) -> Result<ContextStats> {
        self.pool.with_conn(|conn| {
            let (total, embedded, average, first, last): (
                i64,
                i64,
                Option<f64>,
                Option<String>,
                Option<String>,
            ) = conn.query_row(
                "SELECT COUNT(*), COUNT(embedding), AVG(importance), MIN(created_at), MAX(updated_at) \
                 FROM context_chunks WHERE session_id = ?1",
                params![session_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
            )?;

            let mut stmt = conn.prepare(
                "SELECT content_type, COUNT(*) FROM context_chunks \
                 WHERE session_id = ?1 GROUP BY content_type",
            )?;
            let by_content_type = stmt
                .query_map(params![session_id], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
                })?
                .collect::<rusqlite::Result<BTreeMap<_, _>>>()?;

            Ok(ContextStats {
                total_chunks: total as u64,
                embedded_chunks: embedded as u64,
                average_importance: average.unwrap_or(0.0),
                first_created: first.as_deref().map(parse_timestamp),
                last_updated: last.as_deref().map(parse_timestamp),
                by_content_type,
            })
        })
    }
}
