use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;

use super::types::parse_timestamp;
use crate::error::Result;

/// Aggregate view of one session in the memory store.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub total_entries: u64,
    /// Entries large enough to have bulk-retrieval chunks.
    pub chunked_entries: u64,
    pub average_importance: f64,
    pub by_content_type: BTreeMap<String, u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

/// Compute the summary of `session_id`. An unknown session yields zero counts.
pub fn session_summary(conn: &Connection, session_id: &str) -> Result<SessionSummary> {
    let (total, average, last_updated): (i64, Option<f64>, Option<String>) = conn.query_row(
        "SELECT COUNT(*), AVG(importance), MAX(updated_at) FROM memory_entries WHERE session_id = ?1",
        params![session_id],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )?;

    let chunked: i64 = conn.query_row(
        "SELECT COUNT(DISTINCT c.entry_id) FROM memory_chunks c \
         JOIN memory_entries e ON e.id = c.entry_id WHERE e.session_id = ?1",
        params![session_id],
        |row| row.get(0),
    )?;

    Ok(SessionSummary {
        session_id: session_id.to_string(),
        total_entries: total as u64,
        chunked_entries: chunked as u64,
        average_importance: average.unwrap_or(0.0),
        by_content_type: count_by_type(conn, session_id)?,
        last_updated: last_updated.as_deref().map(parse_timestamp),
    })
}

fn count_by_type(conn: &Connection, session_id: &str) -> Result<BTreeMap<String, u64>> {
    let mut stmt = conn.prepare(
        "SELECT content_type, COUNT(*) FROM memory_entries WHERE session_id = ?1 GROUP BY content_type",
    )?;
    let rows = stmt
        .query_map(params![session_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows.into_iter().map(|(t, n)| (t, n as u64)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryStore, NewEntry, StoreSettings};
    use std::time::Duration;
    use tempfile::TempDir;

    fn test_store(tmp: &TempDir) -> MemoryStore {
        MemoryStore::open(
            tmp.path().join("memory.db"),
            Duration::from_secs(60),
            StoreSettings::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_empty_session_summary() {
        let tmp = TempDir::new().unwrap();
        let store = test_store(&tmp);
        let summary = store.get_session_summary("nobody").unwrap();
        assert_eq!(summary.total_entries, 0);
        assert_eq!(summary.average_importance, 0.0);
        assert!(summary.by_content_type.is_empty());
        assert!(summary.last_updated.is_none());
    }

    #[test]
    fn test_summary_counts_by_type() {
        let tmp = TempDir::new().unwrap();
        let store = test_store(&tmp);
        store
            .add_memory_entry("s1", &NewEntry::text("a").with_importance(0.2))
            .unwrap();
        store
            .add_memory_entry("s1", &NewEntry::text("b").with_importance(0.6))
            .unwrap();
        store
            .add_memory_entry("s1", &NewEntry::text("c".repeat(1500)).with_type("chat_message"))
            .unwrap();
        store.add_memory_entry("s2", &NewEntry::text("elsewhere")).unwrap();

        let summary = store.get_session_summary("s1").unwrap();
        assert_eq!(summary.total_entries, 3);
        assert_eq!(summary.chunked_entries, 1);
        assert_eq!(summary.by_content_type["text"], 2);
        assert_eq!(summary.by_content_type["chat_message"], 1);
        assert!((summary.average_importance - 0.6).abs() < 1e-9);
        assert!(summary.last_updated.is_some());
    }
}
