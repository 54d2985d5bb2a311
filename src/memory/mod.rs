//! Durable memory store: sessions, entries, and entry chunks.

pub mod stats;
pub mod store;
pub mod types;

use rusqlite::types::Type;
use serde::de::DeserializeOwned;

pub use stats::SessionSummary;
pub use store::{MemoryStore, StoreSettings};
pub use types::{EntryChunk, MemoryEntry, MemoryRecord, Metadata, NewEntry, RecordSource, Session};

/// Build a `LIKE ... ESCAPE '\'` pattern matching `query` anywhere in a column.
///
/// SQLite's LIKE is case-insensitive for ASCII, which gives the
/// case-insensitive substring match without lowering both sides.
pub(crate) fn like_pattern(query: &str) -> String {
    let mut pattern = String::with_capacity(query.len() + 2);
    pattern.push('%');
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Decode a JSON text column, reporting failures as a conversion error on `idx`.
pub(crate) fn decode_json<T: DeserializeOwned>(idx: usize, raw: &str) -> rusqlite::Result<T> {
    serde_json::from_str(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Render tags the way context strings show them: ` [Tags: a, b]`, or nothing.
pub(crate) fn tag_suffix(tags: &[String]) -> String {
    if tags.is_empty() {
        String::new()
    } else {
        format!(" [Tags: {}]", tags.join(", "))
    }
}
