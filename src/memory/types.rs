//! Core memory type definitions.
//!
//! [`Session`] scopes everything; [`MemoryEntry`] is one remembered item in
//! the durable store; [`EntryChunk`] is a bulk-retrieval slice of a large
//! entry; [`MemoryRecord`] is the source-agnostic shape search results are
//! merged into.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Open key/value map attached to sessions, entries, and chunks.
pub type Metadata = Map<String, Value>;

/// Default `content_type` tag.
pub const TEXT: &str = "text";

/// A conversation or project scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub project_path: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub metadata: Metadata,
}

/// One atomic unit of remembered text, as stored in `memory_entries`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Monotonic per-store id.
    pub id: i64,
    pub session_id: String,
    pub content: String,
    /// Free-form tag such as `"text"` or `"chat_message"`.
    pub content_type: String,
    /// Ranking weight in `[0.0, 1.0]`.
    pub importance: f64,
    pub tags: Vec<String>,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fixed-size slice of a large entry, stored in `memory_chunks`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryChunk {
    pub id: i64,
    pub entry_id: i64,
    pub chunk_index: usize,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied by a caller when remembering something.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub content: String,
    pub content_type: String,
    pub importance: f64,
    pub tags: Vec<String>,
    pub metadata: Metadata,
}

impl NewEntry {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            content_type: TEXT.into(),
            importance: 1.0,
            tags: Vec::new(),
            metadata: Metadata::new(),
        }
    }

    pub fn with_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn with_importance(mut self, importance: f64) -> Self {
        self.importance = importance;
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

impl From<&MemoryEntry> for NewEntry {
    fn from(entry: &MemoryEntry) -> Self {
        Self {
            content: entry.content.clone(),
            content_type: entry.content_type.clone(),
            importance: entry.importance,
            tags: entry.tags.clone(),
            metadata: entry.metadata.clone(),
        }
    }
}

/// Where a search hit came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordSource {
    /// Context-manager chunk (similarity or keyword path).
    Context,
    /// In-process recent-entry buffer.
    Ephemeral,
    /// Durable memory store.
    Persistent,
}

/// A search result merged from any of the three sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Store id (entry id or chunk id); `None` for buffer-only records.
    pub entry_id: Option<i64>,
    pub content: String,
    pub content_type: String,
    pub importance: f64,
    pub tags: Vec<String>,
    pub metadata: Metadata,
    pub timestamp: DateTime<Utc>,
    pub source: RecordSource,
}

impl From<MemoryEntry> for MemoryRecord {
    fn from(entry: MemoryEntry) -> Self {
        Self {
            entry_id: Some(entry.id),
            content: entry.content,
            content_type: entry.content_type,
            importance: entry.importance,
            tags: entry.tags,
            metadata: entry.metadata,
            timestamp: entry.created_at,
            source: RecordSource::Persistent,
        }
    }
}

/// Clamp a caller-supplied importance into `[0.0, 1.0]`. NaN becomes the default `1.0`.
pub fn clamp_importance(importance: f64) -> f64 {
    if importance.is_nan() {
        tracing::warn!("importance was NaN, storing default 1.0");
        return 1.0;
    }
    let clamped = importance.clamp(0.0, 1.0);
    if clamped != importance {
        tracing::warn!(importance, clamped, "importance out of range, clamped");
    }
    clamped
}

/// Current time in the storage format.
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// RFC 3339 with microseconds and a `Z` suffix, so lexical order is chronological.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp. Unparseable values map to the Unix epoch so a
/// corrupt row sorts last instead of failing the whole query.
pub fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .unwrap_or_else(|_| {
            tracing::debug!(raw, "unparseable timestamp");
            DateTime::<Utc>::UNIX_EPOCH
        })
}

/// Count characters (not bytes) in `text`.
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}
