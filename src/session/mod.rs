//! Memory system façade.
//!
//! [`MemorySystem`] is what the conversation loop talks to. A `Ready` system
//! coordinates the ephemeral buffer, the memory store, and the context
//! manager for one session; a `Fallback` system accepts every call, stores
//! nothing, and answers with empty values. Every operation reports through
//! [`Outcome`] so callers can tell an empty answer from a broken subsystem,
//! while `value_or` still yields the plain contract value.

pub mod ephemeral;
pub mod snapshot;

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::MnemoConfig;
use crate::context::{content_hash, ContextManager, ContextStats};
use crate::embedding::Embedder;
use crate::error::{MemoryError, Outcome, Result};
use crate::memory::types::{clamp_importance, now};
use crate::memory::{
    MemoryEntry, MemoryRecord, MemoryStore, NewEntry, RecordSource, SessionSummary,
};

pub use ephemeral::EphemeralBuffer;

/// Session-level knobs taken from configuration.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub session_id: String,
    pub project_path: PathBuf,
    pub enabled: bool,
    pub ephemeral_capacity: usize,
    pub min_similarity: f32,
}

impl SessionOptions {
    /// Options from config. `None` session ids get a generated `session_<timestamp>` id;
    /// `None` project paths resolve to the working directory.
    pub fn from_config(
        config: &MnemoConfig,
        session_id: Option<&str>,
        project_path: Option<&Path>,
    ) -> Self {
        let session_id = session_id
            .map(str::to_string)
            .unwrap_or_else(|| snapshot::default_session_id(&now()));
        let project_path = project_path
            .map(Path::to_path_buf)
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            session_id,
            project_path,
            enabled: config.memory.enabled,
            ephemeral_capacity: config.memory.ephemeral_capacity,
            min_similarity: config.retrieval.min_similarity,
        }
    }
}

/// Storage summary merged with context-store statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionOverview {
    pub memory: SessionSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<ContextStats>,
}

/// Aggregate counts for UI display.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MemoryStats {
    pub session_id: String,
    pub ephemeral_entries: usize,
    pub persistent_entries: u64,
    pub context_chunks: u64,
    pub embedded_chunks: u64,
    pub average_importance: f64,
    pub content_type_distribution: BTreeMap<String, u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    pub project_path: PathBuf,
}

/// Cheap status snapshot; never touches storage.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MemoryStatus {
    pub enabled: bool,
    pub session_id: String,
    pub ephemeral_entries: usize,
    pub project_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
}

/// A fully constructed memory system bound to one session.
pub struct SessionMemory {
    options: SessionOptions,
    enabled: AtomicBool,
    ephemeral: Mutex<EphemeralBuffer>,
    store: MemoryStore,
    context: ContextManager,
}

impl SessionMemory {
    /// Wire the stores together and make sure the session row exists.
    pub fn new(store: MemoryStore, context: ContextManager, options: SessionOptions) -> Result<Self> {
        let project = options.project_path.to_string_lossy();
        if store.create_session(&options.session_id, &project, None)? {
            tracing::info!(session_id = %options.session_id, project = %project, "session started");
        } else {
            tracing::info!(session_id = %options.session_id, "session resumed");
        }

        Ok(Self {
            enabled: AtomicBool::new(options.enabled),
            ephemeral: Mutex::new(EphemeralBuffer::new(options.ephemeral_capacity)),
            options,
            store,
            context,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.options.session_id
    }

    pub fn project_path(&self) -> &Path {
        &self.options.project_path
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    pub fn context(&self) -> &ContextManager {
        &self.context
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Toggle memory. Disabling also empties the ephemeral buffer; durable
    /// memory is kept so re-enabling picks up where it left off.
    pub fn set_memory_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
        tracing::info!(session_id = %self.session_id(), enabled, "memory toggled");
        if !enabled {
            if let Outcome::Fatal(e) = self.clear_session_memory() {
                tracing::warn!(error = %e, "could not clear ephemeral buffer");
            }
        }
    }

    /// Remember `entry` in all three tiers. Returns the store id, or `-1`
    /// without writing anything when memory is disabled.
    pub fn add_to_session_memory(&self, entry: NewEntry) -> Outcome<i64> {
        if !self.is_enabled() {
            return Outcome::Ok(-1);
        }
        let session_id = self.session_id();
        let entry = NewEntry {
            importance: clamp_importance(entry.importance),
            ..entry
        };

        let stored = self.store.add_memory_entry(session_id, &entry);
        self.remember_recent(&entry, stored.as_ref().ok().copied());

        let entry_id = match stored {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(session_id, error = %e, "failed to persist memory entry");
                return Outcome::Fatal(e);
            }
        };

        match self.context.add_content(session_id, &entry) {
            Ok(_) => Outcome::Ok(entry_id),
            Err(e) => {
                tracing::warn!(session_id, error = %e, "context indexing failed, entry kept in store");
                Outcome::degraded(entry_id, format!("context indexing failed: {e}"))
            }
        }
    }

    /// Search all three tiers, deduplicate by content, and rank by importance then recency.
    ///
    /// Context hits take precedence over ephemeral ones, which take precedence
    /// over store hits, when the same content appears more than once.
    pub fn search_session_memory(
        &self,
        query: &str,
        content_type: Option<&str>,
        max_results: usize,
    ) -> Outcome<Vec<MemoryRecord>> {
        if !self.is_enabled() {
            return Outcome::Ok(Vec::new());
        }
        let session_id = self.session_id();
        let mut problems = Vec::new();

        let context_hits = self
            .context
            .search_filtered(
                session_id,
                query,
                content_type,
                max_results,
                self.options.min_similarity,
            )
            .unwrap_or_else(|e| {
                tracing::warn!(session_id, error = %e, "context search failed");
                problems.push(format!("context search failed: {e}"));
                Vec::new()
            });

        let recent = self
            .lock_ephemeral()
            .map(|buffer| buffer.search(query, content_type))
            .unwrap_or_else(|e| {
                problems.push(e.to_string());
                Vec::new()
            });

        let persistent = self
            .store
            .search_memory(session_id, query, content_type, max_results)
            .unwrap_or_else(|e| {
                tracing::warn!(session_id, error = %e, "store search failed");
                problems.push(format!("store search failed: {e}"));
                Vec::new()
            });

        let candidates = context_hits
            .into_iter()
            .map(|hit| MemoryRecord {
                entry_id: Some(hit.chunk.id),
                content: hit.chunk.content,
                content_type: hit.chunk.content_type,
                importance: hit.chunk.importance,
                tags: hit.chunk.tags,
                metadata: hit.chunk.metadata,
                timestamp: hit.chunk.created_at,
                source: RecordSource::Context,
            })
            .chain(recent)
            .chain(persistent.into_iter().map(MemoryRecord::from));

        let results = merge_ranked(candidates, max_results);
        if problems.is_empty() {
            Outcome::Ok(results)
        } else {
            Outcome::degraded(results, problems.join("; "))
        }
    }

    /// Prompt context for this session.
    ///
    /// Served by the context manager; if it fails, the memory store's simpler
    /// assembly answers instead and the outcome is `Degraded`.
    pub fn get_context(&self, max_entries: usize, include_types: Option<&[String]>) -> Outcome<String> {
        if !self.is_enabled() {
            return Outcome::Ok(String::new());
        }
        let session_id = self.session_id();

        match self
            .context
            .get_context_for_session(session_id, max_entries, include_types)
        {
            Ok(context) => Outcome::Ok(context),
            Err(e) => {
                tracing::warn!(session_id, error = %e, "context assembly failed, using store context");
                match self
                    .store
                    .get_session_context(session_id, max_entries, include_types)
                {
                    Ok(context) => Outcome::degraded(context, format!("context manager failed: {e}")),
                    Err(store_err) => {
                        tracing::warn!(session_id, error = %store_err, "store context failed");
                        Outcome::Fatal(store_err)
                    }
                }
            }
        }
    }

    pub fn get_session_summary(&self) -> Outcome<SessionOverview> {
        let session_id = self.session_id();
        let memory = match self.store.get_session_summary(session_id) {
            Ok(summary) => summary,
            Err(e) => return Outcome::Fatal(e),
        };
        match self.context.get_session_stats(session_id) {
            Ok(stats) => Outcome::Ok(SessionOverview {
                memory,
                context: Some(stats),
            }),
            Err(e) => {
                tracing::warn!(session_id, error = %e, "context stats unavailable");
                Outcome::degraded(
                    SessionOverview {
                        memory,
                        context: None,
                    },
                    format!("context stats unavailable: {e}"),
                )
            }
        }
    }

    /// Empty the ephemeral buffer only.
    pub fn clear_session_memory(&self) -> Outcome<()> {
        match self.lock_ephemeral() {
            Ok(mut buffer) => {
                buffer.clear();
                Outcome::Ok(())
            }
            Err(e) => Outcome::Fatal(e),
        }
    }

    /// Delete this session's durable entries and context chunks.
    pub fn clear_persistent_memory(&self) -> Outcome<bool> {
        let session_id = self.session_id();
        let deleted = match self.store.delete_session_memory(session_id) {
            Ok(deleted) => deleted,
            Err(e) => {
                tracing::warn!(session_id, error = %e, "failed to clear stored memory");
                return Outcome::Fatal(e);
            }
        };
        match self.context.delete_session_content(session_id) {
            Ok(chunks_deleted) => Outcome::Ok(deleted || chunks_deleted),
            Err(e) => {
                tracing::warn!(session_id, error = %e, "failed to clear context chunks");
                Outcome::degraded(deleted, format!("context chunks not cleared: {e}"))
            }
        }
    }

    pub fn clear_all_memory(&self) -> Outcome<bool> {
        if let Outcome::Fatal(e) = self.clear_session_memory() {
            return Outcome::Fatal(e);
        }
        self.clear_persistent_memory()
    }

    /// Copy every stored entry into a new `saved_<name>_<timestamp>` session.
    /// The copy is all-or-nothing, so a failed save leaves no snapshot behind.
    pub fn save_session_memory(&self, name: &str) -> Outcome<bool> {
        self.save_snapshot(name)
            .map_err(|e| {
                tracing::warn!(name, error = %e, "snapshot save failed");
                e
            })
            .into()
    }

    /// Replace this session's memory with the newest snapshot saved as `name`.
    ///
    /// Returns `false` when memory is disabled or no such snapshot exists.
    pub fn load_session_memory(&self, name: &str) -> Outcome<bool> {
        if !self.is_enabled() {
            return Outcome::Ok(false);
        }

        let source = match self.find_snapshot(name) {
            Ok(Some(id)) => id,
            Ok(None) => {
                tracing::info!(name, "no snapshot with that name");
                return Outcome::Ok(false);
            }
            Err(e) => return Outcome::Fatal(e),
        };
        let mut entries = match self.store.all_memory_entries(&source) {
            Ok(entries) => entries,
            Err(e) => return Outcome::Fatal(e),
        };

        if let Outcome::Fatal(e) = self.clear_all_memory() {
            return Outcome::Fatal(e);
        }

        sort_oldest_first(&mut entries);
        let mut problems = Vec::new();
        for entry in &entries {
            match self.add_to_session_memory(NewEntry::from(entry)) {
                Outcome::Ok(_) => {}
                Outcome::Degraded { reason, .. } => problems.push(reason),
                Outcome::Fatal(e) => return Outcome::Fatal(e),
            }
        }

        tracing::info!(name, snapshot = %source, restored = entries.len(), "snapshot loaded");
        if problems.is_empty() {
            Outcome::Ok(true)
        } else {
            Outcome::degraded(true, problems.join("; "))
        }
    }

    /// Distinct snapshot names, newest first.
    pub fn get_available_sessions(&self) -> Outcome<Vec<String>> {
        let sessions = match self.store.list_sessions(snapshot::SNAPSHOT_PREFIX) {
            Ok(sessions) => sessions,
            Err(e) => return Outcome::Fatal(e),
        };
        let mut seen = HashSet::new();
        let names = sessions
            .iter()
            .filter_map(|s| snapshot::parse_snapshot_name(&s.session_id))
            .filter(|name| seen.insert(name.to_string()))
            .map(str::to_string)
            .collect();
        Outcome::Ok(names)
    }

    pub fn get_memory_stats(&self) -> Outcome<MemoryStats> {
        let ephemeral_entries = self.ephemeral_len();
        self.get_session_summary().map(|overview| {
            let context = overview.context.unwrap_or_default();
            MemoryStats {
                session_id: self.session_id().to_string(),
                ephemeral_entries,
                persistent_entries: overview.memory.total_entries,
                context_chunks: context.total_chunks,
                embedded_chunks: context.embedded_chunks,
                average_importance: overview.memory.average_importance,
                content_type_distribution: overview.memory.by_content_type,
                last_updated: overview.memory.last_updated,
                project_path: self.project_path().to_path_buf(),
            }
        })
    }

    pub fn get_memory_status(&self) -> Outcome<MemoryStatus> {
        let enabled = self.is_enabled();
        Outcome::Ok(MemoryStatus {
            enabled,
            session_id: self.session_id().to_string(),
            ephemeral_entries: if enabled { self.ephemeral_len() } else { 0 },
            project_path: self.project_path().to_path_buf(),
            fallback_reason: None,
        })
    }

    /// Release idle database connections of both stores.
    pub fn close(&self) {
        self.store.close();
        self.context.close();
        tracing::debug!(session_id = %self.session_id(), "memory system closed");
    }

    fn save_snapshot(&self, name: &str) -> Result<bool> {
        let snapshot_id = snapshot::snapshot_session_id(name, &now())?;
        let project = self.options.project_path.to_string_lossy();
        let copied = self
            .store
            .copy_session_entries(self.session_id(), &snapshot_id, &project)?;

        tracing::info!(name, snapshot = %snapshot_id, entries = copied, "snapshot saved");
        Ok(true)
    }

    fn find_snapshot(&self, name: &str) -> Result<Option<String>> {
        // list_sessions is newest first, so the first match wins
        Ok(self
            .store
            .list_sessions(snapshot::SNAPSHOT_PREFIX)?
            .into_iter()
            .find(|s| snapshot::parse_snapshot_name(&s.session_id) == Some(name))
            .map(|s| s.session_id))
    }

    fn remember_recent(&self, entry: &NewEntry, entry_id: Option<i64>) {
        let record = MemoryRecord {
            entry_id,
            content: entry.content.clone(),
            content_type: entry.content_type.clone(),
            importance: entry.importance,
            tags: entry.tags.clone(),
            metadata: entry.metadata.clone(),
            timestamp: now(),
            source: RecordSource::Ephemeral,
        };
        match self.lock_ephemeral() {
            Ok(mut buffer) => buffer.push(record),
            Err(e) => tracing::warn!(error = %e, "ephemeral buffer unavailable"),
        }
    }

    fn ephemeral_len(&self) -> usize {
        self.lock_ephemeral().map(|b| b.len()).unwrap_or(0)
    }

    fn lock_ephemeral(&self) -> Result<MutexGuard<'_, EphemeralBuffer>> {
        self.ephemeral
            .lock()
            .map_err(|e| MemoryError::LockPoisoned(format!("ephemeral buffer: {e}")))
    }
}

/// Keep the first record per content hash, then sort by importance and
/// recency (both descending) and truncate.
fn merge_ranked(candidates: impl Iterator<Item = MemoryRecord>, max_results: usize) -> Vec<MemoryRecord> {
    let mut seen = HashSet::new();
    let mut unique: Vec<MemoryRecord> = candidates
        .filter(|record| seen.insert(content_hash(&record.content)))
        .collect();
    unique.sort_by(|a, b| {
        b.importance
            .partial_cmp(&a.importance)
            .unwrap_or(CmpOrdering::Equal)
            .then_with(|| b.timestamp.cmp(&a.timestamp))
    });
    unique.truncate(max_results);
    unique
}

fn sort_oldest_first(entries: &mut [MemoryEntry]) {
    entries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
}

/// The memory subsystem handed to the conversation loop.
pub enum MemorySystem {
    Ready(Box<SessionMemory>),
    /// Construction failed; every call is accepted and answered with an
    /// empty value.
    Fallback { reason: String },
}

impl MemorySystem {
    /// Open both stores from config and start (or resume) a session.
    ///
    /// Never fails: any construction error is logged and yields `Fallback`.
    pub fn open(config: &MnemoConfig, session_id: Option<&str>, project_path: Option<&Path>) -> Self {
        let options = SessionOptions::from_config(config, session_id, project_path);
        match Self::build(config, options) {
            Ok(memory) => Self::Ready(Box::new(memory)),
            Err(e) => {
                tracing::warn!(error = %e, "memory system unavailable, running without memory");
                Self::Fallback {
                    reason: e.to_string(),
                }
            }
        }
    }

    fn build(config: &MnemoConfig, options: SessionOptions) -> Result<SessionMemory> {
        let embedder = Arc::new(Embedder::lazy(config.embedding.clone()));
        let store = MemoryStore::from_config(config)?;
        let context = ContextManager::from_config(config, embedder)?;
        SessionMemory::new(store, context, options)
    }

    pub fn fallback(reason: impl Into<String>) -> Self {
        Self::Fallback {
            reason: reason.into(),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    pub fn as_ready(&self) -> Option<&SessionMemory> {
        match self {
            Self::Ready(memory) => Some(memory),
            Self::Fallback { .. } => None,
        }
    }

    pub fn session_id(&self) -> &str {
        match self {
            Self::Ready(memory) => memory.session_id(),
            Self::Fallback { .. } => "fallback",
        }
    }

    pub fn is_enabled(&self) -> bool {
        match self {
            Self::Ready(memory) => memory.is_enabled(),
            Self::Fallback { .. } => false,
        }
    }

    pub fn set_memory_enabled(&self, enabled: bool) {
        if let Self::Ready(memory) = self {
            memory.set_memory_enabled(enabled);
        }
    }

    pub fn add_to_session_memory(&self, entry: NewEntry) -> Outcome<i64> {
        match self {
            Self::Ready(memory) => memory.add_to_session_memory(entry),
            Self::Fallback { reason } => Outcome::degraded(-1, reason.as_str()),
        }
    }

    pub fn search_session_memory(
        &self,
        query: &str,
        content_type: Option<&str>,
        max_results: usize,
    ) -> Outcome<Vec<MemoryRecord>> {
        match self {
            Self::Ready(memory) => memory.search_session_memory(query, content_type, max_results),
            Self::Fallback { reason } => Outcome::degraded(Vec::new(), reason.as_str()),
        }
    }

    pub fn get_context(&self, max_entries: usize, include_types: Option<&[String]>) -> Outcome<String> {
        match self {
            Self::Ready(memory) => memory.get_context(max_entries, include_types),
            Self::Fallback { reason } => Outcome::degraded(String::new(), reason.as_str()),
        }
    }

    pub fn get_session_summary(&self) -> Outcome<SessionOverview> {
        match self {
            Self::Ready(memory) => memory.get_session_summary(),
            Self::Fallback { reason } => Outcome::degraded(SessionOverview::default(), reason.as_str()),
        }
    }

    pub fn clear_session_memory(&self) -> Outcome<()> {
        match self {
            Self::Ready(memory) => memory.clear_session_memory(),
            Self::Fallback { reason } => Outcome::degraded((), reason.as_str()),
        }
    }

    pub fn clear_persistent_memory(&self) -> Outcome<bool> {
        match self {
            Self::Ready(memory) => memory.clear_persistent_memory(),
            Self::Fallback { reason } => Outcome::degraded(false, reason.as_str()),
        }
    }

    pub fn clear_all_memory(&self) -> Outcome<bool> {
        match self {
            Self::Ready(memory) => memory.clear_all_memory(),
            Self::Fallback { reason } => Outcome::degraded(false, reason.as_str()),
        }
    }

    pub fn save_session_memory(&self, name: &str) -> Outcome<bool> {
        match self {
            Self::Ready(memory) => memory.save_session_memory(name),
            Self::Fallback { reason } => Outcome::degraded(false, reason.as_str()),
        }
    }

    pub fn load_session_memory(&self, name: &str) -> Outcome<bool> {
        match self {
            Self::Ready(memory) => memory.load_session_memory(name),
            Self::Fallback { reason } => Outcome::degraded(false, reason.as_str()),
        }
    }

    pub fn get_available_sessions(&self) -> Outcome<Vec<String>> {
        match self {
            Self::Ready(memory) => memory.get_available_sessions(),
            Self::Fallback { reason } => Outcome::degraded(Vec::new(), reason.as_str()),
        }
    }

    pub fn get_memory_stats(&self) -> Outcome<MemoryStats> {
        match self {
            Self::Ready(memory) => memory.get_memory_stats(),
            Self::Fallback { reason } => Outcome::degraded(MemoryStats::default(), reason.as_str()),
        }
    }

    pub fn get_memory_status(&self) -> Outcome<MemoryStatus> {
        match self {
            Self::Ready(memory) => memory.get_memory_status(),
            Self::Fallback { reason } => Outcome::degraded(
                MemoryStatus {
                    session_id: "fallback".into(),
                    fallback_reason: Some(reason.clone()),
                    ..MemoryStatus::default()
                },
                reason.as_str(),
            ),
        }
    }

    pub fn close(&self) {
        if let Self::Ready(memory) = self {
            memory.close();
        }
    }
}
