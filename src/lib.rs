//! Session memory and context retrieval for local-first assistants.
//!
//! mnemo remembers what happens in a conversation and hands the most relevant
//! part back when the next prompt is built. Memory lives in three tiers:
//!
//! | Tier | Where | Purpose |
//! |------|-------|---------|
//! | **Ephemeral** | In-process ring buffer | Zero-latency recall of recent turns |
//! | **Persistent** | SQLite `memory.db` | Authoritative store of sessions and entries |
//! | **Context** | SQLite `context.db` | Overlapping chunks with optional embeddings |
//!
//! # Architecture
//!
//! - **Storage**: SQLite via `rusqlite`, pooled with `r2d2` and idle eviction
//! - **Embeddings**: Local ONNX Runtime with all-MiniLM-L6-v2 (384 dimensions), optional
//! - **Retrieval**: Cosine similarity over stored chunk embeddings, keyword matching
//!   when no embedding is available, importance/recency ranking throughout
//! - **Degradation**: every façade call reports an [`error::Outcome`]; a façade
//!   that cannot open its stores becomes a no-op fallback
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from TOML files and environment variables
//! - [`db`]: SQLite connections, pooling, schema, and migrations
//! - [`embedding`]: Text-to-vector embedding and similarity
//! - [`memory`]: Durable store of sessions and memory entries
//! - [`context`]: Chunking, indexing, and ranked retrieval
//! - [`session`]: The [`session::MemorySystem`] façade

pub mod config;
pub mod context;
pub mod db;
pub mod embedding;
pub mod error;
pub mod memory;
pub mod session;
