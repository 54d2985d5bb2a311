#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use mnemo::config::MnemoConfig;
use mnemo::context::{ChunkSettings, ContextManager};
use mnemo::embedding::{Embedder, EmbeddingProvider};
use mnemo::memory::{MemoryStore, StoreSettings};
use mnemo::session::{MemorySystem, SessionMemory, SessionOptions};

pub const HASH_DIM: usize = 64;

/// Deterministic bag-of-words embedder: each lowercase word is hashed (FNV-1a)
/// into one of `HASH_DIM` buckets, then the vector is L2-normalized.
pub struct HashingProvider;

fn fnv1a(word: &str) -> u64 {
    word.bytes().fold(0xcbf29ce484222325u64, |hash, b| {
        (hash ^ b as u64).wrapping_mul(0x100000001b3)
    })
}

impl EmbeddingProvider for HashingProvider {
    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let mut v = vec![0.0f32; HASH_DIM];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            v[(fnv1a(&word.to_lowercase()) % HASH_DIM as u64) as usize] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(v)
    }

    fn dimensions(&self) -> usize {
        HASH_DIM
    }

    fn model_name(&self) -> &str {
        "test-hashing"
    }
}

pub fn hashing_embedder() -> Arc<Embedder> {
    Arc::new(Embedder::from_provider(Box::new(HashingProvider)))
}

pub fn no_embedder() -> Arc<Embedder> {
    Arc::new(Embedder::unavailable("embeddings disabled in tests"))
}

pub fn test_store(dir: &Path) -> MemoryStore {
    MemoryStore::open(
        dir.join("memory.db"),
        Duration::from_secs(60),
        StoreSettings::default(),
    )
    .unwrap()
}

pub fn test_context(dir: &Path, embedder: Arc<Embedder>) -> ContextManager {
    ContextManager::open(
        dir.join("context.db"),
        Duration::from_secs(60),
        embedder,
        ChunkSettings::default(),
    )
    .unwrap()
}

pub fn test_options(session_id: &str, dir: &Path) -> SessionOptions {
    SessionOptions {
        session_id: session_id.to_string(),
        project_path: dir.to_path_buf(),
        enabled: true,
        ephemeral_capacity: 100,
        min_similarity: 0.3,
    }
}

/// A ready memory system over fresh stores in `dir`.
pub fn test_memory(dir: &Path, embedder: Arc<Embedder>) -> MemorySystem {
    test_memory_with(dir, embedder, test_options("test-session", dir))
}

pub fn test_memory_with(dir: &Path, embedder: Arc<Embedder>, options: SessionOptions) -> MemorySystem {
    let memory = SessionMemory::new(test_store(dir), test_context(dir, embedder), options).unwrap();
    MemorySystem::Ready(Box::new(memory))
}

/// Config rooted at `dir` with embeddings turned off.
pub fn test_config(dir: &Path) -> MnemoConfig {
    let mut config = MnemoConfig::default();
    config.storage.data_dir = dir.to_string_lossy().into_owned();
    config.embedding.provider = "none".into();
    config
}
