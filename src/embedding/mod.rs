//! Text-to-vector embedding pipeline.
//!
//! Provides the [`EmbeddingProvider`] trait, a local ONNX implementation
//! (all-MiniLM-L6-v2, 384 dimensions, L2-normalized), and [`Embedder`], the
//! two-state capability the context manager talks to. Embeddings are an
//! enhancement: when no provider can be loaded the embedder reports
//! [`Capability::Unavailable`] and every `embed` call yields `None`.

pub mod local;
pub mod similarity;

use std::sync::OnceLock;

use anyhow::Result;

use crate::config::EmbeddingConfig;

pub use similarity::{cosine_similarity, manual_cosine_similarity};

/// Number of dimensions produced by the bundled local model.
pub const EMBEDDING_DIM: usize = 384;

/// Trait for embedding text into vectors.
///
/// All methods are synchronous; callers in async contexts should use
/// `tokio::task::spawn_blocking`.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text string into a vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of text strings. Implementations may override for batched inference.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Number of dimensions this provider produces.
    fn dimensions(&self) -> usize {
        EMBEDDING_DIM
    }

    /// Identifier of the model behind this provider, recorded in the context store.
    fn model_name(&self) -> &str;
}

/// Build the provider named in config.
///
/// Returns `Ok(None)` for `provider = "none"`. Returns an error if the local
/// model files are missing; run `mnemo model download` first.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Option<Box<dyn EmbeddingProvider>>> {
    match config.provider.as_str() {
        "local" => {
            let provider = local::LocalEmbeddingProvider::new(config)?;
            Ok(Some(Box::new(provider)))
        }
        "none" => Ok(None),
        other => anyhow::bail!("unknown embedding provider: {other}. Supported: local, none"),
    }
}

/// Whether embeddings can be produced in this process.
pub enum Capability {
    Available(Box<dyn EmbeddingProvider>),
    Unavailable(String),
}

/// Lazily-resolved embedding capability.
///
/// The provider is loaded on first use. A failed load disables the embedder
/// for the rest of its lifetime; a failed inference only affects that call.
pub struct Embedder {
    config: Option<EmbeddingConfig>,
    state: OnceLock<Capability>,
}

impl Embedder {
    /// Defer loading the configured provider until the first embed call.
    pub fn lazy(config: EmbeddingConfig) -> Self {
        Self {
            config: Some(config),
            state: OnceLock::new(),
        }
    }

    /// Wrap an already-constructed provider.
    pub fn from_provider(provider: Box<dyn EmbeddingProvider>) -> Self {
        Self::resolved(Capability::Available(provider))
    }

    /// An embedder that never produces vectors.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::resolved(Capability::Unavailable(reason.into()))
    }

    fn resolved(capability: Capability) -> Self {
        let state = OnceLock::new();
        let _ = state.set(capability);
        Self {
            config: None,
            state,
        }
    }

    /// Resolve the capability, loading the provider if this is the first call.
    pub fn capability(&self) -> &Capability {
        self.state.get_or_init(|| self.load())
    }

    pub fn is_available(&self) -> bool {
        matches!(self.capability(), Capability::Available(_))
    }

    pub fn model_name(&self) -> Option<&str> {
        match self.capability() {
            Capability::Available(provider) => Some(provider.model_name()),
            Capability::Unavailable(_) => None,
        }
    }

    /// Embed `text`, or `None` when embeddings are unavailable or inference failed.
    pub fn embed(&self, text: &str) -> Option<Vec<f32>> {
        let Capability::Available(provider) = self.capability() else {
            return None;
        };
        match provider.embed(text) {
            Ok(vector) => Some(vector),
            Err(e) => {
                tracing::debug!(error = %e, "embedding failed, continuing without vector");
                None
            }
        }
    }

    /// Cosine similarity between two stored or freshly computed vectors.
    pub fn similarity(&self, a: &[f32], b: &[f32]) -> f32 {
        cosine_similarity(a, b)
    }

    fn load(&self) -> Capability {
        let Some(config) = &self.config else {
            return Capability::Unavailable("no embedding provider configured".into());
        };
        match create_provider(config) {
            Ok(Some(provider)) => {
                tracing::info!(model = provider.model_name(), "embedding provider ready");
                Capability::Available(provider)
            }
            Ok(None) => {
                tracing::info!("embeddings disabled by configuration, using keyword retrieval");
                Capability::Unavailable("embedding provider set to none".into())
            }
            Err(e) => {
                tracing::warn!(error = %e, "embedding provider unavailable, using keyword retrieval");
                Capability::Unavailable(e.to_string())
            }
        }
    }
}

/// Encode a vector as little-endian `f32` bytes for BLOB storage.
pub fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Decode a BLOB written by [`embedding_to_blob`]. `None` if the length is not a
/// multiple of four bytes.
pub fn blob_to_embedding(blob: &[u8]) -> Option<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return None;
    }
    Some(
        blob.chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingProvider {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    impl EmbeddingProvider for CountingProvider {
        fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("inference failed");
            }
            Ok(vec![text.len() as f32, 1.0])
        }

        fn dimensions(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "counting"
        }
    }

    #[test]
    fn blob_roundtrip_preserves_values() {
        let original = vec![0.1_f32, -0.5, 1.0, f32::MIN_POSITIVE];
        let blob = embedding_to_blob(&original);
        assert_eq!(blob.len(), 16);
        assert_eq!(blob_to_embedding(&blob).unwrap(), original);
    }

    #[test]
    fn blob_with_torn_length_is_rejected() {
        assert!(blob_to_embedding(&[0u8, 1, 2]).is_none());
    }

    #[test]
    fn available_embedder_returns_vectors() {
        let calls = Arc::new(AtomicUsize::new(0));
        let embedder = Embedder::from_provider(Box::new(CountingProvider {
            calls: Arc::clone(&calls),
            fail: false,
        }));

        assert!(embedder.is_available());
        assert_eq!(embedder.model_name(), Some("counting"));
        assert_eq!(embedder.embed("abc"), Some(vec![3.0, 1.0]));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn inference_failure_yields_none_but_stays_available() {
        let calls = Arc::new(AtomicUsize::new(0));
        let embedder = Embedder::from_provider(Box::new(CountingProvider {
            calls: Arc::clone(&calls),
            fail: true,
        }));

        assert!(embedder.embed("abc").is_none());
        assert!(embedder.is_available());
        assert!(embedder.embed("abc").is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn failed_load_disables_permanently() {
        let tmp = tempfile::TempDir::new().unwrap();
        let embedder = Embedder::lazy(EmbeddingConfig {
            provider: "local".into(),
            model: "all-MiniLM-L6-v2".into(),
            cache_dir: tmp.path().to_string_lossy().into_owned(),
        });

        assert!(embedder.embed("hello").is_none());
        assert!(matches!(embedder.capability(), Capability::Unavailable(_)));
        assert!(embedder.embed("hello again").is_none());
    }

    #[test]
    fn none_provider_is_unavailable() {
        let embedder = Embedder::lazy(EmbeddingConfig {
            provider: "none".into(),
            ..EmbeddingConfig::default()
        });
        assert!(!embedder.is_available());
        assert!(embedder.model_name().is_none());
    }

    #[test]
    fn unknown_provider_is_unavailable() {
        let embedder = Embedder::lazy(EmbeddingConfig {
            provider: "quantum".into(),
            ..EmbeddingConfig::default()
        });
        match embedder.capability() {
            Capability::Unavailable(reason) => assert!(reason.contains("unknown embedding provider")),
            Capability::Available(_) => panic!("unknown provider must not load"),
        }
    }
}
