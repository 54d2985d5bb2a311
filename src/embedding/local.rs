//! Local ONNX Runtime embedding provider.
//!
//! Runs a sentence-transformers export (all-MiniLM-L6-v2 by default) through
//! `ort`: tokenize, run the encoder, mean-pool over the attention mask, then
//! L2-normalize.

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::{Encoding, Tokenizer};

use super::{EmbeddingProvider, EMBEDDING_DIM};
use crate::config::EmbeddingConfig;

/// Maximum sequence length the MiniLM encoder was trained with.
const MAX_SEQ_LEN: usize = 256;

pub const MODEL_FILE: &str = "model.onnx";
pub const TOKENIZER_FILE: &str = "tokenizer.json";

pub struct LocalEmbeddingProvider {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    model: String,
}

// Safety: Tokenizer is Send+Sync and the ONNX session is only reached through
// the Mutex, which serializes every run().
unsafe impl Send for LocalEmbeddingProvider {}
unsafe impl Sync for LocalEmbeddingProvider {}

/// Paths of the model and tokenizer files under the configured cache dir.
pub fn model_files(config: &EmbeddingConfig) -> (PathBuf, PathBuf) {
    let cache_dir = crate::config::expand_tilde(&config.cache_dir);
    (cache_dir.join(MODEL_FILE), cache_dir.join(TOKENIZER_FILE))
}

impl LocalEmbeddingProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (model_path, tokenizer_path) = model_files(config);

        anyhow::ensure!(
            model_path.exists(),
            "ONNX model not found at {}. Run `mnemo model download` first.",
            model_path.display()
        );
        anyhow::ensure!(
            tokenizer_path.exists(),
            "Tokenizer not found at {}. Run `mnemo model download` first.",
            tokenizer_path.display()
        );

        let session = Session::builder()?
            .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)?
            .with_intra_threads(2)?
            .commit_from_file(&model_path)
            .context("failed to load ONNX model")?;

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("failed to load tokenizer: {e}"))?;
        tokenizer
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length: MAX_SEQ_LEN,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("failed to set truncation: {e}"))?;
        tokenizer.with_padding(Some(tokenizers::PaddingParams {
            strategy: tokenizers::PaddingStrategy::BatchLongest,
            ..Default::default()
        }));

        tracing::info!(
            model = %config.model,
            path = %model_path.display(),
            "local embedding model loaded"
        );

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            model: config.model.clone(),
        })
    }

    fn encode(&self, texts: &[&str]) -> Result<Vec<Encoding>> {
        self.tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| anyhow::anyhow!("tokenization failed: {e}"))
    }
}

impl EmbeddingProvider for LocalEmbeddingProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text])?
            .into_iter()
            .next()
            .context("embedding batch returned no vectors")
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let encodings = self.encode(texts)?;
        let batch = Batch::from_encodings(&encodings);

        let shape = vec![batch.size as i64, batch.seq_len as i64];
        let input_ids = Tensor::from_array((shape.clone(), batch.input_ids.into_boxed_slice()))?;
        let attention_mask =
            Tensor::from_array((shape.clone(), batch.attention_mask.clone().into_boxed_slice()))?;
        // Single-segment input: token types are all zero
        let token_type_ids = Tensor::from_array((
            shape,
            vec![0i64; batch.size * batch.seq_len].into_boxed_slice(),
        ))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| anyhow::anyhow!("session lock poisoned: {e}"))?;

        let outputs = session.run(ort::inputs! {
            "input_ids" => input_ids,
            "attention_mask" => attention_mask,
            "token_type_ids" => token_type_ids,
        })?;

        // Output name varies by export; fall back to the first output
        let hidden = outputs
            .get("token_embeddings")
            .or_else(|| outputs.get("last_hidden_state"))
            .unwrap_or_else(|| &outputs[0]);

        let (dims, data) = hidden
            .try_extract_tensor::<f32>()
            .context("failed to extract token embeddings")?;
        let dims: &[i64] = &dims;
        anyhow::ensure!(
            dims.len() == 3 && dims[2] == EMBEDDING_DIM as i64,
            "unexpected token embedding shape {dims:?}, expected [batch, seq, {EMBEDDING_DIM}]"
        );

        let out_seq_len = dims[1] as usize;
        let vectors = (0..batch.size)
            .map(|b| {
                let pooled = mean_pool(
                    data,
                    &batch.attention_mask[b * batch.seq_len..(b + 1) * batch.seq_len],
                    b * out_seq_len * EMBEDDING_DIM,
                    out_seq_len,
                    EMBEDDING_DIM,
                );
                l2_normalize(&pooled)
            })
            .collect();

        Ok(vectors)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Flattened, padded model inputs for one batch.
struct Batch {
    size: usize,
    seq_len: usize,
    input_ids: Vec<i64>,
    attention_mask: Vec<i64>,
}

impl Batch {
    fn from_encodings(encodings: &[Encoding]) -> Self {
        let size = encodings.len();
        let seq_len = encodings.first().map(|e| e.get_ids().len()).unwrap_or(0);

        let mut input_ids = Vec::with_capacity(size * seq_len);
        let mut attention_mask = Vec::with_capacity(size * seq_len);
        for encoding in encodings {
            input_ids.extend(encoding.get_ids().iter().map(|&id| id as i64));
            attention_mask.extend(encoding.get_attention_mask().iter().map(|&m| m as i64));
        }

        Self {
            size,
            seq_len,
            input_ids,
            attention_mask,
        }
    }
}

/// Average the token vectors of one sequence, weighting by the attention mask.
fn mean_pool(data: &[f32], mask: &[i64], offset: usize, seq_len: usize, dim: usize) -> Vec<f32> {
    let mut sum = vec![0.0f32; dim];
    let mut count = 0.0f32;

    for (s, &m) in mask.iter().take(seq_len).enumerate() {
        if m <= 0 {
            continue;
        }
        let weight = m as f32;
        let start = offset + s * dim;
        for (acc, value) in sum.iter_mut().zip(&data[start..start + dim]) {
            *acc += value * weight;
        }
        count += weight;
    }

    if count > 0.0 {
        sum.iter_mut().for_each(|x| *x /= count);
    }
    sum
}

/// L2-normalize a vector. A zero vector is returned unchanged.
fn l2_normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter().map(|x| x / norm).collect()
    } else {
        v.to_vec()
    }
}
