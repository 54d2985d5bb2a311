pub mod add;
pub mod clear;
pub mod context;
pub mod search;
pub mod snapshot;
pub mod stats;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use mnemo::config::{EmbeddingConfig, MnemoConfig};
use mnemo::embedding::local::{MODEL_FILE, TOKENIZER_FILE};
use mnemo::error::Outcome;
use mnemo::session::MemorySystem;

const MODEL_URL: &str =
    "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/onnx/model.onnx";
const TOKENIZER_URL: &str =
    "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/tokenizer.json";

/// Session and project selection shared by every `memory` subcommand.
pub struct Target {
    pub session: Option<String>,
    pub project: Option<PathBuf>,
}

/// Open the memory system for a CLI command.
///
/// Without `--session` the configured default session is used, so separate
/// invocations see the same memory. A fallback system is an error here.
pub fn open_memory(config: &MnemoConfig, target: &Target) -> Result<MemorySystem> {
    let session = target
        .session
        .as_deref()
        .unwrap_or(&config.memory.default_session);
    match MemorySystem::open(config, Some(session), target.project.as_deref()) {
        MemorySystem::Fallback { reason } => anyhow::bail!("memory system unavailable: {reason}"),
        ready => Ok(ready),
    }
}

/// Unwrap a façade outcome, printing the reason when a fallback path answered.
pub fn settle<T>(outcome: Outcome<T>) -> Result<T> {
    match outcome {
        Outcome::Ok(value) => Ok(value),
        Outcome::Degraded { value, reason } => {
            eprintln!("note: {reason}");
            Ok(value)
        }
        Outcome::Fatal(err) => Err(err.into()),
    }
}

/// First `max` characters of `text`, with an ellipsis when truncated.
pub fn preview(text: &str, max: usize) -> String {
    let flat = text.replace('\n', " ");
    if flat.chars().count() > max {
        let head: String = flat.chars().take(max).collect();
        format!("{head}...")
    } else {
        flat
    }
}

/// Download the ONNX embedding model and tokenizer to the cache directory.
pub async fn model_download(config: &EmbeddingConfig) -> Result<()> {
    let cache_dir = mnemo::config::expand_tilde(&config.cache_dir);
    std::fs::create_dir_all(&cache_dir)
        .with_context(|| format!("failed to create cache dir: {}", cache_dir.display()))?;

    for (label, url, file) in [
        ("model", MODEL_URL, MODEL_FILE),
        ("tokenizer", TOKENIZER_URL, TOKENIZER_FILE),
    ] {
        let dest = cache_dir.join(file);
        if dest.exists() {
            println!("{label} already present at {}", dest.display());
            continue;
        }
        println!("Downloading {file}...");
        download_file(url, &dest).await?;
        println!("{label} saved to {}", dest.display());
    }

    println!("Model download complete. Semantic retrieval is ready.");
    Ok(())
}

/// Stream a file to disk with a progress bar, writing to a temp file and renaming.
async fn download_file(url: &str, dest: &Path) -> Result<()> {
    let mut response = reqwest::get(url)
        .await
        .with_context(|| format!("HTTP request failed for {url}"))?;

    anyhow::ensure!(
        response.status().is_success(),
        "download failed with HTTP {}",
        response.status()
    );

    let pb = match response.content_length() {
        Some(size) => {
            let pb = ProgressBar::new(size);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("  {bar:40.cyan/blue} {bytes}/{total_bytes} ({eta})")
                    .context("invalid progress template")?
                    .progress_chars("##-"),
            );
            pb
        }
        None => ProgressBar::new_spinner(),
    };

    let tmp_path = dest.with_extension("tmp");
    let mut file = tokio::fs::File::create(&tmp_path)
        .await
        .with_context(|| format!("failed to create temp file: {}", tmp_path.display()))?;

    while let Some(chunk) = response.chunk().await.context("error reading response")? {
        file.write_all(&chunk)
            .await
            .context("error writing to file")?;
        pb.inc(chunk.len() as u64);
    }

    file.flush().await?;
    drop(file);

    tokio::fs::rename(&tmp_path, dest)
        .await
        .context("failed to rename temp file")?;

    pb.finish_and_clear();
    Ok(())
}
