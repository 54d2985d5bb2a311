use anyhow::Result;
use std::sync::Arc;

use mnemo::config::MnemoConfig;
use mnemo::memory::RecordSource;

use super::{open_memory, preview, settle, Target};

/// Search the session's memory from the terminal.
pub async fn search(
    config: &MnemoConfig,
    target: &Target,
    query: &str,
    content_type: Option<String>,
) -> Result<()> {
    let memory = Arc::new(open_memory(config, target)?);
    let max_results = config.retrieval.top_k;

    // Query embedding may load the ONNX model, so stay off the async workers
    let query_text = query.to_string();
    let searcher = Arc::clone(&memory);
    let outcome = tokio::task::spawn_blocking(move || {
        searcher.search_session_memory(&query_text, content_type.as_deref(), max_results)
    })
    .await?;
    let results = settle(outcome)?;

    if results.is_empty() {
        println!("No results found.");
        return Ok(());
    }

    println!("Found {} result(s)\n", results.len());
    for (i, record) in results.iter().enumerate() {
        let source = match record.source {
            RecordSource::Context => "context",
            RecordSource::Ephemeral => "recent",
            RecordSource::Persistent => "stored",
        };
        println!(
            "  {}. [{}] {} (importance: {:.2}, {})",
            i + 1,
            record.content_type,
            source,
            record.importance,
            record.timestamp.format("%Y-%m-%d %H:%M:%S"),
        );
        println!("     {}", preview(&record.content, 120));
        println!();
    }

    memory.close();
    Ok(())
}
