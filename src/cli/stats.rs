use anyhow::{Context, Result};

use mnemo::config::MnemoConfig;

use super::{open_memory, preview, settle, Target};

/// Display memory statistics for the session.
pub fn stats(config: &MnemoConfig, target: &Target) -> Result<()> {
    let memory = open_memory(config, target)?;
    let stats = settle(memory.get_memory_stats())?;
    let status = settle(memory.get_memory_status())?;

    println!("Memory Statistics");
    println!("{}", "=".repeat(40));
    println!("  Session:             {}", stats.session_id);
    println!("  Project:             {}", stats.project_path.display());
    println!("  Enabled:             {}", status.enabled);
    println!("  Stored entries:      {}", stats.persistent_entries);
    println!("  Context chunks:      {}", stats.context_chunks);
    println!("  Embedded chunks:     {}", stats.embedded_chunks);
    println!("  Average importance:  {:.2}", stats.average_importance);
    if let Some(last) = stats.last_updated {
        println!("  Last updated:        {}", last.to_rfc3339());
    }
    println!();

    if !stats.content_type_distribution.is_empty() {
        println!("By Type:");
        for (content_type, count) in &stats.content_type_distribution {
            println!("  {:<16} {}", content_type, count);
        }
    }

    memory.close();
    Ok(())
}

/// List the highest-ranked stored entries.
pub fn list(config: &MnemoConfig, target: &Target, limit: usize) -> Result<()> {
    let memory = open_memory(config, target)?;
    let ready = memory
        .as_ready()
        .context("memory system is not ready")?;
    let entries = ready
        .store()
        .get_memory_entries(ready.session_id(), limit, 0)?;

    if entries.is_empty() {
        println!("No memories stored for session {}.", ready.session_id());
        return Ok(());
    }

    for entry in &entries {
        println!(
            "  #{:<5} [{}] importance {:.2}  {}",
            entry.id,
            entry.content_type,
            entry.importance,
            entry.created_at.format("%Y-%m-%d %H:%M:%S"),
        );
        println!("         {}", preview(&entry.content, 120));
        if !entry.tags.is_empty() {
            println!("         tags: {}", entry.tags.join(", "));
        }
    }

    memory.close();
    Ok(())
}
