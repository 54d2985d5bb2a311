use anyhow::Result;
use std::sync::Arc;

use mnemo::config::MnemoConfig;
use mnemo::memory::NewEntry;

use super::{open_memory, settle, Target};

/// Remember a piece of text in the session.
pub async fn add(config: &MnemoConfig, target: &Target, entry: NewEntry) -> Result<()> {
    let memory = Arc::new(open_memory(config, target)?);

    let writer = Arc::clone(&memory);
    let outcome = tokio::task::spawn_blocking(move || writer.add_to_session_memory(entry)).await?;
    let id = settle(outcome)?;

    if id < 0 {
        println!("Memory is disabled; nothing stored.");
    } else {
        println!("Stored entry #{id} in session {}.", memory.session_id());
    }

    memory.close();
    Ok(())
}
