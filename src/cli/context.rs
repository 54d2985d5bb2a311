use anyhow::Result;

use mnemo::config::MnemoConfig;

use super::{open_memory, settle, Target};

/// Print the assembled prompt context for the session.
pub fn context(config: &MnemoConfig, target: &Target, types: &[String]) -> Result<()> {
    let memory = open_memory(config, target)?;
    let include = (!types.is_empty()).then_some(types);
    let context = settle(memory.get_context(config.retrieval.max_context_entries, include))?;

    if context.is_empty() {
        println!("No context stored for session {}.", memory.session_id());
    } else {
        println!("{context}");
    }

    memory.close();
    Ok(())
}
