use anyhow::{bail, Result};

use mnemo::config::MnemoConfig;

use super::{open_memory, settle, Target};

/// Snapshot the session's stored entries under `name`.
pub fn save(config: &MnemoConfig, target: &Target, name: &str) -> Result<()> {
    let memory = open_memory(config, target)?;
    if !settle(memory.save_session_memory(name))? {
        bail!("could not save snapshot {name:?}");
    }
    println!("Saved session {} as {name:?}.", memory.session_id());
    memory.close();
    Ok(())
}

/// Replace the session's memory with the newest snapshot named `name`.
pub fn load(config: &MnemoConfig, target: &Target, name: &str) -> Result<()> {
    let memory = open_memory(config, target)?;
    if !settle(memory.load_session_memory(name))? {
        bail!("no snapshot named {name:?} (or memory is disabled)");
    }
    println!("Loaded snapshot {name:?} into session {}.", memory.session_id());
    memory.close();
    Ok(())
}

/// List saved snapshot names, newest first.
pub fn available(config: &MnemoConfig, target: &Target) -> Result<()> {
    let memory = open_memory(config, target)?;
    let names = settle(memory.get_available_sessions())?;
    if names.is_empty() {
        println!("No saved snapshots.");
    } else {
        for name in &names {
            println!("  {name}");
        }
    }
    memory.close();
    Ok(())
}
