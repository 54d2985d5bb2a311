//! CLI `memory clear` command: delete a session's memory after confirmation.

use anyhow::{bail, Result};
use std::io::Write;

use mnemo::config::MnemoConfig;

use super::{open_memory, settle, Target};

/// Delete every stored entry and context chunk of the session.
pub fn clear(config: &MnemoConfig, target: &Target, yes: bool) -> Result<()> {
    let memory = open_memory(config, target)?;

    if !yes {
        println!(
            "WARNING: This will permanently delete all memory of session {}.",
            memory.session_id()
        );
        println!("Saved snapshots are kept.");
        print!("\nType YES to confirm: ");
        std::io::stdout().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;

        if input.trim() != "YES" {
            bail!("clear cancelled");
        }
    }

    if settle(memory.clear_all_memory())? {
        println!("Session memory cleared.");
    } else {
        println!("Nothing to clear.");
    }

    memory.close();
    Ok(())
}
