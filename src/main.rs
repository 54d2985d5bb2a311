mod cli;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use mnemo::config::MnemoConfig;
use mnemo::memory::NewEntry;

#[derive(Parser)]
#[command(name = "mnemo", version, about = "Session memory and context retrieval for local assistants")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Inspect and manage session memory
    Memory {
        #[command(flatten)]
        target: TargetArgs,
        #[command(subcommand)]
        action: MemoryAction,
    },
    /// Manage the embedding model
    Model {
        #[command(subcommand)]
        action: ModelAction,
    },
}

#[derive(Args)]
struct TargetArgs {
    /// Session id (defaults to memory.default_session)
    #[arg(long, global = true)]
    session: Option<String>,
    /// Project path recorded for new sessions (defaults to the working directory)
    #[arg(long, global = true)]
    project: Option<PathBuf>,
}

#[derive(Subcommand)]
enum MemoryAction {
    /// Show memory statistics
    Stats,
    /// Search memory across all tiers
    Search {
        /// Search query
        #[arg(required = true)]
        query: Vec<String>,
        /// Only match this content type
        #[arg(long = "type")]
        content_type: Option<String>,
    },
    /// List the highest-ranked stored entries
    List {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Print the assembled prompt context
    Context {
        /// Only include these content types
        #[arg(long = "type")]
        types: Vec<String>,
    },
    /// Remember a piece of text
    Add {
        text: String,
        #[arg(long = "type", default_value = "text")]
        content_type: String,
        #[arg(long, default_value_t = 1.0)]
        importance: f64,
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Delete all memory of the session
    Clear {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Save the session's memory as a named snapshot
    Save { name: String },
    /// Replace the session's memory with the newest snapshot of that name
    Load { name: String },
    /// List saved snapshot names
    Available,
}

#[derive(Subcommand)]
enum ModelAction {
    /// Download the embedding model to ~/.mnemo/models/
    Download,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = MnemoConfig::load()?;

    // Log to stderr so stdout stays clean for command output
    let filter = EnvFilter::try_new(&config.log.level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Memory { target, action } => {
            let target = cli::Target {
                session: target.session,
                project: target.project,
            };
            match action {
                MemoryAction::Stats => cli::stats::stats(&config, &target)?,
                MemoryAction::Search {
                    query,
                    content_type,
                } => cli::search::search(&config, &target, &query.join(" "), content_type).await?,
                MemoryAction::List { limit } => cli::stats::list(&config, &target, limit)?,
                MemoryAction::Context { types } => cli::context::context(&config, &target, &types)?,
                MemoryAction::Add {
                    text,
                    content_type,
                    importance,
                    tags,
                } => {
                    let entry = NewEntry::text(text)
                        .with_type(content_type)
                        .with_importance(importance)
                        .with_tags(tags);
                    cli::add::add(&config, &target, entry).await?
                }
                MemoryAction::Clear { yes } => cli::clear::clear(&config, &target, yes)?,
                MemoryAction::Save { name } => cli::snapshot::save(&config, &target, &name)?,
                MemoryAction::Load { name } => cli::snapshot::load(&config, &target, &name)?,
                MemoryAction::Available => cli::snapshot::available(&config, &target)?,
            }
        }
        Command::Model { action } => match action {
            ModelAction::Download => {
                cli::model_download(&config.embedding).await?;
            }
        },
    }

    Ok(())
}
