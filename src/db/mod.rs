pub mod migrations;
pub mod pool;
pub mod schema;

use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

use crate::error::Result;

pub use pool::ConnectionPool;

/// Which of the two on-disk stores a database file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// Sessions, memory entries, and their bulk-retrieval chunks.
    Memory,
    /// Embedding chunks used for similarity retrieval.
    Context,
}

impl StoreKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Context => "context",
        }
    }
}

/// Open a raw connection with the per-connection pragmas applied.
///
/// Schema is not touched; use [`open_database`] for the first connection to a file.
pub fn open_connection(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    configure_connection(&conn)?;
    Ok(conn)
}

/// Per-connection pragmas, applied to every connection the pool opens.
pub fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    // WAL lets the UI thread read while a background indexer writes
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(Duration::from_secs(5))?;
    Ok(())
}

/// Open (or create) a store at the given path with schema initialized and
/// migrations applied.
pub fn open_database(path: impl AsRef<Path>, kind: StoreKind) -> Result<Connection> {
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let conn = open_connection(path)?;
    schema::init_schema(&conn, kind)?;
    migrations::run_migrations(&conn, kind)?;

    tracing::info!(path = %path.display(), store = kind.as_str(), "database initialized");
    Ok(conn)
}
