//! r2d2 connection pool over one store file.
//!
//! A connection is checked out for the duration of one operation and is
//! owned by the calling thread until the operation returns, so no two
//! threads ever use it at the same time. Connections idle for longer than
//! the configured timeout are closed by the pool's reaper.

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::Duration;

use super::StoreKind;
use crate::error::{MemoryError, Result};

type SqlitePool = Pool<SqliteConnectionManager>;

/// Enough for a UI thread, a background indexer, and a few CLI workers.
const MAX_CONNECTIONS: u32 = 8;
const CHECKOUT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ConnectionPool {
    path: PathBuf,
    kind: StoreKind,
    idle_timeout: Duration,
    pool: RwLock<SqlitePool>,
}

impl ConnectionPool {
    /// Open the store (creating schema and running migrations), then build
    /// the pool over it. A zero `idle_timeout` keeps idle connections until
    /// [`close`](Self::close).
    pub fn open(path: impl AsRef<Path>, kind: StoreKind, idle_timeout: Duration) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        drop(super::open_database(&path, kind)?);

        let pool = build_pool(&path, idle_timeout)?;
        Ok(Self {
            path,
            kind,
            idle_timeout,
            pool: RwLock::new(pool),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` with a pooled connection checked out for this thread.
    pub fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut conn = self.checkout()?;
        f(&mut conn)
    }

    /// Run `f` inside an immediate transaction, so concurrent writers queue on
    /// the busy timeout. Any error rolls the transaction back and is returned
    /// unchanged.
    pub fn with_transaction<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        self.with_conn(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let value = f(&tx)?;
            tx.commit()?;
            Ok(value)
        })
    }

    /// Number of connections currently parked in the pool.
    pub fn idle_connections(&self) -> usize {
        self.current()
            .map(|pool| pool.state().idle_connections as usize)
            .unwrap_or(0)
    }

    /// Close every idle connection by swapping in a fresh pool. Connections
    /// checked out right now finish their operation and close on return.
    pub fn close(&self) {
        let fresh = match build_pool(&self.path, self.idle_timeout) {
            Ok(pool) => pool,
            Err(e) => {
                tracing::warn!(store = self.kind.as_str(), error = %e, "could not rebuild connection pool");
                return;
            }
        };
        match self.pool.write() {
            Ok(mut pool) => {
                let closed = pool.state().idle_connections;
                *pool = fresh;
                tracing::debug!(store = self.kind.as_str(), closed, "closed idle connections");
            }
            Err(e) => tracing::warn!(error = %e, "could not close pooled connections"),
        }
    }

    fn checkout(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
        Ok(self.current()?.get()?)
    }

    fn current(&self) -> Result<SqlitePool> {
        self.pool
            .read()
            .map(|pool| pool.clone())
            .map_err(|e| MemoryError::LockPoisoned(format!("{} pool: {e}", self.kind.as_str())))
    }
}

fn build_pool(path: &Path, idle_timeout: Duration) -> Result<SqlitePool> {
    let manager = SqliteConnectionManager::file(path).with_init(|conn| super::configure_connection(conn));
    let idle_timeout = (!idle_timeout.is_zero()).then_some(idle_timeout);
    Ok(Pool::builder()
        .max_size(MAX_CONNECTIONS)
        .min_idle(Some(0))
        .idle_timeout(idle_timeout)
        .connection_timeout(CHECKOUT_TIMEOUT)
        .build(manager)?)
}
