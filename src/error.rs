//! Error type for the storage and retrieval layers, and the [`Outcome`]
//! channel the session façade reports through.

use thiserror::Error;

/// Failures raised by the memory and context stores.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("lock poisoned: {0}")]
    LockPoisoned(String),

    #[error("session {0} already exists")]
    SessionExists(String),

    #[error("invalid snapshot name {0:?}: names must be non-empty")]
    InvalidSnapshotName(String),
}

pub type Result<T> = std::result::Result<T, MemoryError>;

/// Result of a façade operation.
///
/// `Degraded` carries a usable value produced by a fallback path (storage
/// context instead of chunk context, partial search results, a no-op
/// façade). Keyword search when no embedding is available is the normal
/// path and reports `Ok`. `Fatal` means the subsystem could not answer at all.
#[derive(Debug)]
pub enum Outcome<T> {
    Ok(T),
    Degraded { value: T, reason: String },
    Fatal(MemoryError),
}

impl<T> Outcome<T> {
    pub fn degraded(value: T, reason: impl Into<String>) -> Self {
        Self::Degraded {
            value,
            reason: reason.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }

    /// The produced value, or `fallback` when the operation failed outright.
    pub fn value_or(self, fallback: T) -> T {
        match self {
            Self::Ok(value) | Self::Degraded { value, .. } => value,
            Self::Fatal(_) => fallback,
        }
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Ok(value) | Self::Degraded { value, .. } => Some(value),
            Self::Fatal(_) => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Self::Ok(value) => Outcome::Ok(f(value)),
            Self::Degraded { value, reason } => Outcome::Degraded {
                value: f(value),
                reason,
            },
            Self::Fatal(err) => Outcome::Fatal(err),
        }
    }
}

impl<T: Default> Outcome<T> {
    pub fn value_or_default(self) -> T {
        self.value_or(T::default())
    }
}

impl<T> From<Result<T>> for Outcome<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(value) => Self::Ok(value),
            Err(err) => Self::Fatal(err),
        }
    }
}
