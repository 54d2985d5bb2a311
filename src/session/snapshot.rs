//! Session id conventions.
//!
//! Saved snapshots live in ordinary sessions named
//! `saved_<name>_<YYYYMMDD_HHMMSS_ffffff>`; generated working sessions are
//! `session_<YYYYMMDD_HHMMSS_ffffff>`.

use chrono::{DateTime, Utc};

use crate::error::{MemoryError, Result};

pub const SNAPSHOT_PREFIX: &str = "saved_";

const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S_%6f";

fn stamp(at: &DateTime<Utc>) -> String {
    at.format(STAMP_FORMAT).to_string()
}

/// Id for a freshly generated working session.
pub fn default_session_id(at: &DateTime<Utc>) -> String {
    format!("session_{}", stamp(at))
}

/// Id of a new snapshot of `name` taken at `at`.
pub fn snapshot_session_id(name: &str, at: &DateTime<Utc>) -> Result<String> {
    validate_name(name)?;
    Ok(format!("{SNAPSHOT_PREFIX}{name}_{}", stamp(at)))
}

/// Recover the human-given name from a snapshot session id.
///
/// The trailing three `_`-separated fields must be the timestamp; whatever
/// sits between the prefix and the timestamp is the name, so names may
/// themselves contain underscores.
pub fn parse_snapshot_name(session_id: &str) -> Option<&str> {
    let rest = session_id.strip_prefix(SNAPSHOT_PREFIX)?;
    let mut parts = rest.rsplitn(4, '_');
    let micros = parts.next()?;
    let time = parts.next()?;
    let date = parts.next()?;
    let name = parts.next()?;

    let digits = |s: &str, len: usize| s.len() == len && s.bytes().all(|b| b.is_ascii_digit());
    if !(digits(date, 8) && digits(time, 6) && digits(micros, 6)) || name.is_empty() {
        return None;
    }
    Some(name)
}

pub fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(MemoryError::InvalidSnapshotName(name.to_string()));
    }
    Ok(())
}
