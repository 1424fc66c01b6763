//! Per-job progress rows in `settings` and skip-if-locked job leases.
//!
//! A watermark is read at the start of an iteration and written in the same
//! transaction as the aggregate rows it covers.

use crate::aggregator_core::error::AggregateError;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Watermark {
    /// Last processed position (inclusive).
    pub sync: u64,
    /// Caught up with the safety head at the time of the write.
    #[serde(default)]
    pub finished: bool,
    /// Job-specific resume hint (e.g. the last processed day).
    #[serde(default)]
    pub index: Option<String>,
}

pub fn read_watermark(conn: &Connection, key: &str) -> Result<Option<Watermark>, AggregateError> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value FROM settings WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?;
    match raw {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Upsert the watermark. Callers pass a connection that is inside the
/// transaction holding the aggregate writes (a `Transaction` derefs to one).
pub fn write_watermark(conn: &Connection, key: &str, watermark: &Watermark) -> Result<(), AggregateError> {
    let value = serde_json::to_string(watermark)?;
    conn.execute(
        "INSERT INTO settings (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

/// Claim `key` for `owner` until `now + ttl`. Succeeds when the lease is free,
/// expired, or already ours; returns `false` when another live owner holds it.
pub fn claim_lease(
    conn: &Connection,
    key: &str,
    owner: &str,
    now: i64,
    ttl_secs: i64,
) -> Result<bool, AggregateError> {
    let changed = conn.execute(
        "INSERT INTO job_leases (key, owner, expires_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(key) DO UPDATE SET owner = excluded.owner, expires_at = excluded.expires_at
         WHERE job_leases.owner = excluded.owner OR job_leases.expires_at <= ?4",
        params![key, owner, now + ttl_secs, now],
    )?;
    Ok(changed == 1)
}

pub fn release_lease(conn: &Connection, key: &str, owner: &str) -> Result<(), AggregateError> {
    conn.execute(
        "DELETE FROM job_leases WHERE key = ?1 AND owner = ?2",
        params![key, owner],
    )?;
    Ok(())
}
