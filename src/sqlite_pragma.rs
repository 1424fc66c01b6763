//! Connection tuning shared by every SQLite handle the indexer opens.

use rusqlite::Connection;

/// Apply WAL mode and the read/write tuning used by ingestion, aggregation and
/// queries. Safe to call on every open connection.
pub fn apply_optimized_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    conn.pragma_update(None, "mmap_size", 268_435_456_i64)?;
    // negative = KiB
    conn.pragma_update(None, "cache_size", -64_000_i64)?;
    conn.pragma_update(None, "wal_autocheckpoint", 1000_i64)?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    Ok(())
}
