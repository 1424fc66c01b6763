//! Concrete aggregate jobs and the SQL helpers they share.

pub mod balance_snapshots;
pub mod daily_stats;
pub mod ft_holders;
pub mod tps;

pub use balance_snapshots::BalanceSnapshotsJob;
pub use daily_stats::DailyStatsJob;
pub use ft_holders::FtHoldersJob;
pub use tps::TpsJob;

use crate::aggregator_core::error::AggregateError;
use rusqlite::{Connection, OptionalExtension, ToSql};

/// Event kinds whose deltas move fungible balances.
pub(crate) const FUNGIBLE_KINDS: &str = "(1, 5)";

/// `(?1, ?2), (?3, ?4), ...` for `rows` rows of `cols` columns.
pub(crate) fn row_placeholders(rows: usize, cols: usize) -> String {
    (0..rows)
        .map(|r| {
            let cols: Vec<String> = (1..=cols).map(|c| format!("?{}", r * cols + c)).collect();
            format!("({})", cols.join(", "))
        })
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) type SqlValues = Vec<Box<dyn ToSql>>;

pub(crate) fn latest_block_height(conn: &Connection) -> Result<Option<u64>, AggregateError> {
    let height: Option<i64> = conn.query_row("SELECT MAX(height) FROM blocks", [], |row| row.get(0))?;
    Ok(height.map(|h| h as u64))
}

/// Timestamp (ns) of the highest stored block at or below `height`.
pub(crate) fn block_timestamp_at(conn: &Connection, height: u64) -> Result<Option<u64>, AggregateError> {
    let ts: Option<i64> = conn
        .query_row(
            "SELECT block_timestamp FROM blocks WHERE height <= ?1 ORDER BY height DESC LIMIT 1",
            [height as i64],
            |row| row.get(0),
        )
        .optional()?;
    Ok(ts.map(|t| t as u64))
}
