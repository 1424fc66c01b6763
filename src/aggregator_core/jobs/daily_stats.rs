//! Event counts and volume per UTC day, contract and cause.
//!
//! The watermark `index` records the day of the last processed block so a
//! reader can tell which day is still filling.

use crate::aggregator_core::error::{parse_stored_amount, parse_stored_volume, AggregateError};
use crate::aggregator_core::job::AggregateJob;
use crate::aggregator_core::jobs::{block_timestamp_at, latest_block_height, row_placeholders, SqlValues};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, Transaction};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyDelta {
    pub date: String,
    pub contract: String,
    pub cause: String,
    pub event_count: i64,
    pub volume: u128,
}

/// `YYYY-MM-DD` (UTC) of a nanosecond timestamp.
pub fn utc_date(ts_nanos: u64) -> Result<String, AggregateError> {
    let secs = (ts_nanos / 1_000_000_000) as i64;
    DateTime::<Utc>::from_timestamp(secs, 0)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .ok_or_else(|| AggregateError::InvalidData(format!("timestamp {} out of range", ts_nanos)))
}

#[derive(Debug, Default)]
pub struct DailyStatsJob;

type DayKey = (String, String, String);

impl DailyStatsJob {
    fn current_volumes(tx: &Transaction, chunk: &[DailyDelta]) -> Result<HashMap<DayKey, u128>, AggregateError> {
        let sql = format!(
            "SELECT date, contract, cause, volume FROM daily_event_stats
             WHERE (date, contract, cause) IN (VALUES {})",
            row_placeholders(chunk.len(), 3)
        );
        let keys = chunk
            .iter()
            .flat_map(|d| [d.date.as_str(), d.contract.as_str(), d.cause.as_str()]);
        let mut stmt = tx.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(keys), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut volumes = HashMap::new();
        for row in rows {
            let (date, contract, cause, volume) = row?;
            volumes.insert((date, contract, cause), parse_stored_volume(&volume)?);
        }
        Ok(volumes)
    }
}

#[async_trait]
impl AggregateJob for DailyStatsJob {
    type Delta = DailyDelta;

    fn name(&self) -> &'static str {
        "daily_event_stats"
    }

    fn latest_position(&self, conn: &Connection) -> Result<Option<u64>, AggregateError> {
        latest_block_height(conn)
    }

    fn aggregate(&self, conn: &Connection, start: u64, end: u64) -> Result<Vec<DailyDelta>, AggregateError> {
        let mut stmt = conn.prepare(
            "SELECT block_timestamp, contract, cause, delta FROM ft_events
             WHERE block_height BETWEEN ?1 AND ?2",
        )?;
        let rows = stmt.query_map(params![start as i64, end as i64], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut grouped: BTreeMap<DayKey, (i64, u128)> = BTreeMap::new();
        for row in rows {
            let (ts, contract, cause, delta) = row?;
            let delta = parse_stored_amount(&delta)?;
            let entry = grouped
                .entry((utc_date(ts as u64)?, contract, cause.clone()))
                .or_insert((0, 0));
            entry.0 += 1;
            // Transfers are stored as a pair; only the receiving side counts as volume.
            if delta > 0 || cause != "TRANSFER" {
                entry.1 = entry.1.saturating_add(delta.unsigned_abs());
            }
        }

        Ok(grouped
            .into_iter()
            .map(|((date, contract, cause), (event_count, volume))| DailyDelta {
                date,
                contract,
                cause,
                event_count,
                volume,
            })
            .collect())
    }

    fn persist(&self, tx: &Transaction, deltas: &[DailyDelta], chunk_size: usize) -> Result<usize, AggregateError> {
        let mut written = 0;
        for chunk in deltas.chunks(chunk_size.max(1)) {
            let current = Self::current_volumes(tx, chunk)?;

            let mut values: SqlValues = Vec::with_capacity(chunk.len() * 5);
            for d in chunk {
                let old = current
                    .get(&(d.date.clone(), d.contract.clone(), d.cause.clone()))
                    .copied()
                    .unwrap_or(0);
                values.push(Box::new(d.date.clone()));
                values.push(Box::new(d.contract.clone()));
                values.push(Box::new(d.cause.clone()));
                values.push(Box::new(d.event_count));
                values.push(Box::new(old.saturating_add(d.volume).to_string()));
            }

            let sql = format!(
                "INSERT INTO daily_event_stats (date, contract, cause, event_count, volume) VALUES {}
                 ON CONFLICT(date, contract, cause) DO UPDATE SET
                    event_count = daily_event_stats.event_count + excluded.event_count,
                    volume = excluded.volume",
                row_placeholders(chunk.len(), 5)
            );
            written += tx.execute(&sql, params_from_iter(values.iter().map(|v| v.as_ref())))?;
        }
        Ok(written)
    }

    fn index_after(&self, conn: &Connection, end: u64) -> Result<Option<String>, AggregateError> {
        block_timestamp_at(conn, end)?.map(utc_date).transpose()
    }
}
