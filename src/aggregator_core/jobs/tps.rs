//! Receipts and blocks per wall-clock second, from the `blocks` table.

use crate::aggregator_core::error::AggregateError;
use crate::aggregator_core::job::AggregateJob;
use crate::aggregator_core::jobs::{latest_block_height, row_placeholders, SqlValues};
use async_trait::async_trait;
use rusqlite::{params, params_from_iter, Connection, Transaction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TpsBucket {
    pub ts_second: i64,
    pub receipts: i64,
    pub blocks: i64,
}

#[derive(Debug, Default)]
pub struct TpsJob;

#[async_trait]
impl AggregateJob for TpsJob {
    type Delta = TpsBucket;

    fn name(&self) -> &'static str {
        "tps"
    }

    fn latest_position(&self, conn: &Connection) -> Result<Option<u64>, AggregateError> {
        latest_block_height(conn)
    }

    fn aggregate(&self, conn: &Connection, start: u64, end: u64) -> Result<Vec<TpsBucket>, AggregateError> {
        let mut stmt = conn.prepare(
            "SELECT block_timestamp / 1000000000 AS ts_second, SUM(receipt_count), COUNT(*)
             FROM blocks WHERE height BETWEEN ?1 AND ?2
             GROUP BY ts_second ORDER BY ts_second",
        )?;
        let buckets = stmt
            .query_map(params![start as i64, end as i64], |row| {
                Ok(TpsBucket {
                    ts_second: row.get(0)?,
                    receipts: row.get(1)?,
                    blocks: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(buckets)
    }

    fn persist(&self, tx: &Transaction, deltas: &[TpsBucket], chunk_size: usize) -> Result<usize, AggregateError> {
        let mut written = 0;
        for chunk in deltas.chunks(chunk_size.max(1)) {
            let mut values: SqlValues = Vec::with_capacity(chunk.len() * 3);
            for bucket in chunk {
                values.push(Box::new(bucket.ts_second));
                values.push(Box::new(bucket.receipts));
                values.push(Box::new(bucket.blocks));
            }
            // a second can straddle two batches
            let sql = format!(
                "INSERT INTO tps (ts_second, receipt_count, block_count) VALUES {}
                 ON CONFLICT(ts_second) DO UPDATE SET
                    receipt_count = tps.receipt_count + excluded.receipt_count,
                    block_count = tps.block_count + excluded.block_count",
                row_placeholders(chunk.len(), 3)
            );
            written += tx.execute(&sql, params_from_iter(values.iter().map(|v| v.as_ref())))?;
        }
        Ok(written)
    }
}
