//! Absolute balances for accounts touched in a range, read back from the
//! token contracts over RPC.

use crate::aggregator_core::error::AggregateError;
use crate::aggregator_core::job::AggregateJob;
use crate::aggregator_core::jobs::{latest_block_height, row_placeholders, SqlValues, FUNGIBLE_KINDS};
use crate::aggregator_core::rpc_pool::{fetch_balances, BalanceReading, BalanceRequest, BalanceSource};
use async_trait::async_trait;
use rusqlite::{params, params_from_iter, Connection, Transaction};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotDelta {
    pub contract: String,
    pub account: String,
    /// `(balance, block_height)` once looked up.
    pub reading: Option<(u128, u64)>,
}

pub struct BalanceSnapshotsJob {
    source: Arc<dyn BalanceSource>,
}

impl BalanceSnapshotsJob {
    pub fn new(source: Arc<dyn BalanceSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl AggregateJob for BalanceSnapshotsJob {
    type Delta = SnapshotDelta;

    fn name(&self) -> &'static str {
        "balance_snapshots"
    }

    fn latest_position(&self, conn: &Connection) -> Result<Option<u64>, AggregateError> {
        latest_block_height(conn)
    }

    fn aggregate(&self, conn: &Connection, start: u64, end: u64) -> Result<Vec<SnapshotDelta>, AggregateError> {
        let sql = format!(
            "SELECT DISTINCT contract, affected FROM ft_events
             WHERE block_height BETWEEN ?1 AND ?2 AND kind IN {} AND token_id IS NULL
             ORDER BY contract, affected",
            FUNGIBLE_KINDS
        );
        let mut stmt = conn.prepare(&sql)?;
        let touched = stmt
            .query_map(params![start as i64, end as i64], |row| {
                Ok(SnapshotDelta {
                    contract: row.get(0)?,
                    account: row.get(1)?,
                    reading: None,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(touched)
    }

    async fn enrich(&self, deltas: Vec<SnapshotDelta>) -> Result<Vec<SnapshotDelta>, AggregateError> {
        if deltas.is_empty() {
            return Ok(deltas);
        }
        let requests: Vec<BalanceRequest> = deltas
            .into_iter()
            .map(|d| BalanceRequest {
                contract: d.contract,
                account: d.account,
            })
            .collect();
        let asked = requests.len();

        let readings = fetch_balances(self.source.clone(), requests).await?;
        log::debug!("balance_snapshots: {} of {} lookups answered", readings.len(), asked);

        Ok(readings
            .into_iter()
            .map(|r: BalanceReading| SnapshotDelta {
                contract: r.contract,
                account: r.account,
                reading: Some((r.balance, r.block_height)),
            })
            .collect())
    }

    fn persist(&self, tx: &Transaction, deltas: &[SnapshotDelta], chunk_size: usize) -> Result<usize, AggregateError> {
        let readings: Vec<(&SnapshotDelta, u128, u64)> = deltas
            .iter()
            .filter_map(|d| d.reading.map(|(balance, height)| (d, balance, height)))
            .collect();

        let mut written = 0;
        for chunk in readings.chunks(chunk_size.max(1)) {
            let mut values: SqlValues = Vec::with_capacity(chunk.len() * 4);
            for (d, balance, height) in chunk {
                values.push(Box::new(d.contract.clone()));
                values.push(Box::new(d.account.clone()));
                values.push(Box::new(balance.to_string()));
                values.push(Box::new(*height as i64));
            }
            // Absolute values: a newer snapshot is never replaced by an older one.
            let sql = format!(
                "INSERT INTO balance_snapshots (contract, account, balance, block_height) VALUES {}
                 ON CONFLICT(contract, account) DO UPDATE SET
                    balance = excluded.balance,
                    block_height = excluded.block_height
                 WHERE excluded.block_height >= balance_snapshots.block_height",
                row_placeholders(chunk.len(), 4)
            );
            written += tx.execute(&sql, params_from_iter(values.iter().map(|v| v.as_ref())))?;
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator_core::jobs::fixtures::{insert_event, store};
    use std::sync::atomic::{AtomicU64, Ordering};

    struct StubBalances {
        height: AtomicU64,
    }

    #[async_trait]
    impl BalanceSource for StubBalances {
        async fn balance_of(&self, request: &BalanceRequest) -> Result<Option<BalanceReading>, AggregateError> {
            if request.contract == "broken.near" {
                return Ok(None);
            }
            let height = self.height.load(Ordering::SeqCst);
            Ok(Some(BalanceReading {
                contract: request.contract.clone(),
                account: request.account.clone(),
                balance: 1_000 + height as u128,
                block_height: height,
            }))
        }
    }

    #[tokio::test]
    async fn test_touched_accounts_get_absolute_balances() {
        let (_dir, mut conn) = store();
        insert_event(&conn, "r1", 5, 1, "usdt.near", "alice.near", 10, "MINT", 1);
        insert_event(&conn, "r2", 5, 1, "usdt.near", "alice.near", -3, "BURN", 1);
        insert_event(&conn, "r3", 6, 2, "broken.near", "bob.near", 1, "MINT", 1);
        insert_event(&conn, "r4", 6, 2, "pool.poolv1.near", "bob.near", 1, "STAKE", 4);

        let source = Arc::new(StubBalances {
            height: AtomicU64::new(90),
        });
        let job = BalanceSnapshotsJob::new(source.clone());

        let touched = job.aggregate(&conn, 5, 6).unwrap();
        assert_eq!(touched.len(), 2);
        let enriched = job.enrich(touched).await.unwrap();
        assert_eq!(enriched.len(), 1);

        let tx = conn.transaction().unwrap();
        assert_eq!(job.persist(&tx, &enriched, 10).unwrap(), 1);
        tx.commit().unwrap();

        // an older reading does not overwrite
        let stale = vec![SnapshotDelta {
            contract: "usdt.near".to_string(),
            account: "alice.near".to_string(),
            reading: Some((1, 10)),
        }];
        let tx = conn.transaction().unwrap();
        job.persist(&tx, &stale, 10).unwrap();
        tx.commit().unwrap();

        let (balance, height): (String, i64) = conn
            .query_row(
                "SELECT balance, block_height FROM balance_snapshots WHERE account = 'alice.near'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!((balance.as_str(), height), ("1090", 90));
    }
}
