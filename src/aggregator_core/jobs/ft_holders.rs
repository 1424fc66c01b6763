//! Holder balances per (contract, account), merged additively from event deltas.

use crate::aggregator_core::error::{parse_stored_amount, AggregateError};
use crate::aggregator_core::job::AggregateJob;
use crate::aggregator_core::jobs::{latest_block_height, row_placeholders, SqlValues, FUNGIBLE_KINDS};
use async_trait::async_trait;
use rusqlite::{params, params_from_iter, Connection, Transaction};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HolderDelta {
    pub contract: String,
    pub account: String,
    pub delta: i128,
    pub last_height: u64,
}

#[derive(Debug, Default)]
pub struct FtHoldersJob;

impl FtHoldersJob {
    fn current_amounts(
        tx: &Transaction,
        chunk: &[HolderDelta],
    ) -> Result<HashMap<(String, String), i128>, AggregateError> {
        let sql = format!(
            "SELECT contract, account, amount FROM ft_holders WHERE (contract, account) IN (VALUES {})",
            row_placeholders(chunk.len(), 2)
        );
        let keys = chunk.iter().flat_map(|d| [d.contract.as_str(), d.account.as_str()]);
        let mut stmt = tx.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(keys), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
        })?;

        let mut amounts = HashMap::new();
        for row in rows {
            let (contract, account, amount) = row?;
            amounts.insert((contract, account), parse_stored_amount(&amount)?);
        }
        Ok(amounts)
    }
}

#[async_trait]
impl AggregateJob for FtHoldersJob {
    type Delta = HolderDelta;

    fn name(&self) -> &'static str {
        "ft_holders"
    }

    fn latest_position(&self, conn: &Connection) -> Result<Option<u64>, AggregateError> {
        latest_block_height(conn)
    }

    fn aggregate(&self, conn: &Connection, start: u64, end: u64) -> Result<Vec<HolderDelta>, AggregateError> {
        let sql = format!(
            "SELECT contract, affected, delta, block_height FROM ft_events
             WHERE block_height BETWEEN ?1 AND ?2 AND kind IN {} AND token_id IS NULL",
            FUNGIBLE_KINDS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![start as i64, end as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;

        let mut grouped: BTreeMap<(String, String), (i128, u64)> = BTreeMap::new();
        for row in rows {
            let (contract, account, delta, height) = row?;
            let delta = parse_stored_amount(&delta)?;
            let entry = grouped.entry((contract, account)).or_insert((0, 0));
            entry.0 = entry
                .0
                .checked_add(delta)
                .ok_or_else(|| AggregateError::InvalidData("holder delta overflow".to_string()))?;
            entry.1 = entry.1.max(height as u64);
        }

        Ok(grouped
            .into_iter()
            .map(|((contract, account), (delta, last_height))| HolderDelta {
                contract,
                account,
                delta,
                last_height,
            })
            .collect())
    }

    fn persist(&self, tx: &Transaction, deltas: &[HolderDelta], chunk_size: usize) -> Result<usize, AggregateError> {
        let mut written = 0;
        for chunk in deltas.chunks(chunk_size.max(1)) {
            let current = Self::current_amounts(tx, chunk)?;

            let mut values: SqlValues = Vec::with_capacity(chunk.len() * 4);
            for d in chunk {
                let old = current
                    .get(&(d.contract.clone(), d.account.clone()))
                    .copied()
                    .unwrap_or(0);
                let amount = old
                    .checked_add(d.delta)
                    .ok_or_else(|| AggregateError::InvalidData("holder amount overflow".to_string()))?;
                if amount < 0 {
                    log::warn!(
                        "⚠️  Negative holder amount {} for {} on {}",
                        amount,
                        d.account,
                        d.contract
                    );
                }
                values.push(Box::new(d.contract.clone()));
                values.push(Box::new(d.account.clone()));
                values.push(Box::new(amount.to_string()));
                values.push(Box::new(d.last_height as i64));
            }

            let sql = format!(
                "INSERT INTO ft_holders (contract, account, amount, last_height) VALUES {}
                 ON CONFLICT(contract, account) DO UPDATE SET
                    amount = excluded.amount,
                    last_height = MAX(ft_holders.last_height, excluded.last_height)",
                row_placeholders(chunk.len(), 4)
            );
            written += tx.execute(&sql, params_from_iter(values.iter().map(|v| v.as_ref())))?;
        }
        Ok(written)
    }
}
