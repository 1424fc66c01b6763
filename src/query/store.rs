//! Read access to the projection (`ft_events`) and base
//! (`ft_events ⋈ blocks ⟕ ft_meta`) tables.

use crate::query::cursor::Cursor;
use crate::query::error::QueryError;
use crate::query::params::{Direction, EventFilter};
use crate::query::rows::{Enrichment, EventRow, ProjectionRow, RowKey};
use rusqlite::{params_from_iter, Connection, Row, ToSql};

const BASE_KEY_CHUNK: usize = 100;

/// One time slice of the rolling window. Bounds are inclusive.
#[derive(Debug, Clone)]
pub struct SliceQuery<'a> {
    pub from_ts: u64,
    pub to_ts: u64,
    pub direction: Direction,
    /// Only rows strictly beyond this key in `direction`.
    pub after: Option<Cursor>,
    pub filter: &'a EventFilter,
    pub limit: usize,
}

pub trait PageStore {
    /// Projection rows in the slice, ordered by key in the slice direction.
    fn projection_slice(&self, slice: &SliceQuery<'_>) -> Result<Vec<ProjectionRow>, QueryError>;

    /// Base rows for `keys`. Rows whose joins are not yet satisfiable are absent.
    fn base_rows(&self, keys: &[RowKey]) -> Result<Vec<EventRow>, QueryError>;
}

fn ts_param(ts: u64) -> i64 {
    ts.min(i64::MAX as u64) as i64
}

const PROJECTION_COLUMNS: &str = "e.event_index, e.contract, e.affected, e.involved, e.delta, e.absolute, \
     e.cause, e.kind, e.token_id, e.memo, e.receipt_id, e.block_height, e.block_timestamp, \
     e.shard_id, e.position";

fn projection_from_row(row: &Row<'_>) -> rusqlite::Result<ProjectionRow> {
    Ok(ProjectionRow {
        event_index: row.get(0)?,
        contract: row.get(1)?,
        affected: row.get(2)?,
        involved: row.get(3)?,
        delta: row.get(4)?,
        absolute: row.get(5)?,
        cause: row.get(6)?,
        kind: row.get::<_, i64>(7)? as u8,
        token_id: row.get(8)?,
        memo: row.get(9)?,
        receipt_id: row.get(10)?,
        block_height: row.get::<_, i64>(11)? as u64,
        block_timestamp: row.get::<_, i64>(12)? as u64,
        shard_id: row.get::<_, i64>(13)? as u64,
        position: row.get::<_, i64>(14)? as u32,
    })
}

/// SQLite-backed store. Holds a read connection; one per caller.
pub struct SqlitePageStore {
    conn: Connection,
}

impl SqlitePageStore {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl PageStore for SqlitePageStore {
    fn projection_slice(&self, slice: &SliceQuery<'_>) -> Result<Vec<ProjectionRow>, QueryError> {
        let mut sql = format!(
            "SELECT {} FROM ft_events e WHERE e.block_timestamp BETWEEN ?1 AND ?2",
            PROJECTION_COLUMNS
        );
        let mut values: Vec<Box<dyn ToSql>> = vec![
            Box::new(ts_param(slice.from_ts)),
            Box::new(ts_param(slice.to_ts)),
        ];

        if let Some(contract) = &slice.filter.contract {
            values.push(Box::new(contract.clone()));
            sql.push_str(&format!(" AND e.contract = ?{}", values.len()));
        }
        if let Some(account) = &slice.filter.account {
            values.push(Box::new(account.clone()));
            sql.push_str(&format!(" AND e.affected = ?{}", values.len()));
        }
        if let Some(cause) = slice.filter.cause {
            values.push(Box::new(cause.as_str()));
            sql.push_str(&format!(" AND e.cause = ?{}", values.len()));
        }

        let (cmp, order) = match slice.direction {
            Direction::Next => ("<", "DESC"),
            Direction::Prev => (">", "ASC"),
        };
        if let Some(after) = slice.after {
            let first = values.len() + 1;
            values.push(Box::new(ts_param(after.ts)));
            values.push(Box::new(ts_param(after.shard)));
            values.push(Box::new(after.kind as i64));
            values.push(Box::new(after.pos as i64));
            sql.push_str(&format!(
                " AND (e.block_timestamp, e.shard_id, e.kind, e.position) {} (?{}, ?{}, ?{}, ?{})",
                cmp,
                first,
                first + 1,
                first + 2,
                first + 3
            ));
        }

        values.push(Box::new(slice.limit as i64));
        sql.push_str(&format!(
            " ORDER BY e.block_timestamp {o}, e.shard_id {o}, e.kind {o}, e.position {o} LIMIT ?{}",
            values.len(),
            o = order
        ));

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter().map(|v| v.as_ref())), projection_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn base_rows(&self, keys: &[RowKey]) -> Result<Vec<EventRow>, QueryError> {
        let mut out = Vec::with_capacity(keys.len());
        for chunk in keys.chunks(BASE_KEY_CHUNK) {
            let placeholders: Vec<String> = (0..chunk.len())
                .map(|i| {
                    let b = i * 5;
                    format!("(?{}, ?{}, ?{}, ?{}, ?{})", b + 1, b + 2, b + 3, b + 4, b + 5)
                })
                .collect();
            let sql = format!(
                "SELECT {}, b.hash, m.symbol, m.decimals
                 FROM ft_events e
                 JOIN blocks b ON b.height = e.block_height
                 LEFT JOIN ft_meta m ON m.contract = e.contract
                 WHERE (e.receipt_id, e.block_timestamp, e.shard_id, e.kind, e.position) IN (VALUES {})",
                PROJECTION_COLUMNS,
                placeholders.join(", ")
            );

            let mut values: Vec<Box<dyn ToSql>> = Vec::with_capacity(chunk.len() * 5);
            for key in chunk {
                values.push(Box::new(key.receipt_id.clone()));
                values.push(Box::new(ts_param(key.ts)));
                values.push(Box::new(ts_param(key.shard)));
                values.push(Box::new(key.kind as i64));
                values.push(Box::new(key.pos as i64));
            }

            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values.iter().map(|v| v.as_ref())), |row| {
                let projection = projection_from_row(row)?;
                let enrichment = Enrichment {
                    block_hash: row.get(15)?,
                    symbol: row.get(16)?,
                    decimals: row.get::<_, Option<i64>>(17)?.map(|d| d as u8),
                };
                Ok(EventRow::with_enrichment(projection, Some(enrichment)))
            })?;
            for row in rows {
                out.push(row?);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator_core::jobs::fixtures::{insert_block, insert_event, store};
    use crate::decoder::EventCause;

    #[test]
    fn test_slice_filters_order_and_cursor() {
        let (_dir, conn) = store();
        for h in 1..=4u64 {
            insert_event(&conn, &format!("r{}", h), h, h * 10, "wrap.near", "alice.near", 1, "MINT", 1);
            insert_event(&conn, &format!("r{}b", h), h, h * 10, "usdt.near", "bob.near", 1, "MINT", 1);
        }
        let store = SqlitePageStore::new(conn);

        let filter = EventFilter {
            contract: Some("wrap.near".to_string()),
            ..Default::default()
        };
        let slice = SliceQuery {
            from_ts: 0,
            to_ts: 100,
            direction: Direction::Next,
            after: Some(Cursor {
                ts: 40,
                shard: 0,
                kind: 1,
                pos: 0,
            }),
            filter: &filter,
            limit: 2,
        };
        let rows = store.projection_slice(&slice).unwrap();
        let ts: Vec<u64> = rows.iter().map(|r| r.block_timestamp).collect();
        assert_eq!(ts, vec![30, 20]);

        let asc = SliceQuery {
            direction: Direction::Prev,
            after: None,
            limit: 10,
            ..slice.clone()
        };
        let ts: Vec<u64> = store
            .projection_slice(&asc)
            .unwrap()
            .iter()
            .map(|r| r.block_timestamp)
            .collect();
        assert_eq!(ts, vec![10, 20, 30, 40]);

        let by_cause = EventFilter {
            cause: Some(EventCause::Burn),
            ..Default::default()
        };
        let none = SliceQuery {
            filter: &by_cause,
            ..asc
        };
        assert!(store.projection_slice(&none).unwrap().is_empty());
    }

    #[test]
    fn test_base_rows_need_block_row() {
        let (_dir, conn) = store();
        insert_event(&conn, "r1", 1, 10, "wrap.near", "alice.near", 5, "MINT", 1);
        insert_event(&conn, "r2", 2, 20, "wrap.near", "alice.near", 5, "MINT", 1);
        insert_block(&conn, 1, 10, 1);
        conn.execute(
            "INSERT INTO ft_meta (contract, name, symbol, decimals) VALUES ('wrap.near', 'Wrapped NEAR', 'wNEAR', 24)",
            [],
        )
        .unwrap();
        let store = SqlitePageStore::new(conn);

        let filter = EventFilter::default();
        let candidates = store
            .projection_slice(&SliceQuery {
                from_ts: 0,
                to_ts: 100,
                direction: Direction::Next,
                after: None,
                filter: &filter,
                limit: 10,
            })
            .unwrap();
        let keys: Vec<RowKey> = candidates.iter().map(|r| r.key()).collect();
        let base = store.base_rows(&keys).unwrap();

        assert_eq!(base.len(), 1);
        let enrichment = base[0].enrichment.clone().unwrap();
        assert_eq!(enrichment.block_hash, "hash-1");
        assert_eq!(enrichment.symbol.as_deref(), Some("wNEAR"));
        assert_eq!(enrichment.decimals, Some(24));
    }
}
