use crate::decoder::event_index::format_index;
use crate::decoder::CanonicalEvent;
use crate::pipeline::db::open_store;
use crate::pipeline::writer_backend::{WriterBackend, WriterError};
use crate::streamer_core::BlockMessage;
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::path::Path;
use std::time::Instant;

/// Block row written alongside its events.
#[derive(Debug, Clone)]
struct BlockRow {
    height: u64,
    hash: String,
    prev_hash: String,
    timestamp: u64,
    shard_count: usize,
    receipt_count: usize,
}

pub struct SqliteWriter {
    conn: Connection,
    blocks: Vec<BlockRow>,
    events: Vec<CanonicalEvent>,
    batch_size: usize,
    chunk_size: usize,
    last_flush: Instant,
    flush_interval_secs: u64,
}

impl SqliteWriter {
    pub fn new(db_path: impl AsRef<Path>, schema_dir: &str) -> Result<Self, WriterError> {
        let conn = open_store(db_path, schema_dir).map_err(|e| WriterError::Schema(e.to_string()))?;

        log::info!("✅ SQLite event store initialized with WAL mode");

        Ok(Self {
            conn,
            blocks: Vec::with_capacity(100),
            events: Vec::with_capacity(1_000),
            batch_size: 100,
            chunk_size: 100,
            last_flush: Instant::now(),
            flush_interval_secs: 2,
        })
    }

    /// Blocks per flush and rows per insert statement chunk.
    pub fn with_batching(mut self, batch_size: usize, chunk_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self.chunk_size = chunk_size.max(1);
        self
    }

    fn insert_event_chunk(tx: &Transaction, chunk: &[CanonicalEvent]) -> Result<usize, WriterError> {
        let mut sql = String::from(
            "INSERT OR IGNORE INTO ft_events
             (event_index, contract, affected, involved, delta, absolute, cause, kind,
              token_id, memo, receipt_id, block_height, block_timestamp, shard_id, position)
             VALUES ",
        );
        let placeholders: Vec<String> = (0..chunk.len())
            .map(|i| {
                let base = i * 15;
                let cols: Vec<String> = (1..=15).map(|c| format!("?{}", base + c)).collect();
                format!("({})", cols.join(", "))
            })
            .collect();
        sql.push_str(&placeholders.join(", "));

        let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::with_capacity(chunk.len() * 15);
        for e in chunk {
            values.push(Box::new(format_index(e.event_index)));
            values.push(Box::new(e.contract.clone()));
            values.push(Box::new(e.affected.clone()));
            values.push(Box::new(e.involved.clone()));
            values.push(Box::new(e.delta.to_string()));
            values.push(Box::new(e.absolute.map(|a| a.to_string())));
            values.push(Box::new(e.cause.as_str()));
            values.push(Box::new(e.kind.code() as i64));
            values.push(Box::new(e.token_id.clone()));
            values.push(Box::new(e.memo.clone()));
            values.push(Box::new(e.receipt_id.clone()));
            values.push(Box::new(e.block_height as i64));
            values.push(Box::new(e.block_timestamp as i64));
            values.push(Box::new(e.shard_id as i64));
            values.push(Box::new(e.position as i64));
        }

        let inserted = tx.execute(&sql, rusqlite::params_from_iter(values.iter().map(|v| v.as_ref())))?;
        Ok(inserted)
    }

    fn flush_batch(&mut self) -> Result<(), WriterError> {
        if self.blocks.is_empty() && self.events.is_empty() {
            return Ok(());
        }

        let tx = self.conn.transaction()?;

        for block in &self.blocks {
            let stored: Option<String> = tx
                .query_row(
                    "SELECT hash FROM blocks WHERE height = ?1",
                    [block.height as i64],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(stored) = stored {
                if stored != block.hash {
                    return Err(WriterError::Fork {
                        height: block.height,
                        stored,
                        incoming: block.hash.clone(),
                    });
                }
            }
        }

        let mut inserted = 0;
        for chunk in self.events.chunks(self.chunk_size) {
            inserted += Self::insert_event_chunk(&tx, chunk)?;
        }

        // Block rows last: the highest block row is the resume checkpoint.
        for block in &self.blocks {
            tx.execute(
                "INSERT OR IGNORE INTO blocks
                 (height, hash, prev_hash, block_timestamp, shard_count, receipt_count)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    block.height as i64,
                    block.hash,
                    block.prev_hash,
                    block.timestamp as i64,
                    block.shard_count as i64,
                    block.receipt_count as i64,
                ],
            )?;
        }

        tx.commit()?;

        log::debug!(
            "✅ Flushed {} blocks, {} events ({} new) to SQLite",
            self.blocks.len(),
            self.events.len(),
            inserted
        );
        self.blocks.clear();
        self.events.clear();
        self.last_flush = Instant::now();

        Ok(())
    }
}

#[async_trait]
impl WriterBackend for SqliteWriter {
    async fn write_block(
        &mut self,
        block: &BlockMessage,
        events: Vec<CanonicalEvent>,
    ) -> Result<(), WriterError> {
        self.blocks.push(BlockRow {
            height: block.height(),
            hash: block.hash().to_string(),
            prev_hash: block.prev_hash().to_string(),
            timestamp: block.timestamp_nanos(),
            shard_count: block.shards.len(),
            receipt_count: block.receipt_count(),
        });
        self.events.extend(events);

        // Auto-flush if batch full or time elapsed
        if self.blocks.len() >= self.batch_size
            || self.last_flush.elapsed().as_secs() >= self.flush_interval_secs
        {
            self.flush_batch()?;
        }

        Ok(())
    }

    async fn flush(&mut self) -> Result<(), WriterError> {
        self.flush_batch()
    }

    fn pending_blocks(&self) -> usize {
        self.blocks.len()
    }

    fn backend_type(&self) -> &'static str {
        "SQLite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::decode_block;
    use crate::pipeline::db::BUNDLED_SCHEMA_DIR;
    use crate::streamer_core::types::test_blocks::{block, function_call, outcome, shard};
    use serde_json::json;
    use tempfile::tempdir;

    fn deposit_block(height: u64, deposits: usize) -> BlockMessage {
        let outcomes = (0..deposits)
            .map(|i| {
                let log = format!("Deposit {} NEAR to user{}.near", i + 1, i);
                outcome(
                    &format!("R{}-{}", height, i),
                    "user.near",
                    "wrap.near",
                    vec![function_call("near_deposit", &json!({}))],
                    &[log.as_str()],
                    true,
                )
            })
            .collect();
        block(height, height * 1_000_000_000, vec![shard(0, outcomes)])
    }

    fn count(db_path: &Path, table: &str) -> i64 {
        let conn = Connection::open(db_path).unwrap();
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
            .unwrap()
    }

    #[tokio::test]
    async fn test_block_and_events_written() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let mut writer = SqliteWriter::new(&db_path, BUNDLED_SCHEMA_DIR).unwrap();

        let msg = deposit_block(500, 3);
        let events = decode_block(&msg).unwrap();
        writer.write_block(&msg, events).await.unwrap();
        writer.flush().await.unwrap();

        assert_eq!(count(&db_path, "ft_events"), 3);
        assert_eq!(count(&db_path, "blocks"), 1);

        let conn = Connection::open(&db_path).unwrap();
        let (delta, index): (String, String) = conn
            .query_row(
                "SELECT delta, event_index FROM ft_events WHERE affected = 'user2.near'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(delta, "3");
        assert_eq!(index.len(), 40);
    }

    #[tokio::test]
    async fn test_replay_is_idempotent() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let mut writer = SqliteWriter::new(&db_path, BUNDLED_SCHEMA_DIR)
            .unwrap()
            .with_batching(10, 2);

        let msg = deposit_block(500, 5);
        for _ in 0..3 {
            writer.write_block(&msg, decode_block(&msg).unwrap()).await.unwrap();
            writer.flush().await.unwrap();
        }

        assert_eq!(count(&db_path, "ft_events"), 5);
        assert_eq!(count(&db_path, "blocks"), 1);
    }

    #[tokio::test]
    async fn test_conflicting_hash_is_rejected() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let mut writer = SqliteWriter::new(&db_path, BUNDLED_SCHEMA_DIR).unwrap();

        let msg = deposit_block(500, 1);
        writer.write_block(&msg, decode_block(&msg).unwrap()).await.unwrap();
        writer.flush().await.unwrap();

        let mut forked = deposit_block(500, 2);
        forked.block.header.hash = "forked-500".to_string();
        writer.write_block(&forked, decode_block(&forked).unwrap()).await.unwrap_or(());
        let err = writer.flush().await.unwrap_err();
        assert!(matches!(err, WriterError::Fork { height: 500, .. }));
        assert_eq!(count(&db_path, "ft_events"), 1);
    }

    #[tokio::test]
    async fn test_batch_flush() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let mut writer = SqliteWriter::new(&db_path, BUNDLED_SCHEMA_DIR)
            .unwrap()
            .with_batching(4, 100);

        for h in 1..=6 {
            let msg = deposit_block(h, 1);
            writer.write_block(&msg, decode_block(&msg).unwrap()).await.unwrap();
        }
        // one auto-flush at 4 blocks
        assert_eq!(writer.pending_blocks(), 2);
        assert_eq!(count(&db_path, "blocks"), 4);

        writer.flush().await.unwrap();
        assert_eq!(count(&db_path, "blocks"), 6);
    }
}
