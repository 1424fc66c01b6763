use crate::query::cursor::Cursor;
use serde::Serialize;

/// Natural key shared by the projection and base tables.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RowKey {
    pub receipt_id: String,
    pub ts: u64,
    pub shard: u64,
    pub kind: u8,
    pub pos: u32,
}

/// A row of the fast projection table (`ft_events` alone).
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionRow {
    pub event_index: String,
    pub contract: String,
    pub affected: String,
    pub involved: Option<String>,
    pub delta: String,
    pub absolute: Option<String>,
    pub cause: String,
    pub kind: u8,
    pub token_id: Option<String>,
    pub memo: Option<String>,
    pub receipt_id: String,
    pub block_height: u64,
    pub block_timestamp: u64,
    pub shard_id: u64,
    pub position: u32,
}

impl ProjectionRow {
    pub fn key(&self) -> RowKey {
        RowKey {
            receipt_id: self.receipt_id.clone(),
            ts: self.block_timestamp,
            shard: self.shard_id,
            kind: self.kind,
            pos: self.position,
        }
    }

    pub fn cursor(&self) -> Cursor {
        Cursor {
            ts: self.block_timestamp,
            shard: self.shard_id,
            kind: self.kind,
            pos: self.position,
        }
    }
}

/// Token metadata and block context joined in by the base table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Enrichment {
    pub block_hash: String,
    pub symbol: Option<String>,
    pub decimals: Option<u8>,
}

/// A returned row. `enrichment` is absent when the base table lagged.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRow {
    pub event_index: String,
    pub contract: String,
    pub affected: String,
    pub involved: Option<String>,
    pub delta: String,
    pub absolute: Option<String>,
    pub cause: String,
    pub kind: u8,
    pub token_id: Option<String>,
    pub memo: Option<String>,
    pub receipt_id: String,
    pub block_height: u64,
    pub block_timestamp: u64,
    pub shard_id: u64,
    pub position: u32,
    #[serde(flatten)]
    pub enrichment: Option<Enrichment>,
}

impl EventRow {
    pub fn key(&self) -> RowKey {
        RowKey {
            receipt_id: self.receipt_id.clone(),
            ts: self.block_timestamp,
            shard: self.shard_id,
            kind: self.kind,
            pos: self.position,
        }
    }

    pub fn cursor(&self) -> Cursor {
        Cursor {
            ts: self.block_timestamp,
            shard: self.shard_id,
            kind: self.kind,
            pos: self.position,
        }
    }

    pub fn is_enriched(&self) -> bool {
        self.enrichment.is_some()
    }

    pub fn with_enrichment(row: ProjectionRow, enrichment: Option<Enrichment>) -> Self {
        Self {
            event_index: row.event_index,
            contract: row.contract,
            affected: row.affected,
            involved: row.involved,
            delta: row.delta,
            absolute: row.absolute,
            cause: row.cause,
            kind: row.kind,
            token_id: row.token_id,
            memo: row.memo,
            receipt_id: row.receipt_id,
            block_height: row.block_height,
            block_timestamp: row.block_timestamp,
            shard_id: row.shard_id,
            position: row.position,
            enrichment,
        }
    }
}

impl From<ProjectionRow> for EventRow {
    fn from(row: ProjectionRow) -> Self {
        EventRow::with_enrichment(row, None)
    }
}
