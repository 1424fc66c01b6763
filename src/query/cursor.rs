//! Opaque resume tokens: URL-safe base64 of a small versioned JSON object.

use crate::query::error::QueryError;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};

pub const CURSOR_VERSION: u8 = 1;

/// Ordering key of the boundary row of a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cursor {
    pub ts: u64,
    pub shard: u64,
    pub kind: u8,
    pub pos: u32,
}

#[derive(Serialize, Deserialize)]
struct CursorWire {
    v: u8,
    ts: u64,
    shard: u64,
    kind: u8,
    pos: u32,
}

impl Cursor {
    pub fn encode(&self) -> String {
        let wire = CursorWire {
            v: CURSOR_VERSION,
            ts: self.ts,
            shard: self.shard,
            kind: self.kind,
            pos: self.pos,
        };
        // a plain struct of integers always serializes
        let json = serde_json::to_vec(&wire).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    pub fn decode(token: &str) -> Result<Self, QueryError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|e| QueryError::InvalidCursor(e.to_string()))?;
        let wire: CursorWire =
            serde_json::from_slice(&bytes).map_err(|e| QueryError::InvalidCursor(e.to_string()))?;
        if wire.v != CURSOR_VERSION {
            return Err(QueryError::InvalidCursor(format!("unsupported version {}", wire.v)));
        }
        Ok(Self {
            ts: wire.ts,
            shard: wire.shard,
            kind: wire.kind,
            pos: wire.pos,
        })
    }
}
