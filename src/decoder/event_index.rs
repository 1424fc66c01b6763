//! Deterministic total order for canonical events.
//!
//! `event_index = timestamp * 10^16 + shard_id * 10^7 + kind * 10^6 + position`
//!
//! Positions are counted per (shard, kind) only after every event of the
//! shard has been collected, so the index does not depend on the order in
//! which receipts were decoded.

use crate::decoder::event::{CanonicalEvent, EventDraft, EventKind};
use crate::decoder::DecodeError;
use std::collections::HashMap;

pub const TIMESTAMP_FACTOR: u128 = 10_000_000_000_000_000;
pub const SHARD_FACTOR: u128 = 10_000_000;
pub const KIND_FACTOR: u128 = 1_000_000;

/// Width of the zero-padded decimal form stored in SQLite.
pub const INDEX_WIDTH: usize = 40;

pub fn event_index(
    timestamp: u64,
    shard_id: u64,
    kind: EventKind,
    position: u32,
) -> Result<u128, DecodeError> {
    if position as u128 >= KIND_FACTOR {
        return Err(DecodeError::PositionOverflow { shard_id, position });
    }
    if shard_id as u128 * SHARD_FACTOR >= TIMESTAMP_FACTOR {
        return Err(DecodeError::ShardOutOfRange(shard_id));
    }
    Ok(timestamp as u128 * TIMESTAMP_FACTOR
        + shard_id as u128 * SHARD_FACTOR
        + kind.code() as u128 * KIND_FACTOR
        + position as u128)
}

/// Zero-padded so lexical order equals numeric order.
pub fn format_index(index: u128) -> String {
    format!("{:0width$}", index, width = INDEX_WIDTH)
}

/// One decoded event still missing its position.
#[derive(Debug, Clone)]
pub struct Collected {
    pub receipt_id: String,
    pub executor: String,
    pub draft: EventDraft,
}

/// Place every collected event of one shard. `collected` must be in receipt
/// order within the shard chunk.
pub fn assign_positions(
    block_height: u64,
    block_timestamp: u64,
    shard_id: u64,
    collected: Vec<Collected>,
) -> Result<Vec<CanonicalEvent>, DecodeError> {
    let mut next_position: HashMap<EventKind, u32> = HashMap::new();
    let mut events = Vec::with_capacity(collected.len());

    for item in collected {
        let kind = item.draft.kind;
        let counter = next_position.entry(kind).or_insert(0);
        let position = *counter;
        *counter += 1;

        let event_index = event_index(block_timestamp, shard_id, kind, position)?;
        let draft = item.draft;
        events.push(CanonicalEvent {
            contract: draft.contract.unwrap_or(item.executor),
            affected: draft.affected,
            involved: draft.involved,
            delta: draft.delta,
            absolute: draft.absolute,
            cause: draft.cause,
            kind,
            token_id: draft.token_id,
            memo: draft.memo,
            receipt_id: item.receipt_id,
            block_height,
            block_timestamp,
            shard_id,
            position,
            event_index,
        });
    }

    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::event::EventCause;

    fn collected(receipt: &str, kind: EventKind) -> Collected {
        Collected {
            receipt_id: receipt.to_string(),
            executor: "token.near".to_string(),
            draft: EventDraft::new(kind, EventCause::Mint, "alice.near", 1),
        }
    }

    #[test]
    fn test_index_layout() {
        let idx = event_index(1_700_000_000_000_000_000, 3, EventKind::Staking, 42).unwrap();
        assert_eq!(
            format_index(idx),
            "0000017000000000000000000000000034000042"
        );
    }

    #[test]
    fn test_positions_count_per_kind() {
        let events = assign_positions(
            10,
            1_000,
            2,
            vec![
                collected("r1", EventKind::FungibleToken),
                collected("r1", EventKind::Staking),
                collected("r2", EventKind::FungibleToken),
            ],
        )
        .unwrap();

        let positions: Vec<_> = events.iter().map(|e| (e.kind, e.position)).collect();
        assert_eq!(
            positions,
            vec![
                (EventKind::FungibleToken, 0),
                (EventKind::Staking, 0),
                (EventKind::FungibleToken, 1),
            ]
        );
        assert_eq!(events[0].contract, "token.near");
    }

    #[test]
    fn test_index_order_matches_key_order() {
        let keys = [
            (100u64, 0u64, EventKind::FungibleToken, 5u32),
            (100, 0, EventKind::Staking, 0),
            (100, 1, EventKind::FungibleToken, 0),
            (100, 1, EventKind::FungibleToken, 999_999),
            (101, 0, EventKind::FungibleToken, 0),
            (100, 3, EventKind::CrossChain, 7),
        ];
        for a in &keys {
            for b in &keys {
                let ia = event_index(a.0, a.1, a.2, a.3).unwrap();
                let ib = event_index(b.0, b.1, b.2, b.3).unwrap();
                let ka = (a.0, a.1, a.2.code(), a.3);
                let kb = (b.0, b.1, b.2.code(), b.3);
                assert_eq!(ia < ib, ka < kb, "{:?} vs {:?}", a, b);
                assert_eq!(format_index(ia) < format_index(ib), ia < ib);
            }
        }
    }

    #[test]
    fn test_position_overflow_is_rejected() {
        assert!(matches!(
            event_index(1, 0, EventKind::FungibleToken, 1_000_000),
            Err(DecodeError::PositionOverflow { .. })
        ));
        assert!(matches!(
            event_index(1, 1_000_000_000, EventKind::FungibleToken, 0),
            Err(DecodeError::ShardOutOfRange(_))
        ));
    }
}
