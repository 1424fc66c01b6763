//! Event decoder: standard event envelopes plus a registry of per-contract
//! decoders for contracts that predate them.

pub mod block_decoder;
pub mod contracts;
pub mod event;
pub mod event_index;
pub mod ft_actions;
pub mod registry;
pub mod standard;

pub use block_decoder::decode_block;
pub use event::{CanonicalEvent, EventCause, EventKind};

#[derive(Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// More than 10^6 events of one kind in one shard chunk.
    PositionOverflow { shard_id: u64, position: u32 },
    /// Shard id does not fit the index layout.
    ShardOutOfRange(u64),
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::PositionOverflow { shard_id, position } => write!(
                f,
                "Event position {} overflows the index in shard {}",
                position, shard_id
            ),
            DecodeError::ShardOutOfRange(shard) => write!(f, "Shard id {} out of index range", shard),
        }
    }
}

impl std::error::Error for DecodeError {}
