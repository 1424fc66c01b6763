//! Canonical balance-affecting events.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventCause {
    Mint,
    Burn,
    Transfer,
    Deposit,
    Withdraw,
    Stake,
    Unstake,
    Reward,
}

impl EventCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventCause::Mint => "MINT",
            EventCause::Burn => "BURN",
            EventCause::Transfer => "TRANSFER",
            EventCause::Deposit => "DEPOSIT",
            EventCause::Withdraw => "WITHDRAW",
            EventCause::Stake => "STAKE",
            EventCause::Unstake => "UNSTAKE",
            EventCause::Reward => "REWARD",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "MINT" => Some(EventCause::Mint),
            "BURN" => Some(EventCause::Burn),
            "TRANSFER" => Some(EventCause::Transfer),
            "DEPOSIT" => Some(EventCause::Deposit),
            "WITHDRAW" => Some(EventCause::Withdraw),
            "STAKE" => Some(EventCause::Stake),
            "UNSTAKE" => Some(EventCause::Unstake),
            "REWARD" => Some(EventCause::Reward),
            _ => None,
        }
    }
}

/// Event family. The discriminant is the single `kind` digit of the event
/// index, so it must stay below 10.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum EventKind {
    FungibleToken = 1,
    NonFungibleToken = 2,
    MultiToken = 3,
    Staking = 4,
    CrossChain = 5,
}

impl EventKind {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(EventKind::FungibleToken),
            2 => Some(EventKind::NonFungibleToken),
            3 => Some(EventKind::MultiToken),
            4 => Some(EventKind::Staking),
            5 => Some(EventKind::CrossChain),
            _ => None,
        }
    }
}

/// What a contract decoder reports before block context is attached.
#[derive(Debug, Clone, PartialEq)]
pub struct EventDraft {
    pub kind: EventKind,
    pub cause: EventCause,
    pub affected: String,
    pub involved: Option<String>,
    pub delta: i128,
    pub absolute: Option<i128>,
    pub token_id: Option<String>,
    pub memo: Option<String>,
    /// Set when the event belongs to a contract other than the receipt executor.
    pub contract: Option<String>,
}

impl EventDraft {
    pub fn new(kind: EventKind, cause: EventCause, affected: &str, delta: i128) -> Self {
        Self {
            kind,
            cause,
            affected: affected.to_string(),
            involved: None,
            delta,
            absolute: None,
            token_id: None,
            memo: None,
            contract: None,
        }
    }

    pub fn involved(mut self, account: &str) -> Self {
        self.involved = Some(account.to_string());
        self
    }

    pub fn memo(mut self, memo: Option<String>) -> Self {
        self.memo = memo;
        self
    }

    pub fn token_id(mut self, token_id: Option<String>) -> Self {
        self.token_id = token_id;
        self
    }

    pub fn absolute(mut self, absolute: Option<i128>) -> Self {
        self.absolute = absolute;
        self
    }
}

/// A fully placed event, ready for storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalEvent {
    pub contract: String,
    pub affected: String,
    pub involved: Option<String>,
    pub delta: i128,
    pub absolute: Option<i128>,
    pub cause: EventCause,
    pub kind: EventKind,
    pub token_id: Option<String>,
    pub memo: Option<String>,
    pub receipt_id: String,
    pub block_height: u64,
    pub block_timestamp: u64,
    pub shard_id: u64,
    pub position: u32,
    pub event_index: u128,
}

impl CanonicalEvent {
    /// Storage idempotency key.
    pub fn natural_key(&self) -> (&str, u64, u64, EventKind, u32) {
        (
            &self.receipt_id,
            self.block_timestamp,
            self.shard_id,
            self.kind,
            self.position,
        )
    }

    /// Ordering key; matches `event_index` order.
    pub fn order_key(&self) -> (u64, u64, u8, u32) {
        (
            self.block_timestamp,
            self.shard_id,
            self.kind.code(),
            self.position,
        )
    }
}

/// Parse a decimal amount from chain JSON. Zero and unparsable amounts yield
/// `None` so callers can drop no-op events.
pub fn parse_amount(raw: &str) -> Option<i128> {
    match raw.trim().parse::<u128>() {
        Ok(0) | Err(_) => None,
        Ok(v) => i128::try_from(v).ok(),
    }
}

/// `parse_amount` for a value that decides whether an event exists. A
/// non-zero amount that cannot be represented drops the event with a warning
/// naming the contract.
pub fn checked_amount(contract: &str, raw: &str) -> Option<i128> {
    let amount = parse_amount(raw);
    if amount.is_none() && raw.trim().parse::<u128>() != Ok(0) {
        log::warn!(
            "⚠️  {}: amount '{}' is not a representable balance change, event dropped",
            contract,
            raw
        );
    }
    amount
}
