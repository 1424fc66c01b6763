//! Static table of contract matchers and their decoders.
//!
//! Adding a contract means adding one entry here; decoders are plain
//! functions with no shared state.

use crate::decoder::contracts::{bridge_token, staking_pool, wrap_near};
use crate::decoder::event::EventDraft;
use crate::streamer_core::types::FunctionCall;

#[derive(Debug, Clone, Copy)]
pub enum ContractMatcher {
    Exact(&'static str),
    Suffix(&'static str),
}

impl ContractMatcher {
    pub fn matches(&self, account_id: &str) -> bool {
        match self {
            ContractMatcher::Exact(id) => account_id == *id,
            ContractMatcher::Suffix(suffix) => {
                account_id.len() > suffix.len() && account_id.ends_with(suffix)
            }
        }
    }
}

/// Decodes one function-call action on a contract given its predecessor and
/// the receipt logs.
pub type ActionDecoder = fn(&str, &FunctionCall, &str, &[String]) -> Vec<EventDraft>;

/// Decodes a receipt from its logs alone, given the contract account.
pub type LogDecoder = fn(&str, &[String]) -> Vec<EventDraft>;

#[derive(Clone, Copy)]
pub enum ContractDecoder {
    Actions(ActionDecoder),
    Logs(LogDecoder),
}

pub struct Registration {
    pub name: &'static str,
    pub matcher: ContractMatcher,
    pub decoder: ContractDecoder,
}

pub static REGISTRY: &[Registration] = &[
    Registration {
        name: "wrap_near",
        matcher: ContractMatcher::Exact("wrap.near"),
        decoder: ContractDecoder::Actions(wrap_near::decode),
    },
    Registration {
        name: "staking_pool",
        matcher: ContractMatcher::Suffix(".pool.near"),
        decoder: ContractDecoder::Logs(staking_pool::decode),
    },
    Registration {
        name: "staking_pool_v1",
        matcher: ContractMatcher::Suffix(".poolv1.near"),
        decoder: ContractDecoder::Logs(staking_pool::decode),
    },
    Registration {
        name: "bridge_token",
        matcher: ContractMatcher::Suffix(".factory.bridge.near"),
        decoder: ContractDecoder::Actions(bridge_token::decode),
    },
];

/// First registration whose matcher accepts `account_id`.
pub fn lookup(account_id: &str) -> Option<&'static Registration> {
    REGISTRY.iter().find(|r| r.matcher.matches(account_id))
}
