//! `wrap.near`: wrapped native token, pre-standard events.

use crate::decoder::event::{checked_amount, EventCause, EventDraft, EventKind};
use crate::decoder::ft_actions::{ft_resolve_transfer, ft_transfer};
use crate::streamer_core::types::FunctionCall;
use regex::Regex;
use std::sync::LazyLock;

static DEPOSIT_LOG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Deposit (\d+) NEAR to (\S+)$").expect("valid regex"));

const KIND: EventKind = EventKind::FungibleToken;

pub fn decode(
    contract: &str,
    call: &FunctionCall,
    predecessor: &str,
    logs: &[String],
) -> Vec<EventDraft> {
    match call.method_name.as_str() {
        "near_deposit" => logs
            .iter()
            .filter_map(|line| DEPOSIT_LOG.captures(line))
            .filter_map(|caps| {
                let amount = checked_amount(contract, &caps[1])?;
                if amount as u128 != call.deposit {
                    log::debug!(
                        "near_deposit log amount {} differs from attached deposit {}",
                        amount,
                        call.deposit
                    );
                }
                Some(EventDraft::new(KIND, EventCause::Mint, &caps[2], amount))
            })
            .collect(),
        "near_withdraw" => {
            let amount = call
                .json_args()
                .and_then(|args| {
                    args.get("amount")
                        .and_then(|a| a.as_str())
                        .and_then(|a| checked_amount(contract, a))
                });
            match amount {
                Some(amount) => vec![EventDraft::new(KIND, EventCause::Burn, predecessor, -amount)],
                None => Vec::new(),
            }
        }
        "ft_transfer" | "ft_transfer_call" => ft_transfer(KIND, contract, call, predecessor),
        "ft_resolve_transfer" => ft_resolve_transfer(KIND, contract, logs),
        _ => Vec::new(),
    }
}
