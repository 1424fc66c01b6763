//! Bridged tokens minted by the bridge factory (`*.factory.bridge.near`).
//!
//! `mint` and `withdraw` cross the bridge and are tagged as cross-chain;
//! transfers inside NEAR are ordinary fungible-token movements.

use crate::decoder::event::{checked_amount, EventCause, EventDraft, EventKind};
use crate::decoder::ft_actions::{ft_resolve_transfer, ft_transfer};
use crate::streamer_core::types::FunctionCall;

fn arg_str(call: &FunctionCall, key: &str) -> Option<String> {
    call.json_args()?
        .get(key)?
        .as_str()
        .map(str::to_string)
}

pub fn decode(
    contract: &str,
    call: &FunctionCall,
    predecessor: &str,
    logs: &[String],
) -> Vec<EventDraft> {
    match call.method_name.as_str() {
        "mint" => {
            let account = arg_str(call, "account_id");
            let amount = arg_str(call, "amount")
                .as_deref()
                .and_then(|a| checked_amount(contract, a));
            match (account, amount) {
                (Some(account), Some(amount)) => vec![EventDraft::new(
                    EventKind::CrossChain,
                    EventCause::Mint,
                    &account,
                    amount,
                )],
                _ => Vec::new(),
            }
        }
        "withdraw" => {
            let amount = arg_str(call, "amount")
                .as_deref()
                .and_then(|a| checked_amount(contract, a));
            match amount {
                Some(amount) => vec![EventDraft::new(
                    EventKind::CrossChain,
                    EventCause::Burn,
                    predecessor,
                    -amount,
                )
                .memo(arg_str(call, "recipient"))],
                None => Vec::new(),
            }
        }
        "ft_transfer" | "ft_transfer_call" => {
            ft_transfer(EventKind::FungibleToken, contract, call, predecessor)
        }
        "ft_resolve_transfer" => ft_resolve_transfer(EventKind::FungibleToken, contract, logs),
        _ => Vec::new(),
    }
}
