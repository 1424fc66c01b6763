//! Method-call decoders shared by legacy fungible-token contracts that
//! predate standard event logs.

use crate::decoder::event::{checked_amount, EventCause, EventDraft, EventKind};
use crate::streamer_core::types::FunctionCall;
use regex::Regex;
use std::sync::LazyLock;

static BURN_LOG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Account @(\S+) burned (\d+)$").expect("valid regex"));

static REFUND_LOG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Refund (\d+) from (\S+) to (\S+)$").expect("valid regex"));

/// `ft_transfer` / `ft_transfer_call`: `{receiver_id, amount, memo}` moves
/// `amount` from the predecessor to `receiver_id`.
pub fn ft_transfer(
    kind: EventKind,
    contract: &str,
    call: &FunctionCall,
    predecessor: &str,
) -> Vec<EventDraft> {
    let Some(args) = call.json_args() else {
        return Vec::new();
    };
    let receiver = args.get("receiver_id").and_then(|v| v.as_str());
    let amount = args
        .get("amount")
        .and_then(|v| v.as_str())
        .and_then(|a| checked_amount(contract, a));
    let memo = args
        .get("memo")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    match (receiver, amount) {
        (Some(receiver), Some(amount)) => vec![
            EventDraft::new(kind, EventCause::Transfer, predecessor, -amount)
                .involved(receiver)
                .memo(memo.clone()),
            EventDraft::new(kind, EventCause::Transfer, receiver, amount)
                .involved(predecessor)
                .memo(memo),
        ],
        _ => Vec::new(),
    }
}

/// `ft_resolve_transfer` reports unused amounts in its logs: either refunded
/// to the sender or burned because the sender no longer exists.
pub fn ft_resolve_transfer(kind: EventKind, contract: &str, logs: &[String]) -> Vec<EventDraft> {
    let mut drafts = Vec::new();

    for line in logs {
        if let Some(caps) = BURN_LOG.captures(line) {
            if let Some(amount) = checked_amount(contract, &caps[2]) {
                drafts.push(EventDraft::new(kind, EventCause::Burn, &caps[1], -amount));
            }
            continue;
        }
        if let Some(caps) = REFUND_LOG.captures(line) {
            if let Some(amount) = checked_amount(contract, &caps[1]) {
                let (from, to) = (&caps[2], &caps[3]);
                drafts.push(
                    EventDraft::new(kind, EventCause::Transfer, from, -amount).involved(to),
                );
                drafts.push(EventDraft::new(kind, EventCause::Transfer, to, amount).involved(from));
            }
        }
    }

    drafts
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(method: &str, args: serde_json::Value) -> FunctionCall {
        FunctionCall {
            method_name: method.to_string(),
            args: args.to_string().into_bytes(),
            deposit: 1,
        }
    }

    #[test]
    fn test_transfer_from_args() {
        let drafts = ft_transfer(
            EventKind::FungibleToken,
            "token.near",
            &call("ft_transfer", json!({"receiver_id": "bob.near", "amount": "30"})),
            "alice.near",
        );
        assert_eq!(drafts.len(), 2);
        assert_eq!((drafts[0].affected.as_str(), drafts[0].delta), ("alice.near", -30));
        assert_eq!((drafts[1].affected.as_str(), drafts[1].delta), ("bob.near", 30));
    }

    #[test]
    fn test_transfer_with_bad_args_is_empty() {
        let mut bad = call("ft_transfer", json!({}));
        bad.args = vec![0xff, 0x00];
        assert!(ft_transfer(EventKind::FungibleToken, "token.near", &bad, "a.near").is_empty());
        let zero = call("ft_transfer", json!({"receiver_id": "b.near", "amount": "0"}));
        assert!(ft_transfer(EventKind::FungibleToken, "token.near", &zero, "a.near").is_empty());
    }

    #[test]
    fn test_resolve_transfer_logs() {
        let logs = vec![
            "Refund 12 from bob.near to alice.near".to_string(),
            "Account @gone.near burned 3".to_string(),
            "something else".to_string(),
        ];
        let drafts = ft_resolve_transfer(EventKind::FungibleToken, "token.near", &logs);
        assert_eq!(drafts.len(), 3);
        assert_eq!(drafts[0].delta, -12);
        assert_eq!(drafts[1].affected, "alice.near");
        assert_eq!((drafts[2].cause, drafts[2].delta), (EventCause::Burn, -3));
    }

    #[test]
    fn test_oversized_transfer_amount_is_dropped() {
        let too_big = (i128::MAX as u128 + 1).to_string();
        let oversized = call("ft_transfer", json!({"receiver_id": "b.near", "amount": too_big}));
        assert!(ft_transfer(EventKind::FungibleToken, "token.near", &oversized, "a.near").is_empty());

        let logs = vec![format!("Refund {} from bob.near to alice.near", too_big)];
        assert!(ft_resolve_transfer(EventKind::FungibleToken, "token.near", &logs).is_empty());
    }
}
