//! Turns one block message into index-ordered canonical events.

use crate::decoder::event::{CanonicalEvent, EventDraft};
use crate::decoder::event_index::{assign_positions, Collected};
use crate::decoder::registry::{self, ContractDecoder};
use crate::decoder::standard::{decode_envelope, extract_envelopes};
use crate::decoder::DecodeError;
use crate::streamer_core::types::{BlockMessage, ReceiptExecutionOutcome, Shard};

/// Drafts for a single receipt outcome. Failed outcomes produce nothing.
/// Standard events take precedence: the registry path only runs when the
/// outcome carried no standard envelope.
pub fn decode_outcome(outcome: &ReceiptExecutionOutcome) -> Vec<Collected> {
    if !outcome.is_success() {
        return Vec::new();
    }

    let receipt = &outcome.receipt;
    let executor = &outcome.execution_outcome.outcome.executor_id;
    let logs = outcome.logs();

    let envelopes = extract_envelopes(logs);
    let drafts: Vec<EventDraft> = if !envelopes.is_empty() {
        envelopes
            .iter()
            .flat_map(|envelope| decode_envelope(executor, envelope))
            .collect()
    } else {
        match registry::lookup(&receipt.receiver_id) {
            Some(registration) => {
                let drafts: Vec<_> = match registration.decoder {
                    ContractDecoder::Actions(decode) => outcome
                        .function_calls()
                        .iter()
                        .flat_map(|call| decode(&receipt.receiver_id, call, &receipt.predecessor_id, logs))
                        .collect(),
                    ContractDecoder::Logs(decode) => decode(&receipt.receiver_id, logs),
                };
                if drafts.is_empty() && !logs.is_empty() {
                    log::warn!(
                        "⚠️  {} receipt {} on {} had logs but no recognized shape",
                        registration.name,
                        receipt.receipt_id,
                        receipt.receiver_id
                    );
                }
                drafts
            }
            None => Vec::new(),
        }
    };

    drafts
        .into_iter()
        .map(|draft| Collected {
            receipt_id: receipt.receipt_id.clone(),
            executor: executor.clone(),
            draft,
        })
        .collect()
}

pub fn decode_shard(
    block_height: u64,
    block_timestamp: u64,
    shard: &Shard,
) -> Result<Vec<CanonicalEvent>, DecodeError> {
    let collected: Vec<Collected> = shard
        .receipt_execution_outcomes
        .iter()
        .flat_map(decode_outcome)
        .collect();
    assign_positions(block_height, block_timestamp, shard.shard_id, collected)
}

/// All events of a block sorted by event index.
pub fn decode_block(block: &BlockMessage) -> Result<Vec<CanonicalEvent>, DecodeError> {
    let mut events = Vec::new();
    for shard in &block.shards {
        events.extend(decode_shard(block.height(), block.timestamp_nanos(), shard)?);
    }
    events.sort_by_key(|e| e.event_index);
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::event::{EventCause, EventKind};
    use crate::streamer_core::types::test_blocks::{block, function_call, outcome, shard};
    use serde_json::json;

    #[test]
    fn test_wrap_deposit_block() {
        let msg = block(
            500,
            1_000,
            vec![shard(
                0,
                vec![outcome(
                    "R1",
                    "alice.near",
                    "wrap.near",
                    vec![function_call("near_deposit", &json!({}))],
                    &["Deposit 500 NEAR to alice.near"],
                    true,
                )],
            )],
        );
        let events = decode_block(&msg).unwrap();
        assert_eq!(events.len(), 1);
        let e = &events[0];
        assert_eq!(e.cause, EventCause::Mint);
        assert_eq!(e.affected, "alice.near");
        assert_eq!(e.delta, 500);
        assert_eq!(e.contract, "wrap.near");
        assert_eq!(e.block_height, 500);
    }

    #[test]
    fn test_failed_receipt_is_ignored() {
        let msg = block(
            1,
            1,
            vec![shard(
                0,
                vec![outcome(
                    "R1",
                    "alice.near",
                    "wrap.near",
                    vec![function_call("near_deposit", &json!({}))],
                    &["Deposit 5 NEAR to alice.near"],
                    false,
                )],
            )],
        );
        assert!(decode_block(&msg).unwrap().is_empty());
    }

    #[test]
    fn test_standard_events_win_over_registry() {
        let log = r#"EVENT_JSON:{"standard":"nep141","version":"1.0.0","event":"ft_transfer","data":[{"old_owner_id":"a.near","new_owner_id":"b.near","amount":"9"}]}"#;
        let msg = block(
            2,
            2,
            vec![shard(
                0,
                vec![outcome(
                    "R1",
                    "a.near",
                    "wrap.near",
                    vec![function_call(
                        "ft_transfer",
                        &json!({"receiver_id": "b.near", "amount": "9"}),
                    )],
                    &[log],
                    true,
                )],
            )],
        );
        // one pair from the envelope, not a second pair from the args
        assert_eq!(decode_block(&msg).unwrap().len(), 2);
    }

    #[test]
    fn test_positions_are_per_shard_and_sorted() {
        let mint = |r: &str, acc: &str| {
            let log = format!("Deposit 1 NEAR to {}", acc);
            outcome(
                r,
                acc,
                "wrap.near",
                vec![function_call("near_deposit", &json!({}))],
                &[log.as_str()],
                true,
            )
        };
        let msg = block(
            3,
            3_000,
            vec![
                shard(1, vec![mint("R3", "c.near")]),
                shard(0, vec![mint("R1", "a.near"), mint("R2", "b.near")]),
            ],
        );
        let events = decode_block(&msg).unwrap();
        let keys: Vec<_> = events.iter().map(|e| (e.shard_id, e.position, e.affected.as_str())).collect();
        assert_eq!(keys, vec![(0, 0, "a.near"), (0, 1, "b.near"), (1, 0, "c.near")]);
        assert!(events.windows(2).all(|w| w[0].event_index < w[1].event_index));
        assert!(events.iter().all(|e| e.kind == EventKind::FungibleToken));
    }

    #[test]
    fn test_unregistered_contract_without_events() {
        let msg = block(
            4,
            4,
            vec![shard(
                0,
                vec![outcome(
                    "R1",
                    "a.near",
                    "random.near",
                    vec![function_call("do_thing", &json!({}))],
                    &["did a thing"],
                    true,
                )],
            )],
        );
        assert!(decode_block(&msg).unwrap().is_empty());
    }
}
