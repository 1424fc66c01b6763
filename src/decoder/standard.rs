//! Standardized `EVENT_JSON:` log events (NEP-297 envelopes).
//!
//! Recognized standards map straight to canonical events without any
//! contract-specific logic: `nep141` fungible tokens, `nep171` NFTs and
//! `nep245` multi-tokens.

use crate::decoder::event::{checked_amount, EventCause, EventDraft, EventKind};
use serde::Deserialize;
use serde_json::Value;

pub const EVENT_PREFIX: &str = "EVENT_JSON:";

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct EventEnvelope {
    pub standard: String,
    #[serde(default)]
    pub version: String,
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

/// Envelopes found in a receipt's logs. Malformed JSON after the prefix is
/// logged and skipped.
pub fn extract_envelopes(logs: &[String]) -> Vec<EventEnvelope> {
    logs.iter()
        .filter_map(|log| log.strip_prefix(EVENT_PREFIX))
        .filter_map(|body| match serde_json::from_str::<EventEnvelope>(body.trim()) {
            Ok(envelope) => Some(envelope),
            Err(e) => {
                log::warn!("⚠️  Malformed event log skipped: {}", e);
                None
            }
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct OwnerItem {
    owner_id: Option<String>,
    #[serde(default)]
    amount: Option<String>,
    #[serde(default)]
    token_ids: Vec<String>,
    #[serde(default)]
    amounts: Vec<String>,
    #[serde(default)]
    memo: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TransferItem {
    old_owner_id: Option<String>,
    new_owner_id: Option<String>,
    #[serde(default)]
    amount: Option<String>,
    #[serde(default)]
    token_ids: Vec<String>,
    #[serde(default)]
    amounts: Vec<String>,
    #[serde(default)]
    memo: Option<String>,
}

fn items<T: for<'de> Deserialize<'de>>(envelope: &EventEnvelope) -> Vec<T> {
    match serde_json::from_value::<Vec<T>>(envelope.data.clone()) {
        Ok(items) => items,
        Err(e) => {
            log::warn!(
                "⚠️  Unexpected data shape for {}:{}: {}",
                envelope.standard,
                envelope.event,
                e
            );
            Vec::new()
        }
    }
}

fn transfer_pair(
    kind: EventKind,
    from: &str,
    to: &str,
    amount: i128,
    token_id: Option<String>,
    memo: Option<String>,
) -> [EventDraft; 2] {
    [
        EventDraft::new(kind, EventCause::Transfer, from, -amount)
            .involved(to)
            .token_id(token_id.clone())
            .memo(memo.clone()),
        EventDraft::new(kind, EventCause::Transfer, to, amount)
            .involved(from)
            .token_id(token_id)
            .memo(memo),
    ]
}

/// (token_id, amount) pairs for one item. NFTs move exactly one unit per id.
fn token_amounts(
    contract: &str,
    kind: EventKind,
    token_ids: &[String],
    amounts: &[String],
) -> Vec<(String, i128)> {
    match kind {
        EventKind::NonFungibleToken => token_ids.iter().map(|id| (id.clone(), 1)).collect(),
        _ => token_ids
            .iter()
            .zip(amounts.iter())
            .filter_map(|(id, amount)| checked_amount(contract, amount).map(|a| (id.clone(), a)))
            .collect(),
    }
}

fn decode_fungible(contract: &str, envelope: &EventEnvelope) -> Vec<EventDraft> {
    let kind = EventKind::FungibleToken;
    let mut drafts = Vec::new();

    match envelope.event.as_str() {
        "ft_mint" | "ft_burn" => {
            let burn = envelope.event == "ft_burn";
            for item in items::<OwnerItem>(envelope) {
                let (Some(owner), Some(amount)) =
                    (item.owner_id, item.amount.as_deref().and_then(|a| checked_amount(contract, a)))
                else {
                    continue;
                };
                let (cause, delta) = if burn {
                    (EventCause::Burn, -amount)
                } else {
                    (EventCause::Mint, amount)
                };
                drafts.push(EventDraft::new(kind, cause, &owner, delta).memo(item.memo));
            }
        }
        "ft_transfer" => {
            for item in items::<TransferItem>(envelope) {
                let (Some(from), Some(to), Some(amount)) = (
                    item.old_owner_id,
                    item.new_owner_id,
                    item.amount.as_deref().and_then(|a| checked_amount(contract, a)),
                ) else {
                    continue;
                };
                drafts.extend(transfer_pair(kind, &from, &to, amount, None, item.memo));
            }
        }
        other => log::debug!("Ignoring nep141 event {}", other),
    }

    drafts
}

fn decode_tokens(
    contract: &str,
    envelope: &EventEnvelope,
    kind: EventKind,
    prefix: &str,
) -> Vec<EventDraft> {
    let mut drafts = Vec::new();
    let event = envelope.event.strip_prefix(prefix).unwrap_or("");

    match event {
        "mint" | "burn" => {
            for item in items::<OwnerItem>(envelope) {
                let Some(owner) = item.owner_id else {
                    continue;
                };
                for (token_id, amount) in token_amounts(contract, kind, &item.token_ids, &item.amounts) {
                    let (cause, delta) = if event == "burn" {
                        (EventCause::Burn, -amount)
                    } else {
                        (EventCause::Mint, amount)
                    };
                    drafts.push(
                        EventDraft::new(kind, cause, &owner, delta)
                            .token_id(Some(token_id))
                            .memo(item.memo.clone()),
                    );
                }
            }
        }
        "transfer" => {
            for item in items::<TransferItem>(envelope) {
                let (Some(from), Some(to)) = (item.old_owner_id, item.new_owner_id) else {
                    continue;
                };
                for (token_id, amount) in token_amounts(contract, kind, &item.token_ids, &item.amounts) {
                    drafts.extend(transfer_pair(
                        kind,
                        &from,
                        &to,
                        amount,
                        Some(token_id),
                        item.memo.clone(),
                    ));
                }
            }
        }
        _ => log::debug!("Ignoring {} event {}", envelope.standard, envelope.event),
    }

    drafts
}

/// Canonical drafts for one envelope logged by `contract`. Unknown standards
/// yield nothing.
pub fn decode_envelope(contract: &str, envelope: &EventEnvelope) -> Vec<EventDraft> {
    match envelope.standard.as_str() {
        "nep141" => decode_fungible(contract, envelope),
        "nep171" => decode_tokens(contract, envelope, EventKind::NonFungibleToken, "nft_"),
        "nep245" => decode_tokens(contract, envelope, EventKind::MultiToken, "mt_"),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logs(lines: &[&str]) -> Vec<String> {
        lines.iter().map(|l| l.to_string()).collect()
    }

    #[test]
    fn test_ft_transfer_emits_pair() {
        let envelopes = extract_envelopes(&logs(&[
            "Transfer 5 from a.near to b.near",
            r#"EVENT_JSON:{"standard":"nep141","version":"1.0.0","event":"ft_transfer","data":[{"old_owner_id":"a.near","new_owner_id":"b.near","amount":"5","memo":"hi"}]}"#,
        ]));
        assert_eq!(envelopes.len(), 1);

        let drafts = decode_envelope("token.near", &envelopes[0]);
        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].affected, "a.near");
        assert_eq!(drafts[0].delta, -5);
        assert_eq!(drafts[0].involved.as_deref(), Some("b.near"));
        assert_eq!(drafts[1].affected, "b.near");
        assert_eq!(drafts[1].delta, 5);
        assert_eq!(drafts[1].memo.as_deref(), Some("hi"));
    }

    #[test]
    fn test_ft_mint_and_burn() {
        let envelopes = extract_envelopes(&logs(&[
            r#"EVENT_JSON:{"standard":"nep141","version":"1.0.0","event":"ft_mint","data":[{"owner_id":"a.near","amount":"7"},{"owner_id":"b.near","amount":"0"}]}"#,
            r#"EVENT_JSON:{"standard":"nep141","version":"1.0.0","event":"ft_burn","data":[{"owner_id":"a.near","amount":"2"}]}"#,
        ]));
        let drafts: Vec<_> = envelopes.iter().flat_map(|e| decode_envelope("token.near", e)).collect();
        assert_eq!(drafts.len(), 2);
        assert_eq!((drafts[0].cause, drafts[0].delta), (EventCause::Mint, 7));
        assert_eq!((drafts[1].cause, drafts[1].delta), (EventCause::Burn, -2));
    }

    #[test]
    fn test_nft_transfer_per_token() {
        let envelopes = extract_envelopes(&logs(&[
            r#"EVENT_JSON:{"standard":"nep171","version":"1.0.0","event":"nft_transfer","data":[{"old_owner_id":"a.near","new_owner_id":"b.near","token_ids":["1","2"]}]}"#,
        ]));
        let drafts = decode_envelope("token.near", &envelopes[0]);
        assert_eq!(drafts.len(), 4);
        assert!(drafts.iter().all(|d| d.kind == EventKind::NonFungibleToken));
        assert_eq!(drafts[2].token_id.as_deref(), Some("2"));
        assert_eq!(drafts[3].delta, 1);
    }

    #[test]
    fn test_mt_mint_uses_amounts() {
        let envelopes = extract_envelopes(&logs(&[
            r#"EVENT_JSON:{"standard":"nep245","version":"1.0.0","event":"mt_mint","data":[{"owner_id":"a.near","token_ids":["gold","silver"],"amounts":["10","0"]}]}"#,
        ]));
        let drafts = decode_envelope("token.near", &envelopes[0]);
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].kind, EventKind::MultiToken);
        assert_eq!(drafts[0].token_id.as_deref(), Some("gold"));
        assert_eq!(drafts[0].delta, 10);
    }

    #[test]
    fn test_malformed_and_unknown_are_skipped() {
        let envelopes = extract_envelopes(&logs(&[
            "EVENT_JSON:{not json",
            r#"EVENT_JSON:{"standard":"dao","version":"1","event":"vote","data":[]}"#,
            r#"EVENT_JSON:{"standard":"nep141","version":"1","event":"ft_mint","data":{"owner_id":"x"}}"#,
        ]));
        assert_eq!(envelopes.len(), 2);
        assert!(envelopes.iter().flat_map(|e| decode_envelope("token.near", e)).next().is_none());
    }

    #[test]
    fn test_amount_beyond_signed_range_drops_whole_pair() {
        let too_big = (i128::MAX as u128 + 1).to_string();
        let line = format!(
            r#"EVENT_JSON:{{"standard":"nep141","version":"1.0.0","event":"ft_transfer","data":[{{"old_owner_id":"a.near","new_owner_id":"b.near","amount":"{}"}},{{"old_owner_id":"a.near","new_owner_id":"c.near","amount":"{}"}}]}}"#,
            too_big,
            i128::MAX
        );
        let envelopes = extract_envelopes(&[line]);
        let drafts = decode_envelope("token.near", &envelopes[0]);
        assert_eq!(drafts.len(), 2);
        assert!(drafts.iter().all(|d| d.involved.as_deref() != Some("b.near")));
        assert_eq!(drafts[1].delta, i128::MAX);
    }
}
