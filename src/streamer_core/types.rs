//! Raw block messages as produced by the lake-style block storage.
//!
//! Only the fields the decoder and the stream continuity check need are typed;
//! everything else is carried as `serde_json::Value` so new protocol fields do
//! not break deserialization.

use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BlockMessage {
    pub block: Block,
    #[serde(default)]
    pub shards: Vec<Shard>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Block {
    #[serde(default)]
    pub author: Option<String>,
    pub header: BlockHeader,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BlockHeader {
    #[serde(deserialize_with = "u64_from_str_or_num")]
    pub height: u64,
    pub hash: String,
    pub prev_hash: String,
    #[serde(default)]
    pub prev_height: Option<u64>,
    #[serde(deserialize_with = "u64_from_str_or_num")]
    pub timestamp_nanosec: u64,
    #[serde(default)]
    pub epoch_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Shard {
    pub shard_id: u64,
    #[serde(default)]
    pub receipt_execution_outcomes: Vec<ReceiptExecutionOutcome>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReceiptExecutionOutcome {
    pub receipt: Receipt,
    pub execution_outcome: ExecutionOutcomeWithId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Receipt {
    pub receipt_id: String,
    pub predecessor_id: String,
    pub receiver_id: String,
    pub receipt: ReceiptBody,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ReceiptBody {
    Action(ActionReceipt),
    Data(Value),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionReceipt {
    pub signer_id: String,
    /// Heterogeneous: unit actions are bare strings, the rest are
    /// single-key objects such as `{"FunctionCall": {...}}`.
    #[serde(default)]
    pub actions: Vec<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionOutcomeWithId {
    #[serde(default)]
    pub id: Option<String>,
    pub outcome: ExecutionOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionOutcome {
    #[serde(default)]
    pub logs: Vec<String>,
    pub status: Value,
    pub executor_id: String,
}

/// A decoded `FunctionCall` action.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    pub method_name: String,
    pub args: Vec<u8>,
    pub deposit: u128,
}

impl FunctionCall {
    /// Arguments parsed as JSON. `None` when the call used a binary encoding.
    pub fn json_args(&self) -> Option<Value> {
        serde_json::from_slice(&self.args).ok()
    }
}

impl BlockMessage {
    pub fn height(&self) -> u64 {
        self.block.header.height
    }

    pub fn hash(&self) -> &str {
        &self.block.header.hash
    }

    pub fn prev_hash(&self) -> &str {
        &self.block.header.prev_hash
    }

    pub fn timestamp_nanos(&self) -> u64 {
        self.block.header.timestamp_nanosec
    }

    pub fn receipt_count(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.receipt_execution_outcomes.len())
            .sum()
    }
}

impl ReceiptExecutionOutcome {
    pub fn logs(&self) -> &[String] {
        &self.execution_outcome.outcome.logs
    }

    /// `SuccessValue` and `SuccessReceiptId` count as success; `Failure` and
    /// `Unknown` do not.
    pub fn is_success(&self) -> bool {
        match &self.execution_outcome.outcome.status {
            Value::Object(map) => {
                map.contains_key("SuccessValue") || map.contains_key("SuccessReceiptId")
            }
            _ => false,
        }
    }

    /// Function calls carried by an action receipt, in action order.
    /// Calls whose args are not valid base64 are dropped with a warning.
    pub fn function_calls(&self) -> Vec<FunctionCall> {
        let actions = match &self.receipt.receipt {
            ReceiptBody::Action(action) => &action.actions,
            ReceiptBody::Data(_) => return Vec::new(),
        };

        actions
            .iter()
            .filter_map(|action| action.get("FunctionCall"))
            .filter_map(|call| {
                let method_name = call.get("method_name")?.as_str()?.to_string();
                let raw_args = call.get("args").and_then(Value::as_str).unwrap_or("");
                let args = match general_purpose::STANDARD.decode(raw_args) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        log::warn!(
                            "⚠️  Undecodable args for {} in receipt {}: {}",
                            method_name,
                            self.receipt.receipt_id,
                            e
                        );
                        return None;
                    }
                };
                let deposit = call
                    .get("deposit")
                    .and_then(Value::as_str)
                    .and_then(|d| d.parse().ok())
                    .unwrap_or(0);
                Some(FunctionCall {
                    method_name,
                    args,
                    deposit,
                })
            })
            .collect()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumOrString {
    Num(u64),
    Str(String),
}

/// Lake files encode some u64 fields as strings to survive JS number limits.
fn u64_from_str_or_num<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match NumOrString::deserialize(deserializer)? {
        NumOrString::Num(n) => Ok(n),
        NumOrString::Str(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
pub(crate) mod test_blocks {
    //! Builders for hand-written blocks used across unit tests.

    use super::*;
    use serde_json::json;

    pub fn function_call(method: &str, args: &Value) -> Value {
        json!({
            "FunctionCall": {
                "method_name": method,
                "args": general_purpose::STANDARD.encode(args.to_string()),
                "gas": 30_000_000_000_000u64,
                "deposit": "1"
            }
        })
    }

    pub fn outcome(
        receipt_id: &str,
        predecessor: &str,
        receiver: &str,
        actions: Vec<Value>,
        logs: &[&str],
        success: bool,
    ) -> ReceiptExecutionOutcome {
        let status = if success {
            json!({"SuccessValue": ""})
        } else {
            json!({"Failure": {"ActionError": {"index": 0}}})
        };
        ReceiptExecutionOutcome {
            receipt: Receipt {
                receipt_id: receipt_id.to_string(),
                predecessor_id: predecessor.to_string(),
                receiver_id: receiver.to_string(),
                receipt: ReceiptBody::Action(ActionReceipt {
                    signer_id: predecessor.to_string(),
                    actions,
                }),
            },
            execution_outcome: ExecutionOutcomeWithId {
                id: Some(receipt_id.to_string()),
                outcome: ExecutionOutcome {
                    logs: logs.iter().map(|l| l.to_string()).collect(),
                    status,
                    executor_id: receiver.to_string(),
                },
            },
        }
    }

    pub fn block(height: u64, timestamp: u64, shards: Vec<Shard>) -> BlockMessage {
        BlockMessage {
            block: Block {
                author: None,
                header: BlockHeader {
                    height,
                    hash: format!("hash-{}", height),
                    prev_hash: format!("hash-{}", height.saturating_sub(1)),
                    prev_height: Some(height.saturating_sub(1)),
                    timestamp_nanosec: timestamp,
                    epoch_id: None,
                },
            },
            shards,
        }
    }

    pub fn shard(shard_id: u64, outcomes: Vec<ReceiptExecutionOutcome>) -> Shard {
        Shard {
            shard_id,
            receipt_execution_outcomes: outcomes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lake_block() {
        let raw = r#"{
            "block": {
                "author": "node0",
                "header": {
                    "height": 120,
                    "hash": "H120",
                    "prev_hash": "H119",
                    "prev_height": 119,
                    "timestamp_nanosec": "1700000000000000000",
                    "epoch_id": "E1"
                }
            },
            "shards": [{
                "shard_id": 2,
                "chunk": null,
                "receipt_execution_outcomes": [{
                    "receipt": {
                        "receipt_id": "R1",
                        "predecessor_id": "alice.near",
                        "receiver_id": "wrap.near",
                        "receipt": {"Action": {
                            "signer_id": "alice.near",
                            "actions": ["CreateAccount", {"FunctionCall": {
                                "method_name": "near_withdraw",
                                "args": "eyJhbW91bnQiOiIxMCJ9",
                                "gas": 1,
                                "deposit": "1"
                            }}]
                        }}
                    },
                    "execution_outcome": {
                        "id": "R1",
                        "outcome": {
                            "logs": [],
                            "status": {"SuccessValue": ""},
                            "executor_id": "wrap.near"
                        }
                    }
                }]
            }]
        }"#;

        let block: BlockMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(block.height(), 120);
        assert_eq!(block.timestamp_nanos(), 1_700_000_000_000_000_000);
        assert_eq!(block.receipt_count(), 1);

        let outcome = &block.shards[0].receipt_execution_outcomes[0];
        assert!(outcome.is_success());

        let calls = outcome.function_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].method_name, "near_withdraw");
        assert_eq!(calls[0].deposit, 1);
        assert_eq!(calls[0].json_args().unwrap()["amount"], "10");
    }

    #[test]
    fn test_failure_status_is_not_success() {
        let outcome =
            test_blocks::outcome("R", "a.near", "b.near", Vec::new(), &[], false);
        assert!(!outcome.is_success());
    }

    #[test]
    fn test_data_receipt_has_no_calls() {
        let mut outcome =
            test_blocks::outcome("R", "a.near", "b.near", Vec::new(), &[], true);
        outcome.receipt.receipt = ReceiptBody::Data(serde_json::json!({"data_id": "x"}));
        assert!(outcome.function_calls().is_empty());
    }
}
