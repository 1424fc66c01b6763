//! Bounded JSON-RPC pool for view calls, spread round-robin over endpoints.

use crate::aggregator_core::error::AggregateError;
use crate::streamer_core::error_handler::{retry_with_backoff, ExponentialBackoff};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceRequest {
    pub contract: String,
    pub account: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceReading {
    pub contract: String,
    pub account: String,
    pub balance: u128,
    pub block_height: u64,
}

/// Where absolute token balances come from.
#[async_trait]
pub trait BalanceSource: Send + Sync {
    /// `Ok(None)` when the contract cannot answer (no `ft_balance_of`, panics).
    async fn balance_of(&self, request: &BalanceRequest) -> Result<Option<BalanceReading>, AggregateError>;
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct CallResult {
    #[serde(default)]
    result: Vec<u8>,
    #[serde(default)]
    block_height: u64,
    #[serde(default)]
    error: Option<String>,
}

pub struct RpcPool {
    client: Client,
    endpoints: Vec<String>,
    next: AtomicUsize,
    permits: Arc<Semaphore>,
    backoff: ExponentialBackoff,
}

impl RpcPool {
    pub fn new(endpoints: Vec<String>, concurrency: usize, timeout_secs: u64) -> Result<Self, AggregateError> {
        if endpoints.is_empty() {
            return Err(AggregateError::InvalidData("no RPC endpoints configured".to_string()));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoints,
            next: AtomicUsize::new(0),
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            backoff: ExponentialBackoff::new(200, 5_000, 4),
        })
    }

    pub fn with_backoff(mut self, backoff: ExponentialBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    fn endpoint(&self) -> &str {
        let i = self.next.fetch_add(1, Ordering::Relaxed) % self.endpoints.len();
        &self.endpoints[i]
    }

    async fn call_once(&self, request: &BalanceRequest) -> Result<Option<BalanceReading>, AggregateError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| AggregateError::Rpc(e.to_string()))?;

        let args = general_purpose::STANDARD.encode(json!({ "account_id": request.account }).to_string());
        let body = json!({
            "jsonrpc": "2.0",
            "id": "nearflow",
            "method": "query",
            "params": {
                "request_type": "call_function",
                "finality": "final",
                "account_id": request.contract,
                "method_name": "ft_balance_of",
                "args_base64": args,
            }
        });

        let response: RpcResponse = self
            .client
            .post(self.endpoint())
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        parse_call_response(request, response)
    }
}

fn parse_call_response(
    request: &BalanceRequest,
    response: RpcResponse,
) -> Result<Option<BalanceReading>, AggregateError> {
    if let Some(error) = response.error {
        // Contract-side failures are final; anything else is retried.
        let name = error.get("name").and_then(Value::as_str).unwrap_or("");
        if name == "HANDLER_ERROR" {
            log::debug!("{} cannot answer ft_balance_of: {}", request.contract, error);
            return Ok(None);
        }
        return Err(AggregateError::Rpc(error.to_string()));
    }
    let Some(result) = response.result else {
        return Err(AggregateError::Rpc("empty RPC response".to_string()));
    };
    let call: CallResult = serde_json::from_value(result)?;
    if let Some(error) = call.error {
        log::debug!("{} ft_balance_of failed: {}", request.contract, error);
        return Ok(None);
    }

    let raw: String = serde_json::from_slice(&call.result)?;
    let balance = raw
        .parse::<u128>()
        .map_err(|e| AggregateError::InvalidData(format!("balance '{}': {}", raw, e)))?;
    Ok(Some(BalanceReading {
        contract: request.contract.clone(),
        account: request.account.clone(),
        balance,
        block_height: call.block_height,
    }))
}

#[async_trait]
impl BalanceSource for RpcPool {
    async fn balance_of(&self, request: &BalanceRequest) -> Result<Option<BalanceReading>, AggregateError> {
        let what = format!("ft_balance_of({}, {})", request.contract, request.account);
        retry_with_backoff(self.backoff.clone(), &what, || self.call_once(request)).await
    }
}

/// Look up every request concurrently. Fan-out width is bounded by the
/// source itself; any hard failure fails the whole batch.
pub async fn fetch_balances(
    source: Arc<dyn BalanceSource>,
    requests: Vec<BalanceRequest>,
) -> Result<Vec<BalanceReading>, AggregateError> {
    let mut tasks = JoinSet::new();
    for request in requests {
        let source = source.clone();
        tasks.spawn(async move { source.balance_of(&request).await });
    }

    let mut readings = Vec::with_capacity(tasks.len());
    while let Some(joined) = tasks.join_next().await {
        let reading = joined.map_err(|e| AggregateError::Rpc(format!("lookup task failed: {}", e)))??;
        readings.extend(reading);
    }
    readings.sort_by(|a, b| (&a.contract, &a.account).cmp(&(&b.contract, &b.account)));
    Ok(readings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> BalanceRequest {
        BalanceRequest {
            contract: "token.near".to_string(),
            account: "alice.near".to_string(),
        }
    }

    fn response(value: Value) -> RpcResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_parse_balance_bytes() {
        // "\"1500\"" as bytes
        let bytes: Vec<u8> = "\"1500\"".bytes().collect();
        let reading = parse_call_response(
            &request(),
            response(json!({"jsonrpc": "2.0", "result": {"result": bytes, "block_height": 77, "logs": []}})),
        )
        .unwrap()
        .unwrap();
        assert_eq!(reading.balance, 1_500);
        assert_eq!(reading.block_height, 77);
    }

    #[test]
    fn test_contract_errors_are_not_retried() {
        let handler = response(json!({"error": {"name": "HANDLER_ERROR", "cause": {"name": "UNKNOWN_ACCOUNT"}}}));
        assert!(parse_call_response(&request(), handler).unwrap().is_none());

        let panicked = response(json!({"result": {"error": "wasm execution failed", "logs": []}}));
        assert!(parse_call_response(&request(), panicked).unwrap().is_none());

        let internal = response(json!({"error": {"name": "INTERNAL_ERROR"}}));
        assert!(parse_call_response(&request(), internal).is_err());
    }

    #[test]
    fn test_round_robin_endpoints() {
        let pool = RpcPool::new(
            vec!["https://a.example".to_string(), "https://b.example".to_string()],
            2,
            5,
        )
        .unwrap();
        let picked: Vec<String> = (0..4).map(|_| pool.endpoint().to_string()).collect();
        assert_eq!(
            picked,
            vec!["https://a.example", "https://b.example", "https://a.example", "https://b.example"]
        );
        assert!(RpcPool::new(Vec::new(), 2, 5).is_err());
    }

    #[tokio::test]
    async fn test_transport_errors_retry_within_budget() {
        // nothing listens on the discard port
        let pool = RpcPool::new(vec!["http://127.0.0.1:9".to_string()], 1, 2)
            .unwrap()
            .with_backoff(ExponentialBackoff::new(1, 2, 2));

        assert!(pool.balance_of(&request()).await.is_err());
        assert_eq!(pool.next.load(Ordering::SeqCst), 3);
    }

    struct FixedSource;

    #[async_trait]
    impl BalanceSource for FixedSource {
        async fn balance_of(&self, request: &BalanceRequest) -> Result<Option<BalanceReading>, AggregateError> {
            if request.account == "ghost.near" {
                return Ok(None);
            }
            Ok(Some(BalanceReading {
                contract: request.contract.clone(),
                account: request.account.clone(),
                balance: request.account.len() as u128,
                block_height: 9,
            }))
        }
    }

    #[tokio::test]
    async fn test_fan_out_collects_sorted_readings() {
        let requests = ["carol.near", "ghost.near", "al.near"]
            .iter()
            .map(|a| BalanceRequest {
                contract: "token.near".to_string(),
                account: a.to_string(),
            })
            .collect();
        let readings = fetch_balances(Arc::new(FixedSource), requests).await.unwrap();
        assert_eq!(readings.len(), 2);
        assert_eq!(readings[0].account, "al.near");
        assert_eq!(readings[1].balance, 10);
    }
}
