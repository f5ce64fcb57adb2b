//! JSON-RPC transport to the ledger node, with endpoint failover.
//!
//! The node is an opaque dependency reached over HTTP(S). Writes go through
//! `submit_raw`; everything else is a read. Transport failures rotate to the
//! next endpoint; a node-reported error is a definitive answer and is never
//! retried here.

use crate::config::NodeConfig;
use crate::error::{ChainTraceError, Result};
use crate::ledger::{Address, TransactionId};
use async_trait::async_trait;
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{RwLock, Semaphore};
use tracing::{debug, info, warn};

/// Consecutive failures after which an endpoint is considered unhealthy
const UNHEALTHY_FAILURE_COUNT: usize = 5;

/// How long an unhealthy endpoint is benched before being retried
const RECOVERY_WINDOW: Duration = Duration::from_secs(300);

/// Read/write surface of the ledger node
#[async_trait]
pub trait LedgerNode: Send + Sync {
    /// The sequence number the node currently expects for an identity
    async fn sequence_for(&self, identity: &Address) -> Result<u64>;

    /// The node's current fee price estimate
    async fn gas_price(&self) -> Result<U256>;

    /// Submit a hex-encoded signed envelope; nodes dedupe by envelope hash,
    /// so resubmitting an identical envelope is safe
    async fn submit_raw(&self, raw: &str) -> Result<TransactionId>;

    /// Receipt for a submitted transaction, if the node has one yet
    async fn transaction_receipt(&self, id: &TransactionId) -> Result<Option<Receipt>>;

    /// Read-only program call
    async fn call(&self, program: &Address, call_data: &[u8]) -> Result<Vec<u8>>;
}

/// Inclusion outcome reported by the node for a submitted transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub transaction_id: TransactionId,
    pub status: ReceiptStatus,
    #[serde(default)]
    pub block_number: Option<u64>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReceiptStatus {
    Included,
    Failed,
}

impl Receipt {
    pub fn succeeded(&self) -> bool {
        self.status == ReceiptStatus::Included
    }
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// A single node endpoint with health accounting
struct Endpoint {
    url: String,
    failure_count: AtomicUsize,
    success_count: AtomicUsize,
    last_failure: RwLock<Option<Instant>>,
}

impl Endpoint {
    fn new(url: String) -> Self {
        Self {
            url,
            failure_count: AtomicUsize::new(0),
            success_count: AtomicUsize::new(0),
            last_failure: RwLock::new(None),
        }
    }

    async fn record_success(&self) {
        self.success_count.fetch_add(1, Ordering::Relaxed);
        self.failure_count.store(0, Ordering::Relaxed);
    }

    async fn record_failure(&self) {
        *self.last_failure.write().await = Some(Instant::now());
        self.failure_count.fetch_add(1, Ordering::Relaxed);
    }

    async fn is_healthy(&self) -> bool {
        if self.failure_count.load(Ordering::Relaxed) > UNHEALTHY_FAILURE_COUNT {
            // allow recovery once the bench window has passed
            if let Some(last) = *self.last_failure.read().await {
                return last.elapsed() > RECOVERY_WINDOW;
            }
            return false;
        }
        true
    }
}

/// HTTP JSON-RPC client with primary/backup failover and a bounded number
/// of in-flight requests
pub struct HttpNodeClient {
    client: reqwest::Client,
    primary_endpoints: Vec<Arc<Endpoint>>,
    backup_endpoints: Vec<Arc<Endpoint>>,
    next_primary: AtomicUsize,
    next_backup: AtomicUsize,
    request_semaphore: Arc<Semaphore>,
    next_request_id: AtomicU64,
}

impl HttpNodeClient {
    pub fn new(config: &NodeConfig) -> Result<Self> {
        if config.primary_endpoints.is_empty() {
            return Err(ChainTraceError::Config(config::ConfigError::Message(
                "At least one primary RPC endpoint must be provided".to_string(),
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.rpc_timeout_ms))
            .build()?;

        let primary_endpoints = config
            .primary_endpoints
            .iter()
            .cloned()
            .map(|url| Arc::new(Endpoint::new(url)))
            .collect::<Vec<_>>();
        let backup_endpoints = config
            .backup_endpoints
            .iter()
            .cloned()
            .map(|url| Arc::new(Endpoint::new(url)))
            .collect::<Vec<_>>();

        info!(
            "Initialized ledger node client with {} primary and {} backup endpoints",
            primary_endpoints.len(),
            backup_endpoints.len()
        );

        Ok(Self {
            client,
            primary_endpoints,
            backup_endpoints,
            next_primary: AtomicUsize::new(0),
            next_backup: AtomicUsize::new(0),
            request_semaphore: Arc::new(Semaphore::new(config.max_concurrent_requests)),
            next_request_id: AtomicU64::new(1),
        })
    }

    fn rotate<'a>(
        endpoints: &'a [Arc<Endpoint>],
        cursor: &AtomicUsize,
    ) -> Option<&'a Arc<Endpoint>> {
        if endpoints.is_empty() {
            return None;
        }
        let index = cursor.fetch_add(1, Ordering::Relaxed) % endpoints.len();
        Some(&endpoints[index])
    }

    /// Execute one JSON-RPC request with automatic failover
    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let _permit = self
            .request_semaphore
            .acquire()
            .await
            .map_err(|_| ChainTraceError::Internal("request semaphore closed".to_string()))?;

        let id = self.next_request_id.fetch_add(1, Ordering::Relaxed);

        for _ in 0..self.primary_endpoints.len() {
            if let Some(endpoint) = Self::rotate(&self.primary_endpoints, &self.next_primary) {
                if !endpoint.is_healthy().await {
                    continue;
                }
                match self.send(endpoint, method, &params, id).await {
                    Ok(result) => {
                        endpoint.record_success().await;
                        return Ok(result);
                    }
                    Err(e @ ChainTraceError::NodeRejected { .. }) => {
                        // the node answered; failing over would just repeat it
                        endpoint.record_success().await;
                        return Err(e);
                    }
                    Err(e) => {
                        endpoint.record_failure().await;
                        warn!("Primary RPC request failed on {}: {}", endpoint.url, e);
                    }
                }
            }
        }

        for _ in 0..self.backup_endpoints.len() {
            if let Some(endpoint) = Self::rotate(&self.backup_endpoints, &self.next_backup) {
                if !endpoint.is_healthy().await {
                    continue;
                }
                match self.send(endpoint, method, &params, id).await {
                    Ok(result) => {
                        endpoint.record_success().await;
                        warn!("Using backup RPC endpoint: {}", endpoint.url);
                        return Ok(result);
                    }
                    Err(e @ ChainTraceError::NodeRejected { .. }) => {
                        endpoint.record_success().await;
                        return Err(e);
                    }
                    Err(e) => {
                        endpoint.record_failure().await;
                        warn!("Backup RPC request failed on {}: {}", endpoint.url, e);
                    }
                }
            }
        }

        Err(ChainTraceError::ConnectionLost {
            endpoint: "all ledger node endpoints".to_string(),
        })
    }

    async fn send(
        &self,
        endpoint: &Endpoint,
        method: &str,
        params: &Value,
        id: u64,
    ) -> Result<Value> {
        debug!("RPC {} -> {}", method, endpoint.url);

        let request = RpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params: params.clone(),
        };

        let response = self
            .client
            .post(&endpoint.url)
            .json(&request)
            .send()
            .await?;
        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| ChainTraceError::Rpc(format!("invalid JSON-RPC response: {}", e)))?;

        if let Some(error) = body.error {
            return Err(ChainTraceError::NodeRejected {
                code: error.code,
                message: error.message,
            });
        }

        body.result
            .ok_or_else(|| ChainTraceError::Rpc("response carries neither result nor error".to_string()))
    }
}

/// Parse a JSON-RPC quantity: either a number or a 0x-prefixed hex string
fn parse_quantity(value: &Value) -> Result<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| ChainTraceError::Rpc(format!("quantity out of range: {}", n))),
        Value::String(s) => {
            let stripped = s.strip_prefix("0x").unwrap_or(s);
            u64::from_str_radix(stripped, 16)
                .map_err(|_| ChainTraceError::Rpc(format!("invalid quantity: {}", s)))
        }
        other => Err(ChainTraceError::Rpc(format!(
            "expected quantity, got {}",
            other
        ))),
    }
}

fn parse_u256(value: &Value) -> Result<U256> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .map(U256::from)
            .ok_or_else(|| ChainTraceError::Rpc(format!("quantity out of range: {}", n))),
        Value::String(s) => {
            let stripped = s.strip_prefix("0x").unwrap_or(s);
            U256::from_str_radix(stripped, 16)
                .map_err(|_| ChainTraceError::Rpc(format!("invalid quantity: {}", s)))
        }
        other => Err(ChainTraceError::Rpc(format!(
            "expected quantity, got {}",
            other
        ))),
    }
}

fn parse_hex_data(value: &Value) -> Result<Vec<u8>> {
    let s = value
        .as_str()
        .ok_or_else(|| ChainTraceError::Rpc("expected hex data string".to_string()))?;
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(stripped).map_err(|_| ChainTraceError::Rpc(format!("invalid hex data: {}", s)))
}

#[async_trait]
impl LedgerNode for HttpNodeClient {
    async fn sequence_for(&self, identity: &Address) -> Result<u64> {
        let result = self
            .request("ledger_getSequence", json!([identity]))
            .await?;
        parse_quantity(&result)
    }

    async fn gas_price(&self) -> Result<U256> {
        let result = self.request("ledger_gasPrice", json!([])).await?;
        parse_u256(&result)
    }

    async fn submit_raw(&self, raw: &str) -> Result<TransactionId> {
        let result = self
            .request("ledger_submitRawTransaction", json!([raw]))
            .await?;
        let s = result
            .as_str()
            .ok_or_else(|| ChainTraceError::Rpc("expected transaction id string".to_string()))?;
        TransactionId::from_hex(s)
    }

    async fn transaction_receipt(&self, id: &TransactionId) -> Result<Option<Receipt>> {
        let result = self
            .request("ledger_getTransactionReceipt", json!([id]))
            .await?;
        if result.is_null() {
            return Ok(None);
        }
        let receipt: Receipt = serde_json::from_value(result)
            .map_err(|e| ChainTraceError::Rpc(format!("malformed receipt: {}", e)))?;
        Ok(Some(receipt))
    }

    async fn call(&self, program: &Address, call_data: &[u8]) -> Result<Vec<u8>> {
        let params = json!([{
            "to": program,
            "data": format!("0x{}", hex::encode(call_data)),
        }]);
        let result = self.request("ledger_call", params).await?;
        parse_hex_data(&result)
    }
}
