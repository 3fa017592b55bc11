//! Thin JSON-RPC HTTP client for the node under test.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use ethereum_types::{Address, H256, U256};
use serde_json::{Value, json};
use tracing::debug;

use crate::client::{BlockHeader, CallRequest, ChainClient, Receipt, ReceiptStatus};
use crate::error::ClientError;

/// Configuration for RPC client behavior.
#[derive(Debug, Clone)]
pub struct RpcConfig {
    /// Per-request timeout (default: 30s).
    pub timeout: Duration,
    /// TCP connect timeout (default: 10s).
    pub connect_timeout: Duration,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Ethereum JSON-RPC client over async HTTP.
pub struct EthRpcClient {
    http: reqwest::Client,
    url: String,
    config: RpcConfig,
    next_id: AtomicU64,
}

impl EthRpcClient {
    pub fn new(url: &str) -> Self {
        Self::with_config(url, RpcConfig::default())
    }

    pub fn with_config(url: &str, config: RpcConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            http,
            url: url.to_string(),
            config,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Single JSON-RPC round trip. No retries: a failed call is reported to
    /// the caller as-is.
    async fn rpc_call(&self, method: &str, params: Value) -> Result<Value, ClientError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": id
        });
        debug!(method, id, "rpc request");

        let response = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ClientError::Timeout {
                        method: method.into(),
                        elapsed_ms: self.config.timeout.as_millis() as u64,
                    }
                } else {
                    ClientError::ConnectionFailed {
                        url: self.url.clone(),
                        cause: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::HttpError {
                method: method.into(),
                status: status.as_u16(),
                body,
            });
        }

        let json_response: Value = response
            .json()
            .await
            .map_err(|e| ClientError::parse(method, "response_body", e.to_string()))?;

        extract_result(method, json_response)
    }
}

/// Splits a JSON-RPC envelope into its result or its error.
fn extract_result(method: &str, mut response: Value) -> Result<Value, ClientError> {
    if let Some(error) = response.get("error").filter(|e| !e.is_null()) {
        let code = error.get("code").and_then(|c| c.as_i64()).unwrap_or(-1);
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown")
            .to_string();
        return Err(ClientError::JsonRpcError {
            method: method.into(),
            code,
            message,
        });
    }

    response
        .get_mut("result")
        .map(Value::take)
        .ok_or_else(|| ClientError::parse(method, "result", "missing result field"))
}

#[async_trait::async_trait]
impl ChainClient for EthRpcClient {
    async fn chain_id(&self) -> Result<u64, ClientError> {
        let result = self.rpc_call("eth_chainId", json!([])).await?;
        parse_u64("eth_chainId", &result)
    }

    async fn block_number(&self) -> Result<u64, ClientError> {
        let result = self.rpc_call("eth_blockNumber", json!([])).await?;
        parse_u64("eth_blockNumber", &result)
    }

    async fn latest_header(&self) -> Result<BlockHeader, ClientError> {
        let result = self
            .rpc_call("eth_getBlockByNumber", json!(["latest", false]))
            .await?;
        parse_block_header(&result)
    }

    async fn pending_nonce(&self, address: Address) -> Result<u64, ClientError> {
        let result = self
            .rpc_call(
                "eth_getTransactionCount",
                json!([format!("0x{address:x}"), "pending"]),
            )
            .await?;
        parse_u64("eth_getTransactionCount", &result)
    }

    async fn gas_price(&self) -> Result<U256, ClientError> {
        let result = self.rpc_call("eth_gasPrice", json!([])).await?;
        parse_u256("eth_gasPrice", &result)
    }

    async fn send_raw_transaction(&self, raw: &Bytes) -> Result<H256, ClientError> {
        let result = self
            .rpc_call(
                "eth_sendRawTransaction",
                json!([format!("0x{}", hex::encode(raw))]),
            )
            .await?;
        parse_h256("eth_sendRawTransaction", &result)
    }

    async fn transaction_receipt(&self, hash: H256) -> Result<Option<Receipt>, ClientError> {
        let result = self
            .rpc_call("eth_getTransactionReceipt", json!([format!("0x{hash:x}")]))
            .await?;
        parse_receipt(&result)
    }

    async fn call(&self, request: &CallRequest) -> Result<Bytes, ClientError> {
        let mut tx = json!({
            "from": format!("0x{:x}", request.from),
            "to": format!("0x{:x}", request.to),
            "gas": format!("0x{:x}", request.gas),
        });
        if !request.data.is_empty() {
            tx["data"] = json!(format!("0x{}", hex::encode(&request.data)));
        }
        let result = self.rpc_call("eth_call", json!([tx, "latest"])).await?;
        parse_bytes("eth_call", &result)
    }

    async fn code_at(&self, address: Address) -> Result<Bytes, ClientError> {
        let result = self
            .rpc_call("eth_getCode", json!([format!("0x{address:x}"), "latest"]))
            .await?;
        parse_bytes("eth_getCode", &result)
    }
}

// --- Parsing helpers ---

fn hex_str<'a>(method: &str, field: &str, val: &'a Value) -> Result<&'a str, ClientError> {
    let s = val
        .as_str()
        .ok_or_else(|| ClientError::parse(method, field, "expected hex string"))?;
    Ok(s.strip_prefix("0x").unwrap_or(s))
}

fn parse_bytes(method: &str, val: &Value) -> Result<Bytes, ClientError> {
    let s = hex_str(method, "result", val)?;
    hex::decode(s)
        .map(Bytes::from)
        .map_err(|e| ClientError::parse(method, "result", e.to_string()))
}

fn parse_u64(method: &str, val: &Value) -> Result<u64, ClientError> {
    let s = hex_str(method, "u64", val)?;
    u64::from_str_radix(s, 16).map_err(|e| ClientError::parse(method, "u64", e.to_string()))
}

fn parse_u256(method: &str, val: &Value) -> Result<U256, ClientError> {
    let s = hex_str(method, "U256", val)?;
    U256::from_str_radix(s, 16).map_err(|e| ClientError::parse(method, "U256", e.to_string()))
}

fn parse_h256(method: &str, val: &Value) -> Result<H256, ClientError> {
    let bytes = hex::decode(hex_str(method, "H256", val)?)
        .map_err(|e| ClientError::parse(method, "H256", e.to_string()))?;
    if bytes.len() != 32 {
        return Err(ClientError::parse(
            method,
            "H256",
            format!("expected 32 bytes, got {}", bytes.len()),
        ));
    }
    Ok(H256::from_slice(&bytes))
}

fn parse_address(method: &str, val: &Value) -> Result<Address, ClientError> {
    let bytes = hex::decode(hex_str(method, "Address", val)?)
        .map_err(|e| ClientError::parse(method, "Address", e.to_string()))?;
    if bytes.len() != 20 {
        return Err(ClientError::parse(
            method,
            "Address",
            format!("expected 20 bytes, got {}", bytes.len()),
        ));
    }
    Ok(Address::from_slice(&bytes))
}

/// Treats JSON `null` the same as an absent field.
fn non_null<'a>(val: &'a Value, field: &str) -> Option<&'a Value> {
    val.get(field).filter(|v| !v.is_null())
}

fn parse_block_header(val: &Value) -> Result<BlockHeader, ClientError> {
    const METHOD: &str = "eth_getBlockByNumber";
    if val.is_null() {
        return Err(ClientError::parse(METHOD, "result", "block not found"));
    }
    let number = non_null(val, "number")
        .ok_or_else(|| ClientError::parse(METHOD, "number", "missing"))?;
    Ok(BlockHeader {
        number: parse_u64(METHOD, number)?,
        base_fee_per_gas: non_null(val, "baseFeePerGas")
            .map(|v| parse_u256(METHOD, v))
            .transpose()?,
    })
}

fn parse_receipt(val: &Value) -> Result<Option<Receipt>, ClientError> {
    const METHOD: &str = "eth_getTransactionReceipt";
    if val.is_null() {
        return Ok(None);
    }
    let hash = non_null(val, "transactionHash")
        .ok_or_else(|| ClientError::parse(METHOD, "transactionHash", "missing"))?;

    // Pre-Byzantium receipts carry a state root instead of a status.
    let status = match non_null(val, "status") {
        Some(v) => match parse_u64(METHOD, v)? {
            1 => ReceiptStatus::Success,
            0 => ReceiptStatus::Failed,
            _ => ReceiptStatus::Unknown,
        },
        None => ReceiptStatus::Unknown,
    };

    Ok(Some(Receipt {
        transaction_hash: parse_h256(METHOD, hash)?,
        block_number: non_null(val, "blockNumber")
            .map(|v| parse_u64(METHOD, v))
            .transpose()?,
        status,
        contract_address: non_null(val, "contractAddress")
            .map(|v| parse_address(METHOD, v))
            .transpose()?,
    }))
}
