//! HTTP JSON-RPC client.
//!
//! Used for the request/response side of the pipeline: historical block
//! fetches, log queries, `eth_call`, and code probes. Streaming goes over
//! the WebSocket client in `stream`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::{json, Value};

use chainsink_core::types::{EvmBlock, RawLog};

use crate::error::TransportError;
use crate::jsonrpc::{JsonRpcRequest, JsonRpcResponse};
use crate::wire;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

pub struct HttpClient {
    chain: String,
    url: String,
    client: reqwest::Client,
    next_id: AtomicU64,
}

impl HttpClient {
    pub fn new(chain: impl Into<String>, url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { chain: chain.into(), url: url.into(), client, next_id: AtomicU64::new(1) }
    }

    pub fn chain(&self) -> &str {
        &self.chain
    }

    /// Send a single JSON-RPC call and return its result value.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest::new(id, method, params);
        let response: JsonRpcResponse = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        response.into_result()
    }

    /// Fetch a block with full transaction objects. `None` when the node
    /// does not have the block.
    pub async fn get_block(&self, number: u64) -> Result<Option<EvmBlock>, TransportError> {
        let result = self
            .call("eth_getBlockByNumber", json!([format!("0x{number:x}"), true]))
            .await?;
        if result.is_null() {
            return Ok(None);
        }
        wire::block_from_value(&self.chain, result).map(Some)
    }

    /// Fetch all logs emitted in one block.
    pub async fn get_logs(&self, block_number: u64) -> Result<Vec<RawLog>, TransportError> {
        let tag = format!("0x{block_number:x}");
        let result = self
            .call("eth_getLogs", json!([{"fromBlock": tag, "toBlock": tag}]))
            .await?;
        wire::logs_from_value(result)
    }

    pub async fn latest_block_number(&self) -> Result<u64, TransportError> {
        let result = self.call("eth_blockNumber", json!([])).await?;
        result
            .as_str()
            .and_then(wire::parse_hex_u64)
            .ok_or_else(|| TransportError::invalid("eth_blockNumber result"))
    }

    /// Read-only contract call against latest state; returns the raw hex
    /// return data.
    pub async fn eth_call(&self, to: &str, data: &str) -> Result<String, TransportError> {
        let result = self
            .call("eth_call", json!([{"to": to, "data": data}, "latest"]))
            .await?;
        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| TransportError::invalid("eth_call result"))
    }

    /// Deployed bytecode at an address (`0x` when not a contract).
    pub async fn get_code(&self, address: &str) -> Result<String, TransportError> {
        let result = self.call("eth_getCode", json!([address, "latest"])).await?;
        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| TransportError::invalid("eth_getCode result"))
    }
}
