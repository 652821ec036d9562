//! JSON-RPC 2.0 wire types.
//!
//! Requests always carry numeric ids (clients hand them out from an atomic
//! counter); incoming WebSocket frames are either id-bearing responses or
//! `eth_subscription` notifications.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TransportError;

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    pub params: Value,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self { jsonrpc: "2.0", id, method: method.into(), params }
    }

    pub fn to_text(&self) -> Result<String, TransportError> {
        serde_json::to_string(self).map_err(|e| TransportError::invalid(e.to_string()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    pub id: Option<u64>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Extract the result, mapping a node-side error to `TransportError::Rpc`.
    pub fn into_result(self) -> Result<Value, TransportError> {
        if let Some(err) = self.error {
            return Err(TransportError::Rpc { code: err.code, message: err.message });
        }
        Ok(self.result.unwrap_or(Value::Null))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

/// An `eth_subscription` push from the node.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionNotification {
    pub method: String,
    pub params: SubscriptionParams,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionParams {
    pub subscription: String,
    pub result: Value,
}

/// A frame read off the WebSocket.
#[derive(Debug, Clone)]
pub enum IncomingMessage {
    Response(JsonRpcResponse),
    Notification(SubscriptionNotification),
}

impl IncomingMessage {
    pub fn parse(text: &str) -> Result<Self, TransportError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| TransportError::invalid(e.to_string()))?;
        if value.get("method").is_some() {
            let notification: SubscriptionNotification = serde_json::from_value(value)
                .map_err(|e| TransportError::invalid(e.to_string()))?;
            Ok(IncomingMessage::Notification(notification))
        } else {
            let response: JsonRpcResponse = serde_json::from_value(value)
                .map_err(|e| TransportError::invalid(e.to_string()))?;
            Ok(IncomingMessage::Response(response))
        }
    }
}
