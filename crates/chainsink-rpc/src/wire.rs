//! Hex-quantity wire structs and their conversion into typed chain data.
//!
//! Header fields are strict (a malformed block is rejected); transaction
//! fields are lenient and default to zero, matching how nodes omit
//! `gasPrice` on typed transactions.

use chainsink_core::types::{EvmBlock, EvmTransaction, RawLog};
use serde::Deserialize;
use serde_json::Value;

use crate::error::TransportError;

pub fn parse_hex_u64(s: &str) -> Option<u64> {
    u64::from_str_radix(s.trim_start_matches("0x"), 16).ok()
}

pub fn parse_hex_u128(s: &str) -> Option<u128> {
    u128::from_str_radix(s.trim_start_matches("0x"), 16).ok()
}

#[derive(Debug, Deserialize)]
struct WireBlock {
    number: String,
    hash: String,
    #[serde(rename = "parentHash")]
    parent_hash: String,
    timestamp: String,
    #[serde(default)]
    transactions: Vec<WireTransaction>,
}

#[derive(Debug, Deserialize)]
struct WireTransaction {
    hash: String,
    from: String,
    #[serde(default)]
    to: Option<String>,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    gas: Option<String>,
    #[serde(rename = "gasPrice", default)]
    gas_price: Option<String>,
    #[serde(rename = "chainId", default)]
    chain_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireLog {
    address: String,
    #[serde(default)]
    topics: Vec<String>,
    #[serde(default)]
    data: Option<String>,
    #[serde(rename = "transactionHash")]
    tx_hash: String,
    #[serde(rename = "logIndex")]
    log_index: String,
    #[serde(default)]
    removed: bool,
}

/// Convert an `eth_getBlockByNumber` result into a typed block.
pub fn block_from_value(chain: &str, value: Value) -> Result<EvmBlock, TransportError> {
    let wire: WireBlock =
        serde_json::from_value(value).map_err(|e| TransportError::invalid(e.to_string()))?;
    let number = parse_hex_u64(&wire.number)
        .ok_or_else(|| TransportError::invalid(format!("block number `{}`", wire.number)))?;
    let timestamp = parse_hex_u64(&wire.timestamp)
        .ok_or_else(|| TransportError::invalid(format!("block timestamp `{}`", wire.timestamp)))?
        as i64;

    let transactions = wire
        .transactions
        .into_iter()
        .map(|tx| EvmTransaction {
            hash: tx.hash,
            from: tx.from,
            to: tx.to,
            value: tx.value.as_deref().and_then(parse_hex_u128).unwrap_or(0),
            gas: tx.gas.as_deref().and_then(parse_hex_u64).unwrap_or(0),
            gas_price: tx.gas_price.as_deref().and_then(parse_hex_u128).unwrap_or(0),
            chain_id: tx.chain_id.as_deref().and_then(parse_hex_u64),
        })
        .collect();

    Ok(EvmBlock {
        chain: chain.to_string(),
        number,
        hash: wire.hash,
        parent_hash: wire.parent_hash,
        timestamp,
        transactions,
    })
}

/// Convert an `eth_getLogs` result into typed logs.
pub fn logs_from_value(value: Value) -> Result<Vec<RawLog>, TransportError> {
    let wires: Vec<WireLog> =
        serde_json::from_value(value).map_err(|e| TransportError::invalid(e.to_string()))?;
    Ok(wires
        .into_iter()
        .map(|log| RawLog {
            address: log.address.to_lowercase(),
            topics: log.topics,
            data: log.data.unwrap_or_else(|| "0x".to_string()),
            tx_hash: log.tx_hash,
            log_index: parse_hex_u64(&log.log_index).unwrap_or(0) as u32,
            removed: log.removed,
        })
        .collect())
}

/// Pull the block number out of a `newHeads` notification header.
pub fn header_number(header: &Value) -> Option<u64> {
    header.get("number").and_then(Value::as_str).and_then(parse_hex_u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hex_parsing() {
        assert_eq!(parse_hex_u64("0x10"), Some(16));
        assert_eq!(parse_hex_u64("ff"), Some(255));
        assert_eq!(parse_hex_u64("0xzz"), None);
        assert_eq!(parse_hex_u128("0xde0b6b3a7640000"), Some(1_000_000_000_000_000_000));
    }

    #[test]
    fn block_normalizes_quantities() {
        let value = json!({
            "number": "0x112a880",
            "hash": "0xblockhash",
            "parentHash": "0xparent",
            "timestamp": "0x65500000",
            "transactions": [{
                "hash": "0xtx",
                "from": "0xsender",
                "to": "0xreceiver",
                "value": "0xde0b6b3a7640000",
                "gas": "0x5208",
                "gasPrice": "0x6fc23ac00",
                "chainId": "0x1"
            }]
        });
        let block = block_from_value("ethereum", value).unwrap();
        assert_eq!(block.number, 18_000_000);
        assert_eq!(block.timestamp, 0x65500000);
        let tx = &block.transactions[0];
        assert_eq!(tx.value, 1_000_000_000_000_000_000);
        assert_eq!(tx.gas, 21_000);
        assert_eq!(tx.chain_id, Some(1));
    }

    #[test]
    fn typed_tx_without_gas_price_defaults_to_zero() {
        let value = json!({
            "number": "0x1",
            "hash": "0xh",
            "parentHash": "0xp",
            "timestamp": "0x2",
            "transactions": [{"hash": "0xtx", "from": "0xsender"}]
        });
        let block = block_from_value("base", value).unwrap();
        let tx = &block.transactions[0];
        assert_eq!(tx.gas_price, 0);
        assert_eq!(tx.to, None);
        assert_eq!(tx.chain_id, None);
    }

    #[test]
    fn malformed_header_is_rejected() {
        let value = json!({
            "number": "not-hex",
            "hash": "0xh",
            "parentHash": "0xp",
            "timestamp": "0x2"
        });
        assert!(block_from_value("ethereum", value).is_err());
    }

    #[test]
    fn logs_normalize_index_and_address_case() {
        let value = json!([{
            "address": "0xC02AAA39b223FE8D0A0e5C4F27eAD9083C756Cc2",
            "topics": ["0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"],
            "data": "0x",
            "transactionHash": "0xtx",
            "logIndex": "0x2a",
            "removed": false
        }]);
        let logs = logs_from_value(value).unwrap();
        assert_eq!(logs[0].log_index, 42);
        assert_eq!(logs[0].address, "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2");
    }

    #[test]
    fn header_number_extraction() {
        assert_eq!(header_number(&json!({"number": "0x64"})), Some(100));
        assert_eq!(header_number(&json!({"hash": "0xh"})), None);
    }
}
