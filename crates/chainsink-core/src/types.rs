//! Typed chain data.
//!
//! All JSON-RPC payloads are converted into these structs at the client
//! boundary; nothing downstream works with untyped JSON.

use serde::{Deserialize, Serialize};

/// A block with its full transaction objects, normalized from the node's
/// hex-quantity wire form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvmBlock {
    pub chain: String,
    pub number: u64,
    pub hash: String,
    pub parent_hash: String,
    /// Unix seconds.
    pub timestamp: i64,
    pub transactions: Vec<EvmTransaction>,
}

/// A transaction as carried inside a block.
///
/// `value` and `gas_price` are wei quantities; u128 comfortably covers the
/// total ether supply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvmTransaction {
    pub hash: String,
    pub from: String,
    /// Absent for contract creations.
    pub to: Option<String>,
    pub value: u128,
    pub gas: u64,
    pub gas_price: u128,
    /// Absent on some chains and legacy transactions.
    pub chain_id: Option<u64>,
}

/// The flattened row shape persisted for a transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct TxRow {
    pub block_number: u64,
    pub chain: String,
    pub tx_hash: String,
    pub chain_id: Option<u64>,
    pub from_address: String,
    pub to_address: Option<String>,
    pub value: u128,
    /// gas limit * gas price, the fee ceiling in wei.
    pub total_gas: u128,
    pub timestamp: i64,
}

/// An undecoded event log, normalized from `eth_getLogs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawLog {
    pub address: String,
    pub topics: Vec<String>,
    /// Hex-encoded data payload, `0x`-prefixed (may be just `0x`).
    pub data: String,
    pub tx_hash: String,
    pub log_index: u32,
    pub removed: bool,
}

/// Resolved liquidity-pool metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractInfo {
    pub address: String,
    pub factory: String,
    /// Pool fee in the contract's native units (e.g. hundredths of a bip for
    /// Uniswap V3), when the contract exposes `fee()`.
    pub fee: Option<u64>,
    pub token0: TokenInfo,
    pub token1: TokenInfo,
    /// Human-readable pair name, e.g. `WETH/USDC`.
    pub name: String,
}

/// Resolved ERC-20 token metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub address: String,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// A classified reserve-sync event, one row per log.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncRow {
    pub contract_address: String,
    pub factory_address: String,
    pub token0_symbol: String,
    pub token0_address: String,
    pub token1_symbol: String,
    pub token1_address: String,
    /// Reserves scaled by each token's decimals.
    pub reserve0: f64,
    pub reserve1: f64,
    /// Factory-derived swap fee fraction, when the factory is known.
    pub fee: Option<f64>,
    pub tx_hash: String,
    pub log_index: u32,
    pub timestamp: i64,
}

/// A classified swap event, one row per log.
#[derive(Debug, Clone, PartialEq)]
pub struct SwapRow {
    pub contract_address: String,
    pub token0_symbol: String,
    pub token1_symbol: String,
    /// Scaled by token decimals; the in-side is positive, the out-side
    /// negative.
    pub amount0: f64,
    pub amount1: f64,
    pub tx_hash: String,
    pub log_index: u32,
    pub timestamp: i64,
}

/// A classified pool fee-change event.
#[derive(Debug, Clone, PartialEq)]
pub struct FeeRow {
    pub contract_address: String,
    pub fee: u64,
    pub tx_hash: String,
    pub log_index: u32,
    pub timestamp: i64,
}

/// A persisted block header row.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockRow {
    pub number: u64,
    pub hash: String,
    pub parent_hash: String,
    pub timestamp: i64,
}
