//! Protocol event classification.
//!
//! Decoded logs route by event name to swap / sync / fee handlers keyed by
//! the resolved signature hash the log decoded against. Unknown protocol
//! variants are counted, never raised. Swap and sync rows need token
//! metadata, so events on contracts without resolved `ContractInfo` are
//! dropped.

mod fee;
mod swap;
mod sync;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use indexmap::IndexMap;

use chainsink_core::event::{DecodedEvent, DecodedParam};
use chainsink_core::store::EvmStore;
use chainsink_core::types::{ContractInfo, FeeRow, SwapRow, SyncRow};
use chainsink_core::value::ParamValue;

/// A decoded log promoted to a protocol-level record.
#[derive(Debug, Clone)]
pub enum ClassifiedEvent {
    Swap(SwapRow),
    Sync(SyncRow),
    Fee(FeeRow),
}

/// Named-parameter lookup through protocol synonym lists.
fn param<'a>(
    parameters: &'a IndexMap<String, DecodedParam>,
    names: &[&str],
) -> Option<&'a ParamValue> {
    names.iter().find_map(|name| parameters.get(*name).map(|p| &p.value))
}

fn param_f64(parameters: &IndexMap<String, DecodedParam>, names: &[&str]) -> Option<f64> {
    param(parameters, names).and_then(ParamValue::to_f64)
}

fn scale(raw: f64, decimals: u8) -> f64 {
    raw / 10f64.powi(decimals as i32)
}

pub struct EventClassifier {
    chain: String,
    store: Arc<dyn EvmStore>,
    unknown_protocols: Mutex<HashMap<String, u64>>,
}

impl EventClassifier {
    pub fn new(chain: impl Into<String>, store: Arc<dyn EvmStore>) -> Self {
        Self { chain: chain.into(), store, unknown_protocols: Mutex::new(HashMap::new()) }
    }

    /// Classify and persist one decoded event. `None` means the event was
    /// dropped: not a protocol event, unknown variant, missing contract
    /// metadata, or malformed parameters.
    pub async fn process_event(
        &self,
        event: &DecodedEvent,
        tx_hash: &str,
        timestamp: i64,
    ) -> Option<ClassifiedEvent> {
        match event.event.as_str() {
            "Swap" => self.handle_swap(event, tx_hash, timestamp).await,
            "Sync" => self.handle_sync(event, tx_hash, timestamp).await,
            "SetCustomFee" => self.handle_fee(event, tx_hash, timestamp).await,
            _ => None,
        }
    }

    /// Signatures seen for protocol event names with no registered handler.
    pub fn unknown_protocols(&self) -> HashMap<String, u64> {
        self.unknown_protocols.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    async fn handle_swap(
        &self,
        event: &DecodedEvent,
        tx_hash: &str,
        timestamp: i64,
    ) -> Option<ClassifiedEvent> {
        let Some(shape) = swap::shape_for(&event.signature) else {
            self.record_unknown(&event.event, &event.signature);
            return None;
        };
        let Some(raw) = swap::extract(shape, &event.parameters) else {
            tracing::warn!(chain = %self.chain, tx = tx_hash, contract = %event.contract, "malformed swap parameters");
            return None;
        };
        let info = self.contract_info(&event.contract).await?;

        let amount0 = scale(raw.amount0, info.token0.decimals);
        let amount1 = scale(raw.amount1, info.token1.decimals);
        // in-amount positive, out-amount negative
        let (amount0, amount1) =
            if raw.amount0_is_in { (amount0, -amount1) } else { (-amount0, amount1) };

        let row = SwapRow {
            contract_address: event.contract.clone(),
            token0_symbol: info.token0.symbol.clone(),
            token1_symbol: info.token1.symbol.clone(),
            amount0,
            amount1,
            tx_hash: tx_hash.to_string(),
            log_index: event.log_index,
            timestamp,
        };
        if let Err(e) = self.store.insert_swap_event(&self.chain, &row).await {
            tracing::warn!(chain = %self.chain, tx = tx_hash, error = %e, "swap persist failed");
            return None;
        }
        Some(ClassifiedEvent::Swap(row))
    }

    async fn handle_sync(
        &self,
        event: &DecodedEvent,
        tx_hash: &str,
        timestamp: i64,
    ) -> Option<ClassifiedEvent> {
        if !sync::is_known(&event.signature) {
            self.record_unknown(&event.event, &event.signature);
            return None;
        }
        let Some(raw) = sync::extract(&event.parameters) else {
            tracing::warn!(chain = %self.chain, tx = tx_hash, contract = %event.contract, "malformed sync parameters");
            return None;
        };
        let info = self.contract_info(&event.contract).await?;

        let row = SyncRow {
            contract_address: event.contract.clone(),
            factory_address: info.factory.clone(),
            token0_symbol: info.token0.symbol.clone(),
            token0_address: info.token0.address.clone(),
            token1_symbol: info.token1.symbol.clone(),
            token1_address: info.token1.address.clone(),
            reserve0: scale(raw.reserve0, info.token0.decimals),
            reserve1: scale(raw.reserve1, info.token1.decimals),
            fee: sync::factory_fee(&info.factory),
            tx_hash: tx_hash.to_string(),
            log_index: event.log_index,
            timestamp,
        };
        if let Err(e) = self.store.insert_sync_event(&self.chain, &row).await {
            tracing::warn!(chain = %self.chain, tx = tx_hash, error = %e, "sync persist failed");
            return None;
        }
        Some(ClassifiedEvent::Sync(row))
    }

    async fn handle_fee(
        &self,
        event: &DecodedEvent,
        tx_hash: &str,
        timestamp: i64,
    ) -> Option<ClassifiedEvent> {
        if !fee::is_known(&event.signature) {
            self.record_unknown(&event.event, &event.signature);
            return None;
        }
        let Some(raw) = fee::extract(&event.parameters) else {
            tracing::warn!(chain = %self.chain, tx = tx_hash, contract = %event.contract, "malformed fee parameters");
            return None;
        };

        // fee changes carry no amounts, so token metadata is not required;
        // the row targets the pool named in the event when present
        let row = FeeRow {
            contract_address: raw.pool.unwrap_or_else(|| event.contract.clone()),
            fee: raw.fee,
            tx_hash: tx_hash.to_string(),
            log_index: event.log_index,
            timestamp,
        };
        if let Err(e) = self.store.insert_fee_event(&self.chain, &row).await {
            tracing::warn!(chain = %self.chain, tx = tx_hash, error = %e, "fee persist failed");
            return None;
        }
        Some(ClassifiedEvent::Fee(row))
    }

    async fn contract_info(&self, address: &str) -> Option<ContractInfo> {
        match self.store.query_contract_info(&self.chain, address).await {
            Ok(Some(info)) => Some(info),
            Ok(None) => {
                tracing::debug!(chain = %self.chain, address, "no contract info, event dropped");
                None
            }
            Err(e) => {
                tracing::warn!(chain = %self.chain, address, error = %e, "contract lookup failed");
                None
            }
        }
    }

    fn record_unknown(&self, event: &str, signature: &str) {
        let mut unknown = self.unknown_protocols.lock().unwrap_or_else(|e| e.into_inner());
        let count = unknown.entry(signature.to_string()).or_insert(0);
        *count += 1;
        tracing::debug!(chain = %self.chain, event, signature, count = *count, "unknown protocol variant");
    }
}
