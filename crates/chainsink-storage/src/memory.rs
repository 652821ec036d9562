//! In-memory store backend.
//!
//! Mirrors the SQLite backend's conflict semantics with plain maps; used
//! by tests and as a throwaway sink.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use chainsink_core::error::StoreError;
use chainsink_core::event::EventSignature;
use chainsink_core::store::EvmStore;
use chainsink_core::types::{BlockRow, ContractInfo, FeeRow, SwapRow, SyncRow, TokenInfo, TxRow};

type Key = (String, String);

#[derive(Default)]
pub struct InMemoryStore {
    blocks: Mutex<HashMap<(String, u64), BlockRow>>,
    transactions: Mutex<HashMap<(String, i64, String), TxRow>>,
    signatures: Mutex<HashMap<Key, EventSignature>>,
    abis: Mutex<HashMap<Key, String>>,
    contracts: Mutex<HashMap<Key, ContractInfo>>,
    tokens: Mutex<HashMap<Key, TokenInfo>>,
    swaps: Mutex<HashMap<(String, String, u32), SwapRow>>,
    syncs: Mutex<HashMap<(String, String, u32), SyncRow>>,
    fees: Mutex<HashMap<(String, String, u32), FeeRow>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[async_trait]
impl EvmStore for InMemoryStore {
    async fn insert_block(&self, chain: &str, block: &BlockRow) -> Result<(), StoreError> {
        lock(&self.blocks)
            .entry((chain.to_string(), block.number))
            .or_insert_with(|| block.clone());
        Ok(())
    }

    async fn query_block(&self, chain: &str, number: u64) -> Result<Option<BlockRow>, StoreError> {
        Ok(lock(&self.blocks).get(&(chain.to_string(), number)).cloned())
    }

    async fn insert_transactions_bulk(
        &self,
        chain: &str,
        rows: &[TxRow],
    ) -> Result<(), StoreError> {
        let mut transactions = lock(&self.transactions);
        for row in rows {
            transactions
                .entry((chain.to_string(), row.timestamp, row.tx_hash.clone()))
                .or_insert_with(|| row.clone());
        }
        Ok(())
    }

    async fn query_transactions(
        &self,
        chain: &str,
        block_number: u64,
    ) -> Result<Vec<TxRow>, StoreError> {
        let mut rows: Vec<TxRow> = lock(&self.transactions)
            .iter()
            .filter(|((c, _, _), row)| c == chain && row.block_number == block_number)
            .map(|(_, row)| row.clone())
            .collect();
        rows.sort_by(|a, b| a.tx_hash.cmp(&b.tx_hash));
        Ok(rows)
    }

    async fn insert_event_signature(
        &self,
        chain: &str,
        signature: &EventSignature,
    ) -> Result<(), StoreError> {
        let mut signatures = lock(&self.signatures);
        let key = (chain.to_string(), signature.signature_hash.clone());
        match signatures.get_mut(&key) {
            Some(existing) => {
                // refresh descriptive fields, never clobber a known contract
                let contract_address = existing
                    .contract_address
                    .clone()
                    .or_else(|| signature.contract_address.clone());
                *existing = EventSignature { contract_address, ..signature.clone() };
            }
            None => {
                signatures.insert(key, signature.clone());
            }
        }
        Ok(())
    }

    async fn query_event_signature(
        &self,
        chain: &str,
        signature_hash: &str,
    ) -> Result<Option<EventSignature>, StoreError> {
        Ok(lock(&self.signatures).get(&(chain.to_string(), signature_hash.to_string())).cloned())
    }

    async fn insert_contract_abi(
        &self,
        chain: &str,
        address: &str,
        abi_json: &str,
    ) -> Result<(), StoreError> {
        lock(&self.abis).insert((chain.to_string(), address.to_string()), abi_json.to_string());
        Ok(())
    }

    async fn query_contract_abi(
        &self,
        chain: &str,
        address: &str,
    ) -> Result<Option<String>, StoreError> {
        Ok(lock(&self.abis).get(&(chain.to_string(), address.to_string())).cloned())
    }

    async fn insert_contract_info(
        &self,
        chain: &str,
        info: &ContractInfo,
    ) -> Result<(), StoreError> {
        lock(&self.contracts).insert((chain.to_string(), info.address.clone()), info.clone());
        Ok(())
    }

    async fn query_contract_info(
        &self,
        chain: &str,
        address: &str,
    ) -> Result<Option<ContractInfo>, StoreError> {
        Ok(lock(&self.contracts).get(&(chain.to_string(), address.to_string())).cloned())
    }

    async fn insert_token_info(&self, chain: &str, info: &TokenInfo) -> Result<(), StoreError> {
        lock(&self.tokens).insert((chain.to_string(), info.address.clone()), info.clone());
        Ok(())
    }

    async fn query_token_info(
        &self,
        chain: &str,
        address: &str,
    ) -> Result<Option<TokenInfo>, StoreError> {
        Ok(lock(&self.tokens).get(&(chain.to_string(), address.to_string())).cloned())
    }

    async fn insert_swap_event(&self, chain: &str, row: &SwapRow) -> Result<(), StoreError> {
        lock(&self.swaps)
            .entry((chain.to_string(), row.tx_hash.clone(), row.log_index))
            .or_insert_with(|| row.clone());
        Ok(())
    }

    async fn query_swap_events(&self, chain: &str) -> Result<Vec<SwapRow>, StoreError> {
        let mut rows: Vec<SwapRow> = lock(&self.swaps)
            .iter()
            .filter(|((c, _, _), _)| c == chain)
            .map(|(_, row)| row.clone())
            .collect();
        rows.sort_by_key(|row| (row.timestamp, row.log_index));
        Ok(rows)
    }

    async fn insert_sync_event(&self, chain: &str, row: &SyncRow) -> Result<(), StoreError> {
        lock(&self.syncs)
            .entry((chain.to_string(), row.tx_hash.clone(), row.log_index))
            .or_insert_with(|| row.clone());
        Ok(())
    }

    async fn query_sync_events(&self, chain: &str) -> Result<Vec<SyncRow>, StoreError> {
        let mut rows: Vec<SyncRow> = lock(&self.syncs)
            .iter()
            .filter(|((c, _, _), _)| c == chain)
            .map(|(_, row)| row.clone())
            .collect();
        rows.sort_by_key(|row| (row.timestamp, row.log_index));
        Ok(rows)
    }

    async fn insert_fee_event(&self, chain: &str, row: &FeeRow) -> Result<(), StoreError> {
        lock(&self.fees)
            .entry((chain.to_string(), row.tx_hash.clone(), row.log_index))
            .or_insert_with(|| row.clone());
        Ok(())
    }

    async fn query_fee_events(&self, chain: &str) -> Result<Vec<FeeRow>, StoreError> {
        let mut rows: Vec<FeeRow> = lock(&self.fees)
            .iter()
            .filter(|((c, _, _), _)| c == chain)
            .map(|(_, row)| row.clone())
            .collect();
        rows.sort_by_key(|row| (row.timestamp, row.log_index));
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainsink_core::event::EventInput;

    fn signature(contract: Option<&str>) -> EventSignature {
        EventSignature {
            signature_hash: "0xsig".into(),
            name: "Transfer".into(),
            full_signature: "Transfer(address,address,uint256)".into(),
            contract_address: contract.map(str::to_string),
            inputs: vec![EventInput { name: "from".into(), ty: "address".into(), indexed: true }],
        }
    }

    #[tokio::test]
    async fn duplicate_block_insert_is_a_noop() {
        let store = InMemoryStore::new();
        let row = BlockRow { number: 1, hash: "0xa".into(), parent_hash: "0x0".into(), timestamp: 10 };
        store.insert_block("ethereum", &row).await.unwrap();
        let replay = BlockRow { hash: "0xchanged".into(), ..row.clone() };
        store.insert_block("ethereum", &replay).await.unwrap();
        let found = store.query_block("ethereum", 1).await.unwrap().unwrap();
        assert_eq!(found.hash, "0xa");
    }

    #[tokio::test]
    async fn signature_conflict_keeps_existing_contract() {
        let store = InMemoryStore::new();
        store.insert_event_signature("ethereum", &signature(Some("0xfirst"))).await.unwrap();
        store.insert_event_signature("ethereum", &signature(Some("0xsecond"))).await.unwrap();
        let found = store.query_event_signature("ethereum", "0xsig").await.unwrap().unwrap();
        assert_eq!(found.contract_address.as_deref(), Some("0xfirst"));
    }

    #[tokio::test]
    async fn signature_conflict_fills_missing_contract() {
        let store = InMemoryStore::new();
        store.insert_event_signature("ethereum", &signature(None)).await.unwrap();
        store.insert_event_signature("ethereum", &signature(Some("0xlate"))).await.unwrap();
        let found = store.query_event_signature("ethereum", "0xsig").await.unwrap().unwrap();
        assert_eq!(found.contract_address.as_deref(), Some("0xlate"));
    }

    #[tokio::test]
    async fn chains_are_isolated() {
        let store = InMemoryStore::new();
        let row = BlockRow { number: 5, hash: "0xa".into(), parent_hash: "0x0".into(), timestamp: 1 };
        store.insert_block("ethereum", &row).await.unwrap();
        assert!(store.query_block("base", 5).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn swap_dedupe_key_is_tx_and_log_index() {
        let store = InMemoryStore::new();
        let row = SwapRow {
            contract_address: "0xpool".into(),
            token0_symbol: "WETH".into(),
            token1_symbol: "USDC".into(),
            amount0: 1.0,
            amount1: -2500.0,
            tx_hash: "0xtx".into(),
            log_index: 3,
            timestamp: 100,
        };
        store.insert_swap_event("ethereum", &row).await.unwrap();
        store.insert_swap_event("ethereum", &row).await.unwrap();
        let mut other = row.clone();
        other.log_index = 4;
        store.insert_swap_event("ethereum", &other).await.unwrap();
        assert_eq!(store.query_swap_events("ethereum").await.unwrap().len(), 2);
    }
}
