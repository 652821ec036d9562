//! Log batch decoding.
//!
//! ABIs for every unique emitting address are prefetched through the
//! bounded cache (store first, then the explorer), batches decode on a
//! bounded pool, and results come back grouped per transaction in log
//! order.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use chainsink_core::cache::BoundedCache;
use chainsink_core::event::DecodedLog;
use chainsink_core::store::EvmStore;
use chainsink_core::types::RawLog;

use crate::decoder::LogDecoder;
use crate::metadata::{ContractResolution, MetadataResolver};
use crate::querier::AbiProvider;

pub const DEFAULT_BATCH_SIZE: usize = 1000;

pub struct LogProcessor {
    chain: String,
    store: Arc<dyn EvmStore>,
    decoder: LogDecoder,
    abi_provider: Arc<dyn AbiProvider>,
    abis: Arc<BoundedCache<String, String>>,
    resolver: Option<Arc<MetadataResolver>>,
    pool: Arc<Semaphore>,
    batch_size: usize,
}

impl LogProcessor {
    pub fn new(
        chain: impl Into<String>,
        store: Arc<dyn EvmStore>,
        decoder: LogDecoder,
        abi_provider: Arc<dyn AbiProvider>,
    ) -> Self {
        Self {
            chain: chain.into(),
            store,
            decoder,
            abi_provider,
            abis: Arc::new(BoundedCache::default()),
            resolver: None,
            pool: Arc::new(Semaphore::new(crate::blocks::DEFAULT_WORKERS)),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Attach a resolver; freshly fetched ABIs then trigger background
    /// pool-metadata resolution.
    pub fn with_resolver(mut self, resolver: Arc<MetadataResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn with_abi_cache(mut self, cache: Arc<BoundedCache<String, String>>) -> Self {
        self.abis = cache;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_worker_pool(mut self, pool: Arc<Semaphore>) -> Self {
        self.pool = pool;
        self
    }

    /// Decode a block's logs, returning them grouped by transaction hash
    /// with per-transaction log order preserved.
    pub async fn process(
        &self,
        block_number: u64,
        logs: Vec<RawLog>,
    ) -> HashMap<String, Vec<DecodedLog>> {
        let addresses: HashSet<String> = logs.iter().map(|log| log.address.clone()).collect();
        let mut abi_map: HashMap<String, Option<String>> = HashMap::with_capacity(addresses.len());
        for address in addresses {
            let abi = self.contract_abi(&address).await;
            abi_map.insert(address, abi);
        }
        let abi_map = Arc::new(abi_map);

        let mut tasks: JoinSet<(usize, Vec<(String, DecodedLog)>)> = JoinSet::new();
        for (batch_index, chunk) in logs.chunks(self.batch_size).enumerate() {
            let Ok(permit) = self.pool.clone().acquire_owned().await else {
                break;
            };
            let chunk = chunk.to_vec();
            let decoder = self.decoder.clone();
            let abi_map = Arc::clone(&abi_map);
            tasks.spawn(async move {
                let _permit = permit;
                let mut decoded = Vec::with_capacity(chunk.len());
                for log in &chunk {
                    let abi = abi_map.get(&log.address).and_then(|a| a.as_deref());
                    if let Some(result) = decoder.decode_log(log, abi).await {
                        decoded.push((log.tx_hash.clone(), result));
                    }
                }
                (batch_index, decoded)
            });
        }

        let mut batches: Vec<(usize, Vec<(String, DecodedLog)>)> = Vec::new();
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(batch) => batches.push(batch),
                Err(e) => {
                    tracing::error!(chain = %self.chain, block_number, error = %e, "log batch dropped");
                }
            }
        }
        batches.sort_by_key(|(index, _)| *index);

        let mut grouped: HashMap<String, Vec<DecodedLog>> = HashMap::new();
        for (_, decoded) in batches {
            for (tx_hash, log) in decoded {
                grouped.entry(tx_hash).or_default().push(log);
            }
        }
        grouped
    }

    /// ABI lookup: cache, then store, then the explorer. A fetch hit is
    /// persisted and, with a resolver attached, kicks off contract
    /// resolution in the background.
    pub async fn contract_abi(&self, address: &str) -> Option<String> {
        if let Some(abi) = self.abis.get(&address.to_string()) {
            return Some(abi);
        }

        match self.store.query_contract_abi(&self.chain, address).await {
            Ok(Some(abi)) => {
                self.abis.set(address.to_string(), abi.clone());
                return Some(abi);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(chain = %self.chain, address, error = %e, "abi lookup failed");
            }
        }

        let abi = self.abi_provider.fetch_abi(address).await?;
        if let Err(e) = self.store.insert_contract_abi(&self.chain, address, &abi).await {
            tracing::warn!(chain = %self.chain, address, error = %e, "abi persist failed");
        }
        self.abis.set(address.to_string(), abi.clone());

        if let Some(resolver) = &self.resolver {
            let resolver = Arc::clone(resolver);
            let address = address.to_string();
            let abi_json = abi.clone();
            let chain = self.chain.clone();
            tokio::spawn(async move {
                match resolver.resolve_contract(&address, &abi_json, false).await {
                    ContractResolution::Resolved(info) => {
                        tracing::debug!(chain = %chain, address, pair = %info.name, "new contract resolved");
                    }
                    ContractResolution::NotAPool => {
                        tracing::debug!(chain = %chain, address, "new contract is not a pool");
                    }
                    ContractResolution::Failed(reason) => {
                        tracing::debug!(chain = %chain, address, reason, "contract resolution failed");
                    }
                }
            });
        }
        Some(abi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chainsink_core::event::{EventInput, EventSignature};
    use chainsink_storage::memory::InMemoryStore;

    struct NoAbis;

    #[async_trait]
    impl AbiProvider for NoAbis {
        async fn fetch_abi(&self, _address: &str) -> Option<String> {
            None
        }
    }

    struct OneAbi(String);

    #[async_trait]
    impl AbiProvider for OneAbi {
        async fn fetch_abi(&self, _address: &str) -> Option<String> {
            Some(self.0.clone())
        }
    }

    const TRANSFER_TOPIC: &str =
        "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";

    fn transfer_signature() -> EventSignature {
        EventSignature {
            signature_hash: TRANSFER_TOPIC.into(),
            name: "Transfer".into(),
            full_signature: "Transfer(address,address,uint256)".into(),
            contract_address: None,
            inputs: vec![
                EventInput { name: "from".into(), ty: "address".into(), indexed: true },
                EventInput { name: "to".into(), ty: "address".into(), indexed: true },
                EventInput { name: "value".into(), ty: "uint256".into(), indexed: false },
            ],
        }
    }

    fn transfer_log(tx_hash: &str, log_index: u32) -> RawLog {
        RawLog {
            address: "0xtoken".into(),
            topics: vec![
                TRANSFER_TOPIC.into(),
                format!("0x{:0>64}", "11"),
                format!("0x{:0>64}", "22"),
            ],
            data: format!("0x{:0>64}", "3e8"),
            tx_hash: tx_hash.into(),
            log_index,
            removed: false,
        }
    }

    fn processor(store: Arc<InMemoryStore>, provider: Arc<dyn AbiProvider>) -> LogProcessor {
        let decoder = LogDecoder::new("ethereum", store.clone());
        LogProcessor::new("ethereum", store, decoder, provider)
    }

    #[tokio::test]
    async fn logs_group_by_transaction_in_order() {
        let store = Arc::new(InMemoryStore::new());
        store.insert_event_signature("ethereum", &transfer_signature()).await.unwrap();
        let processor = processor(store, Arc::new(NoAbis));

        let logs = vec![
            transfer_log("0xtx1", 0),
            transfer_log("0xtx2", 1),
            transfer_log("0xtx1", 2),
        ];
        let grouped = processor.process(1, logs).await;
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped["0xtx1"].len(), 2);
        assert_eq!(grouped["0xtx1"][0].log_index(), 0);
        assert_eq!(grouped["0xtx1"][1].log_index(), 2);
        assert_eq!(grouped["0xtx2"].len(), 1);
    }

    #[tokio::test]
    async fn order_survives_multiple_batches() {
        let store = Arc::new(InMemoryStore::new());
        store.insert_event_signature("ethereum", &transfer_signature()).await.unwrap();
        let processor = processor(store, Arc::new(NoAbis)).with_batch_size(2);

        let logs: Vec<_> = (0..7).map(|i| transfer_log("0xtx", i)).collect();
        let grouped = processor.process(1, logs).await;
        let indices: Vec<_> = grouped["0xtx"].iter().map(|d| d.log_index()).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn fetched_abi_is_persisted_and_cached() {
        let store = Arc::new(InMemoryStore::new());
        let abi = r#"[{"type":"event","name":"Transfer","inputs":[]}]"#;
        let processor = processor(store.clone(), Arc::new(OneAbi(abi.into())));

        let first = processor.contract_abi("0xtoken").await;
        assert_eq!(first.as_deref(), Some(abi));
        assert_eq!(
            store.query_contract_abi("ethereum", "0xtoken").await.unwrap().as_deref(),
            Some(abi)
        );
        // second hit comes from the cache
        assert_eq!(processor.contract_abi("0xtoken").await.as_deref(), Some(abi));
    }

    #[tokio::test]
    async fn missing_abi_reads_as_absent() {
        let store = Arc::new(InMemoryStore::new());
        let processor = processor(store, Arc::new(NoAbis));
        assert!(processor.contract_abi("0xunverified").await.is_none());
    }
}
