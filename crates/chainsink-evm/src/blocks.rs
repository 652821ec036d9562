//! Block and transaction persistence.
//!
//! `process` persists the header row synchronously and hands the
//! transaction batches to a bounded worker pool; one bulk insert per
//! block. A failed batch is logged and dropped, it never fails the block.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use chainsink_core::chain::numeric_chain_id;
use chainsink_core::error::PipelineError;
use chainsink_core::store::EvmStore;
use chainsink_core::types::{BlockRow, EvmBlock, EvmTransaction, TxRow};

pub const DEFAULT_BATCH_SIZE: usize = 1000;
pub const DEFAULT_WORKERS: usize = 8;

#[derive(Clone)]
pub struct BlockProcessor {
    chain: String,
    chain_id: Option<u64>,
    store: Arc<dyn EvmStore>,
    pool: Arc<Semaphore>,
    batch_size: usize,
}

impl BlockProcessor {
    pub fn new(chain: impl Into<String>, store: Arc<dyn EvmStore>) -> Self {
        let chain = chain.into();
        Self {
            chain_id: numeric_chain_id(&chain),
            chain,
            store,
            pool: Arc::new(Semaphore::new(DEFAULT_WORKERS)),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_worker_pool(mut self, pool: Arc<Semaphore>) -> Self {
        self.pool = pool;
        self
    }

    /// Persist the block header, submit its transactions for background
    /// persistence, and return (number, timestamp) for the log stage.
    pub async fn process(&self, block: &EvmBlock) -> Result<(u64, i64), PipelineError> {
        let row = BlockRow {
            number: block.number,
            hash: block.hash.clone(),
            parent_hash: block.parent_hash.clone(),
            timestamp: block.timestamp,
        };
        self.store.insert_block(&self.chain, &row).await?;

        if !block.transactions.is_empty() {
            let this = self.clone();
            let transactions = block.transactions.clone();
            let (number, timestamp) = (block.number, block.timestamp);
            tokio::spawn(async move {
                this.persist_transactions(transactions, number, timestamp).await;
            });
        }
        Ok((block.number, block.timestamp))
    }

    async fn persist_transactions(
        &self,
        transactions: Vec<EvmTransaction>,
        block_number: u64,
        timestamp: i64,
    ) {
        let mut tasks: JoinSet<Vec<TxRow>> = JoinSet::new();
        for chunk in transactions.chunks(self.batch_size) {
            let Ok(permit) = self.pool.clone().acquire_owned().await else {
                return;
            };
            let chunk = chunk.to_vec();
            let this = self.clone();
            tasks.spawn(async move {
                let _permit = permit;
                this.build_rows(&chunk, block_number, timestamp)
            });
        }

        let mut rows = Vec::with_capacity(transactions.len());
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(chunk_rows) => rows.extend(chunk_rows),
                Err(e) => {
                    tracing::error!(
                        chain = %self.chain,
                        block_number,
                        error = %e,
                        "transaction batch dropped"
                    );
                }
            }
        }

        match self.store.insert_transactions_bulk(&self.chain, &rows).await {
            Ok(()) => tracing::debug!(
                chain = %self.chain,
                block_number,
                rows = rows.len(),
                "transactions persisted"
            ),
            Err(e) => tracing::error!(
                chain = %self.chain,
                block_number,
                error = %e,
                "transaction insert failed"
            ),
        }
    }

    fn build_rows(
        &self,
        transactions: &[EvmTransaction],
        block_number: u64,
        timestamp: i64,
    ) -> Vec<TxRow> {
        transactions
            .iter()
            .map(|tx| TxRow {
                block_number,
                chain: self.chain.clone(),
                tx_hash: tx.hash.clone(),
                chain_id: tx.chain_id.or(self.chain_id),
                from_address: tx.from.clone(),
                to_address: tx.to.clone(),
                value: tx.value,
                total_gas: tx.gas as u128 * tx.gas_price,
                timestamp,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainsink_storage::memory::InMemoryStore;
    use std::time::Duration;

    fn block(chain: &str, number: u64, txs: Vec<EvmTransaction>) -> EvmBlock {
        EvmBlock {
            chain: chain.into(),
            number,
            hash: format!("0xhash{number}"),
            parent_hash: format!("0xhash{}", number.saturating_sub(1)),
            timestamp: 1_700_000_000 + number as i64,
            transactions: txs,
        }
    }

    fn tx(hash: &str, chain_id: Option<u64>) -> EvmTransaction {
        EvmTransaction {
            hash: hash.into(),
            from: "0xsender".into(),
            to: Some("0xreceiver".into()),
            value: 5,
            gas: 21_000,
            gas_price: 2,
            chain_id,
        }
    }

    async fn wait_for_rows(store: &InMemoryStore, chain: &str, number: u64, want: usize) -> Vec<TxRow> {
        for _ in 0..100 {
            let rows = store.query_transactions(chain, number).await.unwrap();
            if rows.len() >= want {
                return rows;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("transactions never persisted");
    }

    #[tokio::test]
    async fn process_returns_number_and_timestamp() {
        let store = Arc::new(InMemoryStore::new());
        let processor = BlockProcessor::new("ethereum", store.clone());
        let block = block("ethereum", 100, vec![]);
        let (number, timestamp) = processor.process(&block).await.unwrap();
        assert_eq!(number, 100);
        assert_eq!(timestamp, block.timestamp);
        assert!(store.query_block("ethereum", 100).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn transactions_are_persisted_in_bulk() {
        let store = Arc::new(InMemoryStore::new());
        let processor = BlockProcessor::new("ethereum", store.clone()).with_batch_size(2);
        let txs: Vec<_> = (0..5).map(|i| tx(&format!("0xtx{i}"), Some(1))).collect();
        processor.process(&block("ethereum", 7, txs)).await.unwrap();

        let rows = wait_for_rows(&store, "ethereum", 7, 5).await;
        assert_eq!(rows.len(), 5);
        assert!(rows.iter().all(|r| r.total_gas == 42_000));
    }

    #[tokio::test]
    async fn missing_chain_id_defaults_to_well_known_id() {
        let store = Arc::new(InMemoryStore::new());
        let processor = BlockProcessor::new("ethereum", store.clone());
        processor
            .process(&block("ethereum", 8, vec![tx("0xtx", None)]))
            .await
            .unwrap();
        let rows = wait_for_rows(&store, "ethereum", 8, 1).await;
        assert_eq!(rows[0].chain_id, Some(1));
    }

    #[tokio::test]
    async fn reprocessing_a_block_is_idempotent() {
        let store = Arc::new(InMemoryStore::new());
        let processor = BlockProcessor::new("base", store.clone());
        let block = block("base", 9, vec![tx("0xtx", Some(8453))]);
        processor.process(&block).await.unwrap();
        wait_for_rows(&store, "base", 9, 1).await;
        processor.process(&block).await.unwrap();
        // give the second background persist a chance to run
        tokio::time::sleep(Duration::from_millis(50)).await;
        let rows = store.query_transactions("base", 9).await.unwrap();
        assert_eq!(rows.len(), 1);
    }
}
