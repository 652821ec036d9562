//! End-to-end pipeline tests against a scripted block source and the
//! in-memory store: blocks in, protocol rows out.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use chainsink_core::error::PipelineError;
use chainsink_core::event::{EventInput, EventSignature};
use chainsink_core::store::EvmStore;
use chainsink_core::types::{ContractInfo, EvmBlock, EvmTransaction, RawLog, TokenInfo};
use chainsink_evm::querier::{AbiProvider, BlockSource};
use chainsink_evm::{BlockProcessor, EvmPipeline, EventClassifier, LogDecoder, LogProcessor};
use chainsink_rpc::stream::ShutdownToken;
use chainsink_rpc::TransportError;
use chainsink_storage::InMemoryStore;

const POOL: &str = "0xpool";
const SYNC_TOPIC: &str = "0x1c411e9a96e071241c2f21f7726b17ae89e3cab4c78be50e062b03a9fffbbad1";

/// Serves a fixed set of blocks; the live subscription sends them all,
/// optionally follows with a fatal error, then closes.
struct ScriptedSource {
    blocks: HashMap<u64, EvmBlock>,
    logs: HashMap<u64, Vec<RawLog>>,
    live_order: Vec<u64>,
    fail_after: Option<TransportError>,
}

impl ScriptedSource {
    fn new() -> Self {
        Self {
            blocks: HashMap::new(),
            logs: HashMap::new(),
            live_order: Vec::new(),
            fail_after: None,
        }
    }

    fn with_block(mut self, block: EvmBlock, logs: Vec<RawLog>) -> Self {
        self.live_order.push(block.number);
        self.logs.insert(block.number, logs);
        self.blocks.insert(block.number, block);
        self
    }

    fn failing_with(mut self, error: TransportError) -> Self {
        self.fail_after = Some(error);
        self
    }
}

#[async_trait]
impl BlockSource for ScriptedSource {
    async fn subscribe_blocks(
        &self,
        _duration: Option<Duration>,
        _shutdown: ShutdownToken,
    ) -> Result<mpsc::Receiver<Result<EvmBlock, TransportError>>, PipelineError> {
        let (tx, rx) = mpsc::channel(16);
        let items: Vec<_> = self
            .live_order
            .iter()
            .map(|number| Ok(self.blocks[number].clone()))
            .collect();
        let failure = self.fail_after.as_ref().map(|e| match e {
            TransportError::ConnectExhausted { attempts } => {
                TransportError::ConnectExhausted { attempts: *attempts }
            }
            other => TransportError::WebSocket(other.to_string()),
        });
        tokio::spawn(async move {
            for item in items {
                if tx.send(item).await.is_err() {
                    return;
                }
            }
            if let Some(error) = failure {
                let _ = tx.send(Err(error)).await;
            }
        });
        Ok(rx)
    }

    async fn block_by_number(&self, number: u64) -> Result<Option<EvmBlock>, PipelineError> {
        Ok(self.blocks.get(&number).cloned())
    }

    async fn block_logs(&self, number: u64) -> Result<Vec<RawLog>, PipelineError> {
        Ok(self.logs.get(&number).cloned().unwrap_or_default())
    }
}

struct NoAbis;

#[async_trait]
impl AbiProvider for NoAbis {
    async fn fetch_abi(&self, _address: &str) -> Option<String> {
        None
    }
}

fn sync_signature() -> EventSignature {
    EventSignature {
        signature_hash: SYNC_TOPIC.into(),
        name: "Sync".into(),
        full_signature: "Sync(uint112,uint112)".into(),
        contract_address: None,
        inputs: vec![
            EventInput { name: "reserve0".into(), ty: "uint112".into(), indexed: false },
            EventInput { name: "reserve1".into(), ty: "uint112".into(), indexed: false },
        ],
    }
}

fn pool_info() -> ContractInfo {
    ContractInfo {
        address: POOL.into(),
        factory: "0x5c69bee701ef814a2b6a3edd4b1652cb9cc5aa6f".into(),
        fee: None,
        token0: TokenInfo {
            address: "0xweth".into(),
            name: "Wrapped Ether".into(),
            symbol: "WETH".into(),
            decimals: 18,
        },
        token1: TokenInfo {
            address: "0xusdc".into(),
            name: "USD Coin".into(),
            symbol: "USDC".into(),
            decimals: 6,
        },
        name: "WETH/USDC".into(),
    }
}

fn block(number: u64, transactions: Vec<EvmTransaction>) -> EvmBlock {
    EvmBlock {
        chain: "ethereum".into(),
        number,
        hash: format!("0xhash{number}"),
        parent_hash: format!("0xhash{}", number.saturating_sub(1)),
        timestamp: 1_700_000_000 + number as i64,
        transactions,
    }
}

fn transfer_tx(hash: &str) -> EvmTransaction {
    EvmTransaction {
        hash: hash.into(),
        from: "0xsender".into(),
        to: Some("0xreceiver".into()),
        value: 1_000_000_000_000_000_000,
        gas: 21_000,
        gas_price: 30_000_000_000,
        chain_id: Some(1),
    }
}

/// 5 WETH (18 decimals) and 12000 USDC (6 decimals) as ABI words.
fn sync_log(tx_hash: &str, log_index: u32) -> RawLog {
    RawLog {
        address: POOL.into(),
        topics: vec![SYNC_TOPIC.into()],
        data: format!("0x{:0>64}{:0>64}", "4563918244f40000", "2cb417800"),
        tx_hash: tx_hash.into(),
        log_index,
        removed: false,
    }
}

async fn seeded_store() -> Arc<InMemoryStore> {
    let store = Arc::new(InMemoryStore::new());
    store.insert_event_signature("ethereum", &sync_signature()).await.unwrap();
    store.insert_contract_info("ethereum", &pool_info()).await.unwrap();
    store
}

fn pipeline(source: ScriptedSource, store: Arc<InMemoryStore>) -> EvmPipeline {
    let decoder = LogDecoder::new("ethereum", store.clone());
    let blocks = BlockProcessor::new("ethereum", store.clone());
    let logs = LogProcessor::new("ethereum", store.clone(), decoder, Arc::new(NoAbis));
    let classifier = Arc::new(EventClassifier::new("ethereum", store));
    EvmPipeline::from_parts(
        "ethereum",
        Arc::new(source),
        blocks,
        logs,
        classifier,
        ShutdownToken::new(),
        2,
        100,
    )
}

async fn wait_for_transactions(store: &InMemoryStore, number: u64, want: usize) {
    for _ in 0..100 {
        if store.query_transactions("ethereum", number).await.unwrap().len() >= want {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("transactions never persisted");
}

#[tokio::test]
async fn historical_run_lands_blocks_transactions_and_sync_rows() {
    let store = seeded_store().await;
    let source = ScriptedSource::new()
        .with_block(block(1, vec![transfer_tx("0xtx1")]), vec![sync_log("0xtx1", 0)]);

    pipeline(source, store.clone()).run_historical(1, 3).await.unwrap();

    // block 1 present; 2 and 3 were missing upstream and skipped
    assert!(store.query_block("ethereum", 1).await.unwrap().is_some());
    assert!(store.query_block("ethereum", 2).await.unwrap().is_none());
    wait_for_transactions(&store, 1, 1).await;

    let syncs = store.query_sync_events("ethereum").await.unwrap();
    assert_eq!(syncs.len(), 1);
    let row = &syncs[0];
    assert_eq!(row.contract_address, POOL);
    assert!((row.reserve0 - 5.0).abs() < 1e-12);
    assert!((row.reserve1 - 12_000.0).abs() < 1e-9);
    assert_eq!(row.fee, Some(0.003));
    assert_eq!(row.tx_hash, "0xtx1");
    assert_eq!(row.timestamp, 1_700_000_001);
}

#[tokio::test]
async fn live_run_drains_the_stream_then_returns() {
    let store = seeded_store().await;
    let source = ScriptedSource::new()
        .with_block(block(1, vec![]), vec![sync_log("0xtx1", 0)])
        .with_block(block(2, vec![]), vec![sync_log("0xtx2", 0)]);

    pipeline(source, store.clone()).run(None).await.unwrap();

    assert!(store.query_block("ethereum", 1).await.unwrap().is_some());
    assert!(store.query_block("ethereum", 2).await.unwrap().is_some());
    assert_eq!(store.query_sync_events("ethereum").await.unwrap().len(), 2);
}

#[tokio::test]
async fn fatal_stream_error_fails_the_run_after_processing() {
    let store = seeded_store().await;
    let source = ScriptedSource::new()
        .with_block(block(1, vec![]), vec![])
        .failing_with(TransportError::ConnectExhausted { attempts: 5 });

    let result = pipeline(source, store.clone()).run(None).await;
    assert!(matches!(result, Err(PipelineError::Rpc(_))));
    // the block that arrived before the failure was still ingested
    assert!(store.query_block("ethereum", 1).await.unwrap().is_some());
}

#[tokio::test]
async fn replaying_a_range_is_idempotent() {
    let store = seeded_store().await;

    for _ in 0..2 {
        let source = ScriptedSource::new()
            .with_block(block(1, vec![transfer_tx("0xtx1")]), vec![sync_log("0xtx1", 0)]);
        pipeline(source, store.clone()).run_historical(1, 1).await.unwrap();
    }

    wait_for_transactions(&store, 1, 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(store.query_transactions("ethereum", 1).await.unwrap().len(), 1);
    assert_eq!(store.query_sync_events("ethereum").await.unwrap().len(), 1);
}
