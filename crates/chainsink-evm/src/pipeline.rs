//! Pipeline orchestration.
//!
//! Blocks arrive from the stream (or by number in historical mode), go
//! through the block and log processors, and the decoded events fan out
//! over a bounded queue to a fixed pool of classification workers.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::task::{JoinHandle, JoinSet};

use chainsink_core::cache::{self, BoundedCache};
use chainsink_core::error::PipelineError;
use chainsink_core::event::{DecodedEvent, DecodedLog};
use chainsink_core::store::EvmStore;
use chainsink_core::types::EvmBlock;
use chainsink_rpc::abi::AbiFetcher;
use chainsink_rpc::stream::{ShutdownToken, StreamConfig};

use crate::blocks::BlockProcessor;
use crate::decoder::LogDecoder;
use crate::events::EventClassifier;
use crate::logs::LogProcessor;
use crate::metadata::MetadataResolver;
use crate::querier::{capabilities, BlockSource, EvmQuerier};

pub const DEFAULT_EVENT_WORKERS: usize = 8;
pub const DEFAULT_EVENT_QUEUE: usize = 10_000;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub chain: String,
    pub http_url: String,
    pub ws_url: String,
    /// Etherscan-style explorer endpoint for ABI fetches.
    pub abi_base_url: Option<String>,
    pub abi_api_key: Option<String>,
    pub event_workers: usize,
    pub event_queue: usize,
    pub batch_size: usize,
    pub stream: StreamConfig,
}

impl PipelineConfig {
    pub fn new(
        chain: impl Into<String>,
        http_url: impl Into<String>,
        ws_url: impl Into<String>,
    ) -> Self {
        Self {
            chain: chain.into(),
            http_url: http_url.into(),
            ws_url: ws_url.into(),
            abi_base_url: None,
            abi_api_key: None,
            event_workers: DEFAULT_EVENT_WORKERS,
            event_queue: DEFAULT_EVENT_QUEUE,
            batch_size: crate::blocks::DEFAULT_BATCH_SIZE,
            stream: StreamConfig::default(),
        }
    }
}

struct EventJob {
    event: DecodedEvent,
    tx_hash: String,
    timestamp: i64,
}

pub struct EvmPipeline {
    chain: String,
    source: Arc<dyn BlockSource>,
    blocks: BlockProcessor,
    logs: LogProcessor,
    classifier: Arc<EventClassifier>,
    shutdown: ShutdownToken,
    event_workers: usize,
    event_queue: usize,
}

impl EvmPipeline {
    /// Assemble a pipeline against a live node.
    pub fn new(config: PipelineConfig, store: Arc<dyn EvmStore>) -> Self {
        let mut querier = EvmQuerier::new(&config.chain, &config.http_url, &config.ws_url)
            .with_stream_config(config.stream.clone());
        if let Some(base_url) = &config.abi_base_url {
            let mut fetcher = AbiFetcher::new(base_url);
            if let Some(key) = &config.abi_api_key {
                fetcher = fetcher.with_api_key(key);
            }
            querier = querier.with_abi_fetcher(fetcher);
        }
        let (source, caller, abi_provider) = capabilities(Arc::new(querier));

        let signature_cache = Arc::new(BoundedCache::default());
        let abi_cache = Arc::new(BoundedCache::default());
        // detached; sweepers die with the runtime
        let _ = cache::spawn_sweeper(signature_cache.clone(), cache::DEFAULT_SWEEP_INTERVAL);
        let _ = cache::spawn_sweeper(abi_cache.clone(), cache::DEFAULT_SWEEP_INTERVAL);

        let pool = Arc::new(Semaphore::new(config.event_workers));
        let resolver = Arc::new(MetadataResolver::new(&config.chain, caller, store.clone()));
        let decoder =
            LogDecoder::new(&config.chain, store.clone()).with_signature_cache(signature_cache);
        let blocks = BlockProcessor::new(&config.chain, store.clone())
            .with_batch_size(config.batch_size)
            .with_worker_pool(pool.clone());
        let logs = LogProcessor::new(&config.chain, store.clone(), decoder, abi_provider)
            .with_resolver(resolver)
            .with_abi_cache(abi_cache)
            .with_batch_size(config.batch_size)
            .with_worker_pool(pool);
        let classifier = Arc::new(EventClassifier::new(&config.chain, store));

        Self {
            chain: config.chain,
            source,
            blocks,
            logs,
            classifier,
            shutdown: ShutdownToken::new(),
            event_workers: config.event_workers,
            event_queue: config.event_queue,
        }
    }

    /// Assemble a pipeline from pre-built parts (tests, custom sources).
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        chain: impl Into<String>,
        source: Arc<dyn BlockSource>,
        blocks: BlockProcessor,
        logs: LogProcessor,
        classifier: Arc<EventClassifier>,
        shutdown: ShutdownToken,
        event_workers: usize,
        event_queue: usize,
    ) -> Self {
        Self {
            chain: chain.into(),
            source,
            blocks,
            logs,
            classifier,
            shutdown,
            event_workers: event_workers.max(1),
            event_queue: event_queue.max(1),
        }
    }

    pub fn shutdown_token(&self) -> ShutdownToken {
        self.shutdown.clone()
    }

    /// Request a graceful stop: the stream winds down and workers drain.
    pub fn stop(&self) {
        self.shutdown.shutdown();
    }

    /// Stream and process live blocks until the duration elapses, the
    /// token fires, or the stream fails fatally.
    pub async fn run(&self, duration: Option<Duration>) -> Result<(), PipelineError> {
        tracing::info!(chain = %self.chain, ?duration, "pipeline starting");
        let mut blocks_rx = self.source.subscribe_blocks(duration, self.shutdown.clone()).await?;
        let (event_tx, mut workers) = self.spawn_event_workers();

        let mut result = Ok(());
        while let Some(item) = blocks_rx.recv().await {
            if self.shutdown.is_shutdown() {
                break;
            }
            match item {
                Ok(block) => {
                    let number = block.number;
                    if let Err(e) = self.handle_block(block, &event_tx).await {
                        tracing::error!(chain = %self.chain, number, error = %e, "block processing failed");
                    }
                }
                Err(e) => {
                    result = Err(PipelineError::Rpc(e.to_string()));
                    break;
                }
            }
        }

        drop(event_tx);
        while workers.join_next().await.is_some() {}
        tracing::info!(chain = %self.chain, "pipeline stopped");
        result
    }

    /// Process an inclusive block range sequentially by number.
    pub async fn run_historical(&self, start: u64, end: u64) -> Result<(), PipelineError> {
        tracing::info!(chain = %self.chain, start, end, "historical run starting");
        let (event_tx, mut workers) = self.spawn_event_workers();

        for number in start..=end {
            if self.shutdown.is_shutdown() {
                tracing::info!(chain = %self.chain, number, "historical run interrupted");
                break;
            }
            match self.source.block_by_number(number).await {
                Ok(Some(block)) => {
                    if let Err(e) = self.handle_block(block, &event_tx).await {
                        tracing::error!(chain = %self.chain, number, error = %e, "block processing failed");
                    }
                }
                Ok(None) => {
                    tracing::warn!(chain = %self.chain, number, "block not found, skipped");
                }
                Err(e) => {
                    tracing::error!(chain = %self.chain, number, error = %e, "block fetch failed");
                }
            }
        }

        drop(event_tx);
        while workers.join_next().await.is_some() {}
        tracing::info!(chain = %self.chain, "historical run finished");
        Ok(())
    }

    async fn handle_block(
        &self,
        block: EvmBlock,
        event_tx: &mpsc::Sender<EventJob>,
    ) -> Result<(), PipelineError> {
        let (number, timestamp) = self.blocks.process(&block).await?;
        let logs = self.source.block_logs(number).await?;
        let grouped = self.logs.process(number, logs).await;

        for (tx_hash, decoded) in grouped {
            for log in decoded {
                if let DecodedLog::Event(event) = log {
                    let job = EventJob { event, tx_hash: tx_hash.clone(), timestamp };
                    if event_tx.send(job).await.is_err() {
                        return Ok(());
                    }
                }
            }
        }
        Ok(())
    }

    fn spawn_event_workers(&self) -> (mpsc::Sender<EventJob>, JoinSet<()>) {
        let (tx, rx) = mpsc::channel::<EventJob>(self.event_queue);
        let rx = Arc::new(Mutex::new(rx));
        let mut workers = JoinSet::new();
        for _ in 0..self.event_workers {
            let rx = Arc::clone(&rx);
            let classifier = Arc::clone(&self.classifier);
            workers.spawn(async move {
                loop {
                    let job = { rx.lock().await.recv().await };
                    let Some(job) = job else { break };
                    classifier.process_event(&job.event, &job.tx_hash, job.timestamp).await;
                }
            });
        }
        (tx, workers)
    }
}

/// Trip the token on Ctrl-C so `run` winds down gracefully.
pub fn spawn_signal_handler(token: ShutdownToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, shutting down");
            token.shutdown();
        }
    })
}
