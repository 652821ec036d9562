//! Chain-facing capability traits and their node-backed implementation.
//!
//! The pipeline is composed against these seams; tests swap in mock
//! implementations.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use chainsink_core::error::PipelineError;
use chainsink_core::types::{EvmBlock, RawLog};
use chainsink_rpc::abi::AbiFetcher;
use chainsink_rpc::http::HttpClient;
use chainsink_rpc::stream::{BlockStream, ShutdownToken, StreamConfig};
use chainsink_rpc::TransportError;

fn rpc_err(e: TransportError) -> PipelineError {
    PipelineError::Rpc(e.to_string())
}

/// Live and historical block access.
#[async_trait]
pub trait BlockSource: Send + Sync {
    /// Start a live subscription; blocks (or a fatal transport error)
    /// arrive on the returned channel.
    async fn subscribe_blocks(
        &self,
        duration: Option<Duration>,
        shutdown: ShutdownToken,
    ) -> Result<mpsc::Receiver<Result<EvmBlock, TransportError>>, PipelineError>;

    async fn block_by_number(&self, number: u64) -> Result<Option<EvmBlock>, PipelineError>;

    async fn block_logs(&self, number: u64) -> Result<Vec<RawLog>, PipelineError>;
}

/// Read-only contract state access.
#[async_trait]
pub trait ContractCaller: Send + Sync {
    async fn eth_call(&self, to: &str, data: &str) -> Result<String, PipelineError>;

    async fn get_code(&self, address: &str) -> Result<String, PipelineError>;
}

/// Best-effort ABI lookup from an external source.
#[async_trait]
pub trait AbiProvider: Send + Sync {
    async fn fetch_abi(&self, address: &str) -> Option<String>;
}

/// Node-backed implementation of the chain capabilities: HTTP for
/// request/response, WebSocket for streaming, explorer API for ABIs.
pub struct EvmQuerier {
    chain: String,
    http: HttpClient,
    ws_url: String,
    stream_config: StreamConfig,
    abi_fetcher: Option<AbiFetcher>,
}

impl EvmQuerier {
    pub fn new(
        chain: impl Into<String>,
        http_url: impl Into<String>,
        ws_url: impl Into<String>,
    ) -> Self {
        let chain = chain.into();
        Self {
            http: HttpClient::new(chain.clone(), http_url),
            chain,
            ws_url: ws_url.into(),
            stream_config: StreamConfig::default(),
            abi_fetcher: None,
        }
    }

    pub fn with_stream_config(mut self, config: StreamConfig) -> Self {
        self.stream_config = config;
        self
    }

    pub fn with_abi_fetcher(mut self, fetcher: AbiFetcher) -> Self {
        self.abi_fetcher = Some(fetcher);
        self
    }

    pub fn chain(&self) -> &str {
        &self.chain
    }

    pub async fn latest_block_number(&self) -> Result<u64, PipelineError> {
        self.http.latest_block_number().await.map_err(rpc_err)
    }
}

#[async_trait]
impl BlockSource for EvmQuerier {
    async fn subscribe_blocks(
        &self,
        duration: Option<Duration>,
        shutdown: ShutdownToken,
    ) -> Result<mpsc::Receiver<Result<EvmBlock, TransportError>>, PipelineError> {
        let stream = BlockStream::new(&self.chain, &self.ws_url, self.stream_config.clone());
        Ok(stream.run(duration, shutdown))
    }

    async fn block_by_number(&self, number: u64) -> Result<Option<EvmBlock>, PipelineError> {
        self.http.get_block(number).await.map_err(rpc_err)
    }

    async fn block_logs(&self, number: u64) -> Result<Vec<RawLog>, PipelineError> {
        self.http.get_logs(number).await.map_err(rpc_err)
    }
}

#[async_trait]
impl ContractCaller for EvmQuerier {
    async fn eth_call(&self, to: &str, data: &str) -> Result<String, PipelineError> {
        self.http.eth_call(to, data).await.map_err(rpc_err)
    }

    async fn get_code(&self, address: &str) -> Result<String, PipelineError> {
        self.http.get_code(address).await.map_err(rpc_err)
    }
}

#[async_trait]
impl AbiProvider for EvmQuerier {
    async fn fetch_abi(&self, address: &str) -> Option<String> {
        match &self.abi_fetcher {
            Some(fetcher) => fetcher.fetch_abi(address).await,
            None => None,
        }
    }
}

/// Shared handles to one querier under each of its capability traits.
pub fn capabilities(
    querier: Arc<EvmQuerier>,
) -> (Arc<dyn BlockSource>, Arc<dyn ContractCaller>, Arc<dyn AbiProvider>) {
    (querier.clone(), querier.clone(), querier)
}
