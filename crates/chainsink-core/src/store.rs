//! Persistence sink contract.
//!
//! Every write is idempotent: re-processing a block must not duplicate rows
//! or fail on conflicts. Backends decide how (e.g. `ON CONFLICT` clauses).

use async_trait::async_trait;

use crate::error::StoreError;
use crate::event::EventSignature;
use crate::types::{BlockRow, ContractInfo, FeeRow, SwapRow, SyncRow, TokenInfo, TxRow};

/// The pipeline's persistence interface. All keys are scoped by chain slug.
#[async_trait]
pub trait EvmStore: Send + Sync {
    /// Insert a block header row; a duplicate (chain, number) is a no-op.
    async fn insert_block(&self, chain: &str, block: &BlockRow) -> Result<(), StoreError>;

    async fn query_block(&self, chain: &str, number: u64) -> Result<Option<BlockRow>, StoreError>;

    /// Bulk-insert transaction rows; duplicates on
    /// (chain, timestamp, tx_hash) are skipped.
    async fn insert_transactions_bulk(
        &self,
        chain: &str,
        rows: &[TxRow],
    ) -> Result<(), StoreError>;

    async fn query_transactions(
        &self,
        chain: &str,
        block_number: u64,
    ) -> Result<Vec<TxRow>, StoreError>;

    /// Upsert an event signature. On conflict the descriptive fields are
    /// refreshed but an already-set `contract_address` is never clobbered.
    async fn insert_event_signature(
        &self,
        chain: &str,
        signature: &EventSignature,
    ) -> Result<(), StoreError>;

    async fn query_event_signature(
        &self,
        chain: &str,
        signature_hash: &str,
    ) -> Result<Option<EventSignature>, StoreError>;

    /// Upsert a contract's raw ABI JSON.
    async fn insert_contract_abi(
        &self,
        chain: &str,
        address: &str,
        abi_json: &str,
    ) -> Result<(), StoreError>;

    async fn query_contract_abi(
        &self,
        chain: &str,
        address: &str,
    ) -> Result<Option<String>, StoreError>;

    async fn insert_contract_info(
        &self,
        chain: &str,
        info: &ContractInfo,
    ) -> Result<(), StoreError>;

    async fn query_contract_info(
        &self,
        chain: &str,
        address: &str,
    ) -> Result<Option<ContractInfo>, StoreError>;

    async fn insert_token_info(&self, chain: &str, info: &TokenInfo) -> Result<(), StoreError>;

    async fn query_token_info(
        &self,
        chain: &str,
        address: &str,
    ) -> Result<Option<TokenInfo>, StoreError>;

    /// Insert a classified swap; duplicates on (chain, tx_hash, log_index)
    /// are skipped.
    async fn insert_swap_event(&self, chain: &str, row: &SwapRow) -> Result<(), StoreError>;

    async fn query_swap_events(&self, chain: &str) -> Result<Vec<SwapRow>, StoreError>;

    /// Insert a classified reserve sync; duplicates on
    /// (chain, tx_hash, log_index) are skipped.
    async fn insert_sync_event(&self, chain: &str, row: &SyncRow) -> Result<(), StoreError>;

    async fn query_sync_events(&self, chain: &str) -> Result<Vec<SyncRow>, StoreError>;

    /// Insert a classified fee change; duplicates on
    /// (chain, tx_hash, log_index) are skipped.
    async fn insert_fee_event(&self, chain: &str, row: &FeeRow) -> Result<(), StoreError>;

    async fn query_fee_events(&self, chain: &str) -> Result<Vec<FeeRow>, StoreError>;
}
