//! Lazy contract and token metadata resolution.
//!
//! A contract is probed for the pool interface (`token0`/`token1`/
//! `factory`) before any call is made, then for deployed code; an address
//! without either is a definitive `NotAPool`, not an error. Token metadata
//! comes from the minimal ERC-20 read interface. No retries at this layer.

use std::sync::Arc;

use alloy_core::dyn_abi::DynSolType;
use alloy_json_abi::JsonAbi;

use chainsink_core::error::PipelineError;
use chainsink_core::store::EvmStore;
use chainsink_core::types::{ContractInfo, TokenInfo};
use chainsink_core::value::ParamValue;

use crate::normalizer::normalize;
use crate::querier::ContractCaller;
use crate::signature::keccak256;

/// Outcome of probing a contract for pool metadata.
#[derive(Debug, Clone)]
pub enum ContractResolution {
    Resolved(ContractInfo),
    /// The ABI lacks the pool interface; asking again is pointless.
    NotAPool,
    /// A chain call or token resolution failed; may succeed later.
    Failed(String),
}

pub struct MetadataResolver {
    chain: String,
    caller: Arc<dyn ContractCaller>,
    store: Arc<dyn EvmStore>,
}

impl MetadataResolver {
    pub fn new(
        chain: impl Into<String>,
        caller: Arc<dyn ContractCaller>,
        store: Arc<dyn EvmStore>,
    ) -> Self {
        Self { chain: chain.into(), caller, store }
    }

    /// Resolve pool metadata for a contract, reusing stored info unless
    /// `update` forces a refresh.
    pub async fn resolve_contract(
        &self,
        address: &str,
        abi_json: &str,
        update: bool,
    ) -> ContractResolution {
        if !update {
            match self.store.query_contract_info(&self.chain, address).await {
                Ok(Some(info)) => return ContractResolution::Resolved(info),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(chain = %self.chain, address, error = %e, "contract lookup failed");
                }
            }
        }

        let abi: JsonAbi = match serde_json::from_str(abi_json) {
            Ok(abi) => abi,
            Err(e) => return ContractResolution::Failed(format!("abi parse: {e}")),
        };
        if !has_pool_interface(&abi) {
            return ContractResolution::NotAPool;
        }

        match self.caller.get_code(address).await {
            Ok(code) if code.trim_start_matches("0x").is_empty() => {
                tracing::debug!(chain = %self.chain, address, "no code at address");
                return ContractResolution::NotAPool;
            }
            Ok(_) => {}
            Err(e) => return ContractResolution::Failed(format!("eth_getCode: {e}")),
        }

        let factory = match self.call_address(address, "factory()").await {
            Ok(a) => a,
            Err(e) => return ContractResolution::Failed(format!("factory(): {e}")),
        };
        let token0_address = match self.call_address(address, "token0()").await {
            Ok(a) => a,
            Err(e) => return ContractResolution::Failed(format!("token0(): {e}")),
        };
        let token1_address = match self.call_address(address, "token1()").await {
            Ok(a) => a,
            Err(e) => return ContractResolution::Failed(format!("token1(): {e}")),
        };

        let Some(token0) = self.resolve_token(&token0_address, update).await else {
            return ContractResolution::Failed(format!("token {token0_address} unresolved"));
        };
        let Some(token1) = self.resolve_token(&token1_address, update).await else {
            return ContractResolution::Failed(format!("token {token1_address} unresolved"));
        };

        // fee() is optional across pool variants
        let fee = match self.call_uint(address, "fee()").await {
            Ok(fee) => Some(fee),
            Err(e) => {
                tracing::debug!(chain = %self.chain, address, error = %e, "no fee() on pool");
                None
            }
        };

        let info = ContractInfo {
            address: address.to_lowercase(),
            factory: factory.to_lowercase(),
            fee,
            name: format!("{}/{}", token0.symbol, token1.symbol),
            token0,
            token1,
        };
        if let Err(e) = self.store.insert_contract_info(&self.chain, &info).await {
            tracing::warn!(chain = %self.chain, address, error = %e, "contract persist failed");
        }
        tracing::info!(chain = %self.chain, address, pair = %info.name, "pool resolved");
        ContractResolution::Resolved(info)
    }

    /// Resolve ERC-20 metadata; any failed call reads as unresolvable.
    pub async fn resolve_token(&self, address: &str, update: bool) -> Option<TokenInfo> {
        if !update {
            match self.store.query_token_info(&self.chain, address).await {
                Ok(Some(info)) => return Some(info),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(chain = %self.chain, address, error = %e, "token lookup failed");
                }
            }
        }

        let name = match self.call_string(address, "name()").await {
            Ok(name) => name,
            Err(e) => {
                tracing::debug!(chain = %self.chain, address, error = %e, "token name() failed");
                return None;
            }
        };
        let symbol = match self.call_string(address, "symbol()").await {
            Ok(symbol) => symbol,
            Err(e) => {
                tracing::debug!(chain = %self.chain, address, error = %e, "token symbol() failed");
                return None;
            }
        };
        let decimals = match self.call_uint(address, "decimals()").await {
            Ok(decimals) => u8::try_from(decimals).unwrap_or(18),
            Err(e) => {
                tracing::debug!(chain = %self.chain, address, error = %e, "token decimals() failed");
                return None;
            }
        };

        let info = TokenInfo { address: address.to_lowercase(), name, symbol, decimals };
        if let Err(e) = self.store.insert_token_info(&self.chain, &info).await {
            tracing::warn!(chain = %self.chain, address, error = %e, "token persist failed");
        }
        Some(info)
    }

    async fn call(&self, to: &str, fn_signature: &str) -> Result<Vec<u8>, PipelineError> {
        let selector = &keccak256(fn_signature.as_bytes())[..4];
        let data = format!("0x{}", hex::encode(selector));
        let returned = self.caller.eth_call(to, &data).await?;
        hex::decode(returned.trim_start_matches("0x"))
            .map_err(|e| PipelineError::Rpc(format!("return data hex: {e}")))
    }

    async fn call_decoded(
        &self,
        to: &str,
        fn_signature: &str,
        ty: DynSolType,
    ) -> Result<ParamValue, PipelineError> {
        let bytes = self.call(to, fn_signature).await?;
        let value = ty
            .abi_decode(&bytes)
            .map_err(|e| PipelineError::Rpc(format!("{fn_signature} return: {e}")))?;
        Ok(normalize(&value))
    }

    async fn call_address(&self, to: &str, fn_signature: &str) -> Result<String, PipelineError> {
        match self.call_decoded(to, fn_signature, DynSolType::Address).await? {
            // addresses are lowercased everywhere in the pipeline
            ParamValue::Address(a) => Ok(a.to_lowercase()),
            other => Err(PipelineError::Rpc(format!("{fn_signature} returned {other:?}"))),
        }
    }

    async fn call_string(&self, to: &str, fn_signature: &str) -> Result<String, PipelineError> {
        match self.call_decoded(to, fn_signature, DynSolType::String).await? {
            ParamValue::String(s) => Ok(s),
            other => Err(PipelineError::Rpc(format!("{fn_signature} returned {other:?}"))),
        }
    }

    async fn call_uint(&self, to: &str, fn_signature: &str) -> Result<u64, PipelineError> {
        let value = self.call_decoded(to, fn_signature, DynSolType::Uint(256)).await?;
        value
            .as_u64()
            .ok_or_else(|| PipelineError::Rpc(format!("{fn_signature} returned {value:?}")))
    }
}

fn has_pool_interface(abi: &JsonAbi) -> bool {
    let has = |name: &str| abi.functions().any(|f| f.name == name && f.inputs.is_empty());
    has("token0") && has("token1") && has("factory")
}
