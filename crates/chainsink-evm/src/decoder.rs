//! ABI-based log decoding.
//!
//! Signature resolution order: in-memory cache, then the store, then a
//! linear scan of the supplied contract ABI (persisting and caching a hit).
//! A log whose signature cannot be resolved still decodes, into the raw
//! `Unknown` fallback shape.

use std::sync::Arc;

use alloy_core::dyn_abi::{DynSolType, DynSolValue};
use indexmap::IndexMap;

use chainsink_core::cache::BoundedCache;
use chainsink_core::error::DecodeError;
use chainsink_core::event::{DecodedEvent, DecodedLog, DecodedParam, EventSignature, UnknownLog};
use chainsink_core::store::EvmStore;
use chainsink_core::types::RawLog;
use chainsink_core::value::ParamValue;

use crate::signature::signatures_from_abi;

#[derive(Clone)]
pub struct LogDecoder {
    chain: String,
    store: Arc<dyn EvmStore>,
    signatures: Arc<BoundedCache<String, EventSignature>>,
}

impl LogDecoder {
    pub fn new(chain: impl Into<String>, store: Arc<dyn EvmStore>) -> Self {
        Self { chain: chain.into(), store, signatures: Arc::new(BoundedCache::default()) }
    }

    pub fn with_signature_cache(mut self, cache: Arc<BoundedCache<String, EventSignature>>) -> Self {
        self.signatures = cache;
        self
    }

    /// Decode one log. Logs without topics are skipped; any unexpected
    /// failure is logged and swallowed so a bad log never aborts its block.
    pub async fn decode_log(&self, log: &RawLog, abi: Option<&str>) -> Option<DecodedLog> {
        if log.topics.is_empty() {
            return None;
        }
        match self.try_decode(log, abi).await {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                tracing::error!(
                    chain = %self.chain,
                    tx = %log.tx_hash,
                    log_index = log.log_index,
                    error = %e,
                    "log decode failed"
                );
                None
            }
        }
    }

    async fn try_decode(&self, log: &RawLog, abi: Option<&str>) -> Result<DecodedLog, DecodeError> {
        let topic0 = log.topics[0].clone();
        match self.resolve_signature(&topic0, &log.address, abi).await {
            Some(signature) => decode_with_signature(log, &signature).map(DecodedLog::Event),
            None => Ok(DecodedLog::Unknown(decode_without_abi(log))),
        }
    }

    /// Cache, then store, then ABI scan.
    async fn resolve_signature(
        &self,
        topic0: &str,
        contract: &str,
        abi: Option<&str>,
    ) -> Option<EventSignature> {
        if let Some(signature) = self.signatures.get(&topic0.to_string()) {
            return Some(signature);
        }

        match self.store.query_event_signature(&self.chain, topic0).await {
            Ok(Some(signature)) => {
                self.signatures.set(topic0.to_string(), signature.clone());
                return Some(signature);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(chain = %self.chain, topic0, error = %e, "signature lookup failed");
            }
        }

        let abi = abi?;
        let candidates = match signatures_from_abi(abi) {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::debug!(chain = %self.chain, contract, error = %e, "unusable abi");
                return None;
            }
        };
        for mut signature in candidates {
            if signature.signature_hash == topic0 {
                signature.contract_address = Some(contract.to_string());
                if let Err(e) = self.store.insert_event_signature(&self.chain, &signature).await {
                    tracing::warn!(chain = %self.chain, topic0, error = %e, "signature persist failed");
                }
                self.signatures.set(topic0.to_string(), signature.clone());
                return Some(signature);
            }
        }
        None
    }
}

/// Dynamic types only carry their hash in a topic; the preimage is gone.
fn indexed_type_is_hashed(ty: &str) -> bool {
    ty == "bytes" || ty == "string" || ty.ends_with(']') || ty.starts_with('(') || ty.starts_with("tuple")
}

fn decode_topic(ty: &str, topic: &str) -> Result<ParamValue, DecodeError> {
    let bytes = hex::decode(topic.trim_start_matches("0x"))
        .map_err(|e| DecodeError::InvalidLog { reason: format!("topic hex: {e}") })?;
    let sol_type: DynSolType = ty
        .parse()
        .map_err(|_| DecodeError::UnsupportedType { ty: ty.to_string() })?;
    let value = sol_type
        .abi_decode(&bytes)
        .map_err(|e| DecodeError::AbiDecode { reason: e.to_string() })?;
    Ok(crate::normalizer::normalize(&value))
}

fn decode_data(types: &[&str], data: &str) -> Result<Vec<ParamValue>, DecodeError> {
    let bytes = hex::decode(data.trim_start_matches("0x"))
        .map_err(|e| DecodeError::InvalidLog { reason: format!("data hex: {e}") })?;
    let sol_types = types
        .iter()
        .map(|ty| {
            ty.parse::<DynSolType>()
                .map_err(|_| DecodeError::UnsupportedType { ty: ty.to_string() })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let decoded = DynSolType::Tuple(sol_types)
        .abi_decode(&bytes)
        .map_err(|e| DecodeError::AbiDecode { reason: e.to_string() })?;
    match decoded {
        DynSolValue::Tuple(values) => Ok(values.iter().map(crate::normalizer::normalize).collect()),
        other => Ok(vec![crate::normalizer::normalize(&other)]),
    }
}

/// Decode a log against a resolved signature.
///
/// Indexed parameters map one-to-one onto `topics[1..]`, stopping early if
/// topics run out. The data section decodes as one tuple; its failure is
/// captured, not raised, so the indexed half survives.
pub fn decode_with_signature(
    log: &RawLog,
    signature: &EventSignature,
) -> Result<DecodedEvent, DecodeError> {
    let mut parameters: IndexMap<String, DecodedParam> = IndexMap::new();
    let mut data_decode_error = None;

    if !signature.inputs.is_empty() {
        let mut topics = log.topics.iter().skip(1);
        for input in signature.indexed_inputs() {
            let Some(topic) = topics.next() else { break };
            let (value, decode_error) = if indexed_type_is_hashed(&input.ty) {
                (ParamValue::Bytes(topic.clone()), None)
            } else {
                match decode_topic(&input.ty, topic) {
                    Ok(value) => (value, None),
                    Err(e) => (ParamValue::Null, Some(e.to_string())),
                }
            };
            parameters.insert(
                input.name.clone(),
                DecodedParam { value, ty: input.ty.clone(), indexed: true, decode_error },
            );
        }

        let non_indexed: Vec<_> = signature.non_indexed_inputs().collect();
        if !non_indexed.is_empty() && !log.data.trim_start_matches("0x").is_empty() {
            let types: Vec<&str> = non_indexed.iter().map(|i| i.ty.as_str()).collect();
            match decode_data(&types, &log.data) {
                Ok(values) => {
                    for (input, value) in non_indexed.iter().zip(values) {
                        parameters.insert(
                            input.name.clone(),
                            DecodedParam {
                                value,
                                ty: input.ty.clone(),
                                indexed: false,
                                decode_error: None,
                            },
                        );
                    }
                }
                Err(e) => data_decode_error = Some(e.to_string()),
            }
        }
    }

    Ok(DecodedEvent {
        event: signature.name.clone(),
        signature: signature.signature_hash.clone(),
        contract: log.address.clone(),
        log_index: log.log_index,
        parameters,
        data_decode_error,
    })
}

/// Total fallback for unresolvable signatures: topics verbatim, data split
/// into 32-byte words.
pub fn decode_without_abi(log: &RawLog) -> UnknownLog {
    let data = log.data.trim_start_matches("0x");
    let data_chunks = data
        .as_bytes()
        .chunks(64)
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect();
    UnknownLog {
        contract: log.address.clone(),
        log_index: log.log_index,
        signature: log.topics[0].clone(),
        topics: log.topics[1..].to_vec(),
        data_chunks,
    }
}
