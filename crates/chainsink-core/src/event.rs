//! Event signatures and decoded log shapes.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::value::ParamValue;

/// One declared parameter of an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventInput {
    pub name: String,
    /// Canonical ABI type, e.g. `uint256`, `address`, `(uint128,uint128)`.
    pub ty: String,
    pub indexed: bool,
}

/// A resolved event signature: the keccak hash of the canonical declaration
/// plus everything needed to decode matching logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSignature {
    /// `0x`-prefixed keccak256 of `Name(type0,type1,...)`.
    pub signature_hash: String,
    pub name: String,
    /// The canonical declaration the hash was computed from.
    pub full_signature: String,
    /// First contract this signature was observed on, if any. Persisted
    /// once and never clobbered on conflict.
    pub contract_address: Option<String>,
    pub inputs: Vec<EventInput>,
}

impl EventSignature {
    /// Parameter types in declaration order.
    pub fn input_types(&self) -> Vec<&str> {
        self.inputs.iter().map(|i| i.ty.as_str()).collect()
    }

    /// Indexed flags in declaration order.
    pub fn indexed_flags(&self) -> Vec<bool> {
        self.inputs.iter().map(|i| i.indexed).collect()
    }

    pub fn indexed_inputs(&self) -> impl Iterator<Item = &EventInput> {
        self.inputs.iter().filter(|i| i.indexed)
    }

    pub fn non_indexed_inputs(&self) -> impl Iterator<Item = &EventInput> {
        self.inputs.iter().filter(|i| !i.indexed)
    }
}

/// A decoded parameter: the normalized value plus its declared type and
/// position class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedParam {
    pub value: ParamValue,
    pub ty: String,
    pub indexed: bool,
    /// Set when this parameter's topic failed to decode; `value` is `Null`
    /// then, never a stringified error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decode_error: Option<String>,
}

/// A log decoded against a known signature.
///
/// `parameters` preserves decode order (indexed parameters first, then the
/// data section).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedEvent {
    pub event: String,
    /// The resolved `topics[0]` hash the log decoded against; classifiers
    /// key their protocol tables on it.
    pub signature: String,
    pub contract: String,
    pub log_index: u32,
    pub parameters: IndexMap<String, DecodedParam>,
    /// Set when the non-indexed data section failed to decode; the indexed
    /// parameters above are still valid.
    pub data_decode_error: Option<String>,
}

/// The total-fallback shape for a log whose signature could not be resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnknownLog {
    pub contract: String,
    pub log_index: u32,
    /// `topics[0]` verbatim.
    pub signature: String,
    /// Remaining topics, verbatim hex.
    pub topics: Vec<String>,
    /// The data payload split into 32-byte (64 hex chars) words.
    pub data_chunks: Vec<String>,
}

/// Result of decoding one log: either a known event or the raw fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecodedLog {
    Event(DecodedEvent),
    Unknown(UnknownLog),
}

impl DecodedLog {
    pub fn event_name(&self) -> &str {
        match self {
            DecodedLog::Event(e) => &e.event,
            DecodedLog::Unknown(_) => "Unknown",
        }
    }

    pub fn contract(&self) -> &str {
        match self {
            DecodedLog::Event(e) => &e.contract,
            DecodedLog::Unknown(u) => &u.contract,
        }
    }

    pub fn log_index(&self) -> u32 {
        match self {
            DecodedLog::Event(e) => e.log_index,
            DecodedLog::Unknown(u) => u.log_index,
        }
    }
}
