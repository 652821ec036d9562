//! Shared types, errors, cache, and the store contract for the ChainSink
//! pipeline.

pub mod cache;
pub mod chain;
pub mod error;
pub mod event;
pub mod store;
pub mod types;
pub mod value;

pub use cache::BoundedCache;
pub use error::{DecodeError, PipelineError, StoreError};
pub use event::{DecodedEvent, DecodedLog, DecodedParam, EventInput, EventSignature, UnknownLog};
pub use store::EvmStore;
pub use types::{
    BlockRow, ContractInfo, EvmBlock, EvmTransaction, FeeRow, RawLog, SwapRow, SyncRow, TokenInfo,
    TxRow,
};
pub use value::ParamValue;
