//! EVM ingestion pipeline: block/transaction persistence, ABI-based log
//! decoding, protocol event classification, and lazy contract metadata
//! resolution.

pub mod blocks;
pub mod decoder;
pub mod events;
pub mod logs;
pub mod metadata;
pub mod normalizer;
pub mod pipeline;
pub mod querier;
pub mod signature;

pub use blocks::BlockProcessor;
pub use decoder::LogDecoder;
pub use events::{ClassifiedEvent, EventClassifier};
pub use logs::LogProcessor;
pub use metadata::{ContractResolution, MetadataResolver};
pub use pipeline::{spawn_signal_handler, EvmPipeline, PipelineConfig};
pub use querier::{AbiProvider, BlockSource, ContractCaller, EvmQuerier};
