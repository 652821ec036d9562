//! Error taxonomy shared across the pipeline crates.

use thiserror::Error;

/// Errors raised by persistence backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised while decoding a single event log.
///
/// Decode errors are isolated per log: callers log them and move on, they
/// never abort a block.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid log: {reason}")]
    InvalidLog { reason: String },

    #[error("failed to parse contract ABI: {reason}")]
    AbiParse { reason: String },

    #[error("unsupported parameter type `{ty}`")]
    UnsupportedType { ty: String },

    #[error("abi decode failed: {reason}")]
    AbiDecode { reason: String },
}

/// Top-level pipeline error.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("rpc error: {0}")]
    Rpc(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("pipeline aborted: {reason}")]
    Aborted { reason: String },

    #[error("{0}")]
    Other(String),
}
