use thiserror::Error;

/// Transport-level failures talking to a chain node.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("websocket error: {0}")]
    WebSocket(String),

    #[error("connection closed")]
    Closed,

    #[error("connection failed after {attempts} attempts")]
    ConnectExhausted { attempts: u32 },

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("invalid payload: {reason}")]
    InvalidPayload { reason: String },
}

impl TransportError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        TransportError::InvalidPayload { reason: reason.into() }
    }
}
