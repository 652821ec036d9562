//! JSON-RPC transport for ChainSink.
//!
//! `stream` delivers live blocks over a reconnecting WebSocket
//! subscription, `http` covers request/response calls, and `abi` fetches
//! verified contract ABIs from an explorer API.

pub mod abi;
pub mod error;
pub mod http;
pub mod jsonrpc;
pub mod stream;
pub mod wire;

pub use abi::AbiFetcher;
pub use error::TransportError;
pub use http::HttpClient;
pub use stream::{BlockStream, ShutdownToken, StreamConfig, StreamState};
