//! Reconnecting block stream.
//!
//! A background task owns the WebSocket: it subscribes to `newHeads`,
//! re-fetches each announced block with full transactions over the same
//! socket, and delivers typed blocks through a bounded channel. Peer
//! disconnects trigger transparent reconnect + resubscribe; only exhausting
//! the connect retries is fatal, and that error is delivered in-band.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use chainsink_core::types::EvmBlock;

use crate::error::TransportError;
use crate::jsonrpc::{IncomingMessage, JsonRpcRequest};
use crate::wire;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const REQUEST_REPLY_TIMEOUT: Duration = Duration::from_secs(30);
const DEDUPE_WINDOW: usize = 128;

/// Where the stream currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Disconnected,
    Connecting,
    Subscribed,
    Streaming,
    ClosedByPeer,
    ShuttingDown,
}

impl std::fmt::Display for StreamState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StreamState::Disconnected => "disconnected",
            StreamState::Connecting => "connecting",
            StreamState::Subscribed => "subscribed",
            StreamState::Streaming => "streaming",
            StreamState::ClosedByPeer => "closed-by-peer",
            StreamState::ShuttingDown => "shutting-down",
        };
        f.write_str(s)
    }
}

/// Cooperative cancellation handle shared by the stream, the pipeline, and
/// signal handlers.
#[derive(Clone)]
pub struct ShutdownToken {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for ShutdownToken {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub retry_attempts: u32,
    pub retry_delay: Duration,
    pub channel_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self { retry_attempts: 5, retry_delay: Duration::from_secs(2), channel_capacity: 64 }
    }
}

/// Emits each block hash at most once across reconnects, with a bounded
/// memory of recent hashes.
pub(crate) struct BlockDeduper {
    seen: HashSet<String>,
    order: VecDeque<String>,
    capacity: usize,
}

impl BlockDeduper {
    pub(crate) fn new(capacity: usize) -> Self {
        Self { seen: HashSet::new(), order: VecDeque::new(), capacity }
    }

    /// Returns true when the hash has not been observed yet.
    pub(crate) fn observe(&mut self, hash: &str) -> bool {
        if self.seen.contains(hash) {
            return false;
        }
        if self.order.len() >= self.capacity {
            if let Some(old) = self.order.pop_front() {
                self.seen.remove(&old);
            }
        }
        self.seen.insert(hash.to_string());
        self.order.push_back(hash.to_string());
        true
    }
}

/// A live block subscription for one chain.
pub struct BlockStream {
    chain: String,
    ws_url: String,
    config: StreamConfig,
    state: Arc<watch::Sender<StreamState>>,
}

enum LoopExit {
    Reconnect,
    Stop,
}

impl BlockStream {
    pub fn new(chain: impl Into<String>, ws_url: impl Into<String>, config: StreamConfig) -> Self {
        let (state, _rx) = watch::channel(StreamState::Disconnected);
        Self { chain: chain.into(), ws_url: ws_url.into(), config, state: Arc::new(state) }
    }

    pub fn state(&self) -> StreamState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<StreamState> {
        self.state.subscribe()
    }

    /// Start streaming. Blocks arrive on the returned channel; a fatal
    /// transport error is delivered as the final item. `duration` bounds
    /// the stream's lifetime; the token stops it early.
    pub fn run(
        &self,
        duration: Option<Duration>,
        shutdown: ShutdownToken,
    ) -> mpsc::Receiver<Result<EvmBlock, TransportError>> {
        let (tx, rx) = mpsc::channel(self.config.channel_capacity);
        let chain = self.chain.clone();
        let ws_url = self.ws_url.clone();
        let config = self.config.clone();
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            stream_task(chain, ws_url, config, state, shutdown, duration, tx).await;
        });
        rx
    }
}

async fn stream_task(
    chain: String,
    ws_url: String,
    config: StreamConfig,
    state: Arc<watch::Sender<StreamState>>,
    shutdown: ShutdownToken,
    duration: Option<Duration>,
    tx: mpsc::Sender<Result<EvmBlock, TransportError>>,
) {
    let deadline = duration.map(|d| tokio::time::Instant::now() + d);
    let mut shutdown_rx = shutdown.subscribe();
    let mut deduper = BlockDeduper::new(DEDUPE_WINDOW);
    let mut next_id: u64 = 1;

    loop {
        if shutdown.is_shutdown() {
            state.send_replace(StreamState::ShuttingDown);
            return;
        }

        state.send_replace(StreamState::Connecting);
        let mut ws = match connect_with_retry(&chain, &ws_url, &config, &shutdown).await {
            Ok(ws) => ws,
            Err(e) => {
                state.send_replace(StreamState::Disconnected);
                let _ = tx.send(Err(e)).await;
                return;
            }
        };

        let mut pending_headers: VecDeque<Value> = VecDeque::new();
        match subscribe_new_heads(&mut ws, &mut next_id, &mut pending_headers).await {
            Ok(sub_id) => {
                tracing::info!(chain = %chain, subscription = %sub_id, "subscribed to newHeads");
                state.send_replace(StreamState::Subscribed);
            }
            Err(e) => {
                tracing::warn!(chain = %chain, error = %e, "subscribe failed, reconnecting");
                state.send_replace(StreamState::ClosedByPeer);
                tokio::time::sleep(config.retry_delay).await;
                continue;
            }
        }
        state.send_replace(StreamState::Streaming);

        let exit = streaming_loop(
            &chain,
            &mut ws,
            &mut next_id,
            &mut pending_headers,
            &mut deduper,
            &mut shutdown_rx,
            deadline,
            &tx,
        )
        .await;

        match exit {
            LoopExit::Reconnect => {
                state.send_replace(StreamState::ClosedByPeer);
                tracing::warn!(chain = %chain, "connection lost, reconnecting");
                tokio::time::sleep(config.retry_delay).await;
            }
            LoopExit::Stop => {
                state.send_replace(StreamState::ShuttingDown);
                let _ = ws.close(None).await;
                return;
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn streaming_loop(
    chain: &str,
    ws: &mut WsStream,
    next_id: &mut u64,
    pending_headers: &mut VecDeque<Value>,
    deduper: &mut BlockDeduper,
    shutdown_rx: &mut watch::Receiver<bool>,
    deadline: Option<tokio::time::Instant>,
    tx: &mpsc::Sender<Result<EvmBlock, TransportError>>,
) -> LoopExit {
    loop {
        // Headers buffered while waiting on an in-flight request reply.
        while let Some(header) = pending_headers.pop_front() {
            match emit_block(chain, ws, next_id, pending_headers, deduper, tx, &header).await {
                Ok(()) => {}
                Err(exit) => return exit,
            }
        }

        tokio::select! {
            _ = shutdown_rx.changed() => {
                tracing::info!(chain = %chain, "shutdown requested");
                return LoopExit::Stop;
            }
            _ = wait_deadline(deadline) => {
                tracing::info!(chain = %chain, "stream duration elapsed");
                return LoopExit::Stop;
            }
            frame = ws.next() => match frame {
                Some(Ok(Message::Text(text))) => match IncomingMessage::parse(&text) {
                    Ok(IncomingMessage::Notification(n)) => {
                        pending_headers.push_back(n.params.result);
                    }
                    Ok(IncomingMessage::Response(_)) => {
                        tracing::debug!(chain = %chain, "unsolicited response frame ignored");
                    }
                    Err(e) => {
                        tracing::warn!(chain = %chain, error = %e, "unparseable frame skipped");
                    }
                },
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Binary(_) | Message::Frame(_))) => {}
                Some(Ok(Message::Close(_))) | None => return LoopExit::Reconnect,
                Some(Err(e)) => {
                    tracing::warn!(chain = %chain, error = %e, "websocket read error");
                    return LoopExit::Reconnect;
                }
            }
        }
    }
}

/// Fetch the announced block with full transactions and push it downstream.
/// A malformed block is logged and skipped; it never kills the stream.
async fn emit_block(
    chain: &str,
    ws: &mut WsStream,
    next_id: &mut u64,
    pending_headers: &mut VecDeque<Value>,
    deduper: &mut BlockDeduper,
    tx: &mpsc::Sender<Result<EvmBlock, TransportError>>,
    header: &Value,
) -> Result<(), LoopExit> {
    let Some(number) = wire::header_number(header) else {
        tracing::warn!(chain = %chain, "header without a block number skipped");
        return Ok(());
    };

    let result = request_over_ws(
        ws,
        next_id,
        "eth_getBlockByNumber",
        json!([format!("0x{number:x}"), true]),
        pending_headers,
    )
    .await
    .map_err(|_| LoopExit::Reconnect)?;

    if result.is_null() {
        tracing::warn!(chain = %chain, number, "announced block not yet available");
        return Ok(());
    }
    let block = match wire::block_from_value(chain, result) {
        Ok(block) => block,
        Err(e) => {
            tracing::error!(chain = %chain, number, error = %e, "malformed block skipped");
            return Ok(());
        }
    };
    if !deduper.observe(&block.hash) {
        tracing::debug!(chain = %chain, number, "duplicate block announcement dropped");
        return Ok(());
    }
    tracing::debug!(chain = %chain, number, txs = block.transactions.len(), "block received");
    tx.send(Ok(block)).await.map_err(|_| LoopExit::Stop)
}

async fn connect_with_retry(
    chain: &str,
    ws_url: &str,
    config: &StreamConfig,
    shutdown: &ShutdownToken,
) -> Result<WsStream, TransportError> {
    for attempt in 1..=config.retry_attempts {
        if shutdown.is_shutdown() {
            return Err(TransportError::Closed);
        }
        match connect_async(ws_url).await {
            Ok((ws, _response)) => {
                tracing::info!(chain = %chain, attempt, "websocket connected");
                return Ok(ws);
            }
            Err(e) => {
                tracing::warn!(chain = %chain, attempt, error = %e, "websocket connect failed");
                if attempt < config.retry_attempts {
                    tokio::time::sleep(config.retry_delay).await;
                }
            }
        }
    }
    Err(TransportError::ConnectExhausted { attempts: config.retry_attempts })
}

async fn subscribe_new_heads(
    ws: &mut WsStream,
    next_id: &mut u64,
    pending_headers: &mut VecDeque<Value>,
) -> Result<String, TransportError> {
    let result =
        request_over_ws(ws, next_id, "eth_subscribe", json!(["newHeads"]), pending_headers).await?;
    result
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| TransportError::invalid("eth_subscribe result"))
}

/// Send a request over the socket and wait for its reply, buffering any
/// subscription notifications that arrive in between.
async fn request_over_ws(
    ws: &mut WsStream,
    next_id: &mut u64,
    method: &str,
    params: Value,
    pending_headers: &mut VecDeque<Value>,
) -> Result<Value, TransportError> {
    let id = *next_id;
    *next_id += 1;
    let request = JsonRpcRequest::new(id, method, params);
    ws.send(Message::Text(request.to_text()?))
        .await
        .map_err(|e| TransportError::WebSocket(e.to_string()))?;

    let reply = tokio::time::timeout(REQUEST_REPLY_TIMEOUT, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => match IncomingMessage::parse(&text) {
                    Ok(IncomingMessage::Response(resp)) if resp.id == Some(id) => {
                        return resp.into_result();
                    }
                    Ok(IncomingMessage::Response(_)) => {}
                    Ok(IncomingMessage::Notification(n)) => {
                        pending_headers.push_back(n.params.result);
                    }
                    Err(e) => tracing::debug!(error = %e, "unparseable frame during request"),
                },
                Some(Ok(Message::Close(_))) | None => return Err(TransportError::Closed),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(TransportError::WebSocket(e.to_string())),
            }
        }
    })
    .await;

    match reply {
        Ok(result) => result,
        Err(_) => Err(TransportError::WebSocket(format!("{method} reply timed out"))),
    }
}

async fn wait_deadline(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    /// Minimal loopback node: answers `eth_subscribe` and
    /// `eth_getBlockByNumber`, and pushes a `newHeads` notification on every
    /// tick once subscribed.
    async fn serve_blocks(listener: TcpListener, interval: Duration) {
        let (socket, _) = listener.accept().await.expect("accept");
        let mut ws = accept_async(socket).await.expect("handshake");
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut number: u64 = 0;
        let mut subscribed = false;
        loop {
            tokio::select! {
                _ = ticker.tick(), if subscribed => {
                    number += 1;
                    let push = json!({
                        "jsonrpc": "2.0",
                        "method": "eth_subscription",
                        "params": {
                            "subscription": "0xfeed",
                            "result": {"number": format!("0x{number:x}")}
                        }
                    });
                    if ws.send(Message::Text(push.to_string())).await.is_err() {
                        return;
                    }
                }
                frame = ws.next() => {
                    let Some(Ok(Message::Text(text))) = frame else { return };
                    let request: Value = serde_json::from_str(&text).expect("request json");
                    let result = match request["method"].as_str() {
                        Some("eth_subscribe") => {
                            subscribed = true;
                            json!("0xfeed")
                        }
                        Some("eth_getBlockByNumber") => {
                            let tag = request["params"][0].as_str().expect("block tag");
                            json!({
                                "number": tag,
                                "hash": format!("0xhash{tag}"),
                                "parentHash": "0xparent",
                                "timestamp": "0x65500000",
                                "transactions": []
                            })
                        }
                        _ => Value::Null,
                    };
                    let reply = json!({"jsonrpc": "2.0", "id": request["id"], "result": result});
                    if ws.send(Message::Text(reply.to_string())).await.is_err() {
                        return;
                    }
                }
            }
        }
    }

    #[tokio::test]
    async fn deadline_bounds_a_live_stream() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve_blocks(listener, Duration::from_millis(100)));

        let stream = BlockStream::new("ethereum", format!("ws://{addr}"), StreamConfig::default());
        let duration = Duration::from_millis(600);
        let started = std::time::Instant::now();
        let mut rx = stream.run(Some(duration), ShutdownToken::new());

        let mut numbers = Vec::new();
        while let Some(item) = rx.recv().await {
            numbers.push(item.unwrap().number);
        }
        let elapsed = started.elapsed();

        // roughly one block per tick until the deadline, strictly ordered
        assert!(!numbers.is_empty(), "no blocks arrived before the deadline");
        assert!(numbers.len() <= 10, "got {} blocks in ~600ms", numbers.len());
        assert!(numbers.windows(2).all(|w| w[0] < w[1]), "out of order: {numbers:?}");
        // the channel closes once the deadline fires, not long after
        assert!(elapsed >= duration - Duration::from_millis(50), "stream ended early at {elapsed:?}");
        assert!(elapsed < Duration::from_secs(5), "stream overran the deadline: {elapsed:?}");
        assert_eq!(stream.state(), StreamState::ShuttingDown);
    }

    #[test]
    fn deduper_emits_each_hash_once() {
        let mut deduper = BlockDeduper::new(8);
        assert!(deduper.observe("0xa"));
        assert!(!deduper.observe("0xa"));
        assert!(deduper.observe("0xb"));
    }

    #[test]
    fn deduper_window_is_bounded() {
        let mut deduper = BlockDeduper::new(2);
        assert!(deduper.observe("0x1"));
        assert!(deduper.observe("0x2"));
        assert!(deduper.observe("0x3"));
        // 0x1 fell out of the window and may be observed again
        assert!(deduper.observe("0x1"));
    }

    #[test]
    fn shutdown_token_flips_once() {
        let token = ShutdownToken::new();
        assert!(!token.is_shutdown());
        token.shutdown();
        assert!(token.is_shutdown());
        let clone = token.clone();
        assert!(clone.is_shutdown());
    }

    #[tokio::test]
    async fn shutdown_wakes_subscribers() {
        let token = ShutdownToken::new();
        let mut rx = token.subscribe();
        let waiter = tokio::spawn(async move { rx.changed().await.is_ok() });
        token.shutdown();
        assert!(waiter.await.unwrap());
    }

    #[test]
    fn default_config_matches_connect_policy() {
        let config = StreamConfig::default();
        assert_eq!(config.retry_attempts, 5);
        assert_eq!(config.retry_delay, Duration::from_secs(2));
    }

    #[test]
    fn stream_starts_disconnected() {
        let stream = BlockStream::new("ethereum", "wss://node.invalid", StreamConfig::default());
        assert_eq!(stream.state(), StreamState::Disconnected);
    }
}
