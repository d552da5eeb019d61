// Per-Symbol Ticker Stream
// One WebSocket connection per tracked symbol; subscribe/unsubscribe
// envelopes with request ids, automatic reconnection, isolated failures

use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
// Sync state shared with the owning task uses parking_lot; nothing here is
// held across an await point.
use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use crate::core::{BinanceConfig, ConnectionStatus, TickerUpdate};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("Connect timed out after {0}s")]
    ConnectTimeout(u64),
    #[error("Malformed ticker message: {0}")]
    Malformed(String),
    #[error("Max reconnection attempts ({0}) exceeded")]
    MaxReconnects(u32),
}

// ============================================================================
// Events and Commands
// ============================================================================

/// Events delivered to the subscription consumer. Errors are per symbol and
/// never affect other subscriptions.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Tick(TickerUpdate),
    Error(String),
}

#[derive(Debug)]
enum StreamCommand {
    Shutdown,
}

// ============================================================================
// Ticker Message Parsing
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawTicker {
    #[serde(rename = "e")]
    _event_type: String,
    #[serde(rename = "E")]
    event_time: u64,
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "c")]
    last_price: String,
    #[serde(rename = "P")]
    price_change_percent: String,
}

/// Parse a raw 24hr-ticker event into a TickerUpdate
pub fn parse_ticker_message(raw_json: &str) -> Result<TickerUpdate, StreamError> {
    let raw: RawTicker = serde_json::from_str(raw_json)
        .map_err(|e| StreamError::Malformed(e.to_string()))?;

    let last_price = raw
        .last_price
        .parse::<f64>()
        .map_err(|_| StreamError::Malformed(format!("last price '{}'", raw.last_price)))?;
    let change_percent = raw
        .price_change_percent
        .parse::<f64>()
        .map_err(|_| StreamError::Malformed(format!("percent change '{}'", raw.price_change_percent)))?;

    Ok(TickerUpdate::new(raw.symbol, last_price, change_percent, raw.event_time))
}

// ============================================================================
// Envelope Builders
// ============================================================================

/// Stream topic for a symbol: `<lowercased-symbol>@ticker`
pub fn ticker_stream_name(symbol: &str) -> String {
    format!("{}@ticker", symbol.to_lowercase())
}

/// Create a subscribe envelope
pub fn create_subscribe_message(stream_name: &str, id: u32) -> String {
    serde_json::json!({
        "method": "SUBSCRIBE",
        "params": [stream_name],
        "id": id
    })
    .to_string()
}

/// Create an unsubscribe envelope
pub fn create_unsubscribe_message(stream_name: &str, id: u32) -> String {
    serde_json::json!({
        "method": "UNSUBSCRIBE",
        "params": [stream_name],
        "id": id
    })
    .to_string()
}

// ============================================================================
// Stream Statistics
// ============================================================================

#[derive(Debug, Clone)]
pub struct StreamStats {
    pub symbol: String,
    pub status: ConnectionStatus,
    pub messages_received: u64,
    pub reconnects: u64,
    pub errors: u64,
    pub last_message_age_secs: Option<f64>,
}

impl fmt::Display for StreamStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "StreamStats({} state={:?}, messages={}, reconnects={}, errors={})",
            self.symbol, self.status, self.messages_received, self.reconnects, self.errors
        )
    }
}

// ============================================================================
// Ticker Subscription
// ============================================================================

/// A live subscription to one symbol's ticker stream.
///
/// Owns a spawned connection task; ticks and per-symbol errors arrive on the
/// event receiver returned by `spawn`. Teardown sends the unsubscribe
/// envelope before closing; a teardown requested while the connection is
/// still being established is deferred until the socket opens so the
/// unsubscribe is never dropped.
pub struct TickerSubscription {
    symbol: String,
    stream_name: String,
    status: Arc<RwLock<ConnectionStatus>>,
    messages_received: Arc<RwLock<u64>>,
    reconnects: Arc<RwLock<u64>>,
    errors: Arc<RwLock<u64>>,
    last_message: Arc<RwLock<Option<Instant>>>,
    cmd_tx: mpsc::UnboundedSender<StreamCommand>,
    handle: tokio::task::JoinHandle<()>,
}

impl TickerSubscription {
    /// Spawn the connection task for one symbol. Must be called within a
    /// tokio runtime.
    pub fn spawn(
        symbol: &str,
        config: &BinanceConfig,
    ) -> (Self, mpsc::UnboundedReceiver<StreamEvent>) {
        let symbol = symbol.to_uppercase();
        let stream_name = ticker_stream_name(&symbol);

        let status = Arc::new(RwLock::new(ConnectionStatus::Disconnected));
        let messages_received = Arc::new(RwLock::new(0u64));
        let reconnects = Arc::new(RwLock::new(0u64));
        let errors = Arc::new(RwLock::new(0u64));
        let last_message = Arc::new(RwLock::new(None));

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        let task = StreamTask {
            url: config.ws_base_url.clone(),
            symbol: symbol.clone(),
            stream_name: stream_name.clone(),
            status: status.clone(),
            messages_received: messages_received.clone(),
            reconnects: reconnects.clone(),
            errors: errors.clone(),
            last_message: last_message.clone(),
            next_request_id: Arc::new(AtomicU32::new(1)),
            ping_interval_secs: config.ws_ping_interval_secs,
            connect_timeout_secs: config.ws_connect_timeout_secs,
            max_reconnect_attempts: config.ws_max_reconnect_attempts,
            reconnect_max_delay_secs: config.ws_reconnect_max_delay_secs,
        };

        info!(symbol = %symbol, stream = %stream_name, "Spawning ticker subscription");
        let handle = tokio::spawn(task.run(event_tx, cmd_rx));

        (
            Self {
                symbol,
                stream_name,
                status,
                messages_received,
                reconnects,
                errors,
                last_message,
                cmd_tx,
                handle,
            },
            event_rx,
        )
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.read()
    }

    pub fn is_connected(&self) -> bool {
        *self.status.read() == ConnectionStatus::Connected
    }

    pub fn get_stats(&self) -> StreamStats {
        StreamStats {
            symbol: self.symbol.clone(),
            status: *self.status.read(),
            messages_received: *self.messages_received.read(),
            reconnects: *self.reconnects.read(),
            errors: *self.errors.read(),
            last_message_age_secs: self.last_message.read().map(|t| t.elapsed().as_secs_f64()),
        }
    }

    /// Tear the subscription down: unsubscribe (once the socket is open),
    /// close, and wait for the connection task to finish.
    pub async fn shutdown(self) {
        // Send failure means the task already exited
        let _ = self.cmd_tx.send(StreamCommand::Shutdown);
        let _ = self.handle.await;
        info!(symbol = %self.symbol, "Ticker subscription torn down");
    }
}

// ============================================================================
// Connection Task
// ============================================================================

struct StreamTask {
    url: String,
    symbol: String,
    stream_name: String,
    status: Arc<RwLock<ConnectionStatus>>,
    messages_received: Arc<RwLock<u64>>,
    reconnects: Arc<RwLock<u64>>,
    errors: Arc<RwLock<u64>>,
    last_message: Arc<RwLock<Option<Instant>>>,
    next_request_id: Arc<AtomicU32>,
    ping_interval_secs: u64,
    connect_timeout_secs: u64,
    max_reconnect_attempts: u32,
    reconnect_max_delay_secs: u64,
}

impl StreamTask {
    async fn run(
        self,
        event_tx: mpsc::UnboundedSender<StreamEvent>,
        mut cmd_rx: mpsc::UnboundedReceiver<StreamCommand>,
    ) {
        let mut reconnect_attempt = 0u32;

        loop {
            // A shutdown requested between attempts aborts without dialing again
            if shutdown_pending(&mut cmd_rx) {
                *self.status.write() = ConnectionStatus::Disconnected;
                return;
            }

            *self.status.write() = if reconnect_attempt == 0 {
                ConnectionStatus::Connecting
            } else {
                ConnectionStatus::Reconnecting
            };

            match self.connect_once(&event_tx, &mut cmd_rx).await {
                ConnectionOutcome::ShutdownComplete => {
                    *self.status.write() = ConnectionStatus::Disconnected;
                    return;
                }
                ConnectionOutcome::ConnectionLost => {
                    reconnect_attempt += 1;
                    *self.reconnects.write() += 1;
                }
                ConnectionOutcome::DialFailed(message) => {
                    *self.errors.write() += 1;
                    let _ = event_tx.send(StreamEvent::Error(message));
                    reconnect_attempt += 1;
                    *self.reconnects.write() += 1;
                }
            }

            if reconnect_attempt > self.max_reconnect_attempts {
                error!(
                    symbol = %self.symbol,
                    max_attempts = self.max_reconnect_attempts,
                    "Max reconnection attempts reached"
                );
                *self.status.write() = ConnectionStatus::Failed;
                let _ = event_tx.send(StreamEvent::Error(
                    StreamError::MaxReconnects(self.max_reconnect_attempts).to_string(),
                ));
                return;
            }

            let delay_secs =
                std::cmp::min(2_u64.pow(reconnect_attempt), self.reconnect_max_delay_secs);
            warn!(
                symbol = %self.symbol,
                delay_secs = delay_secs,
                attempt = reconnect_attempt,
                max = self.max_reconnect_attempts,
                "Reconnecting"
            );

            // Backoff sleep, abandoned early on shutdown
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(delay_secs)) => {}
                _ = cmd_rx.recv() => {
                    *self.status.write() = ConnectionStatus::Disconnected;
                    return;
                }
            }
        }
    }

    /// One connection lifetime: dial, subscribe, process until the
    /// connection drops or a shutdown command arrives.
    async fn connect_once(
        &self,
        event_tx: &mpsc::UnboundedSender<StreamEvent>,
        cmd_rx: &mut mpsc::UnboundedReceiver<StreamCommand>,
    ) -> ConnectionOutcome {
        debug!(symbol = %self.symbol, url = %self.url, "Dialing WebSocket");

        // The dial is not raced against the command channel: a teardown
        // requested now must wait for the socket to open so the unsubscribe
        // envelope is not dropped.
        let dial = tokio::time::timeout(
            Duration::from_secs(self.connect_timeout_secs),
            connect_async(&self.url),
        )
        .await;

        let ws_stream = match dial {
            Ok(Ok((ws, _))) => ws,
            Ok(Err(e)) => {
                warn!(symbol = %self.symbol, error = %e, "WebSocket dial failed");
                return ConnectionOutcome::DialFailed(StreamError::WebSocket(e).to_string());
            }
            Err(_) => {
                warn!(
                    symbol = %self.symbol,
                    timeout_secs = self.connect_timeout_secs,
                    "WebSocket dial timed out"
                );
                return ConnectionOutcome::DialFailed(
                    StreamError::ConnectTimeout(self.connect_timeout_secs).to_string(),
                );
            }
        };

        info!(symbol = %self.symbol, stream = %self.stream_name, "WebSocket connected");
        *self.status.write() = ConnectionStatus::Connected;

        let (mut write, mut read) = ws_stream.split();

        // Deferred teardown: the socket just opened with a shutdown already
        // requested. Unsubscribe, close, done.
        if shutdown_pending(cmd_rx) {
            debug!(symbol = %self.symbol, "Deferred teardown after connect");
            self.send_unsubscribe(&mut write).await;
            let _ = write.send(Message::Close(None)).await;
            return ConnectionOutcome::ShutdownComplete;
        }

        let req_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let subscribe_msg = create_subscribe_message(&self.stream_name, req_id);
        if let Err(e) = write.send(Message::Text(subscribe_msg)).await {
            warn!(symbol = %self.symbol, error = %e, "Failed to send subscribe");
            return ConnectionOutcome::ConnectionLost;
        }
        info!(symbol = %self.symbol, stream = %self.stream_name, id = req_id, "Subscribed");

        let mut ping_timer =
            tokio::time::interval(Duration::from_secs(self.ping_interval_secs));
        ping_timer.tick().await; // first tick fires immediately

        loop {
            tokio::select! {
                msg_result = read.next() => {
                    match msg_result {
                        Some(Ok(Message::Text(text))) => {
                            *self.last_message.write() = Some(Instant::now());
                            self.handle_text(&text, event_tx);
                        }
                        Some(Ok(Message::Ping(data))) => {
                            *self.last_message.write() = Some(Instant::now());
                            let _ = write.send(Message::Pong(data)).await;
                        }
                        Some(Ok(Message::Pong(_))) => {
                            *self.last_message.write() = Some(Instant::now());
                        }
                        Some(Ok(Message::Close(_))) => {
                            info!(symbol = %self.symbol, "WebSocket closed by server");
                            return ConnectionOutcome::ConnectionLost;
                        }
                        Some(Ok(Message::Binary(data))) => {
                            warn!(symbol = %self.symbol, bytes = data.len(), "Unexpected binary message");
                        }
                        Some(Ok(Message::Frame(_))) => {}
                        Some(Err(e)) => {
                            error!(symbol = %self.symbol, error = %e, "WebSocket error");
                            *self.errors.write() += 1;
                            let _ = event_tx.send(StreamEvent::Error(e.to_string()));
                            return ConnectionOutcome::ConnectionLost;
                        }
                        None => {
                            info!(symbol = %self.symbol, "WebSocket stream ended");
                            return ConnectionOutcome::ConnectionLost;
                        }
                    }
                }

                cmd = cmd_rx.recv() => {
                    // A closed command channel means the subscription handle
                    // was dropped; treat it the same as explicit shutdown.
                    match cmd {
                        Some(StreamCommand::Shutdown) | None => {
                            self.send_unsubscribe(&mut write).await;
                            let _ = write.send(Message::Close(None)).await;
                            return ConnectionOutcome::ShutdownComplete;
                        }
                    }
                }

                _ = ping_timer.tick() => {
                    if let Err(e) = write.send(Message::Ping(vec![])).await {
                        warn!(symbol = %self.symbol, error = %e, "Ping failed");
                        return ConnectionOutcome::ConnectionLost;
                    }
                }
            }
        }
    }

    fn handle_text(&self, text: &str, event_tx: &mpsc::UnboundedSender<StreamEvent>) {
        match parse_ticker_message(text) {
            Ok(update) => {
                *self.messages_received.write() += 1;
                let _ = event_tx.send(StreamEvent::Tick(update));
            }
            Err(parse_err) => {
                // Subscribe/unsubscribe acks arrive as {"result":null,"id":n}
                let is_ack = serde_json::from_str::<serde_json::Value>(text)
                    .map(|v| v.get("result").is_some())
                    .unwrap_or(false);
                if is_ack {
                    debug!(symbol = %self.symbol, "Subscription ack received");
                } else {
                    warn!(symbol = %self.symbol, error = %parse_err, "Unparseable stream message");
                    *self.errors.write() += 1;
                }
            }
        }
    }

    async fn send_unsubscribe<S>(&self, write: &mut S)
    where
        S: SinkExt<Message> + Unpin,
        S::Error: fmt::Display,
    {
        let req_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let msg = create_unsubscribe_message(&self.stream_name, req_id);
        match write.send(Message::Text(msg)).await {
            Ok(_) => info!(symbol = %self.symbol, stream = %self.stream_name, id = req_id, "Unsubscribed"),
            Err(e) => warn!(symbol = %self.symbol, error = %e, "Failed to send unsubscribe"),
        }
    }
}

enum ConnectionOutcome {
    ShutdownComplete,
    ConnectionLost,
    DialFailed(String),
}

/// Drain any already-queued shutdown command. A disconnected channel counts:
/// the owning handle is gone, nobody will consume events.
fn shutdown_pending(cmd_rx: &mut mpsc::UnboundedReceiver<StreamCommand>) -> bool {
    match cmd_rx.try_recv() {
        Ok(StreamCommand::Shutdown) => true,
        Err(mpsc::error::TryRecvError::Disconnected) => true,
        Err(mpsc::error::TryRecvError::Empty) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticker_stream_name() {
        assert_eq!(ticker_stream_name("BTCUSDT"), "btcusdt@ticker");
        assert_eq!(ticker_stream_name("ethusdt"), "ethusdt@ticker");
    }

    #[test]
    fn test_subscribe_message() {
        let msg = create_subscribe_message("btcusdt@ticker", 7);
        assert!(msg.contains("SUBSCRIBE"));
        assert!(msg.contains("btcusdt@ticker"));
        assert!(msg.contains("\"id\":7"));
    }

    #[test]
    fn test_unsubscribe_message() {
        let msg = create_unsubscribe_message("btcusdt@ticker", 8);
        assert!(msg.contains("UNSUBSCRIBE"));
        assert!(msg.contains("btcusdt@ticker"));
        assert!(msg.contains("\"id\":8"));
    }

    #[test]
    fn test_parse_ticker_message() {
        let json = r#"{"e":"24hrTicker","E":1700000000000,"s":"BTCUSDT","p":"500.0","P":"1.25","c":"42000.50","o":"41500.50","h":"42500.00","l":"41000.00","v":"1000.0","q":"42000000.0"}"#;
        let update = parse_ticker_message(json).unwrap();
        assert_eq!(update.symbol, "BTCUSDT");
        assert_eq!(update.last_price, 42000.50);
        assert_eq!(update.change_24h_percent, 1.25);
        assert_eq!(update.event_time, 1700000000000);
    }

    #[test]
    fn test_parse_ticker_rejects_ack() {
        let ack = r#"{"result":null,"id":1}"#;
        assert!(parse_ticker_message(ack).is_err());
    }

    #[test]
    fn test_parse_ticker_rejects_bad_price() {
        let json = r#"{"e":"24hrTicker","E":1,"s":"BTCUSDT","c":"not_a_number","P":"1.0"}"#;
        let result = parse_ticker_message(json);
        assert!(matches!(result, Err(StreamError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_subscription_spawn_and_shutdown_before_connect() {
        // Unroutable port: the dial fails or times out, shutdown still
        // resolves promptly and the task exits
        let config = BinanceConfig {
            ws_base_url: "ws://127.0.0.1:1".to_string(),
            ws_connect_timeout_secs: 1,
            ws_max_reconnect_attempts: 0,
            ..BinanceConfig::default()
        };

        let (subscription, mut event_rx) = TickerSubscription::spawn("BTCUSDT", &config);
        assert_eq!(subscription.symbol(), "BTCUSDT");
        assert_eq!(subscription.stream_name(), "btcusdt@ticker");

        subscription.shutdown().await;

        // Either a dial error was reported or the channel just closed
        while let Some(event) = event_rx.recv().await {
            match event {
                StreamEvent::Error(_) => {}
                StreamEvent::Tick(_) => panic!("No ticks expected without a server"),
            }
        }
    }
}
