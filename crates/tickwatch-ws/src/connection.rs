//! Per-symbol quote connection.
//!
//! Handles connection lifecycle and automatic reconnection with exponential
//! backoff. Parsed quotes are pushed into an mpsc channel; when `run` returns
//! the sender is dropped with the connection, which closes the consumer's
//! stream and lets it decide whether to resubscribe.

use crate::error::{WsError, WsResult};
use crate::heartbeat::HeartbeatManager;
use crate::message::parse_quote;
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use std::time::Duration;
use tickwatch_core::{Quote, Symbol};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{connect_async_tls_with_config, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Endpoint base, e.g. `wss://api.fugle.tw/realtime/v0.3`.
    pub base_url: String,
    pub api_token: String,
    /// Reconnection attempts before `run` gives up (0 = infinite).
    pub max_reconnect_attempts: u32,
    pub reconnect_base_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,
    /// Upper bound of the random jitter added to each backoff delay.
    pub reconnect_jitter_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub heartbeat_timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            base_url: "wss://api.fugle.tw/realtime/v0.3".to_string(),
            api_token: String::new(),
            max_reconnect_attempts: 5,
            reconnect_base_delay_ms: 500,
            reconnect_max_delay_ms: 10_000,
            reconnect_jitter_ms: 250,
            heartbeat_interval_ms: 30_000,
            heartbeat_timeout_ms: 10_000,
        }
    }
}

impl ConnectionConfig {
    /// Full intraday quote URL for `symbol`.
    pub fn url_for(&self, symbol: &Symbol) -> String {
        format!(
            "{}/intraday/quote?symbolId={}&apiToken={}",
            self.base_url.trim_end_matches('/'),
            symbol,
            self.api_token
        )
    }

    /// Exponential backoff: `base * 2^(attempt-1)`, capped, plus jitter.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self
            .reconnect_base_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.reconnect_max_delay_ms);
        Duration::from_millis(delay + rand_jitter(self.reconnect_jitter_ms))
    }
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// WebSocket connection for one symbol's intraday quotes.
pub struct QuoteConnection {
    config: ConnectionConfig,
    symbol: Symbol,
    state_tx: watch::Sender<ConnectionState>,
    heartbeat: HeartbeatManager,
    quote_tx: mpsc::Sender<Quote>,
    reconnect_count: RwLock<u32>,
    shutdown_token: CancellationToken,
}

enum SessionEnd {
    /// Shutdown requested or the consumer went away; do not reconnect.
    Stop,
    /// Server closed the stream; reconnect.
    Dropped,
}

impl QuoteConnection {
    pub fn new(config: ConnectionConfig, symbol: Symbol, quote_tx: mpsc::Sender<Quote>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let heartbeat =
            HeartbeatManager::new(config.heartbeat_interval_ms, config.heartbeat_timeout_ms);
        Self {
            config,
            symbol,
            state_tx,
            heartbeat,
            quote_tx,
            reconnect_count: RwLock::new(0),
            shutdown_token: CancellationToken::new(),
        }
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Observe state transitions.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Consecutive failed attempts since the last successful connect.
    pub fn reconnect_count(&self) -> u32 {
        *self.reconnect_count.read()
    }

    pub fn shutdown(&self) {
        debug!(symbol = %self.symbol, "Quote connection shutdown requested");
        self.shutdown_token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_replace(state);
    }

    /// Connect and pump quotes until shutdown or reconnection gives up.
    pub async fn run(&self) -> WsResult<()> {
        let mut attempt = 0u32;

        loop {
            if self.is_shutdown() {
                self.set_state(ConnectionState::Disconnected);
                return Ok(());
            }

            self.set_state(ConnectionState::Connecting);

            match self.session().await {
                Ok(SessionEnd::Stop) => {
                    self.set_state(ConnectionState::Disconnected);
                    return Ok(());
                }
                Ok(SessionEnd::Dropped) => {
                    info!(symbol = %self.symbol, "Quote stream ended by server");
                }
                Err(e) => {
                    warn!(symbol = %self.symbol, error = %e, "Quote connection error");
                }
            }

            if self.is_shutdown() {
                self.set_state(ConnectionState::Disconnected);
                return Ok(());
            }

            attempt += 1;
            *self.reconnect_count.write() = attempt;

            if self.config.max_reconnect_attempts > 0
                && attempt > self.config.max_reconnect_attempts
            {
                error!(symbol = %self.symbol, attempt, "Max reconnection attempts reached");
                self.set_state(ConnectionState::Disconnected);
                return Err(WsError::ConnectionFailed(format!(
                    "{}: max reconnection attempts reached",
                    self.symbol
                )));
            }

            self.set_state(ConnectionState::Reconnecting);
            let delay = self.config.backoff_delay(attempt);
            warn!(
                symbol = %self.symbol,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Reconnecting quote stream"
            );

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = self.shutdown_token.cancelled() => {
                    self.set_state(ConnectionState::Disconnected);
                    return Ok(());
                }
            }
        }
    }

    async fn session(&self) -> WsResult<SessionEnd> {
        let url = self.config.url_for(&self.symbol);
        debug!(symbol = %self.symbol, base_url = %self.config.base_url, "Connecting quote stream");

        let connect = connect_async_tls_with_config(url.as_str(), None, true, None);
        let (ws_stream, _response) = tokio::select! {
            res = connect => res?,
            () = self.shutdown_token.cancelled() => return Ok(SessionEnd::Stop),
        };
        let (mut write, mut read) = ws_stream.split();

        self.set_state(ConnectionState::Connected);
        *self.reconnect_count.write() = 0;
        self.heartbeat.reset();
        info!(symbol = %self.symbol, "Quote stream connected");

        loop {
            tokio::select! {
                biased;

                () = self.shutdown_token.cancelled() => {
                    if let Err(e) = write.send(Message::Close(None)).await {
                        debug!(symbol = %self.symbol, error = %e, "Close frame not sent");
                    }
                    return Ok(SessionEnd::Stop);
                }

                () = self.quote_tx.closed() => {
                    debug!(symbol = %self.symbol, "Quote consumer dropped, closing stream");
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(SessionEnd::Stop);
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.heartbeat.record_message();
                            if !self.forward(&text).await {
                                return Ok(SessionEnd::Stop);
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            self.heartbeat.record_message();
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Pong(_))) => {
                            self.heartbeat.record_pong();
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (f.code.into(), f.reason.to_string()))
                                .unwrap_or((1000, "Normal close".to_string()));
                            warn!(symbol = %self.symbol, code, %reason, "Quote stream closed by server");
                            return Err(WsError::ConnectionClosed { code, reason });
                        }
                        Some(Err(e)) => return Err(e.into()),
                        None => return Ok(SessionEnd::Dropped),
                        _ => {}
                    }
                }

                () = self.heartbeat.wait_for_check() => {
                    if self.heartbeat.is_timed_out() {
                        return Err(WsError::HeartbeatTimeout);
                    }
                    if self.heartbeat.should_send_ping() {
                        write.send(Message::Ping(Vec::new())).await?;
                        self.heartbeat.record_ping();
                        trace!(symbol = %self.symbol, "Sent heartbeat ping");
                    }
                }
            }
        }
    }

    /// Parse and forward one frame. Returns false once the consumer is gone.
    async fn forward(&self, text: &str) -> bool {
        match parse_quote(text, &self.symbol) {
            Ok(Some(quote)) => self.quote_tx.send(quote).await.is_ok(),
            Ok(None) => true,
            Err(e) => {
                warn!(symbol = %self.symbol, error = %e, "Skipping unparseable quote frame");
                true
            }
        }
    }
}

/// Random jitter in `0..max_ms`.
fn rand_jitter(max_ms: u64) -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    if max_ms == 0 {
        return 0;
    }
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    u64::from(nanos) % max_ms
}
