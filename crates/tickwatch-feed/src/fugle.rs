//! Fugle realtime transport: one WebSocket connection per subscribed symbol.

use crate::error::{FeedError, FeedResult};
use crate::source::{BoxFuture, QuoteFeed, QuoteStream};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tickwatch_core::Symbol;
use tickwatch_telemetry::Metrics;
use tickwatch_ws::{ConnectionConfig, ConnectionState, QuoteConnection};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct FugleFeedConfig {
    pub connection: ConnectionConfig,
    /// How long `subscribe` waits for the first successful connect.
    pub connect_timeout_ms: u64,
    /// Quotes buffered per symbol before the connection applies backpressure.
    pub channel_capacity: usize,
}

impl Default for FugleFeedConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            connect_timeout_ms: 10_000,
            channel_capacity: 1024,
        }
    }
}

pub struct FugleQuoteFeed {
    config: FugleFeedConfig,
    connections: Mutex<HashMap<Symbol, Arc<QuoteConnection>>>,
}

impl FugleQuoteFeed {
    pub fn new(config: FugleFeedConfig) -> Self {
        Self {
            config,
            connections: Mutex::new(HashMap::new()),
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }

    async fn open(&self, symbol: Symbol) -> FeedResult<QuoteStream> {
        let (tx, rx) = mpsc::channel(self.config.channel_capacity);
        let conn = Arc::new(QuoteConnection::new(
            self.config.connection.clone(),
            symbol.clone(),
            tx,
        ));

        spawn_reconnect_counter(&conn);
        let mut state = conn.watch_state();

        let runner = conn.clone();
        tokio::spawn(async move {
            if let Err(e) = runner.run().await {
                warn!(symbol = %runner.symbol(), error = %e, "Quote connection terminated");
            }
        });

        let timeout = Duration::from_millis(self.config.connect_timeout_ms);
        let connected = matches!(
            tokio::time::timeout(timeout, state.wait_for(|s| *s == ConnectionState::Connected))
                .await,
            Ok(Ok(_))
        );

        if !connected {
            conn.shutdown();
            return Err(FeedError::Transport {
                symbol: symbol.to_string(),
                reason: format!("not connected within {}ms", self.config.connect_timeout_ms),
            });
        }

        if let Some(previous) = self.connections.lock().insert(symbol.clone(), conn) {
            // A stream that gave up is being replaced.
            previous.shutdown();
        }
        info!(%symbol, "Quote subscription opened");
        Ok(rx)
    }
}

/// Count every transition into `Reconnecting` for the connection's lifetime.
fn spawn_reconnect_counter(conn: &QuoteConnection) {
    let mut state = conn.watch_state();
    let symbol = conn.symbol().to_string();
    tokio::spawn(async move {
        while state.changed().await.is_ok() {
            let reconnecting = *state.borrow_and_update() == ConnectionState::Reconnecting;
            if reconnecting {
                Metrics::ws_reconnect(&symbol);
            }
        }
    });
}

impl QuoteFeed for FugleQuoteFeed {
    fn subscribe(&self, symbol: &Symbol) -> BoxFuture<'_, FeedResult<QuoteStream>> {
        let symbol = symbol.clone();
        Box::pin(self.open(symbol))
    }

    fn unsubscribe(&self, symbol: &Symbol) -> BoxFuture<'_, ()> {
        let removed = self.connections.lock().remove(symbol);
        let symbol = symbol.clone();
        Box::pin(async move {
            match removed {
                Some(conn) => {
                    conn.shutdown();
                    info!(%symbol, "Quote subscription closed");
                }
                None => debug!(%symbol, "Unsubscribe for unknown symbol"),
            }
        })
    }
}
