//! Quote transport abstraction.
//!
//! A [`QuoteFeed`] hands out one ordered stream of quotes per symbol. The
//! stream ends (the receiver yields `None`) when the transport gives up on the
//! symbol or the subscription is closed.

use crate::error::{FeedError, FeedResult};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tickwatch_core::{Quote, Symbol};
use tokio::sync::mpsc;

pub use tickwatch_core::BoxFuture;

/// Ordered quotes for one symbol.
pub type QuoteStream = mpsc::Receiver<Quote>;

pub trait QuoteFeed: Send + Sync {
    /// Open a live stream for `symbol`.
    fn subscribe(&self, symbol: &Symbol) -> BoxFuture<'_, FeedResult<QuoteStream>>;

    /// Close the live stream for `symbol`, if any.
    fn unsubscribe(&self, symbol: &Symbol) -> BoxFuture<'_, ()>;
}

/// Arc wrapper for QuoteFeed trait objects.
pub type DynQuoteFeed = Arc<dyn QuoteFeed>;

/// Scriptable feed for tests.
///
/// Quotes are injected with [`MockQuoteFeed::push`]; transport failures with
/// [`MockQuoteFeed::fail_subscribe`] and [`MockQuoteFeed::drop_stream`].
#[derive(Debug, Default)]
pub struct MockQuoteFeed {
    streams: Mutex<HashMap<Symbol, mpsc::Sender<Quote>>>,
    failing: Mutex<HashSet<Symbol>>,
    subscribe_calls: Mutex<Vec<Symbol>>,
    unsubscribe_calls: Mutex<Vec<Symbol>>,
    subscribe_delay: Mutex<Option<Duration>>,
}

const MOCK_STREAM_CAPACITY: usize = 256;

impl MockQuoteFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subscribe for `symbol` fail until [`Self::allow_subscribe`].
    pub fn fail_subscribe(&self, symbol: &Symbol) {
        self.failing.lock().insert(symbol.clone());
    }

    pub fn allow_subscribe(&self, symbol: &Symbol) {
        self.failing.lock().remove(symbol);
    }

    /// Delay every subscribe, to widen race windows in tests.
    pub fn set_subscribe_delay(&self, delay: Option<Duration>) {
        *self.subscribe_delay.lock() = delay;
    }

    /// Deliver a quote on its symbol's stream. Returns false if no stream is open.
    pub async fn push(&self, quote: Quote) -> bool {
        let sender = self.streams.lock().get(&quote.symbol).cloned();
        match sender {
            Some(tx) => tx.send(quote).await.is_ok(),
            None => false,
        }
    }

    /// End a symbol's stream as if the transport had dropped it.
    pub fn drop_stream(&self, symbol: &Symbol) -> bool {
        self.streams.lock().remove(symbol).is_some()
    }

    pub fn is_open(&self, symbol: &Symbol) -> bool {
        self.streams
            .lock()
            .get(symbol)
            .is_some_and(|tx| !tx.is_closed())
    }

    pub fn open_count(&self) -> usize {
        self.streams
            .lock()
            .values()
            .filter(|tx| !tx.is_closed())
            .count()
    }

    pub fn subscribe_count(&self, symbol: &Symbol) -> usize {
        self.subscribe_calls
            .lock()
            .iter()
            .filter(|s| *s == symbol)
            .count()
    }

    pub fn unsubscribe_count(&self, symbol: &Symbol) -> usize {
        self.unsubscribe_calls
            .lock()
            .iter()
            .filter(|s| *s == symbol)
            .count()
    }
}

impl QuoteFeed for MockQuoteFeed {
    fn subscribe(&self, symbol: &Symbol) -> BoxFuture<'_, FeedResult<QuoteStream>> {
        let symbol = symbol.clone();
        Box::pin(async move {
            let delay = *self.subscribe_delay.lock();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            self.subscribe_calls.lock().push(symbol.clone());
            if self.failing.lock().contains(&symbol) {
                return Err(FeedError::Transport {
                    symbol: symbol.to_string(),
                    reason: "mock subscribe failure".to_string(),
                });
            }
            let (tx, rx) = mpsc::channel(MOCK_STREAM_CAPACITY);
            self.streams.lock().insert(symbol, tx);
            Ok(rx)
        })
    }

    fn unsubscribe(&self, symbol: &Symbol) -> BoxFuture<'_, ()> {
        let symbol = symbol.clone();
        Box::pin(async move {
            self.streams.lock().remove(&symbol);
            self.unsubscribe_calls.lock().push(symbol);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use tickwatch_core::{Price, Volume};

    fn quote(symbol: &Symbol, price: Price) -> Quote {
        Quote::new(symbol.clone(), Some(price), Volume::ZERO, Utc::now())
    }

    #[tokio::test]
    async fn test_mock_feed_delivers_and_closes() {
        let feed = MockQuoteFeed::new();
        let sym = Symbol::new("2330").unwrap();

        assert!(!feed.push(quote(&sym, Price::new(dec!(1)))).await);

        let mut rx = feed.subscribe(&sym).await.unwrap();
        assert!(feed.is_open(&sym));
        assert!(feed.push(quote(&sym, Price::new(dec!(580)))).await);
        assert_eq!(rx.recv().await.unwrap().price, Some(Price::new(dec!(580))));

        feed.unsubscribe(&sym).await;
        assert!(rx.recv().await.is_none());
        assert_eq!(feed.open_count(), 0);
        assert_eq!(feed.subscribe_count(&sym), 1);
        assert_eq!(feed.unsubscribe_count(&sym), 1);
    }

    #[tokio::test]
    async fn test_mock_feed_scripted_failure() {
        let feed = MockQuoteFeed::new();
        let sym = Symbol::new("0050").unwrap();
        feed.fail_subscribe(&sym);
        assert!(matches!(
            feed.subscribe(&sym).await,
            Err(FeedError::Transport { .. })
        ));
        feed.allow_subscribe(&sym);
        assert!(feed.subscribe(&sym).await.is_ok());
    }
}
