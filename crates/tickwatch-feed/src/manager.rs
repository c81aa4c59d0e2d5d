//! Refcounted live subscriptions with admission control.
//!
//! Every subscribed symbol gets one delivery lane: a task that pulls quotes
//! from the symbol's stream in arrival order and hands them to the
//! [`TickSink`]. Lanes hold their ticks until [`FeedManager::start_delivery`]
//! is called so that restore finishes before anything is matched.
//!
//! Subscription bookkeeping (admission, refcounts) is serialized behind one
//! async mutex. Transport subscribes run outside it: a new symbol reserves
//! its slot first, and at most one transport call per symbol is in flight.

use crate::error::{FeedError, FeedResult};
use crate::source::{BoxFuture, DynQuoteFeed, QuoteStream};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tickwatch_core::{Quote, Symbol};
use tickwatch_telemetry::Metrics;
use tokio::sync::{mpsc, watch, Mutex as TokioMutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Consumer of delivered ticks. Called sequentially per symbol.
pub trait TickSink: Send + Sync {
    fn on_tick(&self, quote: Quote) -> BoxFuture<'_, ()>;
}

#[derive(Debug, Clone)]
pub struct FeedManagerConfig {
    /// Maximum concurrently open symbol subscriptions.
    pub max_subscriptions: usize,
    /// How long a lane keeps trying to reopen a dropped stream.
    pub resubscribe_window_ms: u64,
    pub resubscribe_base_delay_ms: u64,
    pub resubscribe_max_delay_ms: u64,
}

impl Default for FeedManagerConfig {
    fn default() -> Self {
        Self {
            max_subscriptions: 5,
            resubscribe_window_ms: 60_000,
            resubscribe_base_delay_ms: 1_000,
            resubscribe_max_delay_ms: 15_000,
        }
    }
}

impl FeedManagerConfig {
    fn resubscribe_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self
            .resubscribe_base_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.resubscribe_max_delay_ms);
        Duration::from_millis(delay)
    }
}

/// Unrecoverable feed condition, reported to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedFatal {
    /// A symbol with active monitors could not be resubscribed in time.
    CoverageLost { symbol: Symbol, attempts: u32 },
}

/// Progress of a symbol's first transport subscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenState {
    Pending,
    Opened,
    Failed,
    ShutDown,
}

struct SymbolSubscription {
    refcount: usize,
    cancel: CancellationToken,
    /// Set until the first transport subscribe settles.
    opening: Option<watch::Receiver<OpenState>>,
    /// A transport subscribe for this symbol is running outside the lock.
    /// Releasing the last reference meanwhile leaves the close to that call.
    in_flight: bool,
}

impl SymbolSubscription {
    fn reserve(cancel: CancellationToken, opening: watch::Receiver<OpenState>) -> Self {
        Self {
            refcount: 1,
            cancel,
            opening: Some(opening),
            in_flight: true,
        }
    }
}

type SubscriptionMap = Arc<TokioMutex<HashMap<Symbol, SymbolSubscription>>>;

pub struct FeedManager {
    feed: DynQuoteFeed,
    config: FeedManagerConfig,
    subscriptions: SubscriptionMap,
    delivery_tx: watch::Sender<bool>,
    fatal_tx: mpsc::Sender<FeedFatal>,
    shutdown_token: CancellationToken,
}

impl FeedManager {
    /// Create a manager and the receiver for its fatal signals.
    pub fn new(feed: DynQuoteFeed, config: FeedManagerConfig) -> (Self, mpsc::Receiver<FeedFatal>) {
        let (delivery_tx, _) = watch::channel(false);
        let (fatal_tx, fatal_rx) = mpsc::channel(16);
        let manager = Self {
            feed,
            config,
            subscriptions: Arc::new(TokioMutex::new(HashMap::new())),
            delivery_tx,
            fatal_tx,
            shutdown_token: CancellationToken::new(),
        };
        (manager, fatal_rx)
    }

    pub fn max_subscriptions(&self) -> usize {
        self.config.max_subscriptions
    }

    /// Take one reference on `symbol`'s subscription, opening it if needed.
    ///
    /// A symbol being opened by another caller counts against the limit;
    /// later callers for it wait for that attempt instead of starting their own.
    pub async fn subscribe(&self, symbol: &Symbol, sink: Arc<dyn TickSink>) -> FeedResult<()> {
        let opened = {
            let mut subs = self.subscriptions.lock().await;
            if self.shutdown_token.is_cancelled() {
                return Err(FeedError::ShutDown);
            }

            if let Some(sub) = subs.get_mut(symbol) {
                sub.refcount += 1;
                debug!(%symbol, refcount = sub.refcount, "Subscription reused");
                let Some(mut opening) = sub.opening.clone() else {
                    return Ok(());
                };
                drop(subs);
                return wait_opened(symbol, &mut opening).await;
            }

            if subs.len() >= self.config.max_subscriptions {
                Metrics::subscription_rejected();
                warn!(
                    %symbol,
                    limit = self.config.max_subscriptions,
                    "Subscription limit reached"
                );
                return Err(FeedError::SubscriptionLimitExceeded {
                    limit: self.config.max_subscriptions,
                });
            }

            let (opened, opening) = watch::channel(OpenState::Pending);
            subs.insert(
                symbol.clone(),
                SymbolSubscription::reserve(self.shutdown_token.child_token(), opening),
            );
            opened
        };

        self.open(symbol, sink, opened).await
    }

    /// Run the first transport subscribe for a reserved symbol, then commit
    /// or release the reservation.
    async fn open(
        &self,
        symbol: &Symbol,
        sink: Arc<dyn TickSink>,
        opened: watch::Sender<OpenState>,
    ) -> FeedResult<()> {
        let result = self.feed.subscribe(symbol).await;
        let mut subs = self.subscriptions.lock().await;

        let stream = match result {
            Ok(stream) => stream,
            Err(e) => {
                subs.remove(symbol);
                opened.send_replace(OpenState::Failed);
                return Err(e);
            }
        };

        let live = subs
            .get_mut(symbol)
            .filter(|sub| !sub.cancel.is_cancelled());
        let Some(sub) = live else {
            self.feed.unsubscribe(symbol).await;
            opened.send_replace(OpenState::ShutDown);
            return Err(FeedError::ShutDown);
        };

        sub.opening = None;
        sub.in_flight = false;
        if sub.refcount == 0 {
            let cancel = sub.cancel.clone();
            self.close_locked(&mut subs, symbol, &cancel).await;
            opened.send_replace(OpenState::Opened);
            return Ok(());
        }

        let lane = Lane {
            symbol: symbol.clone(),
            feed: self.feed.clone(),
            sink,
            config: self.config.clone(),
            subscriptions: self.subscriptions.clone(),
            delivery_rx: self.delivery_tx.subscribe(),
            fatal_tx: self.fatal_tx.clone(),
            cancel: sub.cancel.clone(),
        };
        tokio::spawn(lane.run(stream));
        opened.send_replace(OpenState::Opened);

        Metrics::open_subscriptions(subs.len());
        info!(%symbol, open = subs.len(), "Subscription opened");
        Ok(())
    }

    /// Remove `symbol`, stop its lane and close the transport subscription.
    async fn close_locked(
        &self,
        subs: &mut HashMap<Symbol, SymbolSubscription>,
        symbol: &Symbol,
        cancel: &CancellationToken,
    ) {
        subs.remove(symbol);
        cancel.cancel();
        self.feed.unsubscribe(symbol).await;
        Metrics::open_subscriptions(subs.len());
        info!(%symbol, open = subs.len(), "Subscription closed");
    }

    /// Drop one reference on `symbol`; at zero the lane stops and the
    /// transport subscription is closed.
    ///
    /// Safe to call from inside a lane's own `on_tick`: the lane is signalled,
    /// never awaited.
    pub async fn unsubscribe(&self, symbol: &Symbol) {
        let mut subs = self.subscriptions.lock().await;
        let Some(sub) = subs.get_mut(symbol) else {
            debug!(%symbol, "Unsubscribe for symbol without subscription");
            return;
        };

        sub.refcount = sub.refcount.saturating_sub(1);
        if sub.refcount > 0 {
            debug!(%symbol, refcount = sub.refcount, "Subscription released");
            return;
        }
        if sub.in_flight {
            debug!(%symbol, "Last reference released during transport subscribe");
            return;
        }

        let cancel = sub.cancel.clone();
        self.close_locked(&mut subs, symbol, &cancel).await;
    }

    /// Open the startup gate; lanes begin delivering ticks.
    pub fn start_delivery(&self) {
        self.delivery_tx.send_replace(true);
        info!("Tick delivery started");
    }

    pub fn is_delivering(&self) -> bool {
        *self.delivery_tx.borrow()
    }

    /// Stop every lane and close every transport subscription.
    ///
    /// Subscribes still in flight close their own transport subscription when
    /// they return.
    pub async fn shutdown(&self) {
        let mut subs = self.subscriptions.lock().await;
        self.shutdown_token.cancel();
        for (symbol, _) in subs.drain() {
            self.feed.unsubscribe(&symbol).await;
        }
        Metrics::open_subscriptions(0);
        info!("Feed manager shut down");
    }

    pub async fn refcount(&self, symbol: &Symbol) -> usize {
        self.subscriptions
            .lock()
            .await
            .get(symbol)
            .map_or(0, |sub| sub.refcount)
    }

    pub async fn open_subscriptions(&self) -> usize {
        self.subscriptions.lock().await.len()
    }

    pub async fn symbols(&self) -> Vec<Symbol> {
        let mut symbols: Vec<Symbol> = self.subscriptions.lock().await.keys().cloned().collect();
        symbols.sort();
        symbols
    }
}

/// Per-symbol delivery task.
struct Lane {
    symbol: Symbol,
    feed: DynQuoteFeed,
    sink: Arc<dyn TickSink>,
    config: FeedManagerConfig,
    subscriptions: SubscriptionMap,
    delivery_rx: watch::Receiver<bool>,
    fatal_tx: mpsc::Sender<FeedFatal>,
    cancel: CancellationToken,
}

impl Lane {
    async fn run(mut self, mut stream: QuoteStream) {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => return,
            open = wait_open(&mut self.delivery_rx) => {
                if !open {
                    return;
                }
            }
        }

        loop {
            let next = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                next = stream.recv() => next,
            };
            match next {
                Some(quote) => {
                    Metrics::tick_received(self.symbol.as_str());
                    self.sink.on_tick(quote).await;
                }
                None => match self.resubscribe().await {
                    Some(reopened) => stream = reopened,
                    None => break,
                },
            }
        }
        debug!(symbol = %self.symbol, "Delivery lane stopped");
    }

    /// Reopen a dropped stream with backoff inside the configured window.
    async fn resubscribe(&self) -> Option<QuoteStream> {
        let deadline = Instant::now() + Duration::from_millis(self.config.resubscribe_window_ms);
        let mut attempt = 0u32;
        warn!(symbol = %self.symbol, "Quote stream dropped, resubscribing");

        loop {
            attempt += 1;
            Metrics::resubscribe_attempt(self.symbol.as_str());
            if !self.begin_reopen().await {
                return None;
            }

            let result = self.feed.subscribe(&self.symbol).await;
            if self.finish_reopen(result.is_ok()).await {
                return None;
            }
            match result {
                Ok(stream) => {
                    info!(symbol = %self.symbol, attempt, "Quote stream restored");
                    return Some(stream);
                }
                Err(e) => {
                    warn!(symbol = %self.symbol, attempt, error = %e, "Resubscribe failed");
                }
            }

            let delay = self.config.resubscribe_delay(attempt);
            if Instant::now() + delay > deadline {
                error!(symbol = %self.symbol, attempts = attempt, "Quote coverage lost");
                Metrics::coverage_lost(self.symbol.as_str());
                let fatal = FeedFatal::CoverageLost {
                    symbol: self.symbol.clone(),
                    attempts: attempt,
                };
                if self.fatal_tx.send(fatal).await.is_err() {
                    warn!(symbol = %self.symbol, "No receiver for fatal feed signal");
                }
                return None;
            }

            tokio::select! {
                () = self.cancel.cancelled() => return None,
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Mark a transport subscribe in flight. False once the lane is cancelled.
    async fn begin_reopen(&self) -> bool {
        let mut subs = self.subscriptions.lock().await;
        if self.cancel.is_cancelled() {
            return false;
        }
        match subs.get_mut(&self.symbol) {
            Some(sub) => {
                sub.in_flight = true;
                true
            }
            None => false,
        }
    }

    /// Clear the in-flight mark. Returns true when the lane must stop: it was
    /// shut down, or its last reference went away during the subscribe. Any
    /// stream just opened is closed before the lock is released.
    async fn finish_reopen(&self, opened: bool) -> bool {
        let mut subs = self.subscriptions.lock().await;
        let live = subs
            .get_mut(&self.symbol)
            .filter(|_| !self.cancel.is_cancelled());
        let Some(sub) = live else {
            if opened {
                self.feed.unsubscribe(&self.symbol).await;
            }
            return true;
        };
        sub.in_flight = false;
        if sub.refcount > 0 {
            return false;
        }

        subs.remove(&self.symbol);
        self.cancel.cancel();
        self.feed.unsubscribe(&self.symbol).await;
        Metrics::open_subscriptions(subs.len());
        info!(symbol = %self.symbol, open = subs.len(), "Subscription closed");
        true
    }
}

/// Wait for another caller's first subscribe on `symbol` to settle.
async fn wait_opened(symbol: &Symbol, opening: &mut watch::Receiver<OpenState>) -> FeedResult<()> {
    let state = opening
        .wait_for(|state| *state != OpenState::Pending)
        .await
        .map_or(OpenState::Failed, |state| *state);
    match state {
        OpenState::Opened => Ok(()),
        OpenState::ShutDown => Err(FeedError::ShutDown),
        OpenState::Pending | OpenState::Failed => Err(FeedError::Transport {
            symbol: symbol.to_string(),
            reason: "concurrent subscribe failed".to_string(),
        }),
    }
}

async fn wait_open(rx: &mut watch::Receiver<bool>) -> bool {
    rx.wait_for(|open| *open).await.is_ok()
}
