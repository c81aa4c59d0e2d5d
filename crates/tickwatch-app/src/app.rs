//! Application wiring and lifecycle.

use crate::config::{AppConfig, StoreBackend};
use crate::error::{AppError, AppResult};
use std::sync::Arc;
use tickwatch_dispatch::{parse_display_offset, ActionDispatcher, HttpBroker, LineNotifier};
use tickwatch_engine::{MatchingEngine, MonitorService, PriceIndex};
use tickwatch_feed::{FeedFatal, FeedManager, FugleQuoteFeed};
use tickwatch_store::{DynMonitorStore, JournalMonitorStore, MemoryMonitorStore};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Why the main loop stopped.
enum Exit {
    Signal,
    Fatal(FeedFatal),
    ServerStopped,
}

/// Main application.
pub struct Application {
    config: AppConfig,
    service: Arc<MonitorService>,
    fatal_rx: mpsc::Receiver<FeedFatal>,
    shutdown: CancellationToken,
}

impl Application {
    /// Build every component. Must be called inside a Tokio runtime.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        config.validate()?;

        let store = open_store(&config)?;
        let feed = Arc::new(FugleQuoteFeed::new(config.fugle_feed_config()));
        let (feeds, fatal_rx) = FeedManager::new(feed, config.feed_manager_config());
        let feeds = Arc::new(feeds);

        if config.notifier.token.trim().is_empty() {
            warn!("LINE_NOTIFY_TOKEN is not set, alert delivery will fail");
        }
        let dispatcher = ActionDispatcher::new(
            Arc::new(LineNotifier::new(config.line_notify_config())?),
            Arc::new(HttpBroker::new(config.broker_config())?),
            parse_display_offset(&config.notifier.display_offset)?,
        );

        let index = Arc::new(PriceIndex::new());
        let engine = Arc::new(MatchingEngine::new(
            index.clone(),
            store.clone(),
            dispatcher,
            feeds.clone(),
            config.engine.clone(),
        ));
        let service = Arc::new(MonitorService::new(store, index, feeds, engine));

        Ok(Self {
            config,
            service,
            fatal_rx,
            shutdown: CancellationToken::new(),
        })
    }

    /// Restore monitors, serve the API and run until Ctrl-C or a fatal feed
    /// condition. Coverage loss is returned as an error.
    pub async fn run(mut self) -> AppResult<()> {
        let report = self.service.start().await?;
        info!(
            restored = report.restored,
            dropped = report.dropped.len(),
            max_subscriptions = self.config.feed.max_subscriptions,
            "Monitors armed"
        );

        let mut server = self.spawn_server();

        let exit = tokio::select! {
            _ = tokio::signal::ctrl_c() => Exit::Signal,
            Some(fatal) = self.fatal_rx.recv() => Exit::Fatal(fatal),
            _ = wait_server(&mut server) => Exit::ServerStopped,
        };

        self.shutdown.cancel();
        self.service.shutdown().await;
        if let Some(handle) = server {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(error = %e, "HTTP server failed"),
                Err(e) => error!(error = %e, "HTTP server task panicked"),
            }
        }

        match exit {
            Exit::Signal => {
                info!("Shutdown signal received, stopped");
                Ok(())
            }
            Exit::Fatal(FeedFatal::CoverageLost { symbol, attempts }) => {
                error!(%symbol, attempts, "Quote coverage lost, exiting");
                Err(AppError::CoverageLost {
                    symbol: symbol.to_string(),
                    attempts,
                })
            }
            Exit::ServerStopped => Err(AppError::Io(std::io::Error::other(
                "HTTP server stopped unexpectedly",
            ))),
        }
    }

    fn spawn_server(&self) -> Option<JoinHandle<std::io::Result<()>>> {
        if !self.config.http.enabled {
            info!("HTTP API disabled");
            return None;
        }
        let service = self.service.clone();
        let config = self.config.http.clone();
        let shutdown = self.shutdown.clone();
        Some(tokio::spawn(async move {
            tickwatch_http::run_server(service, config, shutdown).await
        }))
    }
}

/// Resolves when the server task ends; pending forever when there is none.
async fn wait_server(server: &mut Option<JoinHandle<std::io::Result<()>>>) {
    match server {
        Some(handle) => {
            let result = handle.await;
            *server = None;
            match result {
                Ok(Ok(())) => warn!("HTTP server exited"),
                Ok(Err(e)) => error!(error = %e, "HTTP server failed"),
                Err(e) => error!(error = %e, "HTTP server task panicked"),
            }
        }
        None => std::future::pending().await,
    }
}

fn open_store(config: &AppConfig) -> AppResult<DynMonitorStore> {
    match config.store.backend {
        StoreBackend::Memory => {
            warn!("Using in-memory monitor store, monitors will not survive a restart");
            Ok(Arc::new(MemoryMonitorStore::new()))
        }
        StoreBackend::Journal => {
            let store = JournalMonitorStore::open(&config.store.data_dir)?;
            if config.store.compact_on_start {
                let removed = store.compact()?;
                info!(path = %store.path().display(), removed, "Journal compacted");
            }
            Ok(Arc::new(store))
        }
    }
}
