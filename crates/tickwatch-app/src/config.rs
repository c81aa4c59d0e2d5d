//! Application configuration.
//!
//! Loaded from TOML; every field has a default so a partial (or missing)
//! file is valid. Secrets come from the environment only.

use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tickwatch_dispatch::{HttpBrokerConfig, LineNotifyConfig, DEFAULT_DISPLAY_OFFSET};
use tickwatch_engine::EngineConfig;
use tickwatch_feed::{FeedManagerConfig, FugleFeedConfig};
use tickwatch_http::HttpConfig;
use tickwatch_telemetry::DEFAULT_FILTER;
use tickwatch_ws::ConnectionConfig;

pub const ENV_CONFIG_PATH: &str = "TICKWATCH_CONFIG";
pub const ENV_FUGLE_TOKEN: &str = "FUGLE_API_TOKEN";
pub const ENV_LINE_TOKEN: &str = "LINE_NOTIFY_TOKEN";
pub const ENV_API_TOKEN: &str = "TICKWATCH_API_TOKEN";
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Subscription management.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSection {
    /// Maximum symbols watched at once (Fugle allows 5 sockets per token).
    #[serde(default = "default_max_subscriptions")]
    pub max_subscriptions: usize,
    #[serde(default = "default_resubscribe_window_ms")]
    pub resubscribe_window_ms: u64,
    #[serde(default = "default_resubscribe_base_delay_ms")]
    pub resubscribe_base_delay_ms: u64,
    #[serde(default = "default_resubscribe_max_delay_ms")]
    pub resubscribe_max_delay_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_max_subscriptions() -> usize {
    5
}

fn default_resubscribe_window_ms() -> u64 {
    60_000
}

fn default_resubscribe_base_delay_ms() -> u64 {
    1_000
}

fn default_resubscribe_max_delay_ms() -> u64 {
    15_000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_channel_capacity() -> usize {
    1024
}

impl Default for FeedSection {
    fn default() -> Self {
        Self {
            max_subscriptions: default_max_subscriptions(),
            resubscribe_window_ms: default_resubscribe_window_ms(),
            resubscribe_base_delay_ms: default_resubscribe_base_delay_ms(),
            resubscribe_max_delay_ms: default_resubscribe_max_delay_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Per-symbol WebSocket connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSocketSection {
    #[serde(default = "default_ws_base_url")]
    pub base_url: String,
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,
    #[serde(default = "default_reconnect_jitter_ms")]
    pub reconnect_jitter_ms: u64,
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,
    /// From `FUGLE_API_TOKEN`.
    #[serde(skip)]
    pub api_token: String,
}

fn default_ws_base_url() -> String {
    "wss://api.fugle.tw/realtime/v0.3".to_string()
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_reconnect_base_delay_ms() -> u64 {
    500
}

fn default_reconnect_max_delay_ms() -> u64 {
    10_000
}

fn default_reconnect_jitter_ms() -> u64 {
    250
}

fn default_heartbeat_interval_ms() -> u64 {
    30_000
}

fn default_heartbeat_timeout_ms() -> u64 {
    10_000
}

impl Default for WebSocketSection {
    fn default() -> Self {
        Self {
            base_url: default_ws_base_url(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
            reconnect_jitter_ms: default_reconnect_jitter_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
            api_token: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Append-only journal on disk.
    #[default]
    Journal,
    /// Process memory; nothing survives a restart.
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSection {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Rewrite the journal to live records before restore.
    #[serde(default = "default_compact_on_start")]
    pub compact_on_start: bool,
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_compact_on_start() -> bool {
    true
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            data_dir: default_data_dir(),
            compact_on_start: default_compact_on_start(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierSection {
    #[serde(default = "default_notify_url")]
    pub url: String,
    #[serde(default = "default_http_timeout_ms")]
    pub timeout_ms: u64,
    /// UTC offset used for the alert timestamp line.
    #[serde(default = "default_display_offset")]
    pub display_offset: String,
    /// From `LINE_NOTIFY_TOKEN`.
    #[serde(skip)]
    pub token: String,
}

fn default_notify_url() -> String {
    "https://notify-api.line.me/api/notify".to_string()
}

fn default_http_timeout_ms() -> u64 {
    5_000
}

fn default_display_offset() -> String {
    DEFAULT_DISPLAY_OFFSET.to_string()
}

impl Default for NotifierSection {
    fn default() -> Self {
        Self {
            url: default_notify_url(),
            timeout_ms: default_http_timeout_ms(),
            display_offset: default_display_offset(),
            token: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerSection {
    #[serde(default = "default_broker_url")]
    pub url: String,
    #[serde(default = "default_http_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_broker_url() -> String {
    "http://127.0.0.1:3001/orders".to_string()
}

impl Default for BrokerSection {
    fn default() -> Self {
        Self {
            url: default_broker_url(),
            timeout_ms: default_http_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetrySection {
    /// `EnvFilter` directives; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_log_filter() -> String {
    DEFAULT_FILTER.to_string()
}

impl Default for TelemetrySection {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub feed: FeedSection,
    #[serde(default)]
    pub websocket: WebSocketSection,
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub notifier: NotifierSection,
    #[serde(default)]
    pub broker: BrokerSection,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub telemetry: TelemetrySection,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read {}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> AppResult<Self> {
        toml::from_str(content).map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))
    }

    /// Resolve the path (`--config` > `TICKWATCH_CONFIG` > default), load it,
    /// and overlay secrets from the environment. A missing default file
    /// yields built-in defaults; a missing explicit file is an error.
    pub fn load(cli_path: Option<String>) -> AppResult<(Self, String)> {
        let explicit = cli_path.or_else(|| std::env::var(ENV_CONFIG_PATH).ok());
        let path = explicit
            .clone()
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

        let mut config = if explicit.is_none() && !Path::new(&path).exists() {
            Self::default()
        } else {
            Self::from_file(&path)?
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok((config, path))
    }

    /// Fill secrets through `lookup` (the process environment in production).
    pub fn apply_env<F: Fn(&str) -> Option<String>>(&mut self, lookup: F) {
        if let Some(token) = lookup(ENV_FUGLE_TOKEN) {
            self.websocket.api_token = token;
        }
        if let Some(token) = lookup(ENV_LINE_TOKEN) {
            self.notifier.token = token;
        }
        if let Some(token) = lookup(ENV_API_TOKEN) {
            self.http.api_token = token;
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.feed.max_subscriptions == 0 {
            return Err(AppError::Config("feed.max_subscriptions must be at least 1".to_string()));
        }
        if self.feed.channel_capacity == 0 {
            return Err(AppError::Config("feed.channel_capacity must be at least 1".to_string()));
        }
        if self.websocket.api_token.trim().is_empty() {
            return Err(AppError::Config(format!("{ENV_FUGLE_TOKEN} is not set")));
        }
        Ok(())
    }

    pub fn feed_manager_config(&self) -> FeedManagerConfig {
        FeedManagerConfig {
            max_subscriptions: self.feed.max_subscriptions,
            resubscribe_window_ms: self.feed.resubscribe_window_ms,
            resubscribe_base_delay_ms: self.feed.resubscribe_base_delay_ms,
            resubscribe_max_delay_ms: self.feed.resubscribe_max_delay_ms,
        }
    }

    pub fn fugle_feed_config(&self) -> FugleFeedConfig {
        let ws = &self.websocket;
        FugleFeedConfig {
            connection: ConnectionConfig {
                base_url: ws.base_url.clone(),
                api_token: ws.api_token.clone(),
                max_reconnect_attempts: ws.max_reconnect_attempts,
                reconnect_base_delay_ms: ws.reconnect_base_delay_ms,
                reconnect_max_delay_ms: ws.reconnect_max_delay_ms,
                reconnect_jitter_ms: ws.reconnect_jitter_ms,
                heartbeat_interval_ms: ws.heartbeat_interval_ms,
                heartbeat_timeout_ms: ws.heartbeat_timeout_ms,
            },
            connect_timeout_ms: self.feed.connect_timeout_ms,
            channel_capacity: self.feed.channel_capacity,
        }
    }

    pub fn line_notify_config(&self) -> LineNotifyConfig {
        LineNotifyConfig {
            url: self.notifier.url.clone(),
            token: self.notifier.token.clone(),
            timeout_ms: self.notifier.timeout_ms,
        }
    }

    pub fn broker_config(&self) -> HttpBrokerConfig {
        HttpBrokerConfig {
            url: self.broker.url.clone(),
            timeout_ms: self.broker.timeout_ms,
        }
    }
}
