//! Alert notification channel.

use crate::error::{DispatchError, DispatchResult};
use parking_lot::Mutex;
use reqwest::Client;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tickwatch_core::BoxFuture;
use tracing::debug;

pub trait Notifier: Send + Sync {
    /// Deliver one message. Errors are reported, never retried.
    fn send(&self, text: String) -> BoxFuture<'_, DispatchResult<()>>;
}

/// Arc wrapper for Notifier trait objects.
pub type DynNotifier = Arc<dyn Notifier>;

#[derive(Debug, Clone)]
pub struct LineNotifyConfig {
    pub url: String,
    pub token: String,
    pub timeout_ms: u64,
}

impl Default for LineNotifyConfig {
    fn default() -> Self {
        Self {
            url: "https://notify-api.line.me/api/notify".to_string(),
            token: String::new(),
            timeout_ms: 5_000,
        }
    }
}

/// LINE Notify: form POST of `message` with a bearer token.
pub struct LineNotifier {
    client: Client,
    config: LineNotifyConfig,
}

impl LineNotifier {
    pub fn new(config: LineNotifyConfig) -> DispatchResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| DispatchError::HttpClient(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    async fn post(&self, text: String) -> DispatchResult<()> {
        if self.config.token.trim().is_empty() {
            return Err(DispatchError::NotConfigured("LINE Notify token"));
        }

        let response = self
            .client
            .post(&self.config.url)
            .bearer_auth(&self.config.token)
            .form(&[("message", text.as_str())])
            .send()
            .await
            .map_err(|e| DispatchError::HttpClient(format!("LINE Notify request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DispatchError::Rejected {
                service: "LINE Notify",
                status: status.as_u16(),
                body,
            });
        }
        debug!(status = status.as_u16(), "LINE Notify accepted message");
        Ok(())
    }
}

impl Notifier for LineNotifier {
    fn send(&self, text: String) -> BoxFuture<'_, DispatchResult<()>> {
        Box::pin(self.post(text))
    }
}

/// Mock notifier for testing.
#[derive(Debug, Default)]
pub struct MockNotifier {
    sent: Mutex<Vec<String>>,
    failing: AtomicBool,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent sends fail (the text is still recorded).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }
}

impl Notifier for MockNotifier {
    fn send(&self, text: String) -> BoxFuture<'_, DispatchResult<()>> {
        Box::pin(async move {
            self.sent.lock().push(text);
            if self.failing.load(Ordering::SeqCst) {
                return Err(DispatchError::Rejected {
                    service: "mock notifier",
                    status: 500,
                    body: "scripted failure".to_string(),
                });
            }
            Ok(())
        })
    }
}
