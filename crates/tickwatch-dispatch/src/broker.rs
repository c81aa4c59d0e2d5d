//! Order submission to the trader service.
//!
//! Submission is fire-and-forget: the matching engine never waits for, or
//! learns about, the broker's answer.

use crate::error::{DispatchError, DispatchResult};
use parking_lot::Mutex;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tickwatch_core::OrderPayload;
use tickwatch_telemetry::Metrics;
use tracing::{debug, warn};

pub trait Broker: Send + Sync {
    fn submit(&self, payload: OrderPayload);
}

/// Arc wrapper for Broker trait objects.
pub type DynBroker = Arc<dyn Broker>;

#[derive(Debug, Clone)]
pub struct HttpBrokerConfig {
    /// Endpoint receiving the order payload as a JSON body.
    pub url: String,
    pub timeout_ms: u64,
}

impl Default for HttpBrokerConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:3001/orders".to_string(),
            timeout_ms: 5_000,
        }
    }
}

/// POSTs each order on a spawned task. Must be used inside a Tokio runtime.
pub struct HttpBroker {
    client: Client,
    url: Arc<str>,
}

impl HttpBroker {
    pub fn new(config: HttpBrokerConfig) -> DispatchResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| DispatchError::HttpClient(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: Arc::from(config.url),
        })
    }
}

impl Broker for HttpBroker {
    fn submit(&self, payload: OrderPayload) {
        let client = self.client.clone();
        let url = self.url.clone();
        tokio::spawn(async move {
            match client.post(url.as_ref()).json(payload.as_value()).send().await {
                Ok(response) if response.status().is_success() => {
                    debug!(status = response.status().as_u16(), "Order accepted by trader service");
                }
                Ok(response) => {
                    Metrics::dispatch_failed("order");
                    warn!(status = response.status().as_u16(), "Trader service rejected order");
                }
                Err(e) => {
                    Metrics::dispatch_failed("order");
                    warn!(error = %e, "Order submission failed");
                }
            }
        });
    }
}

/// Mock broker for testing.
#[derive(Debug, Default)]
pub struct MockBroker {
    submitted: Mutex<Vec<OrderPayload>>,
}

impl MockBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submitted(&self) -> Vec<OrderPayload> {
        self.submitted.lock().clone()
    }

    pub fn submitted_count(&self) -> usize {
        self.submitted.lock().len()
    }
}

impl Broker for MockBroker {
    fn submit(&self, payload: OrderPayload) {
        self.submitted.lock().push(payload);
    }
}
