//! Liveness tracking for a quote connection.
//!
//! The quote endpoint stays silent outside trading hours, so silence alone is
//! not a failure. A ping frame is sent after `interval_ms` of inactivity and
//! the connection is considered dead if no pong arrives within `timeout_ms`.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::time::Duration;
use tracing::trace;

#[derive(Debug, Clone, Copy)]
struct HeartbeatState {
    last_ping: Option<DateTime<Utc>>,
    last_pong: Option<DateTime<Utc>>,
    last_message: DateTime<Utc>,
    awaiting_pong: bool,
}

impl HeartbeatState {
    fn fresh() -> Self {
        Self {
            last_ping: None,
            last_pong: None,
            last_message: Utc::now(),
            awaiting_pong: false,
        }
    }
}

pub struct HeartbeatManager {
    interval_ms: u64,
    timeout_ms: u64,
    state: Mutex<HeartbeatState>,
}

impl HeartbeatManager {
    pub fn new(interval_ms: u64, timeout_ms: u64) -> Self {
        Self {
            interval_ms,
            timeout_ms,
            state: Mutex::new(HeartbeatState::fresh()),
        }
    }

    /// Forget everything from the previous connection.
    pub fn reset(&self) {
        *self.state.lock() = HeartbeatState::fresh();
    }

    pub fn record_ping(&self) {
        let mut state = self.state.lock();
        state.last_ping = Some(Utc::now());
        state.awaiting_pong = true;
    }

    pub fn record_pong(&self) {
        let now = Utc::now();
        let mut state = self.state.lock();
        state.last_pong = Some(now);
        state.last_message = now;
        state.awaiting_pong = false;
        if let Some(ping) = state.last_ping {
            trace!(rtt_ms = (now - ping).num_milliseconds(), "Pong received");
        }
    }

    /// Any inbound frame counts as activity.
    pub fn record_message(&self) {
        self.state.lock().last_message = Utc::now();
    }

    pub fn is_timed_out(&self) -> bool {
        let state = self.state.lock();
        match (state.awaiting_pong, state.last_ping) {
            (true, Some(ping)) => (Utc::now() - ping).num_milliseconds() > self.timeout_ms as i64,
            _ => false,
        }
    }

    pub fn should_send_ping(&self) -> bool {
        let state = self.state.lock();
        !state.awaiting_pong
            && (Utc::now() - state.last_message).num_milliseconds() >= self.interval_ms as i64
    }

    /// Sleep until the next liveness check is due.
    pub async fn wait_for_check(&self) {
        let step = (self.interval_ms / 2).min(self.timeout_ms / 2).max(1);
        tokio::time::sleep(Duration::from_millis(step)).await;
    }

    pub fn stats(&self) -> HeartbeatStats {
        let state = *self.state.lock();
        HeartbeatStats {
            last_ping: state.last_ping,
            last_pong: state.last_pong,
            last_message: state.last_message,
            awaiting_pong: state.awaiting_pong,
        }
    }
}

/// Snapshot of heartbeat state, for diagnostics.
#[derive(Debug, Clone)]
pub struct HeartbeatStats {
    pub last_ping: Option<DateTime<Utc>>,
    pub last_pong: Option<DateTime<Utc>>,
    pub last_message: DateTime<Utc>,
    pub awaiting_pong: bool,
}
