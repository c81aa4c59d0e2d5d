//! Prometheus metrics for tickwatch.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()`. A failure means duplicate metric
//! names, which is a programming error surfaced at first use.

use crate::error::TelemetryResult;
use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
    Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, TextEncoder,
};

/// Ticks received from the feed, by symbol.
pub static TICKS_RECEIVED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "tickwatch_ticks_received_total",
        "Ticks delivered to the matching engine",
        &["symbol"]
    )
    .unwrap()
});

/// Ticks dropped before matching.
/// Labels: reason (no_price)
pub static TICKS_DISCARDED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "tickwatch_ticks_discarded_total",
        "Ticks discarded before matching",
        &["reason"]
    )
    .unwrap()
});

pub static MONITORS_TRIGGERED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "tickwatch_monitors_triggered_total",
        "Monitors whose threshold was crossed",
        &["direction"]
    )
    .unwrap()
});

/// Labels: kind (alert/order), outcome (ok/failed)
pub static DISPATCH_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "tickwatch_dispatch_total",
        "Actions dispatched after a trigger",
        &["kind", "outcome"]
    )
    .unwrap()
});

/// Time from tick timestamp to dispatch completion.
pub static DISPATCH_LATENCY_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "tickwatch_dispatch_latency_ms",
        "Tick timestamp to dispatch completion in milliseconds",
        &["kind"],
        vec![1.0, 5.0, 10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 5000.0]
    )
    .unwrap()
});

pub static OPEN_SUBSCRIPTIONS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "tickwatch_open_subscriptions",
        "Live quote feed subscriptions"
    )
    .unwrap()
});

pub static ACTIVE_MONITORS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "tickwatch_active_monitors",
        "Monitors present in the price index"
    )
    .unwrap()
});

pub static SUBSCRIPTIONS_REJECTED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "tickwatch_subscriptions_rejected_total",
        "Subscriptions refused by admission control"
    )
    .unwrap()
});

pub static RESUBSCRIBE_ATTEMPTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "tickwatch_resubscribe_attempts_total",
        "Attempts to reopen a dropped quote stream",
        &["symbol"]
    )
    .unwrap()
});

pub static WS_RECONNECT_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "tickwatch_ws_reconnect_total",
        "WebSocket reconnection attempts",
        &["symbol"]
    )
    .unwrap()
});

pub static COVERAGE_LOST_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "tickwatch_coverage_lost_total",
        "Symbols whose quote stream could not be restored",
        &["symbol"]
    )
    .unwrap()
});

/// Facade over the metric statics.
pub struct Metrics;

impl Metrics {
    pub fn tick_received(symbol: &str) {
        TICKS_RECEIVED_TOTAL.with_label_values(&[symbol]).inc();
    }

    pub fn tick_discarded(reason: &str) {
        TICKS_DISCARDED_TOTAL.with_label_values(&[reason]).inc();
    }

    pub fn monitor_triggered(direction: &str) {
        MONITORS_TRIGGERED_TOTAL
            .with_label_values(&[direction])
            .inc();
    }

    pub fn dispatch_succeeded(kind: &str) {
        DISPATCH_TOTAL.with_label_values(&[kind, "ok"]).inc();
    }

    pub fn dispatch_failed(kind: &str) {
        DISPATCH_TOTAL.with_label_values(&[kind, "failed"]).inc();
    }

    pub fn dispatch_latency(kind: &str, latency_ms: f64) {
        DISPATCH_LATENCY_MS
            .with_label_values(&[kind])
            .observe(latency_ms);
    }

    pub fn open_subscriptions(count: usize) {
        OPEN_SUBSCRIPTIONS.set(count as i64);
    }

    pub fn active_monitors(count: usize) {
        ACTIVE_MONITORS.set(count as i64);
    }

    pub fn subscription_rejected() {
        SUBSCRIPTIONS_REJECTED_TOTAL.inc();
    }

    pub fn resubscribe_attempt(symbol: &str) {
        RESUBSCRIBE_ATTEMPTS_TOTAL.with_label_values(&[symbol]).inc();
    }

    pub fn ws_reconnect(symbol: &str) {
        WS_RECONNECT_TOTAL.with_label_values(&[symbol]).inc();
    }

    pub fn coverage_lost(symbol: &str) {
        COVERAGE_LOST_TOTAL.with_label_values(&[symbol]).inc();
    }
}

/// Render the default registry in the Prometheus text format.
pub fn encode_metrics() -> TelemetryResult<String> {
    let encoder = TextEncoder::new();
    let mut buf = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buf)?;
    Ok(String::from_utf8(buf)?)
}
