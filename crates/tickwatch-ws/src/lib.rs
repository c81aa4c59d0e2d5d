//! WebSocket quote connections for tickwatch.
//!
//! One connection per symbol against the Fugle realtime intraday endpoint:
//! - Automatic reconnection with exponential backoff and jitter
//! - Heartbeat monitoring (ping frames, pong timeout detection)
//! - Parsing of quote frames into [`tickwatch_core::Quote`]

pub mod connection;
pub mod error;
pub mod heartbeat;
pub mod message;

pub use connection::{ConnectionConfig, ConnectionState, QuoteConnection};
pub use error::{WsError, WsResult};
pub use heartbeat::{HeartbeatManager, HeartbeatStats};
pub use message::parse_quote;

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider.
/// Must be called before any WebSocket connections are made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
