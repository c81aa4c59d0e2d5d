//! Error types for tickwatch-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    #[error("Invalid threshold: {0}")]
    InvalidThreshold(String),

    #[error("Invalid direction: {0}")]
    InvalidDirection(String),

    #[error("Invalid action: {0}")]
    InvalidAction(String),

    #[error("Invalid monitor id: {0}")]
    InvalidMonitorId(String),

    #[error("Decimal parse error: {0}")]
    DecimalParse(#[from] rust_decimal::Error),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
