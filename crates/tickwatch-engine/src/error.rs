//! Engine error types.

use thiserror::Error;
use tickwatch_core::{CoreError, MonitorId};
use tickwatch_feed::FeedError;
use tickwatch_store::StoreError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Monitor limit reached: at most {limit} symbols can be watched")]
    SubscriptionLimitExceeded { limit: usize },

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Monitor not found: {0}")]
    NotFound(MonitorId),

    #[error("Feed error: {0}")]
    Feed(String),
}

impl From<CoreError> for EngineError {
    fn from(e: CoreError) -> Self {
        Self::Validation(e.to_string())
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        Self::StoreUnavailable(e.to_string())
    }
}

impl From<FeedError> for EngineError {
    fn from(e: FeedError) -> Self {
        match e {
            FeedError::SubscriptionLimitExceeded { limit } => {
                Self::SubscriptionLimitExceeded { limit }
            }
            other => Self::Feed(other.to_string()),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
