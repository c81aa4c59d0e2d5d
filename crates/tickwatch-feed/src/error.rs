//! Feed error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Subscription limit exceeded: at most {limit} symbols can be watched")]
    SubscriptionLimitExceeded { limit: usize },

    #[error("Transport error for {symbol}: {reason}")]
    Transport { symbol: String, reason: String },

    #[error("Feed manager is shut down")]
    ShutDown,
}

pub type FeedResult<T> = Result<T, FeedError>;
