//! Live quote feed for tickwatch.
//!
//! - [`QuoteFeed`]: transport seam, one quote stream per symbol
//! - [`FugleQuoteFeed`]: production transport over `tickwatch-ws`
//! - [`MockQuoteFeed`]: scriptable transport for tests
//! - [`FeedManager`]: refcounted subscriptions with admission control,
//!   one delivery lane per symbol, startup gate and resubscription

pub mod error;
pub mod fugle;
pub mod manager;
pub mod source;

pub use error::{FeedError, FeedResult};
pub use fugle::{FugleFeedConfig, FugleQuoteFeed};
pub use manager::{FeedFatal, FeedManager, FeedManagerConfig, TickSink};
pub use source::{BoxFuture, DynQuoteFeed, MockQuoteFeed, QuoteFeed, QuoteStream};
