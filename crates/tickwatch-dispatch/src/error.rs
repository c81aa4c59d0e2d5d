//! Dispatch error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("{service} rejected the request: HTTP {status}: {body}")]
    Rejected {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("Invalid display offset: {0}")]
    InvalidOffset(String),
}

pub type DispatchResult<T> = Result<T, DispatchError>;
