//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(#[from] tickwatch_store::StoreError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] tickwatch_dispatch::DispatchError),

    #[error("Engine error: {0}")]
    Engine(#[from] tickwatch_engine::EngineError),

    #[error("Quote coverage lost for {symbol} after {attempts} attempts")]
    CoverageLost { symbol: String, attempts: u32 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
