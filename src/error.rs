//! Error types for vidpool.

use thiserror::Error;

use crate::pool::PoolState;

#[derive(Debug, Error)]
pub enum Error {
    #[error("worker pool is not idle (state: {0})")]
    NotIdle(PoolState),

    #[error("worker pool is not running (state: {0})")]
    NotRunning(PoolState),

    #[error("video not found: {0}")]
    NotFound(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("transcode failed: {0}")]
    Transcode(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True for lifecycle rejections from `start`/`stop`. These are
    /// retryable once the pool reaches the required state.
    pub fn is_state_error(&self) -> bool {
        matches!(self, Error::NotIdle(_) | Error::NotRunning(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
