//! Error types shared across narrator crates

use thiserror::Error;

use crate::traits::RepositoryError;

/// Top-level error type for narrator operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The native engine reported a failure that could not be skipped.
    #[error("engine error: {0}")]
    Engine(String),

    /// The online repository failed.
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// The audio sink could not be opened or died mid-playback.
    #[error("audio sink error: {0}")]
    Sink(String),

    /// A user-supplied argument was unusable.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An internal channel closed unexpectedly.
    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
