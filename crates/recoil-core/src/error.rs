//! Error types for recoil-core

use thiserror::Error;

/// Core error type
#[derive(Error, Debug)]
pub enum Error {
    /// No recorded local state exists for the requested tick
    #[error("No history entry for tick {0}")]
    HistoryNotFound(u32),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
