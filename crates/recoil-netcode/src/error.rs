//! Error types for recoil-netcode

use thiserror::Error;

/// Netcode error type
#[derive(Debug, Error)]
pub enum Error {
    /// A driver tried to consume input that was never produced
    #[error("Input buffer underflow: no input queued for consumption")]
    BufferUnderflow,

    /// Operation needs a driver but no role has been assigned
    #[error("No role assigned to this model")]
    NoDriver,

    /// Core error
    #[error(transparent)]
    Core(#[from] recoil_core::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Transport error
    #[error("Transport error: {0}")]
    Transport(String),
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type for netcode operations
pub type Result<T> = std::result::Result<T, Error>;
