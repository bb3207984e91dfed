//! Common error types for Musicasua

use thiserror::Error;

/// Common result type for Musicasua operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while resolving and loading shared configuration
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),
}
