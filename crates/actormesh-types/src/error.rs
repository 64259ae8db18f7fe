//! Shared error types for actormesh values.

use thiserror::Error;

/// Errors raised while constructing or converting actormesh values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TypeError {
    /// An actor name is empty, too long, or contains a character outside
    /// the packable alphabet.
    #[error("Invalid actor name: {0}")]
    InvalidActorName(String),

    /// A message body could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A configuration value is out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Alias for Result with TypeError.
pub type TypeResult<T> = Result<T, TypeError>;
