//! Errors from the wire protocol layer.
//!
//! Framing and handshake errors are fatal to the connection they occur on,
//! never to the engine. Routing failures are reported to callers as plain
//! return values; [`WireError::UnknownRoute`] exists for logging.

use actormesh_types::{NodeId, TypeError};
use thiserror::Error;

/// Errors from the wire protocol layer.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("Malformed header: {0}")]
    Format(String),
    #[error("Handshake mismatch: {0}")]
    HandshakeMismatch(String),
    #[error("No route to node {0}")]
    UnknownRoute(NodeId),
    #[error("Frame too large: {size} bytes (max {max})")]
    OversizedFrame { size: u32, max: u32 },
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Protocol violation: {0}")]
    Protocol(String),
}

impl WireError {
    /// Whether this error must bring down the connection it happened on.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::UnknownRoute(_))
    }
}

impl From<rmp_serde::encode::Error> for WireError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for WireError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<TypeError> for WireError {
    fn from(e: TypeError) -> Self {
        match e {
            TypeError::InvalidActorName(msg) => Self::Format(msg),
            TypeError::Serialization(msg) => Self::Serialization(msg),
            TypeError::InvalidConfig(msg) => Self::Protocol(msg),
        }
    }
}

/// Alias for Result with WireError.
pub type WireResult<T> = Result<T, WireError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_route_is_not_fatal() {
        assert!(!WireError::UnknownRoute(NodeId::NIL).is_fatal());
        assert!(WireError::Format("x".into()).is_fatal());
        assert!(WireError::OversizedFrame { size: 2, max: 1 }.is_fatal());
    }

    #[test]
    fn test_display() {
        let err = WireError::OversizedFrame { size: 100, max: 10 };
        assert_eq!(err.to_string(), "Frame too large: 100 bytes (max 10)");
    }

    #[test]
    fn test_type_error_conversion() {
        let err: WireError = TypeError::InvalidActorName("bad".into()).into();
        assert!(matches!(err, WireError::Format(_)));
    }
}
