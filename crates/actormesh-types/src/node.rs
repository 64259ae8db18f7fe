//! Node identity.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Globally unique identifier of one actor-system instance.
///
/// A node id is stable for the lifetime of its process and is the key of
/// every routing decision. It occupies 16 bytes on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// The "no node" id, used in header fields that do not address a node.
    pub const NIL: NodeId = NodeId(Uuid::nil());

    /// Size of a node id in its wire representation.
    pub const WIRE_SIZE: usize = 16;

    /// Create a new random NodeId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Build a NodeId from its wire representation.
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// The wire representation of this id.
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// Whether this is [`NodeId::NIL`].
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for NodeId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_ids_are_unique() {
        assert_ne!(NodeId::new(), NodeId::new());
        assert!(!NodeId::new().is_nil());
    }

    #[test]
    fn test_bytes_roundtrip() {
        let id = NodeId::new();
        assert_eq!(NodeId::from_bytes(*id.as_bytes()), id);
    }

    #[test]
    fn test_nil() {
        assert!(NodeId::NIL.is_nil());
        assert_eq!(NodeId::from_bytes([0; 16]), NodeId::NIL);
    }

    #[test]
    fn test_display_parse() {
        let id = NodeId::new();
        let parsed: NodeId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }
}
