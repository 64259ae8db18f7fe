//! Actor identifiers and addresses.
//!
//! Actors are addressed either by a numeric [`ActorId`] that is unique within
//! their node, or by a short symbolic [`ActorName`] registered on that node.
//! A symbolic name packs into the same 8 bytes as a numeric id, so the wire
//! header does not grow when a message targets a named actor.

use crate::error::{TypeError, TypeResult};
use crate::node::NodeId;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Numeric actor identifier, unique per node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorId(pub u64);

impl ActorId {
    /// Marks "no actor", e.g. an anonymous sender.
    pub const INVALID: ActorId = ActorId(0);

    /// Whether this id refers to an actual actor.
    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }
}

impl std::fmt::Display for ActorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Full address of an actor somewhere in the mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorAddr {
    /// Node hosting the actor.
    pub node: NodeId,
    /// Id of the actor on that node.
    pub id: ActorId,
}

impl ActorAddr {
    /// Create a new address.
    pub fn new(node: NodeId, id: ActorId) -> Self {
        Self { node, id }
    }
}

impl std::fmt::Display for ActorAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.id, self.node)
    }
}

/// Characters allowed in an actor name. Code 0 is reserved for padding,
/// so character `i` of this table encodes as `i + 1`.
const NAME_ALPHABET: &[u8; 63] =
    b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";

/// Bits used per packed character.
const BITS_PER_CHAR: u32 = 6;

/// Symbolic name of a registered actor, packed into a `u64`.
///
/// Names hold 1 to [`ActorName::MAX_LEN`] characters out of
/// `[0-9A-Za-z_]`, six bits each, most significant character first.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActorName(u64);

impl ActorName {
    /// Longest name that fits into 64 bits.
    pub const MAX_LEN: usize = 10;

    /// Pack `name`.
    pub fn new(name: &str) -> TypeResult<Self> {
        if name.is_empty() || name.len() > Self::MAX_LEN {
            return Err(TypeError::InvalidActorName(format!(
                "'{name}' must be 1 to {} characters",
                Self::MAX_LEN
            )));
        }
        let mut packed = 0u64;
        for byte in name.bytes() {
            let code = NAME_ALPHABET
                .iter()
                .position(|c| *c == byte)
                .ok_or_else(|| {
                    TypeError::InvalidActorName(format!(
                        "'{name}' contains unsupported character {:?}",
                        byte as char
                    ))
                })?;
            packed = (packed << BITS_PER_CHAR) | (code as u64 + 1);
        }
        Ok(Self(packed))
    }

    /// Rebuild a name from its packed form, rejecting values that no name
    /// packs to.
    pub fn from_packed(packed: u64) -> TypeResult<Self> {
        if packed == 0 || packed >> (BITS_PER_CHAR as usize * Self::MAX_LEN) != 0 {
            return Err(TypeError::InvalidActorName(format!(
                "{packed:#018x} is not a packed name"
            )));
        }
        let mut started = false;
        for i in (0..Self::MAX_LEN).rev() {
            let code = (packed >> (i as u32 * BITS_PER_CHAR)) & 0x3F;
            if code == 0 {
                if started {
                    return Err(TypeError::InvalidActorName(format!(
                        "{packed:#018x} has a gap at position {i}"
                    )));
                }
            } else {
                started = true;
            }
        }
        Ok(Self(packed))
    }

    /// The packed representation.
    pub fn packed(&self) -> u64 {
        self.0
    }

    /// Decode back into a string.
    pub fn as_string(&self) -> String {
        let mut out = String::with_capacity(Self::MAX_LEN);
        for i in (0..Self::MAX_LEN).rev() {
            let code = (self.0 >> (i as u32 * BITS_PER_CHAR)) & 0x3F;
            if code != 0 {
                out.push(NAME_ALPHABET[code as usize - 1] as char);
            }
        }
        out
    }
}

impl std::fmt::Display for ActorName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_string())
    }
}

impl std::fmt::Debug for ActorName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ActorName({:?})", self.as_string())
    }
}

impl std::str::FromStr for ActorName {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl Serialize for ActorName {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.as_string())
    }
}

impl<'de> Deserialize<'de> for ActorName {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        Self::new(&s).map_err(serde::de::Error::custom)
    }
}
