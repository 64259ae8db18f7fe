//! Message identifiers, opaque message bodies and exit reasons.

use crate::error::{TypeError, TypeResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Correlation id of a message.
///
/// The most significant bit marks a response. The remaining bits carry the
/// request number; a value of zero without the response bit is an
/// asynchronous message that expects no reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct MessageId(u64);

impl MessageId {
    /// Bit marking a response.
    pub const RESPONSE_FLAG: u64 = 1 << 63;

    /// Asynchronous message, no reply expected.
    pub const ASYNC: MessageId = MessageId(0);

    /// Request number `n`. The response bit of `n` is ignored.
    pub fn request(n: u64) -> Self {
        Self(n & !Self::RESPONSE_FLAG)
    }

    /// Rebuild an id from its raw header value.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw header value.
    pub fn raw(&self) -> u64 {
        self.0
    }

    /// The request number without flag bits.
    pub fn request_number(&self) -> u64 {
        self.0 & !Self::RESPONSE_FLAG
    }

    /// Whether the response bit is set.
    pub fn is_response(&self) -> bool {
        self.0 & Self::RESPONSE_FLAG != 0
    }

    /// Whether the sender waits for a reply to this message.
    pub fn is_request(&self) -> bool {
        !self.is_response() && self.request_number() != 0
    }

    /// Whether this message expects no reply at all.
    pub fn is_async(&self) -> bool {
        self.0 == 0
    }

    /// The id a reply to this request carries.
    pub fn response_id(&self) -> Self {
        Self(self.0 | Self::RESPONSE_FLAG)
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_response() {
            write!(f, "response#{}", self.request_number())
        } else if self.is_async() {
            f.write_str("async")
        } else {
            write!(f, "request#{}", self.request_number())
        }
    }
}

/// Opaque application message.
///
/// The protocol engine never looks inside; it only carries the encoded
/// bytes. [`Message::encode`] and [`Message::decode`] use MessagePack for
/// embedders that have no serializer of their own.
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Message {
    body: Vec<u8>,
}

impl Message {
    /// Wrap already-encoded bytes.
    pub fn from_bytes(body: Vec<u8>) -> Self {
        Self { body }
    }

    /// Encode a value as MessagePack.
    pub fn encode<T: Serialize>(value: &T) -> TypeResult<Self> {
        rmp_serde::to_vec_named(value)
            .map(Self::from_bytes)
            .map_err(|e| TypeError::Serialization(e.to_string()))
    }

    /// Decode the body as MessagePack.
    pub fn decode<T: DeserializeOwned>(&self) -> TypeResult<T> {
        rmp_serde::from_slice(&self.body).map_err(|e| TypeError::Serialization(e.to_string()))
    }

    /// The encoded body.
    pub fn as_bytes(&self) -> &[u8] {
        &self.body
    }

    /// Consume the message, returning its body.
    pub fn into_bytes(self) -> Vec<u8> {
        self.body
    }

    /// Body length in bytes.
    pub fn len(&self) -> usize {
        self.body.len()
    }

    /// Whether the body is empty.
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        const PREVIEW: usize = 16;
        let preview = &self.body[..self.body.len().min(PREVIEW)];
        write!(f, "Message({} bytes: {}", self.body.len(), hex::encode(preview))?;
        if self.body.len() > PREVIEW {
            f.write_str("..")?;
        }
        f.write_str(")")
    }
}

/// Why an actor terminated, sent along with `kill_proxy`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    /// Regular termination.
    Normal,
    /// Forced termination.
    Kill,
    /// The node hosting the actor can no longer be reached.
    RemoteLinkUnreachable,
    /// Application-defined reason.
    User(String),
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Normal => f.write_str("normal"),
            Self::Kill => f.write_str("kill"),
            Self::RemoteLinkUnreachable => f.write_str("remote_link_unreachable"),
            Self::User(reason) => write!(f, "user: {reason}"),
        }
    }
}
