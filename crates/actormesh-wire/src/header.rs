//! Fixed-size frame header.
//!
//! Every frame starts with a 64-byte header followed by exactly
//! `payload_len` payload bytes:
//!
//! ```text
//! ┌────┬──────────┬─────────────┬──────────┬─────────────┬───────────┬──────────────┬──────────────┐
//! │ op │ reserved │ payload_len │ op data  │ source_node │ dest_node │ source_actor │ dest_actor / │
//! │ 1B │ 3B       │ u32 BE      │ u64 BE   │ 16B         │ 16B       │ u64 BE       │ packed name  │
//! └────┴──────────┴─────────────┴──────────┴─────────────┴───────────┴──────────────┴──────────────┘
//! ```
//!
//! `op data` carries the message id of dispatch frames and the protocol
//! version of handshakes. For `dispatch_message_named` the last field holds
//! an [`ActorName`] packed into the same 8 bytes.
//!
//! The codec only checks structure. Whether a frame is allowed at this point
//! of a conversation is decided by the connection state machine.

use crate::error::{WireError, WireResult};
use actormesh_types::{ActorId, ActorName, MessageId, NodeId};
use bytes::{Buf, BufMut};

/// Header size in bytes.
pub const HEADER_SIZE: usize = 64;

/// Protocol version carried by handshakes.
pub const PROTOCOL_VERSION: u64 = 1;

/// Operation of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    /// Identity, compatibility and published actor of the accepting side.
    ServerHandshake = 0x00,
    /// Identity and compatibility of the connecting side.
    ClientHandshake = 0x01,
    /// Message for an actor addressed by numeric id.
    DispatchMessage = 0x02,
    /// Message for an actor addressed by name.
    DispatchMessageNamed = 0x03,
    /// The sender created a proxy for one of the receiver's actors.
    AnnounceProxy = 0x04,
    /// An actor represented by a proxy on the receiver terminated.
    KillProxy = 0x05,
    /// Liveness signal.
    Heartbeat = 0x06,
}

impl MessageType {
    /// Whether frames of this kind carry a payload.
    pub fn has_payload(&self) -> bool {
        !matches!(self, Self::AnnounceProxy | Self::Heartbeat)
    }

    /// Whether this is one of the two handshake kinds.
    pub fn is_handshake(&self) -> bool {
        matches!(self, Self::ServerHandshake | Self::ClientHandshake)
    }

    /// Whether this frame carries an application message.
    pub fn is_dispatch(&self) -> bool {
        matches!(self, Self::DispatchMessage | Self::DispatchMessageNamed)
    }

    /// Lowercase protocol name, used in logs and the CLI.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ServerHandshake => "server_handshake",
            Self::ClientHandshake => "client_handshake",
            Self::DispatchMessage => "dispatch_message",
            Self::DispatchMessageNamed => "dispatch_message_named",
            Self::AnnounceProxy => "announce_proxy",
            Self::KillProxy => "kill_proxy",
            Self::Heartbeat => "heartbeat",
        }
    }
}

impl TryFrom<u8> for MessageType {
    type Error = WireError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Ok(match code {
            0x00 => Self::ServerHandshake,
            0x01 => Self::ClientHandshake,
            0x02 => Self::DispatchMessage,
            0x03 => Self::DispatchMessageNamed,
            0x04 => Self::AnnounceProxy,
            0x05 => Self::KillProxy,
            0x06 => Self::Heartbeat,
            other => {
                return Err(WireError::Format(format!(
                    "unknown operation code {other:#04x}"
                )))
            }
        })
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receiver of a frame on the destination node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Destination {
    /// Numeric actor id.
    Id(ActorId),
    /// Registered actor name.
    Name(ActorName),
}

impl Destination {
    fn raw(&self) -> u64 {
        match self {
            Self::Id(id) => id.0,
            Self::Name(name) => name.packed(),
        }
    }
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Name(name) => write!(f, "'{name}'"),
        }
    }
}

/// Decoded frame header.
///
/// Headers are immutable; build them with [`Header::builder`] once the
/// payload length is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    operation: MessageType,
    payload_len: u32,
    operation_data: u64,
    source_node: NodeId,
    dest_node: NodeId,
    source_actor: ActorId,
    dest: Destination,
}

impl Header {
    /// Start building a header for `operation`.
    ///
    /// A named dispatch starts out numeric and only becomes named once
    /// [`HeaderBuilder::dest_name`] supplies the name.
    pub fn builder(operation: MessageType) -> HeaderBuilder {
        let operation = match operation {
            MessageType::DispatchMessageNamed => MessageType::DispatchMessage,
            other => other,
        };
        HeaderBuilder {
            operation,
            operation_data: 0,
            source_node: NodeId::NIL,
            dest_node: NodeId::NIL,
            source_actor: ActorId::INVALID,
            dest: Destination::Id(ActorId::INVALID),
        }
    }

    pub fn operation(&self) -> MessageType {
        self.operation
    }

    /// Number of payload bytes following this header.
    pub fn payload_len(&self) -> u32 {
        self.payload_len
    }

    pub fn operation_data(&self) -> u64 {
        self.operation_data
    }

    /// `operation_data` read as a message id.
    pub fn message_id(&self) -> MessageId {
        MessageId::from_raw(self.operation_data)
    }

    pub fn source_node(&self) -> NodeId {
        self.source_node
    }

    pub fn dest_node(&self) -> NodeId {
        self.dest_node
    }

    pub fn source_actor(&self) -> ActorId {
        self.source_actor
    }

    pub fn dest(&self) -> Destination {
        self.dest
    }

    /// Numeric destination, if the frame is not name-addressed.
    pub fn dest_actor(&self) -> Option<ActorId> {
        match self.dest {
            Destination::Id(id) => Some(id),
            Destination::Name(_) => None,
        }
    }

    /// Encode into a fixed-size array.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode_into(&mut &mut buf[..]);
        buf
    }

    /// Append the encoded header to `out`.
    pub fn encode_into<B: BufMut>(&self, out: &mut B) {
        out.put_u8(self.operation as u8);
        out.put_bytes(0, 3);
        out.put_u32(self.payload_len);
        out.put_u64(self.operation_data);
        out.put_slice(self.source_node.as_bytes());
        out.put_slice(self.dest_node.as_bytes());
        out.put_u64(self.source_actor.0);
        out.put_u64(self.dest.raw());
    }

    /// Decode a header from the first [`HEADER_SIZE`] bytes of `bytes`.
    pub fn decode(bytes: &[u8]) -> WireResult<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(WireError::Format(format!(
                "truncated header: {} of {HEADER_SIZE} bytes",
                bytes.len()
            )));
        }
        let mut buf = &bytes[..HEADER_SIZE];
        let operation = MessageType::try_from(buf.get_u8())?;
        let mut reserved = [0u8; 3];
        buf.copy_to_slice(&mut reserved);
        if reserved != [0; 3] {
            return Err(WireError::Format(format!(
                "reserved bytes must be zero, got {reserved:02x?}"
            )));
        }
        let payload_len = buf.get_u32();
        let operation_data = buf.get_u64();
        let mut node = [0u8; NodeId::WIRE_SIZE];
        buf.copy_to_slice(&mut node);
        let source_node = NodeId::from_bytes(node);
        buf.copy_to_slice(&mut node);
        let dest_node = NodeId::from_bytes(node);
        let source_actor = ActorId(buf.get_u64());
        let raw_dest = buf.get_u64();
        let dest = if operation == MessageType::DispatchMessageNamed {
            Destination::Name(ActorName::from_packed(raw_dest)?)
        } else {
            Destination::Id(ActorId(raw_dest))
        };
        Ok(Self {
            operation,
            payload_len,
            operation_data,
            source_node,
            dest_node,
            source_actor,
            dest,
        })
    }
}

impl std::fmt::Display for Header {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}:{} -> {}:{} data={:#x} len={}",
            self.operation,
            self.source_node,
            self.source_actor,
            self.dest_node,
            self.dest,
            self.operation_data,
            self.payload_len
        )
    }
}

/// Builder for [`Header`].
#[derive(Debug, Clone)]
pub struct HeaderBuilder {
    operation: MessageType,
    operation_data: u64,
    source_node: NodeId,
    dest_node: NodeId,
    source_actor: ActorId,
    dest: Destination,
}

impl HeaderBuilder {
    pub fn operation_data(mut self, data: u64) -> Self {
        self.operation_data = data;
        self
    }

    pub fn message_id(self, mid: MessageId) -> Self {
        self.operation_data(mid.raw())
    }

    pub fn source(mut self, node: NodeId, actor: ActorId) -> Self {
        self.source_node = node;
        self.source_actor = actor;
        self
    }

    pub fn dest_node(mut self, node: NodeId) -> Self {
        self.dest_node = node;
        self
    }

    /// Address a numeric actor. Turns a named dispatch into a numeric one.
    pub fn dest_actor(mut self, actor: ActorId) -> Self {
        if self.operation == MessageType::DispatchMessageNamed {
            self.operation = MessageType::DispatchMessage;
        }
        self.dest = Destination::Id(actor);
        self
    }

    /// Address a named actor. Only dispatch frames can be name-addressed.
    pub fn dest_name(mut self, name: ActorName) -> Self {
        if self.operation.is_dispatch() {
            self.operation = MessageType::DispatchMessageNamed;
            self.dest = Destination::Name(name);
        }
        self
    }

    /// Address `dest`, picking the matching dispatch kind.
    pub fn destination(self, dest: Destination) -> Self {
        match dest {
            Destination::Id(id) => self.dest_actor(id),
            Destination::Name(name) => self.dest_name(name),
        }
    }

    /// Finish the header for a payload of `payload_len` bytes.
    pub fn build(self, payload_len: u32) -> Header {
        Header {
            operation: self.operation,
            payload_len,
            operation_data: self.operation_data,
            source_node: self.source_node,
            dest_node: self.dest_node,
            source_actor: self.source_actor,
            dest: self.dest,
        }
    }
}
