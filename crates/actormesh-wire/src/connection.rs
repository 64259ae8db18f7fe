//! Per-connection framing state machine.
//!
//! The transport reads exactly [`ConnectionState::expected_bytes`] bytes and
//! hands them to the engine. A connection alternates between waiting for a
//! header and waiting for the payload that header announced, until it either
//! faults on bad input or is closed on purpose.

use crate::error::{WireError, WireResult};
use crate::header::{Header, MessageType, HEADER_SIZE};
use actormesh_types::{EndpointHandle, NodeId};

/// Framing state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Next chunk is a [`HEADER_SIZE`]-byte header.
    AwaitHeader,
    /// Next chunk is the payload of the held header, exactly this long.
    AwaitPayload(u32),
    /// Bad input was received. The transport must tear the connection down.
    Faulted,
    /// The engine closed the connection intentionally.
    Closed,
}

impl ConnectionState {
    /// Bytes the transport must buffer before the next call, or `None` once
    /// the connection is finished.
    pub fn expected_bytes(&self) -> Option<usize> {
        match self {
            Self::AwaitHeader => Some(HEADER_SIZE),
            Self::AwaitPayload(n) => Some(*n as usize),
            Self::Faulted | Self::Closed => None,
        }
    }

    /// Whether no further input is accepted.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Faulted | Self::Closed)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AwaitHeader => f.write_str("await_header"),
            Self::AwaitPayload(n) => write!(f, "await_payload({n})"),
            Self::Faulted => f.write_str("faulted"),
            Self::Closed => f.write_str("closed"),
        }
    }
}

/// Structural checks on a decoded header that do not depend on the
/// conversation: size limit and payload presence.
pub fn check_frame(hdr: &Header, max_frame_size: u32) -> WireResult<()> {
    if hdr.payload_len() > max_frame_size {
        return Err(WireError::OversizedFrame {
            size: hdr.payload_len(),
            max: max_frame_size,
        });
    }
    let op = hdr.operation();
    if op.has_payload() != (hdr.payload_len() > 0) {
        return Err(WireError::Format(format!(
            "{op} with payload_len {}",
            hdr.payload_len()
        )));
    }
    Ok(())
}

/// Which side of the connection this node is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Accepted on a listening port; expects a client handshake.
    Acceptor,
    /// Dialed out; expects a server handshake.
    Connector,
}

impl Role {
    /// Handshake the peer must send first.
    pub fn expected_handshake(&self) -> MessageType {
        match self {
            Self::Acceptor => MessageType::ClientHandshake,
            Self::Connector => MessageType::ServerHandshake,
        }
    }
}

/// Framing state of one endpoint.
#[derive(Debug)]
pub struct Connection {
    hdl: EndpointHandle,
    role: Role,
    state: ConnectionState,
    held: Option<Header>,
    peer: Option<NodeId>,
    expected: Option<NodeId>,
}

impl Connection {
    pub fn new(hdl: EndpointHandle, role: Role) -> Self {
        Self {
            hdl,
            role,
            state: ConnectionState::AwaitHeader,
            held: None,
            peer: None,
            expected: None,
        }
    }

    /// Connection dialed to reach `node`.
    pub fn expecting(mut self, node: Option<NodeId>) -> Self {
        self.expected = node;
        self
    }

    pub fn endpoint(&self) -> EndpointHandle {
        self.hdl
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Peer node, once its handshake was accepted.
    pub fn peer(&self) -> Option<NodeId> {
        self.peer
    }

    pub fn is_established(&self) -> bool {
        self.peer.is_some()
    }

    /// Node this connection was dialed to reach, if the embedder said.
    pub fn expected(&self) -> Option<NodeId> {
        self.expected
    }

    /// Expected node of a connection attempt that is still in progress.
    pub fn pending_attempt(&self) -> Option<NodeId> {
        if self.is_established() {
            return None;
        }
        self.expected
    }

    /// Feed a header chunk.
    ///
    /// Returns the header when the frame is complete (no payload). A header
    /// that announces a payload is held and `Ok(None)` is returned.
    pub fn read_header(&mut self, chunk: &[u8], max_frame_size: u32) -> WireResult<Option<Header>> {
        if self.state != ConnectionState::AwaitHeader {
            return Err(WireError::Protocol(format!(
                "header chunk received in state {}",
                self.state
            )));
        }
        if chunk.len() != HEADER_SIZE {
            return Err(WireError::Format(format!(
                "header chunk is {} bytes, expected {HEADER_SIZE}",
                chunk.len()
            )));
        }
        let hdr = Header::decode(chunk)?;
        check_frame(&hdr, max_frame_size)?;
        self.check_order(hdr.operation())?;

        if hdr.payload_len() > 0 {
            self.state = ConnectionState::AwaitPayload(hdr.payload_len());
            self.held = Some(hdr);
            Ok(None)
        } else {
            Ok(Some(hdr))
        }
    }

    /// Feed a payload chunk, returning the header it belongs to.
    pub fn read_payload(&mut self, chunk: &[u8]) -> WireResult<Header> {
        let ConnectionState::AwaitPayload(expected) = self.state else {
            return Err(WireError::Protocol(format!(
                "payload chunk received in state {}",
                self.state
            )));
        };
        if chunk.len() != expected as usize {
            return Err(WireError::Format(format!(
                "payload chunk is {} bytes, expected {expected}",
                chunk.len()
            )));
        }
        let hdr = self
            .held
            .take()
            .ok_or_else(|| WireError::Protocol("payload without a held header".into()))?;
        self.state = ConnectionState::AwaitHeader;
        Ok(hdr)
    }

    fn check_order(&self, op: MessageType) -> WireResult<()> {
        match (self.is_established(), op.is_handshake()) {
            (false, true) if op == self.role.expected_handshake() => Ok(()),
            (false, true) => Err(WireError::Protocol(format!(
                "expected {}, got {op}",
                self.role.expected_handshake()
            ))),
            (false, false) => Err(WireError::Protocol(format!("{op} before handshake"))),
            (true, true) => Err(WireError::Protocol(format!("repeated handshake ({op})"))),
            (true, false) => Ok(()),
        }
    }

    /// Record the peer after a successful handshake.
    pub fn establish(&mut self, peer: NodeId) {
        self.peer = Some(peer);
    }

    /// Enter [`ConnectionState::Faulted`], dropping any held header.
    pub fn fault(&mut self) {
        self.held = None;
        self.state = ConnectionState::Faulted;
    }

    /// Enter [`ConnectionState::Closed`], dropping any held header.
    pub fn close(&mut self) {
        self.held = None;
        self.state = ConnectionState::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actormesh_types::{ActorId, ConnectionHandle, MessageId};

    const MAX: u32 = 1024;

    fn conn(role: Role) -> Connection {
        Connection::new(ConnectionHandle(1).into(), role)
    }

    fn header(op: MessageType, len: u32) -> [u8; HEADER_SIZE] {
        Header::builder(op)
            .source(NodeId::new(), ActorId::INVALID)
            .message_id(MessageId::ASYNC)
            .build(len)
            .encode()
    }

    #[test]
    fn test_expected_bytes() {
        assert_eq!(ConnectionState::AwaitHeader.expected_bytes(), Some(HEADER_SIZE));
        assert_eq!(ConnectionState::AwaitPayload(12).expected_bytes(), Some(12));
        assert_eq!(ConnectionState::Faulted.expected_bytes(), None);
        assert!(ConnectionState::Closed.is_terminal());
    }

    #[test]
    fn test_handshake_then_payload() {
        let mut c = conn(Role::Connector);
        let held = c.read_header(&header(MessageType::ServerHandshake, 10), MAX).unwrap();
        assert!(held.is_none());
        assert_eq!(c.state(), ConnectionState::AwaitPayload(10));

        let hdr = c.read_payload(&[0u8; 10]).unwrap();
        assert_eq!(hdr.operation(), MessageType::ServerHandshake);
        assert_eq!(c.state(), ConnectionState::AwaitHeader);
    }

    #[test]
    fn test_oversized_rejected_before_payload() {
        let mut c = conn(Role::Connector);
        let err = c
            .read_header(&header(MessageType::ServerHandshake, MAX + 1), MAX)
            .unwrap_err();
        assert!(matches!(err, WireError::OversizedFrame { size, max } if size == MAX + 1 && max == MAX));
        assert_eq!(c.state(), ConnectionState::AwaitHeader);
    }

    #[test]
    fn test_wrong_handshake_for_role() {
        let mut c = conn(Role::Acceptor);
        let err = c.read_header(&header(MessageType::ServerHandshake, 4), MAX).unwrap_err();
        assert!(matches!(err, WireError::Protocol(_)));
    }

    #[test]
    fn test_dispatch_before_handshake() {
        let mut c = conn(Role::Acceptor);
        assert!(c.read_header(&header(MessageType::DispatchMessage, 4), MAX).is_err());
    }

    #[test]
    fn test_repeated_handshake() {
        let mut c = conn(Role::Acceptor);
        c.establish(NodeId::new());
        assert!(c.read_header(&header(MessageType::ClientHandshake, 4), MAX).is_err());
    }

    #[test]
    fn test_heartbeat_completes_immediately() {
        let mut c = conn(Role::Acceptor);
        c.establish(NodeId::new());
        let hdr = c.read_header(&header(MessageType::Heartbeat, 0), MAX).unwrap();
        assert_eq!(hdr.unwrap().operation(), MessageType::Heartbeat);
        assert_eq!(c.state(), ConnectionState::AwaitHeader);
    }

    #[test]
    fn test_payload_presence_mismatch() {
        let mut c = conn(Role::Acceptor);
        c.establish(NodeId::new());
        assert!(c.read_header(&header(MessageType::Heartbeat, 3), MAX).is_err());
        assert!(c.read_header(&header(MessageType::DispatchMessage, 0), MAX).is_err());
    }

    #[test]
    fn test_short_payload_chunk() {
        let mut c = conn(Role::Connector);
        c.read_header(&header(MessageType::ServerHandshake, 8), MAX).unwrap();
        assert!(c.read_payload(&[0u8; 7]).is_err());
    }

    #[test]
    fn test_chunk_kind_mismatch() {
        let mut c = conn(Role::Connector);
        assert!(c.read_payload(&[0u8; 4]).is_err());
        assert!(c.read_header(&[0u8; 10], MAX).is_err());
    }

    #[test]
    fn test_pending_attempt_until_established() {
        let node = NodeId::new();
        let mut c = conn(Role::Connector).expecting(Some(node));
        assert_eq!(c.expected(), Some(node));
        assert_eq!(c.pending_attempt(), Some(node));
        c.establish(node);
        assert_eq!(c.pending_attempt(), None);
        assert_eq!(conn(Role::Acceptor).pending_attempt(), None);
    }

    #[test]
    fn test_fault_drops_held_header() {
        let mut c = conn(Role::Connector);
        c.read_header(&header(MessageType::ServerHandshake, 8), MAX).unwrap();
        c.fault();
        assert_eq!(c.state(), ConnectionState::Faulted);
        assert!(c.read_payload(&[0u8; 8]).is_err());
    }
}
