//! Transport endpoint handles.
//!
//! Endpoints are owned by the transport layer. The protocol engine only keeps
//! copies of their handles to look up routes and write buffers.

use serde::{Deserialize, Serialize};

/// Handle of a stream-oriented endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionHandle(pub u64);

/// Handle of a packet-oriented endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DatagramHandle(pub u64);

/// Either kind of transport endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EndpointHandle {
    /// Stream endpoint (e.g. TCP).
    Connection(ConnectionHandle),
    /// Packet endpoint (e.g. UDP).
    Datagram(DatagramHandle),
}

impl EndpointHandle {
    /// Whether this is a stream endpoint.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    /// Whether this is a packet endpoint.
    pub fn is_datagram(&self) -> bool {
        matches!(self, Self::Datagram(_))
    }
}

impl From<ConnectionHandle> for EndpointHandle {
    fn from(hdl: ConnectionHandle) -> Self {
        Self::Connection(hdl)
    }
}

impl From<DatagramHandle> for EndpointHandle {
    fn from(hdl: DatagramHandle) -> Self {
        Self::Datagram(hdl)
    }
}

impl std::fmt::Display for EndpointHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connection(h) => write!(f, "conn#{}", h.0),
            Self::Datagram(h) => write!(f, "dgram#{}", h.0),
        }
    }
}
