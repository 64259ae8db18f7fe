//! Handshake payloads and their validation.
//!
//! The accepting side of a connection sends a server handshake: its node id,
//! the application identifier, and the actor published on the accepting
//! port (if any). The connecting side sends a client handshake with its node
//! id and application identifier. Both headers carry [`PROTOCOL_VERSION`] as
//! operation data. Peers must agree on version and application identifier
//! before any other frame is accepted.

use crate::error::{WireError, WireResult};
use crate::header::{Header, MessageType, PROTOCOL_VERSION};
use crate::payload;
use crate::published::PublishedActor;
use actormesh_types::{ActorId, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Actor advertised by a server handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedInterface {
    /// Id of the published actor on the accepting node.
    pub actor: ActorId,
    /// Signatures of the messages it accepts.
    pub signatures: BTreeSet<String>,
}

impl From<&PublishedActor> for PublishedInterface {
    fn from(published: &PublishedActor) -> Self {
        Self {
            actor: published.actor.id,
            signatures: published.signatures.clone(),
        }
    }
}

/// Payload of a `server_handshake` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerHandshake {
    pub node: NodeId,
    pub app_identifier: String,
    /// `None` when no actor is published on the port: identity exchange only.
    pub published: Option<PublishedInterface>,
}

/// Payload of a `client_handshake` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientHandshake {
    pub node: NodeId,
    pub app_identifier: String,
}

impl ServerHandshake {
    /// Parse and validate a received server handshake.
    pub fn parse(hdr: &Header, body: &[u8], local_app_identifier: &str) -> WireResult<Self> {
        check_header(hdr, MessageType::ServerHandshake)?;
        let hs: Self = payload::decode(body)?;
        check_identity(hdr, &hs.node)?;
        check_app_identifier(local_app_identifier, &hs.app_identifier)?;
        Ok(hs)
    }
}

impl ClientHandshake {
    /// Parse and validate a received client handshake.
    pub fn parse(hdr: &Header, body: &[u8], local_app_identifier: &str) -> WireResult<Self> {
        check_header(hdr, MessageType::ClientHandshake)?;
        let hs: Self = payload::decode(body)?;
        check_identity(hdr, &hs.node)?;
        check_app_identifier(local_app_identifier, &hs.app_identifier)?;
        Ok(hs)
    }
}

fn check_header(hdr: &Header, expected: MessageType) -> WireResult<()> {
    if hdr.operation() != expected {
        return Err(WireError::Protocol(format!(
            "expected {expected}, got {}",
            hdr.operation()
        )));
    }
    if hdr.operation_data() != PROTOCOL_VERSION {
        return Err(WireError::HandshakeMismatch(format!(
            "protocol version mismatch: local={PROTOCOL_VERSION}, remote={}",
            hdr.operation_data()
        )));
    }
    Ok(())
}

fn check_identity(hdr: &Header, node: &NodeId) -> WireResult<()> {
    if node.is_nil() || hdr.source_node() != *node {
        return Err(WireError::HandshakeMismatch(format!(
            "header names node {} but payload names {node}",
            hdr.source_node()
        )));
    }
    Ok(())
}

/// Application identifiers must match exactly.
pub fn check_app_identifier(local: &str, remote: &str) -> WireResult<()> {
    if local != remote {
        return Err(WireError::HandshakeMismatch(format!(
            "app identifier mismatch: local={local:?}, remote={remote:?}"
        )));
    }
    Ok(())
}
