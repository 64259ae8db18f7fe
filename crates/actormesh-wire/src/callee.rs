//! The engine's upward interface.
//!
//! [`Callee`] is implemented by whatever hosts the [`Instance`]: it owns
//! the actors, the proxies and the transport buffers. The engine calls it
//! for every event that leaves the protocol layer and never keeps a
//! reference to anything it returns.
//!
//! [`Instance`]: crate::instance::Instance

use actormesh_types::{
    ActorAddr, ActorId, ActorName, EndpointHandle, ExitReason, Message, MessageId, NodeId,
};
use bytes::BytesMut;
use std::collections::BTreeSet;

/// A message received for a local actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Sending actor. The id is [`ActorId::INVALID`] for anonymous senders.
    pub source: ActorAddr,
    pub message_id: MessageId,
    /// Actors the message passed through before reaching its receiver.
    pub forwarding_stack: Vec<ActorAddr>,
    pub message: Message,
}

/// Callbacks and buffers the engine needs from its host.
pub trait Callee {
    /// A server handshake arrived. `actor` is the actor published on the
    /// remote port ([`ActorId::INVALID`] if none) and `signatures` its
    /// interface. Also called when the handshake came from this node or from
    /// a node that is already connected, right before that connection is
    /// closed, so a pending connect request can be resolved.
    fn finalize_handshake(&mut self, node: &NodeId, actor: ActorId, signatures: &BTreeSet<String>);

    /// `node` is about to lose its route. Drop everything tied to it.
    fn purge_state(&mut self, node: &NodeId);

    /// `node` created a proxy for the local actor `actor`.
    fn proxy_announced(&mut self, node: &NodeId, actor: ActorId);

    /// The actor `actor` on `node` terminated.
    fn proxy_killed(&mut self, node: &NodeId, actor: ActorId, reason: ExitReason);

    /// Deliver a message to a local actor addressed by id.
    fn deliver(&mut self, dest: ActorId, envelope: Envelope);

    /// Deliver a message to a local actor addressed by registered name.
    fn deliver_named(&mut self, dest: ActorName, envelope: Envelope);

    /// A handshake with `node` completed.
    fn learned_new_node(&mut self, node: &NodeId);

    /// `node` sent a heartbeat.
    fn handle_heartbeat(&mut self, node: &NodeId);

    /// `node` is now reachable over `hdl`; move whatever was written to its
    /// pending buffer to the endpoint.
    fn send_buffered_messages(&mut self, node: &NodeId, hdl: EndpointHandle);

    /// Outgoing buffer of an endpoint.
    fn write_buffer(&mut self, hdl: EndpointHandle) -> &mut BytesMut;

    /// Holding buffer for a node whose route is still pending.
    fn pending_buffer(&mut self, node: &NodeId) -> &mut BytesMut;

    /// Hand the endpoint's write buffer to the transport.
    fn flush(&mut self, hdl: EndpointHandle);
}
