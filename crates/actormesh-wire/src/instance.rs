//! The protocol engine.
//!
//! An [`Instance`] owns the routing table, the published actors and the
//! framing state of every endpoint of one node. The transport feeds it byte
//! chunks through [`Instance::handle`]; everything the engine produces goes
//! into buffers owned by the [`Callee`].
//!
//! The engine is single-threaded: every entry point takes `&mut self` and
//! none of them blocks.

use crate::callee::{Callee, Envelope};
use crate::connection::{Connection, ConnectionState, Role};
use crate::error::{WireError, WireResult};
use crate::handshake::{ClientHandshake, PublishedInterface, ServerHandshake};
use crate::header::{Destination, Header, MessageType, HEADER_SIZE, PROTOCOL_VERSION};
use crate::payload::{self, DispatchPayload};
use crate::published::{PublishedActor, PublishedActors, RemovedCallback};
use crate::routing::{Route, RoutingTable};
use actormesh_types::config::WireConfig;
use actormesh_types::{
    ActorAddr, ActorId, ActorName, EndpointHandle, ExitReason, Message, MessageId, NodeId,
};
use bytes::BytesMut;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info, trace, warn};

/// Receiver of an outgoing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recipient {
    /// Node hosting the receiver.
    pub node: NodeId,
    /// Actor on that node.
    pub dest: Destination,
}

impl Recipient {
    /// Actor `id` on `node`.
    pub fn actor(node: NodeId, id: ActorId) -> Self {
        Self {
            node,
            dest: Destination::Id(id),
        }
    }

    /// Actor registered as `name` on `node`.
    pub fn named(node: NodeId, name: ActorName) -> Self {
        Self {
            node,
            dest: Destination::Name(name),
        }
    }
}

impl From<ActorAddr> for Recipient {
    fn from(addr: ActorAddr) -> Self {
        Self::actor(addr.node, addr.id)
    }
}

/// What to do with a connection after a frame was handled.
enum Disposition {
    Continue,
    Close,
}

/// Protocol engine of one node.
pub struct Instance<C: Callee> {
    this_node: NodeId,
    config: WireConfig,
    callee: C,
    routing: RoutingTable,
    published: PublishedActors,
    connections: HashMap<EndpointHandle, Connection>,
}

impl<C: Callee> Instance<C> {
    pub fn new(this_node: NodeId, config: WireConfig, callee: C) -> Self {
        info!(
            node = %this_node,
            app = %config.app_identifier,
            max_frame_size = config.max_frame_size,
            "Protocol engine started"
        );
        Self {
            this_node,
            config,
            callee,
            routing: RoutingTable::new(),
            published: PublishedActors::new(),
            connections: HashMap::new(),
        }
    }

    pub fn this_node(&self) -> NodeId {
        self.this_node
    }

    pub fn config(&self) -> &WireConfig {
        &self.config
    }

    pub fn callee(&self) -> &C {
        &self.callee
    }

    pub fn callee_mut(&mut self) -> &mut C {
        &mut self.callee
    }

    /// Consume the engine, returning its callee.
    pub fn into_callee(self) -> C {
        self.callee
    }

    pub fn routing_table(&self) -> &RoutingTable {
        &self.routing
    }

    pub fn published_actors(&self) -> &PublishedActors {
        &self.published
    }

    /// Framing state of `hdl`, if the endpoint is registered.
    pub fn connection_state(&self, hdl: EndpointHandle) -> Option<ConnectionState> {
        self.connections.get(&hdl).map(Connection::state)
    }

    /// Number of registered endpoints, finished ones included.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    // ---- Routing ----

    /// Route to `node`.
    pub fn lookup(&self, node: &NodeId) -> Route {
        self.routing.lookup(node)
    }

    /// Record that a connection to `node` is being established. Messages
    /// dispatched to it until the handshake completes go to its pending
    /// buffer.
    pub fn add_pending_route(&mut self, node: NodeId) -> bool {
        if node == self.this_node || node.is_nil() {
            return false;
        }
        self.routing.add_pending(node)
    }

    /// Drop the route to `node`, calling `purge_state` first. Used when the
    /// transport gives up on a connection attempt. A direct route also
    /// closes its endpoint. Returns `false` if the node had no route.
    pub fn erase_route(&mut self, node: &NodeId) -> bool {
        if let Route::Direct(hdl) = self.routing.lookup(node) {
            self.close(hdl);
            return true;
        }
        let callee = &mut self.callee;
        let erased = self
            .routing
            .erase_node(node, &mut |n| callee.purge_state(n));
        if erased {
            info!(node = %node, "Pending route dropped");
        }
        erased
    }

    // ---- Published actors ----

    /// Publish the local actor `actor` on `port`.
    pub fn publish(&mut self, port: u16, actor: ActorId, signatures: BTreeSet<String>) {
        self.published
            .publish(port, ActorAddr::new(self.this_node, actor), signatures);
    }

    /// Remove the actor published on `port`.
    pub fn unpublish(
        &mut self,
        port: u16,
        on_removed: Option<RemovedCallback<'_>>,
    ) -> Option<PublishedActor> {
        self.published.unpublish(port, on_removed)
    }

    /// Remove the local actor `actor` from `port`, or from every port.
    pub fn unpublish_actor(
        &mut self,
        actor: ActorId,
        port: Option<u16>,
        on_removed: Option<RemovedCallback<'_>>,
    ) -> usize {
        let addr = ActorAddr::new(self.this_node, actor);
        self.published.unpublish_actor(&addr, port, on_removed)
    }

    // ---- Connection lifecycle ----

    /// Register an endpoint accepted on `port` and send the server
    /// handshake. `port` selects the published actor to advertise.
    pub fn accept_connection(&mut self, hdl: EndpointHandle, port: Option<u16>) -> WireResult<()> {
        self.register(Connection::new(hdl, Role::Acceptor))?;
        let (hdr, body) = self.server_handshake_frame(port)?;
        self.send(hdl, &hdr, &body);
        debug!(endpoint = %hdl, port = ?port, "Server handshake sent");
        Ok(())
    }

    /// Register an endpoint dialed by this node and send the client
    /// handshake.
    ///
    /// `expected` names the node the endpoint was dialed to reach. If the
    /// connection ends before its handshake completes, or the peer turns out
    /// to be another node, the pending route of `expected` is dropped.
    pub fn open_connection(
        &mut self,
        hdl: EndpointHandle,
        expected: Option<NodeId>,
    ) -> WireResult<()> {
        self.register(Connection::new(hdl, Role::Connector).expecting(expected))?;
        let (hdr, body) = self.client_handshake_frame()?;
        self.send(hdl, &hdr, &body);
        debug!(endpoint = %hdl, expected = ?expected, "Client handshake sent");
        Ok(())
    }

    /// The transport closed `hdl`. Purges the route it served and forgets
    /// the endpoint. Returns the node that was reachable through it.
    pub fn connection_closed(&mut self, hdl: EndpointHandle) -> Option<NodeId> {
        let node = self.erase_routes(hdl);
        self.connections.remove(&hdl);
        match node {
            Some(node) => info!(endpoint = %hdl, node = %node, "Connection to node closed"),
            None => debug!(endpoint = %hdl, "Connection closed"),
        }
        node
    }

    fn register(&mut self, conn: Connection) -> WireResult<()> {
        let hdl = conn.endpoint();
        if self.connections.contains_key(&hdl) {
            return Err(WireError::Protocol(format!("endpoint {hdl} already registered")));
        }
        self.connections.insert(hdl, conn);
        Ok(())
    }

    // ---- Inbound ----

    /// Feed the next chunk read from `hdl`.
    ///
    /// `chunk` must hold exactly the number of bytes the previous state asked
    /// for: a header when `is_payload` is false, otherwise the payload of the
    /// header fed before it. Returns the new state; on
    /// [`ConnectionState::Faulted`] or [`ConnectionState::Closed`] the
    /// transport tears the endpoint down and reports it through
    /// [`Instance::connection_closed`].
    pub fn handle(&mut self, hdl: EndpointHandle, chunk: &[u8], is_payload: bool) -> ConnectionState {
        let max_frame_size = self.config.max_frame_size;
        let Some(conn) = self.connections.get_mut(&hdl) else {
            warn!(endpoint = %hdl, "Input on unregistered endpoint");
            return ConnectionState::Faulted;
        };
        if conn.state().is_terminal() {
            trace!(endpoint = %hdl, state = %conn.state(), "Input on finished endpoint ignored");
            return conn.state();
        }
        let read = if is_payload {
            conn.read_payload(chunk).map(Some)
        } else {
            conn.read_header(chunk, max_frame_size)
        };
        let hdr = match read {
            Ok(Some(hdr)) => hdr,
            Ok(None) => return conn.state(),
            Err(e) => return self.fault(hdl, &e),
        };
        let body: &[u8] = if is_payload { chunk } else { &[] };
        trace!(endpoint = %hdl, header = %hdr, "Frame received");
        match self.handle_frame(hdl, &hdr, body) {
            Ok(Disposition::Continue) => self
                .connection_state(hdl)
                .unwrap_or(ConnectionState::Faulted),
            Ok(Disposition::Close) => self.close(hdl),
            Err(e) => self.fault(hdl, &e),
        }
    }

    fn handle_frame(
        &mut self,
        hdl: EndpointHandle,
        hdr: &Header,
        body: &[u8],
    ) -> WireResult<Disposition> {
        if hdr.operation().is_handshake() {
            return match hdr.operation() {
                MessageType::ServerHandshake => self.handle_server_handshake(hdl, hdr, body),
                _ => self.handle_client_handshake(hdl, hdr, body),
            };
        }
        let peer = self
            .connections
            .get(&hdl)
            .and_then(Connection::peer)
            .ok_or_else(|| WireError::Protocol(format!("{} before handshake", hdr.operation())))?;

        match hdr.operation() {
            MessageType::DispatchMessage | MessageType::DispatchMessageNamed => {
                self.handle_dispatch(hdl, hdr, body)?;
            }
            MessageType::AnnounceProxy => {
                let actor = hdr.dest_actor().unwrap_or(ActorId::INVALID);
                debug!(node = %peer, actor = %actor, "Proxy announced");
                self.callee.proxy_announced(&peer, actor);
            }
            MessageType::KillProxy => {
                let reason: ExitReason = payload::decode(body)?;
                debug!(node = %peer, actor = %hdr.source_actor(), reason = %reason, "Proxy killed");
                self.callee.proxy_killed(&peer, hdr.source_actor(), reason);
            }
            MessageType::Heartbeat => {
                trace!(node = %peer, "Heartbeat received");
                self.callee.handle_heartbeat(&peer);
            }
            MessageType::ServerHandshake | MessageType::ClientHandshake => {}
        }
        Ok(Disposition::Continue)
    }

    fn handle_server_handshake(
        &mut self,
        hdl: EndpointHandle,
        hdr: &Header,
        body: &[u8],
    ) -> WireResult<Disposition> {
        let hs = ServerHandshake::parse(hdr, body, &self.config.app_identifier)?;
        let node = hs.node;
        let (actor, signatures) = match hs.published {
            Some(PublishedInterface { actor, signatures }) => (actor, signatures),
            None => (ActorId::INVALID, BTreeSet::new()),
        };
        if node == self.this_node {
            debug!(endpoint = %hdl, "Connected to self, closing");
            self.callee.finalize_handshake(&node, actor, &signatures);
            return Ok(Disposition::Close);
        }
        if matches!(self.routing.lookup(&node), Route::Direct(_)) {
            debug!(endpoint = %hdl, node = %node, "Redundant connection, closing");
            self.callee.finalize_handshake(&node, actor, &signatures);
            return Ok(Disposition::Close);
        }
        let expected = self.connections.get(&hdl).and_then(Connection::expected);
        if let Some(expected) = expected.filter(|e| *e != node) {
            return Err(WireError::HandshakeMismatch(format!(
                "dialed node {expected}, reached {node}"
            )));
        }
        self.establish(hdl, node)?;
        self.callee.learned_new_node(&node);
        if actor.is_valid() {
            self.callee.finalize_handshake(&node, actor, &signatures);
        }
        self.callee.send_buffered_messages(&node, hdl);
        Ok(Disposition::Continue)
    }

    fn handle_client_handshake(
        &mut self,
        hdl: EndpointHandle,
        hdr: &Header,
        body: &[u8],
    ) -> WireResult<Disposition> {
        let hs = ClientHandshake::parse(hdr, body, &self.config.app_identifier)?;
        let node = hs.node;
        if node == self.this_node {
            debug!(endpoint = %hdl, "Accepted connection from self, closing");
            return Ok(Disposition::Close);
        }
        if matches!(self.routing.lookup(&node), Route::Direct(_)) {
            debug!(endpoint = %hdl, node = %node, "Second client handshake, closing");
            return Ok(Disposition::Close);
        }
        self.establish(hdl, node)?;
        self.callee.learned_new_node(&node);
        self.callee.send_buffered_messages(&node, hdl);
        Ok(Disposition::Continue)
    }

    fn establish(&mut self, hdl: EndpointHandle, node: NodeId) -> WireResult<()> {
        if !self.routing.add_direct(node, hdl) {
            return Err(WireError::Protocol(format!(
                "cannot bind node {node} to endpoint {hdl}"
            )));
        }
        if let Some(conn) = self.connections.get_mut(&hdl) {
            conn.establish(node);
        }
        info!(endpoint = %hdl, node = %node, "Handshake complete");
        Ok(())
    }

    fn handle_dispatch(&mut self, hdl: EndpointHandle, hdr: &Header, body: &[u8]) -> WireResult<()> {
        let dest_node = hdr.dest_node();
        if !dest_node.is_nil() && dest_node != self.this_node {
            self.forward(hdl, hdr, body);
            return Ok(());
        }
        let DispatchPayload {
            forwarding_stack,
            message,
        } = payload::decode(body)?;
        let envelope = Envelope {
            source: ActorAddr::new(hdr.source_node(), hdr.source_actor()),
            message_id: hdr.message_id(),
            forwarding_stack,
            message,
        };
        debug!(
            source = %envelope.source,
            dest = %hdr.dest(),
            id = %envelope.message_id,
            size = body.len(),
            "Delivering message"
        );
        match hdr.dest() {
            Destination::Id(actor) => self.callee.deliver(actor, envelope),
            Destination::Name(name) => self.callee.deliver_named(name, envelope),
        }
        Ok(())
    }

    /// Relay a dispatch frame addressed to another node, unchanged.
    fn forward(&mut self, from: EndpointHandle, hdr: &Header, body: &[u8]) {
        let dest_node = hdr.dest_node();
        match self.routing.lookup(&dest_node) {
            Route::Direct(next) if next != from => {
                debug!(from = %from, to = %next, node = %dest_node, "Forwarding message");
                self.send(next, hdr, body);
            }
            _ => warn!(node = %dest_node, "No route to forward message, dropped"),
        }
    }

    fn fault(&mut self, hdl: EndpointHandle, err: &WireError) -> ConnectionState {
        warn!(endpoint = %hdl, error = %err, "Connection faulted");
        self.erase_routes(hdl);
        if let Some(conn) = self.connections.get_mut(&hdl) {
            conn.fault();
        }
        ConnectionState::Faulted
    }

    fn close(&mut self, hdl: EndpointHandle) -> ConnectionState {
        self.erase_routes(hdl);
        if let Some(conn) = self.connections.get_mut(&hdl) {
            conn.close();
        }
        ConnectionState::Closed
    }

    /// Drop the routes that depended on `hdl`: the direct route it served,
    /// and the pending route of a connection attempt that never completed.
    /// A finished endpoint already gave up its attempt.
    fn erase_routes(&mut self, hdl: EndpointHandle) -> Option<NodeId> {
        let attempt = self
            .connections
            .get(&hdl)
            .filter(|c| !c.state().is_terminal())
            .and_then(Connection::pending_attempt)
            .filter(|node| self.routing.lookup(node) == Route::Pending)
            .filter(|node| !self.other_attempt(hdl, node));
        let callee = &mut self.callee;
        if let Some(node) = attempt {
            debug!(endpoint = %hdl, node = %node, "Connection attempt failed");
            self.routing
                .erase_node(&node, &mut |n| callee.purge_state(n));
        }
        self.routing
            .erase_endpoint(&hdl, &mut |node| callee.purge_state(node))
    }

    /// Whether an endpoint other than `hdl` is still dialing `node`.
    fn other_attempt(&self, hdl: EndpointHandle, node: &NodeId) -> bool {
        self.connections.values().any(|c| {
            c.endpoint() != hdl && !c.state().is_terminal() && c.pending_attempt() == Some(*node)
        })
    }

    // ---- Outbound ----

    /// Send `message` to `recipient`.
    ///
    /// Returns `false` without any I/O if the recipient's node has no route.
    /// A pending route buffers the frame in the node's pending buffer.
    pub fn dispatch(
        &mut self,
        sender: Option<&ActorAddr>,
        forwarding_stack: Vec<ActorAddr>,
        recipient: &Recipient,
        mid: MessageId,
        message: Message,
    ) -> bool {
        let route @ (Route::Direct(_) | Route::Pending) = self.routing.lookup(&recipient.node)
        else {
            let err = WireError::UnknownRoute(recipient.node);
            debug!(error = %err, "Dispatch failed");
            return false;
        };
        let (source_node, source_actor) = sender
            .map(|a| (a.node, a.id))
            .unwrap_or((self.this_node, ActorId::INVALID));
        let frame = payload::encode(&DispatchPayload {
            forwarding_stack,
            message,
        })
        .and_then(|body| {
            let hdr = Header::builder(MessageType::DispatchMessage)
                .message_id(mid)
                .source(source_node, source_actor)
                .dest_node(recipient.node)
                .destination(recipient.dest)
                .build(self.payload_len(&body)?);
            Ok((hdr, body))
        });
        let (hdr, body) = match frame {
            Ok(frame) => frame,
            Err(e) => {
                warn!(node = %recipient.node, error = %e, "Cannot encode message");
                return false;
            }
        };
        match route.endpoint() {
            Some(hdl) => {
                trace!(endpoint = %hdl, header = %hdr, "Dispatching");
                self.send(hdl, &hdr, &body);
            }
            None => {
                trace!(node = %recipient.node, header = %hdr, "Buffering until handshake completes");
                append_frame(self.callee.pending_buffer(&recipient.node), &hdr, &body);
            }
        }
        true
    }

    /// Write one heartbeat to every directly connected node. Returns the
    /// number of frames written.
    pub fn handle_heartbeat_tick(&mut self) -> usize {
        let mut routes = self.routing.direct_routes();
        routes.sort();
        for (hdl, node) in &routes {
            let hdr = self.heartbeat_header(*node);
            self.send(*hdl, &hdr, &[]);
        }
        trace!(count = routes.len(), "Heartbeat tick");
        routes.len()
    }

    /// Tell `node` that this node created a proxy for its actor `actor`.
    /// Returns `false` if `node` is not directly connected.
    pub fn announce_proxy(&mut self, node: &NodeId, actor: ActorId) -> bool {
        let Route::Direct(hdl) = self.routing.lookup(node) else {
            debug!(node = %node, actor = %actor, "announce_proxy dropped, no route");
            return false;
        };
        let hdr = self.announce_proxy_header(*node, actor);
        self.send(hdl, &hdr, &[]);
        true
    }

    /// Tell `node` that the local actor `actor` terminated. Returns `false`
    /// if `node` is not directly connected.
    pub fn kill_proxy(&mut self, node: &NodeId, actor: ActorId, reason: &ExitReason) -> bool {
        let Route::Direct(hdl) = self.routing.lookup(node) else {
            debug!(node = %node, actor = %actor, "kill_proxy dropped, no route");
            return false;
        };
        match self.kill_proxy_frame(*node, actor, reason) {
            Ok((hdr, body)) => {
                self.send(hdl, &hdr, &body);
                true
            }
            Err(e) => {
                warn!(node = %node, actor = %actor, error = %e, "Cannot encode kill_proxy");
                false
            }
        }
    }

    /// Append a server handshake advertising the actor published on `port`.
    pub fn write_server_handshake(&self, buf: &mut BytesMut, port: Option<u16>) -> WireResult<()> {
        let (hdr, body) = self.server_handshake_frame(port)?;
        append_frame(buf, &hdr, &body);
        Ok(())
    }

    /// Append a client handshake.
    pub fn write_client_handshake(&self, buf: &mut BytesMut) -> WireResult<()> {
        let (hdr, body) = self.client_handshake_frame()?;
        append_frame(buf, &hdr, &body);
        Ok(())
    }

    /// Append an `announce_proxy` frame for `actor` on `node`.
    pub fn write_announce_proxy(&self, buf: &mut BytesMut, node: NodeId, actor: ActorId) {
        append_frame(buf, &self.announce_proxy_header(node, actor), &[]);
    }

    /// Append a `kill_proxy` frame for the local actor `actor`.
    pub fn write_kill_proxy(
        &self,
        buf: &mut BytesMut,
        node: NodeId,
        actor: ActorId,
        reason: &ExitReason,
    ) -> WireResult<()> {
        let (hdr, body) = self.kill_proxy_frame(node, actor, reason)?;
        append_frame(buf, &hdr, &body);
        Ok(())
    }

    /// Append a heartbeat addressed to `node`.
    pub fn write_heartbeat(&self, buf: &mut BytesMut, node: NodeId) {
        append_frame(buf, &self.heartbeat_header(node), &[]);
    }

    fn server_handshake_frame(&self, port: Option<u16>) -> WireResult<(Header, Vec<u8>)> {
        let published = port.and_then(|p| self.published.get(p));
        if published.is_none() && port.is_some() {
            debug!(port = ?port, "No actor published on port");
        }
        let body = payload::encode(&ServerHandshake {
            node: self.this_node,
            app_identifier: self.config.app_identifier.clone(),
            published: published.map(PublishedInterface::from),
        })?;
        let actor = published.map(|p| p.actor.id).unwrap_or(ActorId::INVALID);
        let hdr = Header::builder(MessageType::ServerHandshake)
            .operation_data(PROTOCOL_VERSION)
            .source(self.this_node, actor)
            .build(self.payload_len(&body)?);
        Ok((hdr, body))
    }

    fn client_handshake_frame(&self) -> WireResult<(Header, Vec<u8>)> {
        let body = payload::encode(&ClientHandshake {
            node: self.this_node,
            app_identifier: self.config.app_identifier.clone(),
        })?;
        let hdr = Header::builder(MessageType::ClientHandshake)
            .operation_data(PROTOCOL_VERSION)
            .source(self.this_node, ActorId::INVALID)
            .build(self.payload_len(&body)?);
        Ok((hdr, body))
    }

    fn kill_proxy_frame(
        &self,
        node: NodeId,
        actor: ActorId,
        reason: &ExitReason,
    ) -> WireResult<(Header, Vec<u8>)> {
        let body = payload::encode(reason)?;
        let hdr = Header::builder(MessageType::KillProxy)
            .source(self.this_node, actor)
            .dest_node(node)
            .build(self.payload_len(&body)?);
        Ok((hdr, body))
    }

    fn announce_proxy_header(&self, node: NodeId, actor: ActorId) -> Header {
        Header::builder(MessageType::AnnounceProxy)
            .source(self.this_node, ActorId::INVALID)
            .dest_node(node)
            .dest_actor(actor)
            .build(0)
    }

    fn heartbeat_header(&self, node: NodeId) -> Header {
        Header::builder(MessageType::Heartbeat)
            .source(self.this_node, ActorId::INVALID)
            .dest_node(node)
            .build(0)
    }

    /// Length of an outgoing payload, bounded by the configured frame size.
    fn payload_len(&self, body: &[u8]) -> WireResult<u32> {
        let max = self.config.max_frame_size;
        match u32::try_from(body.len()) {
            Ok(len) if len <= max => Ok(len),
            _ => Err(WireError::OversizedFrame {
                size: u32::try_from(body.len()).unwrap_or(u32::MAX),
                max,
            }),
        }
    }

    fn send(&mut self, hdl: EndpointHandle, hdr: &Header, body: &[u8]) {
        append_frame(self.callee.write_buffer(hdl), hdr, body);
        self.callee.flush(hdl);
    }
}

fn append_frame(buf: &mut BytesMut, hdr: &Header, body: &[u8]) {
    buf.reserve(HEADER_SIZE + body.len());
    hdr.encode_into(buf);
    buf.extend_from_slice(body);
}

#[cfg(test)]
mod tests {
    use super::*;
    use actormesh_types::ConnectionHandle;

    // ---- Recording callee ----

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
        buffers: HashMap<EndpointHandle, BytesMut>,
        pending: HashMap<NodeId, BytesMut>,
        flushes: Vec<EndpointHandle>,
        delivered: Vec<(Destination, Envelope)>,
    }

    impl Callee for Recorder {
        fn finalize_handshake(&mut self, _node: &NodeId, actor: ActorId, _sigs: &BTreeSet<String>) {
            self.events.push(format!("finalize:{actor}"));
        }
        fn purge_state(&mut self, _node: &NodeId) {
            self.events.push("purge".into());
        }
        fn proxy_announced(&mut self, _node: &NodeId, actor: ActorId) {
            self.events.push(format!("announced:{actor}"));
        }
        fn proxy_killed(&mut self, _node: &NodeId, actor: ActorId, reason: ExitReason) {
            self.events.push(format!("killed:{actor}:{reason}"));
        }
        fn deliver(&mut self, dest: ActorId, envelope: Envelope) {
            self.delivered.push((Destination::Id(dest), envelope));
        }
        fn deliver_named(&mut self, dest: ActorName, envelope: Envelope) {
            self.delivered.push((Destination::Name(dest), envelope));
        }
        fn learned_new_node(&mut self, _node: &NodeId) {
            self.events.push("learned".into());
        }
        fn handle_heartbeat(&mut self, _node: &NodeId) {
            self.events.push("heartbeat".into());
        }
        fn send_buffered_messages(&mut self, _node: &NodeId, _hdl: EndpointHandle) {
            self.events.push("send_buffered".into());
        }
        fn write_buffer(&mut self, hdl: EndpointHandle) -> &mut BytesMut {
            self.buffers.entry(hdl).or_default()
        }
        fn pending_buffer(&mut self, node: &NodeId) -> &mut BytesMut {
            self.pending.entry(*node).or_default()
        }
        fn flush(&mut self, hdl: EndpointHandle) {
            self.flushes.push(hdl);
        }
    }

    fn hdl(id: u64) -> EndpointHandle {
        ConnectionHandle(id).into()
    }

    fn engine() -> Instance<Recorder> {
        Instance::new(NodeId::new(), WireConfig::default(), Recorder::default())
    }

    /// Feed a full frame (header, then payload if any) to `engine`.
    fn feed(engine: &mut Instance<Recorder>, hdl: EndpointHandle, frame: &[u8]) -> ConnectionState {
        let state = engine.handle(hdl, &frame[..HEADER_SIZE], false);
        match state {
            ConnectionState::AwaitPayload(n) => {
                engine.handle(hdl, &frame[HEADER_SIZE..HEADER_SIZE + n as usize], true)
            }
            other => other,
        }
    }

    /// Connect `engine` as acceptor on `hdl` to a fresh peer engine.
    fn accept_peer(engine: &mut Instance<Recorder>, hdl: EndpointHandle) -> Instance<Recorder> {
        let peer = self::engine();
        let mut buf = BytesMut::new();
        peer.write_client_handshake(&mut buf).unwrap();
        engine.accept_connection(hdl, None).unwrap();
        assert_eq!(feed(engine, hdl, &buf), ConnectionState::AwaitHeader);
        peer
    }

    #[test]
    fn test_accept_writes_server_handshake() {
        let mut engine = engine();
        engine.publish(4242, ActorId(9), ["sigX".to_string()].into_iter().collect());
        engine.accept_connection(hdl(1), Some(4242)).unwrap();

        let buf = &engine.callee().buffers[&hdl(1)];
        let hdr = Header::decode(buf).unwrap();
        assert_eq!(hdr.operation(), MessageType::ServerHandshake);
        assert_eq!(hdr.operation_data(), PROTOCOL_VERSION);
        assert_eq!(hdr.source_actor(), ActorId(9));
        let hs: ServerHandshake = payload::decode(&buf[HEADER_SIZE..]).unwrap();
        assert_eq!(hs.published.unwrap().actor, ActorId(9));
        assert_eq!(engine.callee().flushes, vec![hdl(1)]);
    }

    #[test]
    fn test_register_twice_rejected() {
        let mut engine = engine();
        engine.open_connection(hdl(1), None).unwrap();
        assert!(engine.open_connection(hdl(1), None).is_err());
        assert!(engine.accept_connection(hdl(1), None).is_err());
    }

    #[test]
    fn test_client_handshake_creates_route() {
        let mut engine = engine();
        let peer = accept_peer(&mut engine, hdl(1));
        assert_eq!(engine.lookup(&peer.this_node()), Route::Direct(hdl(1)));
        assert_eq!(engine.callee().events, vec!["learned", "send_buffered"]);
    }

    #[test]
    fn test_unregistered_endpoint_faults() {
        let mut engine = engine();
        let frame = engine.heartbeat_header(NodeId::new()).encode();
        assert_eq!(engine.handle(hdl(3), &frame, false), ConnectionState::Faulted);
    }

    #[test]
    fn test_self_connection_closed() {
        let mut engine = engine();
        engine.open_connection(hdl(1), None).unwrap();
        let mut buf = BytesMut::new();
        engine.write_server_handshake(&mut buf, None).unwrap();
        assert_eq!(feed(&mut engine, hdl(1), &buf), ConnectionState::Closed);
        assert_eq!(engine.callee().events, vec!["finalize:0"]);
        assert!(engine.routing_table().is_empty());
        assert_eq!(engine.connection_state(hdl(1)), Some(ConnectionState::Closed));
    }

    #[test]
    fn test_second_client_handshake_closed() {
        let mut engine = engine();
        let peer = accept_peer(&mut engine, hdl(1));
        let mut buf = BytesMut::new();
        peer.write_client_handshake(&mut buf).unwrap();
        engine.accept_connection(hdl(2), None).unwrap();
        assert_eq!(feed(&mut engine, hdl(2), &buf), ConnectionState::Closed);
        assert_eq!(engine.lookup(&peer.this_node()), Route::Direct(hdl(1)));
    }

    #[test]
    fn test_dispatch_unknown_route() {
        let mut engine = engine();
        let ok = engine.dispatch(
            None,
            Vec::new(),
            &Recipient::actor(NodeId::new(), ActorId(1)),
            MessageId::ASYNC,
            Message::from_bytes(vec![1, 2, 3]),
        );
        assert!(!ok);
        assert!(engine.callee().buffers.is_empty());
        assert!(engine.callee().flushes.is_empty());
        assert!(engine.routing_table().is_empty());
    }

    #[test]
    fn test_dispatch_pending_is_buffered() {
        let mut engine = engine();
        let node = NodeId::new();
        assert!(engine.add_pending_route(node));
        let ok = engine.dispatch(
            None,
            Vec::new(),
            &Recipient::actor(node, ActorId(1)),
            MessageId::request(1),
            Message::from_bytes(vec![7]),
        );
        assert!(ok);
        let pending = &engine.callee().pending[&node];
        let hdr = Header::decode(pending).unwrap();
        assert_eq!(hdr.operation(), MessageType::DispatchMessage);
        assert_eq!(hdr.dest_node(), node);
        assert!(engine.callee().flushes.is_empty());
    }

    #[test]
    fn test_pending_route_for_self_rejected() {
        let mut engine = engine();
        let me = engine.this_node();
        assert!(!engine.add_pending_route(me));
        assert!(!engine.add_pending_route(NodeId::NIL));
    }

    #[test]
    fn test_erase_route_pending_and_direct() {
        let mut engine = engine();
        let pending = NodeId::new();
        engine.add_pending_route(pending);
        assert!(engine.erase_route(&pending));
        assert!(!engine.erase_route(&pending));
        assert_eq!(engine.callee().events, vec!["purge"]);

        let peer = accept_peer(&mut engine, hdl(1));
        assert!(engine.erase_route(&peer.this_node()));
        assert_eq!(engine.lookup(&peer.this_node()), Route::Unknown);
        assert_eq!(engine.connection_state(hdl(1)), Some(ConnectionState::Closed));
        assert!(engine.routing_table().is_empty());
    }

    #[test]
    fn test_handshake_from_unexpected_node_faults() {
        let mut engine = engine();
        let dialed = NodeId::new();
        engine.add_pending_route(dialed);
        engine.open_connection(hdl(1), Some(dialed)).unwrap();

        let other = self::engine();
        let mut buf = BytesMut::new();
        other.write_server_handshake(&mut buf, None).unwrap();
        assert_eq!(feed(&mut engine, hdl(1), &buf), ConnectionState::Faulted);
        assert_eq!(engine.lookup(&dialed), Route::Unknown);
        assert_eq!(engine.lookup(&other.this_node()), Route::Unknown);
        assert_eq!(engine.callee().events, vec!["purge"]);
    }

    #[test]
    fn test_closed_attempt_keeps_retried_pending_route() {
        let mut engine = engine();
        let dialed = NodeId::new();
        engine.add_pending_route(dialed);
        engine.open_connection(hdl(1), Some(dialed)).unwrap();
        let hdr = Header::builder(MessageType::Heartbeat).build(0);
        assert_eq!(engine.handle(hdl(1), &hdr.encode(), false), ConnectionState::Faulted);
        assert_eq!(engine.lookup(&dialed), Route::Unknown);

        engine.add_pending_route(dialed);
        assert_eq!(engine.connection_closed(hdl(1)), None);
        assert_eq!(engine.lookup(&dialed), Route::Pending);
        assert_eq!(engine.connection_count(), 0);
    }

    #[test]
    fn test_dispatch_named_delivery() {
        let mut sender = engine();
        let mut receiver = engine();
        let node = receiver.this_node();
        sender.routing.add_direct(node, hdl(5));
        accept_peer(&mut receiver, hdl(1));

        let name = ActorName::new("registry").unwrap();
        assert!(sender.dispatch(
            None,
            vec![ActorAddr::new(sender.this_node(), ActorId(2))],
            &Recipient::named(node, name),
            MessageId::request(4),
            Message::from_bytes(b"hello".to_vec()),
        ));
        let frame = sender.callee().buffers[&hdl(5)].clone();
        assert_eq!(feed(&mut receiver, hdl(1), &frame), ConnectionState::AwaitHeader);

        let (dest, env) = &receiver.callee().delivered[0];
        assert_eq!(*dest, Destination::Name(name));
        assert_eq!(env.source.node, sender.this_node());
        assert_eq!(env.message_id, MessageId::request(4));
        assert_eq!(env.forwarding_stack.len(), 1);
        assert_eq!(env.message.as_bytes(), b"hello");
    }

    #[test]
    fn test_bad_payload_faults_and_purges() {
        let mut engine = engine();
        let peer = accept_peer(&mut engine, hdl(1));
        let hdr = Header::builder(MessageType::DispatchMessage)
            .source(peer.this_node(), ActorId::INVALID)
            .dest_node(engine.this_node())
            .dest_actor(ActorId(1))
            .build(3);
        let mut frame = hdr.encode().to_vec();
        frame.extend_from_slice(&[0xc1, 0xc1, 0xc1]);
        assert_eq!(feed(&mut engine, hdl(1), &frame), ConnectionState::Faulted);
        assert_eq!(engine.lookup(&peer.this_node()), Route::Unknown);
        assert_eq!(engine.callee().events.last().map(String::as_str), Some("purge"));
        assert!(engine.callee().delivered.is_empty());
    }

    #[test]
    fn test_oversized_header_faults() {
        let mut engine = Instance::new(
            NodeId::new(),
            WireConfig {
                max_frame_size: 16,
                ..WireConfig::default()
            },
            Recorder::default(),
        );
        engine.open_connection(hdl(1), None).unwrap();
        let hdr = Header::builder(MessageType::ServerHandshake)
            .operation_data(PROTOCOL_VERSION)
            .build(17);
        assert_eq!(engine.handle(hdl(1), &hdr.encode(), false), ConnectionState::Faulted);
        // Further input is ignored.
        assert_eq!(engine.handle(hdl(1), &[0u8; 17], true), ConnectionState::Faulted);
    }

    #[test]
    fn test_kill_proxy_delivers_reason() {
        let mut engine = engine();
        let peer = accept_peer(&mut engine, hdl(1));
        let mut buf = BytesMut::new();
        peer.write_kill_proxy(&mut buf, engine.this_node(), ActorId(8), &ExitReason::Kill)
            .unwrap();
        assert_eq!(feed(&mut engine, hdl(1), &buf), ConnectionState::AwaitHeader);
        assert_eq!(engine.callee().events.last().unwrap(), "killed:8:kill");
    }

    #[test]
    fn test_announce_and_kill_need_direct_route() {
        let mut engine = engine();
        let node = NodeId::new();
        engine.add_pending_route(node);
        assert!(!engine.announce_proxy(&node, ActorId(1)));
        assert!(!engine.kill_proxy(&NodeId::new(), ActorId(1), &ExitReason::Normal));
        assert!(engine.callee().buffers.is_empty());
    }

    #[test]
    fn test_forward_to_third_node() {
        let mut engine = engine();
        let a = accept_peer(&mut engine, hdl(1));
        let b = accept_peer(&mut engine, hdl(2));

        let body = payload::encode(&DispatchPayload {
            forwarding_stack: Vec::new(),
            message: Message::from_bytes(vec![1]),
        })
        .unwrap();
        let hdr = Header::builder(MessageType::DispatchMessage)
            .source(a.this_node(), ActorId(3))
            .dest_node(b.this_node())
            .dest_actor(ActorId(4))
            .build(body.len() as u32);
        let mut frame = hdr.encode().to_vec();
        frame.extend_from_slice(&body);
        assert_eq!(feed(&mut engine, hdl(1), &frame), ConnectionState::AwaitHeader);

        assert!(engine.callee().delivered.is_empty());
        let out = &engine.callee().buffers[&hdl(2)];
        assert_eq!(&out[out.len() - frame.len()..], &frame[..]);
    }

    #[test]
    fn test_forward_without_route_dropped() {
        let mut engine = engine();
        let a = accept_peer(&mut engine, hdl(1));
        let body = payload::encode(&DispatchPayload {
            forwarding_stack: Vec::new(),
            message: Message::default(),
        })
        .unwrap();
        let hdr = Header::builder(MessageType::DispatchMessage)
            .source(a.this_node(), ActorId(3))
            .dest_node(NodeId::new())
            .dest_actor(ActorId(4))
            .build(body.len() as u32);
        let mut frame = hdr.encode().to_vec();
        frame.extend_from_slice(&body);
        assert_eq!(feed(&mut engine, hdl(1), &frame), ConnectionState::AwaitHeader);
        assert!(engine.callee().delivered.is_empty());
    }

    #[test]
    fn test_connection_closed_purges() {
        let mut engine = engine();
        let peer = accept_peer(&mut engine, hdl(1));
        assert_eq!(engine.connection_closed(hdl(1)), Some(peer.this_node()));
        assert_eq!(engine.connection_count(), 0);
        assert_eq!(engine.callee().events.last().unwrap(), "purge");
        assert_eq!(engine.connection_closed(hdl(1)), None);
    }

    #[test]
    fn test_unpublish_actor_uses_local_node() {
        let mut engine = engine();
        engine.publish(1, ActorId(5), BTreeSet::new());
        engine.publish(2, ActorId(5), BTreeSet::new());
        assert_eq!(engine.unpublish_actor(ActorId(5), None, None), 2);
        assert!(engine.published_actors().is_empty());
    }
}
