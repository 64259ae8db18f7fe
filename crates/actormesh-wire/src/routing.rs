//! Routing table: maps node ids to the endpoints that reach them.
//!
//! A node has a route either because a handshake over some endpoint
//! completed (direct route) or because the embedder announced a connection
//! attempt that is still in progress (pending route). Every erasure hands
//! the node to a purge callback first, so dependents can drop their state
//! while the route still exists.

use actormesh_types::{EndpointHandle, NodeId};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::debug;

/// Current state of a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteState {
    /// Handshake completed over this endpoint.
    Direct(EndpointHandle),
    /// Handshake in progress; writes are buffered by the embedder.
    Pending,
}

/// One entry of the routing table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingEntry {
    /// Node reached by this route.
    pub node: NodeId,
    /// Current state.
    pub state: RouteState,
    /// When the entry entered its current state.
    pub since: DateTime<Utc>,
}

/// Result of [`RoutingTable::lookup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Direct(EndpointHandle),
    Pending,
    Unknown,
}

impl Route {
    /// Whether the node has any entry at all.
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }

    /// The endpoint of a direct route.
    pub fn endpoint(&self) -> Option<EndpointHandle> {
        match self {
            Self::Direct(hdl) => Some(*hdl),
            _ => None,
        }
    }
}

/// Node-to-endpoint mapping owned by the protocol engine.
#[derive(Debug, Default)]
pub struct RoutingTable {
    entries: HashMap<NodeId, RoutingEntry>,
    node_by_endpoint: HashMap<EndpointHandle, NodeId>,
}

impl RoutingTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Route to `node`.
    pub fn lookup(&self, node: &NodeId) -> Route {
        match self.entries.get(node).map(|e| e.state) {
            Some(RouteState::Direct(hdl)) => Route::Direct(hdl),
            Some(RouteState::Pending) => Route::Pending,
            None => Route::Unknown,
        }
    }

    /// Node bound to `hdl` by a completed handshake.
    pub fn node_for(&self, hdl: &EndpointHandle) -> Option<NodeId> {
        self.node_by_endpoint.get(hdl).copied()
    }

    /// Snapshot of an entry.
    pub fn get(&self, node: &NodeId) -> Option<&RoutingEntry> {
        self.entries.get(node)
    }

    /// Record a connection attempt to `node`. Returns `false` if the node
    /// already has an entry (pending or direct), which is left untouched.
    pub fn add_pending(&mut self, node: NodeId) -> bool {
        if self.entries.contains_key(&node) {
            return false;
        }
        debug!(node = %node, "Route pending");
        self.entries.insert(
            node,
            RoutingEntry {
                node,
                state: RouteState::Pending,
                since: Utc::now(),
            },
        );
        true
    }

    /// Bind `node` to `hdl`, creating the entry or promoting a pending one.
    /// Returns `false` without changes if the node already has a direct
    /// route or `hdl` already serves another node.
    pub fn add_direct(&mut self, node: NodeId, hdl: EndpointHandle) -> bool {
        if matches!(self.lookup(&node), Route::Direct(_)) || self.node_by_endpoint.contains_key(&hdl)
        {
            return false;
        }
        debug!(node = %node, endpoint = %hdl, "Route direct");
        self.entries.insert(
            node,
            RoutingEntry {
                node,
                state: RouteState::Direct(hdl),
                since: Utc::now(),
            },
        );
        self.node_by_endpoint.insert(hdl, node);
        true
    }

    /// Remove the route of `node`, calling `on_purge` before it disappears.
    pub fn erase_node(&mut self, node: &NodeId, on_purge: &mut dyn FnMut(&NodeId)) -> bool {
        if !self.entries.contains_key(node) {
            return false;
        }
        on_purge(node);
        if let Some(RoutingEntry {
            state: RouteState::Direct(hdl),
            ..
        }) = self.entries.remove(node)
        {
            self.node_by_endpoint.remove(&hdl);
        }
        debug!(node = %node, "Route erased");
        true
    }

    /// Remove the route served by `hdl`, calling `on_purge` before it
    /// disappears. Returns the node that was reachable through `hdl`.
    pub fn erase_endpoint(
        &mut self,
        hdl: &EndpointHandle,
        on_purge: &mut dyn FnMut(&NodeId),
    ) -> Option<NodeId> {
        let node = self.node_for(hdl)?;
        self.erase_node(&node, on_purge);
        Some(node)
    }

    /// All direct routes as `(endpoint, node)` pairs.
    pub fn direct_routes(&self) -> Vec<(EndpointHandle, NodeId)> {
        self.node_by_endpoint
            .iter()
            .map(|(hdl, node)| (*hdl, *node))
            .collect()
    }

    /// Snapshot of every entry.
    pub fn entries(&self) -> Vec<RoutingEntry> {
        self.entries.values().cloned().collect()
    }

    /// Whether `node` has an entry.
    pub fn contains(&self, node: &NodeId) -> bool {
        self.entries.contains_key(node)
    }

    /// Number of entries, pending included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Number of direct routes.
    pub fn direct_count(&self) -> usize {
        self.node_by_endpoint.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
