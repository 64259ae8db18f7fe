//! Proxy registry: local stand-ins for remote actors, grouped by node.
//!
//! The engine itself never creates proxies. Hosts keep them here and use the
//! registry to implement [`Callee::proxy_killed`] and
//! [`Callee::purge_state`]. The registry is thread-safe and cheap to clone.
//!
//! [`Callee::proxy_killed`]: crate::callee::Callee::proxy_killed
//! [`Callee::purge_state`]: crate::callee::Callee::purge_state

use actormesh_types::{ActorId, EndpointHandle, NodeId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

#[derive(Debug)]
struct NodeProxies<P> {
    /// Endpoint that owns every proxy of this node, once claimed.
    owner: Option<EndpointHandle>,
    proxies: HashMap<ActorId, P>,
}

impl<P> Default for NodeProxies<P> {
    fn default() -> Self {
        Self {
            owner: None,
            proxies: HashMap::new(),
        }
    }
}

/// Thread-safe map of `(node, actor)` to proxy handles.
#[derive(Debug)]
pub struct ProxyRegistry<P> {
    nodes: Arc<RwLock<HashMap<NodeId, NodeProxies<P>>>>,
}

impl<P> Clone for ProxyRegistry<P> {
    fn clone(&self) -> Self {
        Self {
            nodes: Arc::clone(&self.nodes),
        }
    }
}

impl<P> Default for ProxyRegistry<P> {
    fn default() -> Self {
        Self {
            nodes: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl<P: Clone> ProxyRegistry<P> {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Proxy of `actor` on `node`.
    pub fn get(&self, node: &NodeId, actor: ActorId) -> Option<P> {
        let nodes = self.nodes.read().unwrap_or_else(|e| e.into_inner());
        nodes.get(node)?.proxies.get(&actor).cloned()
    }

    /// Proxy of `actor` on `node`, created with `factory` if missing.
    /// `factory` receives the endpoint that claimed the node, if any.
    pub fn get_or_put(
        &self,
        node: NodeId,
        actor: ActorId,
        factory: impl FnOnce(Option<EndpointHandle>) -> P,
    ) -> P {
        let mut nodes = self.nodes.write().unwrap_or_else(|e| e.into_inner());
        let entry = nodes.entry(node).or_default();
        let owner = entry.owner;
        entry
            .proxies
            .entry(actor)
            .or_insert_with(|| factory(owner))
            .clone()
    }

    /// Every proxy of `node`.
    pub fn get_all(&self, node: &NodeId) -> Vec<P> {
        let nodes = self.nodes.read().unwrap_or_else(|e| e.into_inner());
        nodes
            .get(node)
            .map(|n| n.proxies.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Make `owner` the endpoint of `node`. Returns the proxies created so
    /// far; proxies created later see `owner` in their factory.
    pub fn claim(&self, node: NodeId, owner: EndpointHandle) -> Vec<P> {
        let mut nodes = self.nodes.write().unwrap_or_else(|e| e.into_inner());
        let entry = nodes.entry(node).or_default();
        entry.owner = Some(owner);
        entry.proxies.values().cloned().collect()
    }

    /// Endpoint that claimed `node`.
    pub fn owner(&self, node: &NodeId) -> Option<EndpointHandle> {
        let nodes = self.nodes.read().unwrap_or_else(|e| e.into_inner());
        nodes.get(node).and_then(|n| n.owner)
    }

    /// Remove the proxy of `actor` on `node`. The node entry goes away with
    /// its last proxy.
    pub fn erase(&self, node: &NodeId, actor: ActorId) -> Option<P> {
        let mut nodes = self.nodes.write().unwrap_or_else(|e| e.into_inner());
        let entry = nodes.get_mut(node)?;
        let removed = entry.proxies.remove(&actor);
        if entry.proxies.is_empty() {
            nodes.remove(node);
        }
        removed
    }

    /// Remove `node` with all its proxies, returning them.
    pub fn erase_node(&self, node: &NodeId) -> Vec<P> {
        let mut nodes = self.nodes.write().unwrap_or_else(|e| e.into_inner());
        nodes
            .remove(node)
            .map(|n| n.proxies.into_values().collect())
            .unwrap_or_default()
    }

    /// Number of proxies for `node`.
    pub fn count_proxies(&self, node: &NodeId) -> usize {
        let nodes = self.nodes.read().unwrap_or_else(|e| e.into_inner());
        nodes.get(node).map(|n| n.proxies.len()).unwrap_or(0)
    }

    /// Whether no node has an entry.
    pub fn is_empty(&self) -> bool {
        self.nodes.read().unwrap_or_else(|e| e.into_inner()).is_empty()
    }

    /// Remove everything, returning all proxies.
    pub fn clear(&self) -> Vec<P> {
        let mut nodes = self.nodes.write().unwrap_or_else(|e| e.into_inner());
        nodes
            .drain()
            .flat_map(|(_, n)| n.proxies.into_values())
            .collect()
    }
}
