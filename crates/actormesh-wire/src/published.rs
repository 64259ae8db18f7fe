//! Published-actor registry: which local actor answers on which port.

use actormesh_types::ActorAddr;
use std::collections::{BTreeSet, HashMap};
use tracing::info;

/// Port value that selects every port in [`PublishedActors::unpublish_actor`].
pub const ANY_PORT: u16 = 0;

/// An actor exposed on a listening port along with its messaging interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedActor {
    /// The exposed actor.
    pub actor: ActorAddr,
    /// Signatures of the messages the actor accepts.
    pub signatures: BTreeSet<String>,
}

/// Callback invoked once for every removed entry with `(actor, port)`.
pub type RemovedCallback<'a> = &'a mut dyn FnMut(&ActorAddr, u16);

/// Port-to-actor map. An actor may be published on several ports at once.
#[derive(Debug, Default)]
pub struct PublishedActors {
    by_port: HashMap<u16, PublishedActor>,
}

impl PublishedActors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `actor` on `port`, replacing any previous entry.
    pub fn publish(&mut self, port: u16, actor: ActorAddr, signatures: BTreeSet<String>) {
        info!(port, actor = %actor, interface = signatures.len(), "Actor published");
        self.by_port.insert(port, PublishedActor { actor, signatures });
    }

    /// Remove the entry at `port`.
    pub fn unpublish(
        &mut self,
        port: u16,
        on_removed: Option<RemovedCallback<'_>>,
    ) -> Option<PublishedActor> {
        let removed = self.by_port.remove(&port)?;
        if let Some(cb) = on_removed {
            cb(&removed.actor, port);
        }
        info!(port, actor = %removed.actor, "Actor unpublished");
        Some(removed)
    }

    /// Remove `actor` from `port`, or from every port when `port` is `None`
    /// or [`ANY_PORT`]. A specific port is only cleared if it still holds
    /// `actor`. Returns the number of removed entries.
    pub fn unpublish_actor(
        &mut self,
        actor: &ActorAddr,
        port: Option<u16>,
        mut on_removed: Option<RemovedCallback<'_>>,
    ) -> usize {
        let ports: Vec<u16> = match port {
            Some(p) if p != ANY_PORT => {
                if self.by_port.get(&p).is_some_and(|e| e.actor == *actor) {
                    vec![p]
                } else {
                    Vec::new()
                }
            }
            _ => self
                .by_port
                .iter()
                .filter(|(_, e)| e.actor == *actor)
                .map(|(p, _)| *p)
                .collect(),
        };
        for p in &ports {
            self.by_port.remove(p);
            if let Some(cb) = on_removed.as_deref_mut() {
                cb(actor, *p);
            }
            info!(port = *p, actor = %actor, "Actor unpublished");
        }
        ports.len()
    }

    /// Entry at `port`.
    pub fn get(&self, port: u16) -> Option<&PublishedActor> {
        self.by_port.get(&port)
    }

    /// Ports `actor` is currently published on, sorted.
    pub fn ports_of(&self, actor: &ActorAddr) -> Vec<u16> {
        let mut ports: Vec<u16> = self
            .by_port
            .iter()
            .filter(|(_, e)| e.actor == *actor)
            .map(|(p, _)| *p)
            .collect();
        ports.sort_unstable();
        ports
    }

    pub fn iter(&self) -> impl Iterator<Item = (u16, &PublishedActor)> {
        self.by_port.iter().map(|(p, e)| (*p, e))
    }

    pub fn len(&self) -> usize {
        self.by_port.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_port.is_empty()
    }
}
