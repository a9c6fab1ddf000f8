//! Peer Registry - the table of live peers, keyed by remote identity
//!
//! Every mutation and every read goes through one `RwLock`. The backing
//! vector never leaves this module; callers receive cloned `Arc<Peer>`
//! handles. Order is not meaningful, so removal swaps the target with the
//! last element and truncates.

use super::Peer;
use crate::transport::{Connection, ConnectionId};
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// Result of retiring a closed connection from the registry
#[derive(Debug, Clone)]
pub struct CloseOutcome {
    /// The peer that owned the closed connection, if it was registered
    pub removed: Option<Arc<Peer>>,
    /// Peers still registered for the identity after removal
    pub remaining: usize,
}

impl CloseOutcome {
    /// Whether the closed connection was the last session for its identity
    pub fn was_last(&self) -> bool {
        self.removed.is_some() && self.remaining == 0
    }
}

/// Concurrent table of active peers
#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: RwLock<Vec<Arc<Peer>>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the peer for `(identity, connection)`, creating it if needed.
    ///
    /// Registering the same pair twice yields the same `Arc`.
    pub fn insert_or_get(&self, connection: Arc<dyn Connection>, identity: &str) -> Arc<Peer> {
        let connection_id = connection.id();
        let mut peers = self.peers.write();

        if let Some(existing) = peers
            .iter()
            .find(|p| p.identity() == identity && p.connection_id() == connection_id)
        {
            return Arc::clone(existing);
        }

        let peer = Arc::new(Peer::new(connection, identity));
        peers.push(Arc::clone(&peer));
        debug!(
            "Registered peer {} on connection {} ({} total)",
            identity,
            connection_id,
            peers.len()
        );
        peer
    }

    /// Drop `peer` from the table. Removing an absent peer is a no-op.
    pub fn remove(&self, peer: &Arc<Peer>) {
        let mut peers = self.peers.write();
        if let Some(index) = peers.iter().position(|p| Arc::ptr_eq(p, peer)) {
            peers.swap_remove(index);
            debug!("Removed peer {} ({} left)", peer.identity(), peers.len());
        }
    }

    /// First registered peer for `identity`. With duplicates present, which
    /// one is returned is unspecified.
    pub fn lookup_first(&self, identity: &str) -> Option<Arc<Peer>> {
        self.peers
            .read()
            .iter()
            .find(|p| p.identity() == identity)
            .cloned()
    }

    /// Every registered peer for `identity`
    pub fn lookup_all(&self, identity: &str) -> Vec<Arc<Peer>> {
        self.peers
            .read()
            .iter()
            .filter(|p| p.identity() == identity)
            .cloned()
            .collect()
    }

    /// The peer registered for exactly `(identity, connection_id)`
    pub fn lookup_connection(&self, identity: &str, connection_id: ConnectionId) -> Option<Arc<Peer>> {
        self.peers
            .read()
            .iter()
            .find(|p| p.identity() == identity && p.connection_id() == connection_id)
            .cloned()
    }

    /// Make the session on `connection_id` the only one for `identity`.
    ///
    /// Lookup and eviction happen under one write lock. If the connection is
    /// not registered (it was already evicted or closed) nothing changes and
    /// `None` is returned. Evicted connections are asked to close after the
    /// lock is released.
    pub fn promote(
        &self,
        identity: &str,
        connection_id: ConnectionId,
    ) -> Option<(Arc<Peer>, Vec<Arc<Peer>>)> {
        let mut evicted = Vec::new();
        let keep = {
            let mut peers = self.peers.write();
            let keep = peers
                .iter()
                .find(|p| p.identity() == identity && p.connection_id() == connection_id)
                .cloned()?;

            let mut index = 0;
            while index < peers.len() {
                let candidate = &peers[index];
                if candidate.identity() == identity && candidate.connection_id() != connection_id {
                    // The former last element now sits at `index`; look at it again.
                    evicted.push(peers.swap_remove(index));
                    continue;
                }
                index += 1;
            }
            keep
        };

        for peer in &evicted {
            debug!(
                "Dropping duplicate session for {} on connection {}",
                peer.identity(),
                peer.connection_id()
            );
            peer.disconnect();
        }
        Some((keep, evicted))
    }

    /// Collapse every other session for `keep`'s identity onto `keep`.
    ///
    /// Returns the evicted peers, or nothing when `keep` itself is no longer
    /// registered.
    pub fn dedupe(&self, keep: &Arc<Peer>) -> Vec<Arc<Peer>> {
        self.promote(keep.identity(), keep.connection_id())
            .map(|(_, evicted)| evicted)
            .unwrap_or_default()
    }

    /// Retire the peer owning `connection_id` and report how many sessions
    /// for `identity` survive, all under one write lock.
    pub fn close_connection(&self, identity: &str, connection_id: ConnectionId) -> CloseOutcome {
        let mut peers = self.peers.write();

        let removed = peers
            .iter()
            .position(|p| p.identity() == identity && p.connection_id() == connection_id)
            .map(|index| peers.swap_remove(index));

        let remaining = peers.iter().filter(|p| p.identity() == identity).count();
        CloseOutcome { removed, remaining }
    }

    /// Remove every peer for `identity` and return them
    pub fn remove_identity(&self, identity: &str) -> Vec<Arc<Peer>> {
        let mut peers = self.peers.write();
        let mut removed = Vec::new();
        let mut index = 0;
        while index < peers.len() {
            if peers[index].identity() == identity {
                removed.push(peers.swap_remove(index));
                continue;
            }
            index += 1;
        }
        removed
    }

    /// Distinct identities with at least one registered peer
    pub fn identities(&self) -> BTreeSet<String> {
        self.peers
            .read()
            .iter()
            .map(|p| p.identity().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }
}
