// Contact Decision Gate - accept/reject incoming contact requests
//
// There is no spam or abuse policy here. Without an application verdict,
// every request is accepted.

use super::dispatch::CallbackDispatcher;
use super::handler::BotHandler;
use crate::peer::{Peer, PeerRegistry};
use crate::transport::{Connection, ContactDecision};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct ContactDecisionGate {
    registry: Arc<PeerRegistry>,
    handler: Arc<dyn BotHandler>,
    dispatcher: CallbackDispatcher,
}

impl ContactDecisionGate {
    pub fn new(
        registry: Arc<PeerRegistry>,
        handler: Arc<dyn BotHandler>,
        dispatcher: CallbackDispatcher,
    ) -> Self {
        Self {
            registry,
            handler,
            dispatcher,
        }
    }

    /// Decide on a contact request from `identity`.
    ///
    /// The requester is registered before the callback runs. A racing
    /// authentication for the same connection lands on the same peer.
    pub fn decide(
        &self,
        connection: Arc<dyn Connection>,
        identity: &str,
        display_name: &str,
        message: &str,
    ) -> ContactDecision {
        let peer = self.registry.insert_or_get(connection, identity);

        let decision = match self.handler.on_contact_request(&peer, display_name, message) {
            Some(true) | None => ContactDecision::Accepted,
            Some(false) => ContactDecision::Rejected,
        };

        info!(
            "Contact request from {} ({:?}): {}",
            identity, display_name, decision
        );
        decision
    }

    /// Answer the transport's "is this identity allowed" query as
    /// `(allowed, known)`. Both values are always equal.
    ///
    /// Allowed contacts get an outbound chat channel requested right away.
    pub fn lookup_contact(&self, connection: Arc<dyn Connection>, identity: &str) -> (bool, bool) {
        let peer = self.registry.insert_or_get(connection, identity);
        let allowed = self.handler.on_new_peer(&peer).unwrap_or(true);

        if allowed {
            self.open_inbound(&peer);
        } else {
            debug!("Contact {} not allowed", identity);
        }
        (allowed, allowed)
    }

    /// A contact request we sent was accepted by the remote side
    pub fn request_accepted(&self, connection: Arc<dyn Connection>, identity: &str) {
        let peer = self.registry.insert_or_get(connection, identity);
        self.open_inbound(&peer);
    }

    fn open_inbound(&self, peer: &Arc<Peer>) {
        let peer = Arc::clone(peer);
        self.dispatcher.dispatch("open_inbound", move || {
            if let Err(e) = peer.ensure_inbound_channel() {
                warn!("Could not open chat channel to {}: {}", peer.identity(), e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::handler::NoopHandler;
    use crate::transport::testing::connection;

    struct FixedVerdict(bool);

    impl BotHandler for FixedVerdict {
        fn on_new_peer(&self, _peer: &Arc<Peer>) -> Option<bool> {
            Some(self.0)
        }

        fn on_contact_request(&self, _peer: &Arc<Peer>, _name: &str, _message: &str) -> Option<bool> {
            Some(self.0)
        }
    }

    fn gate(handler: Arc<dyn BotHandler>) -> (ContactDecisionGate, Arc<PeerRegistry>) {
        let registry = Arc::new(PeerRegistry::new());
        let gate = ContactDecisionGate::new(
            Arc::clone(&registry),
            handler,
            CallbackDispatcher::inline(),
        );
        (gate, registry)
    }

    #[test]
    fn test_accepting_callback() {
        let (gate, _) = gate(Arc::new(FixedVerdict(true)));
        let (_, conn) = connection(1);
        let decision = gate.decide(conn, "a.onion", "Alice", "hi");
        assert_eq!(decision.as_str(), "Accepted");
    }

    #[test]
    fn test_rejecting_callback() {
        let (gate, _) = gate(Arc::new(FixedVerdict(false)));
        let (_, conn) = connection(1);
        let decision = gate.decide(conn, "a.onion", "Alice", "hi");
        assert_eq!(decision.as_str(), "Rejected");
    }

    #[test]
    fn test_no_callback_accepts() {
        let (gate, _) = gate(Arc::new(NoopHandler));
        let (_, conn) = connection(1);
        assert_eq!(gate.decide(conn, "a.onion", "", ""), ContactDecision::Accepted);
    }

    #[test]
    fn test_decide_registers_placeholder_once() {
        let (gate, registry) = gate(Arc::new(NoopHandler));
        let (_, conn) = connection(1);

        assert!(registry.lookup_first("a.onion").is_none());
        gate.decide(conn.clone(), "a.onion", "Alice", "hi");
        gate.decide(conn.clone(), "a.onion", "Alice", "hi again");
        registry.insert_or_get(conn, "a.onion");

        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_lookup_contact_opens_channel_when_allowed() {
        let (gate, _) = gate(Arc::new(NoopHandler));
        let (recording, conn) = connection(1);

        assert_eq!(gate.lookup_contact(conn.clone(), "a.onion"), (true, true));
        assert_eq!(gate.lookup_contact(conn, "a.onion"), (true, true));

        assert_eq!(recording.open_requests(), 1);
    }

    #[test]
    fn test_lookup_contact_disallowed() {
        let (gate, _) = gate(Arc::new(FixedVerdict(false)));
        let (recording, conn) = connection(1);

        assert_eq!(gate.lookup_contact(conn, "a.onion"), (false, false));
        assert_eq!(recording.open_requests(), 0);
    }

    #[test]
    fn test_request_accepted_opens_channel() {
        let (gate, _) = gate(Arc::new(NoopHandler));
        let (recording, conn) = connection(1);

        gate.request_accepted(conn, "a.onion");
        assert_eq!(recording.open_requests(), 1);
    }
}
