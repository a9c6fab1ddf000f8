//! Session Orchestrator - drives peer lifecycle from transport events
//!
//! Per identity a session moves `Authenticated -> ChatReady -> Disconnected`.
//! Both sides may dial each other at once, so two connections for the same
//! identity can exist for a while. They are collapsed when one of them
//! reports its outbound chat channel open: that connection becomes the
//! canonical session and every other one is closed.

use super::contact::ContactDecisionGate;
use super::dispatch::CallbackDispatcher;
use super::handler::{BotHandler, ChatMessage};
use crate::error::{BotError, Result};
use crate::peer::{Peer, PeerRegistry, SessionState};
use crate::transport::{
    ChannelControl, Connection, ContactDecision, Transport, TransportError, TransportEvents,
    CHAT_CHANNEL, CONNECTION_HELLO,
};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info, warn};

pub struct SessionOrchestrator {
    registry: Arc<PeerRegistry>,
    handler: Arc<dyn BotHandler>,
    dispatcher: CallbackDispatcher,
    contacts: ContactDecisionGate,
}

impl SessionOrchestrator {
    pub fn new(handler: Arc<dyn BotHandler>, dispatcher: CallbackDispatcher) -> Self {
        let registry = Arc::new(PeerRegistry::new());
        let contacts = ContactDecisionGate::new(
            Arc::clone(&registry),
            Arc::clone(&handler),
            dispatcher.clone(),
        );
        Self {
            registry,
            handler,
            dispatcher,
            contacts,
        }
    }

    pub fn registry(&self) -> &Arc<PeerRegistry> {
        &self.registry
    }

    /// Aggregate session state for `identity` across all its connections
    pub fn state_of(&self, identity: &str) -> SessionState {
        self.registry
            .lookup_all(identity)
            .iter()
            .map(|p| p.state())
            .max()
            .unwrap_or(SessionState::Disconnected)
    }

    /// Dial `identity` and register the resulting peer.
    ///
    /// The chat channel request is issued inside the connection's execution
    /// unit together with registration. A failed dial leaves the registry
    /// untouched.
    pub async fn connect(&self, transport: &dyn Transport, identity: &str) -> Result<Arc<Peer>> {
        let connection = transport
            .open_connection(identity, CONNECTION_HELLO)
            .await
            .map_err(|source| {
                warn!("Can't connect to {}: {}", identity, source);
                BotError::ConnectFailed {
                    identity: identity.to_string(),
                    source,
                }
            })?;

        let mut registered = None;
        connection.execute(&mut |channels: &mut dyn ChannelControl| {
            let opened = channels.request_open_channel(CHAT_CHANNEL);
            registered = Some(self.registry.insert_or_get(Arc::clone(&connection), identity));
            opened
        })?;

        let peer = registered
            .ok_or_else(|| BotError::Transport(TransportError::Closed))?;
        info!("Connected to {}", identity);
        self.fire_connect(&peer);
        Ok(peer)
    }

    /// Send `text` to the first live session for `identity`
    pub fn send_message(&self, identity: &str, text: &str) -> Result<()> {
        let peer = self
            .registry
            .lookup_first(identity)
            .ok_or_else(|| BotError::UnknownPeer(identity.to_string()))?;
        peer.send_message(text)?;
        Ok(())
    }

    /// Close every session for `identity`. Does not wait for the transport.
    pub fn disconnect(&self, identity: &str) -> usize {
        let removed = self.registry.remove_identity(identity);
        for peer in &removed {
            peer.disconnect();
        }
        removed.len()
    }

    fn fire_connect(&self, peer: &Arc<Peer>) {
        let handler = Arc::clone(&self.handler);
        let peer = Arc::clone(peer);
        self.dispatcher
            .dispatch("on_connect", move || handler.on_connect(&peer));
    }
}

impl TransportEvents for SessionOrchestrator {
    fn connection_authenticated(&self, connection: Arc<dyn Connection>, identity: &str, known: bool) {
        let peer = self.registry.insert_or_get(connection, identity);
        debug!("{} authenticated (known contact: {})", identity, known);

        self.fire_connect(&peer);

        if known {
            self.dispatcher.dispatch("open_inbound", move || {
                if let Err(e) = peer.ensure_inbound_channel() {
                    warn!("Could not open chat channel to {}: {}", peer.identity(), e);
                }
            });
        }
    }

    fn connection_closed(
        &self,
        connection: &Arc<dyn Connection>,
        identity: &str,
        error: Option<TransportError>,
    ) {
        let outcome = self.registry.close_connection(identity, connection.id());
        match &error {
            Some(e) => info!("Disconnection from {}: {}", identity, e),
            None => info!("Disconnection from {}", identity),
        }

        let Some(peer) = outcome.removed.as_ref() else {
            debug!("Closed connection {} for {} was not registered", connection.id(), identity);
            return;
        };

        if outcome.was_last() {
            let handler = Arc::clone(&self.handler);
            let peer = Arc::clone(peer);
            self.dispatcher
                .dispatch("on_disconnect", move || handler.on_disconnect(&peer));
        } else {
            debug!(
                "{} still has {} session(s), not reporting disconnect",
                identity, outcome.remaining
            );
        }
    }

    fn chat_channel_opened_outbound(&self, connection: Arc<dyn Connection>, identity: &str) {
        let Some((peer, evicted)) = self.registry.promote(identity, connection.id()) else {
            debug!(
                "Ignoring chat channel on retired connection {} for {}",
                connection.id(),
                identity
            );
            return;
        };
        if !evicted.is_empty() {
            info!("Collapsed {} duplicate session(s) for {}", evicted.len(), identity);
        }

        peer.mark_chat_ready();
        let handler = Arc::clone(&self.handler);
        self.dispatcher
            .dispatch("on_ready_to_chat", move || handler.on_ready_to_chat(&peer));
    }

    fn chat_message_received(
        &self,
        connection: Arc<dyn Connection>,
        identity: &str,
        message_id: u32,
        sent_at: SystemTime,
        text: &str,
    ) -> bool {
        debug!("ChatMessage from {} (id {})", identity, message_id);
        let peer = match self.registry.lookup_connection(identity, connection.id()) {
            Some(peer) => peer,
            None => {
                // Delivered, but the retired connection stays out of the registry.
                debug!("Message from {} on unregistered connection {}", identity, connection.id());
                Arc::new(Peer::new(connection, identity))
            }
        };

        let handler = Arc::clone(&self.handler);
        let message = ChatMessage {
            message_id,
            sent_at,
            text: text.to_string(),
        };
        self.dispatcher
            .dispatch("on_message", move || handler.on_message(&peer, &message));
        true
    }

    fn contact_request_received(
        &self,
        connection: Arc<dyn Connection>,
        identity: &str,
        display_name: &str,
        message: &str,
    ) -> ContactDecision {
        self.contacts.decide(connection, identity, display_name, message)
    }

    fn contact_request_accepted(&self, connection: Arc<dyn Connection>, identity: &str) {
        self.contacts.request_accepted(connection, identity);
    }

    fn contact_request_rejected(&self, identity: &str) {
        info!("Contact request to {} was rejected", identity);
    }

    fn lookup_contact(&self, connection: Arc<dyn Connection>, identity: &str) -> (bool, bool) {
        self.contacts.lookup_contact(connection, identity)
    }
}
