// Peer - one relationship with a remote identity over one connection

pub mod registry;

pub use registry::{CloseOutcome, PeerRegistry};

use crate::transport::{
    ChannelControl, Connection, ConnectionId, Direction, TransportError, CHAT_CHANNEL,
};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Where a session stands, from the orchestrator's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SessionState {
    /// Connection exists but has not proven an identity yet
    Unauthenticated,
    /// Identity known, no outbound chat channel confirmed
    Authenticated,
    /// Bidirectional chat is possible
    ChatReady,
    /// No live session for the identity
    Disconnected,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Unauthenticated => write!(f, "unauthenticated"),
            SessionState::Authenticated => write!(f, "authenticated"),
            SessionState::ChatReady => write!(f, "chat-ready"),
            SessionState::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// A remote party reachable over a single live connection.
///
/// Peers are shared as `Arc<Peer>`; two handles refer to the same peer only
/// when they point at the same allocation.
pub struct Peer {
    /// Onion address of the remote side, empty until authenticated
    identity: String,
    connection: Arc<dyn Connection>,
    chat_ready: AtomicBool,
}

impl Peer {
    pub(crate) fn new(connection: Arc<dyn Connection>, identity: &str) -> Self {
        Self {
            identity: identity.to_string(),
            connection,
            chat_ready: AtomicBool::new(false),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection.id()
    }

    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.connection
    }

    pub fn state(&self) -> SessionState {
        if self.identity.is_empty() {
            SessionState::Unauthenticated
        } else if self.chat_ready.load(Ordering::Acquire) {
            SessionState::ChatReady
        } else {
            SessionState::Authenticated
        }
    }

    pub fn is_chat_ready(&self) -> bool {
        self.state() == SessionState::ChatReady
    }

    pub(crate) fn mark_chat_ready(&self) {
        self.chat_ready.store(true, Ordering::Release);
    }

    /// Make sure we have an outbound chat channel on this connection.
    ///
    /// The existence check and the open request run in one execution unit,
    /// so concurrent callers issue at most one request. Returns whether a
    /// request was issued.
    pub fn ensure_inbound_channel(&self) -> Result<bool, TransportError> {
        let mut requested = false;
        self.connection.execute(&mut |channels: &mut dyn ChannelControl| {
            if channels.has_channel(CHAT_CHANNEL, Direction::Outbound) {
                return Ok(());
            }
            channels.request_open_channel(CHAT_CHANNEL)?;
            requested = true;
            Ok(())
        })?;

        if requested {
            debug!("Requested outbound chat channel to {}", self.identity);
        }
        Ok(requested)
    }

    /// Send a chat message over the outbound chat channel
    pub fn send_message(&self, text: &str) -> Result<(), TransportError> {
        debug!("Sending message to {} ({} bytes)", self.identity, text.len());
        self.connection.execute(&mut |channels: &mut dyn ChannelControl| {
            if !channels.has_channel(CHAT_CHANNEL, Direction::Outbound) {
                warn!("Could not find chat channel to {}", self.identity);
                return Err(TransportError::ChannelUnavailable(CHAT_CHANNEL.to_string()));
            }
            channels.send_chat_message(text)
        })
    }

    /// Ask the transport to drop the connection. Does not wait.
    pub fn disconnect(&self) {
        debug!("Disconnecting {} (connection {})", self.identity, self.connection_id());
        self.connection.close();
    }
}

impl fmt::Debug for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Peer")
            .field("identity", &self.identity)
            .field("connection", &self.connection_id())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::connection;

    #[test]
    fn test_new_peer_is_authenticated() {
        let (_, conn) = connection(1);
        let peer = Peer::new(conn, "alice.onion");
        assert_eq!(peer.state(), SessionState::Authenticated);
        assert_eq!(peer.connection_id(), 1);
    }

    #[test]
    fn test_peer_without_identity_is_unauthenticated() {
        let (_, conn) = connection(1);
        let peer = Peer::new(conn, "");
        assert_eq!(peer.state(), SessionState::Unauthenticated);
    }

    #[test]
    fn test_ensure_inbound_channel_is_idempotent() {
        let (recording, conn) = connection(7);
        let peer = Peer::new(conn, "bob.onion");

        assert!(peer.ensure_inbound_channel().unwrap());
        assert!(!peer.ensure_inbound_channel().unwrap());
        assert!(!peer.ensure_inbound_channel().unwrap());

        assert_eq!(recording.open_requests(), 1);
    }

    #[test]
    fn test_send_without_channel_fails() {
        let (recording, conn) = connection(2);
        let peer = Peer::new(conn, "carol.onion");

        let result = peer.send_message("hello");
        assert!(matches!(result, Err(TransportError::ChannelUnavailable(_))));
        assert!(recording.sent().is_empty());
    }

    #[test]
    fn test_send_after_channel_open() {
        let (recording, conn) = connection(3);
        let peer = Peer::new(conn, "dave.onion");

        peer.ensure_inbound_channel().unwrap();
        peer.send_message("hi dave").unwrap();

        assert_eq!(recording.sent(), vec!["hi dave".to_string()]);
    }

    #[test]
    fn test_disconnect_requests_close() {
        let (recording, conn) = connection(4);
        let peer = Peer::new(conn, "erin.onion");
        peer.disconnect();
        assert_eq!(recording.close_requests(), 1);
    }

    #[test]
    fn test_mark_chat_ready() {
        let (_, conn) = connection(5);
        let peer = Peer::new(conn, "frank.onion");
        peer.mark_chat_ready();
        assert!(peer.is_chat_ready());
    }
}
