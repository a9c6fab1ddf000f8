// Application callbacks
//
// Every hook has a default, so an application implements only what it cares
// about. Decision hooks return `Option<bool>`: `None` means "no policy
// configured" and falls back to accepting, which is different from an
// explicit `Some(false)`.

use crate::peer::Peer;
use std::sync::Arc;
use std::time::SystemTime;

/// A chat message delivered by a peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub message_id: u32,
    pub sent_at: SystemTime,
    pub text: String,
}

/// Application hooks for peer lifecycle and contact events
pub trait BotHandler: Send + Sync + 'static {
    /// A connection to `peer` authenticated, or an outbound connect succeeded
    fn on_connect(&self, _peer: &Arc<Peer>) {}

    /// Whether an incoming identity should be treated as a known contact
    fn on_new_peer(&self, _peer: &Arc<Peer>) -> Option<bool> {
        None
    }

    /// Our outbound chat channel to `peer` is open
    fn on_ready_to_chat(&self, _peer: &Arc<Peer>) {}

    fn on_message(&self, _peer: &Arc<Peer>, _message: &ChatMessage) {}

    /// Whether to accept a contact request from `peer`
    fn on_contact_request(&self, _peer: &Arc<Peer>, _name: &str, _message: &str) -> Option<bool> {
        None
    }

    /// The last session for `peer`'s identity closed
    fn on_disconnect(&self, _peer: &Arc<Peer>) {}
}

/// Handler with every hook left at its default
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHandler;

impl BotHandler for NoopHandler {}
