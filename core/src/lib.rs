// OnionBot core: a chat bot runtime over Tor onion services
//
// The bot launches (or attaches to) a Tor daemon, accepts authenticated
// peer connections from an external transport library, and keeps one
// canonical chat session per remote identity.

pub mod bot;
pub mod config;
pub mod error;
pub mod peer;
pub mod session;
pub mod tor;
pub mod transport;

pub use bot::OnionBot;
pub use config::{ControlConfig, ControlKind, TorConfig};
pub use error::{BotError, Result};
pub use peer::{Peer, PeerRegistry, SessionState};
pub use session::{BotHandler, CallbackDispatcher, ChatMessage, NoopHandler, SessionOrchestrator};
pub use tor::{ManagedDaemon, TransportBootstrapState};
pub use transport::{
    ChannelControl, Connection, ConnectionId, ContactDecision, Direction, Transport,
    TransportError, TransportEvents,
};
