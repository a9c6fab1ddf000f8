//! Transport library abstraction for the bot core
//!
//! The channel protocol, identity handshake and connection loop all live in
//! an external transport library. This module defines the seams between
//! that library and the core: handles the core calls into, and the event
//! sink the library calls back.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;
use thiserror::Error;

/// Channel type carrying chat messages
pub const CHAT_CHANNEL: &str = "im.ricochet.chat";

/// Greeting sent when the core dials a remote identity
pub const CONNECTION_HELLO: &str = "CONNECTION";

/// Transport-assigned identifier, unique per live connection
pub type ConnectionId = u64;

/// Direction of a channel relative to this side of the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Opened by the remote party
    Inbound,
    /// Opened by us
    Outbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Inbound => write!(f, "inbound"),
            Direction::Outbound => write!(f, "outbound"),
        }
    }
}

/// Transport error types
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("No {0} channel available")]
    ChannelUnavailable(String),
    #[error("Connection closed")]
    Closed,
    #[error("Transport error: {0}")]
    Other(String),
}

/// Outcome of a contact request, as reported back to the transport library
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContactDecision {
    Accepted,
    /// Awaiting a decision made outside the request call. No current
    /// decision path produces it.
    Pending,
    Rejected,
}

impl ContactDecision {
    /// Wire string expected by the transport library
    pub fn as_str(&self) -> &'static str {
        match self {
            ContactDecision::Accepted => "Accepted",
            ContactDecision::Pending => "Pending",
            ContactDecision::Rejected => "Rejected",
        }
    }
}

impl fmt::Display for ContactDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Channel operations available inside a connection's execution unit.
///
/// Calls made through one `ChannelControl` borrow are serialized with the
/// connection's own protocol processing, so a check followed by a request
/// cannot interleave with another task doing the same.
pub trait ChannelControl {
    /// Whether a channel of `kind` is open (or opening) in `direction`
    fn has_channel(&self, kind: &str, direction: Direction) -> bool;

    /// Ask the remote side to open a channel of `kind` initiated by us
    fn request_open_channel(&mut self, kind: &str) -> Result<(), TransportError>;

    /// Send text over the outbound chat channel
    fn send_chat_message(&mut self, text: &str) -> Result<(), TransportError>;
}

/// One live transport connection to a remote identity
pub trait Connection: Send + Sync {
    /// Stable identifier for this connection
    fn id(&self) -> ConnectionId;

    /// Run `task` inside the connection's serialized execution unit
    fn execute(
        &self,
        task: &mut dyn FnMut(&mut dyn ChannelControl) -> Result<(), TransportError>,
    ) -> Result<(), TransportError>;

    /// Request closure of the underlying connection. Does not wait.
    fn close(&self);
}

/// Outbound side of the transport library
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Dial `identity` and complete the authentication handshake
    async fn open_connection(
        &self,
        identity: &str,
        hello: &str,
    ) -> Result<Arc<dyn Connection>, TransportError>;
}

/// Event sink the transport library drives.
///
/// Methods may be called concurrently from any of the library's worker
/// threads, including for the same identity.
pub trait TransportEvents: Send + Sync {
    /// A connection finished authenticating as `identity`
    fn connection_authenticated(&self, connection: Arc<dyn Connection>, identity: &str, known: bool);

    /// A connection went away
    fn connection_closed(
        &self,
        connection: &Arc<dyn Connection>,
        identity: &str,
        error: Option<TransportError>,
    );

    /// Our outbound chat channel on `connection` was accepted by the remote side
    fn chat_channel_opened_outbound(&self, connection: Arc<dyn Connection>, identity: &str);

    /// A chat message arrived. The return value acknowledges it.
    fn chat_message_received(
        &self,
        connection: Arc<dyn Connection>,
        identity: &str,
        message_id: u32,
        sent_at: SystemTime,
        text: &str,
    ) -> bool;

    /// An unknown identity asked to become a contact
    fn contact_request_received(
        &self,
        connection: Arc<dyn Connection>,
        identity: &str,
        display_name: &str,
        message: &str,
    ) -> ContactDecision;

    /// The remote side accepted a contact request we sent
    fn contact_request_accepted(&self, connection: Arc<dyn Connection>, identity: &str);

    /// The remote side rejected a contact request we sent
    fn contact_request_rejected(&self, identity: &str);

    /// Whether `identity` is allowed to talk to us, as `(allowed, known)`
    fn lookup_contact(&self, connection: Arc<dyn Connection>, identity: &str) -> (bool, bool);
}
