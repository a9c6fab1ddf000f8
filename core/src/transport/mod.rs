// Seams to the external transport library

pub mod abstraction;

#[cfg(test)]
pub(crate) mod testing;

pub use abstraction::{
    ChannelControl, Connection, ConnectionId, ContactDecision, Direction, Transport,
    TransportError, TransportEvents, CHAT_CHANNEL, CONNECTION_HELLO,
};

#[cfg(test)]
pub use abstraction::MockTransport;
