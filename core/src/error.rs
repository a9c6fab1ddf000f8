// Error types for the bot core
//
// Registry operations never fail; everything that can fail lives at the
// daemon bootstrap and outbound connect boundaries.

use crate::transport::TransportError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BotError {
    #[error("Tor bootstrap failed: {0}")]
    Bootstrap(String),
    #[error("Control port error: {0}")]
    Control(String),
    #[error("Could not connect to {identity}: {source}")]
    ConnectFailed {
        identity: String,
        #[source]
        source: TransportError,
    },
    #[error("Unknown peer: {0}")]
    UnknownPeer(String),
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BotError>;
