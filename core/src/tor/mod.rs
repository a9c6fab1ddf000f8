// Tor daemon management: launch, control port, password hashing

pub mod bootstrap;
pub mod control;
pub mod password;

pub use bootstrap::{bootstrap, prepare, ManagedDaemon, TransportBootstrapState};
pub use control::ControlClient;
pub use password::{hashed_password, random_password};
