//! The `relay` module holds the registry of open connections and fans each
//! received message out to every connection except its sender.

pub mod connection;
pub mod engine;
pub mod message;

pub use connection::{Connection, ConnectionId, ConnectionState};
pub use engine::{Relay, SharedRelay};
pub use message::Message;
