//! The `transport` module runs the WebSocket side of the relay.
//!
//! It accepts TCP connections, completes the WebSocket handshake, registers
//! each connection with the [`crate::relay::Relay`] and drives one reader
//! loop and one writer task per connection. Text frames are relayed as
//! opaque payloads.

pub mod websocket;

pub use websocket::{RelayServer, start_websocket_server};
