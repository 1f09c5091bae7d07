//! # RelayChat
//!
//! `relaychat` is a minimal real-time chat relay built with Rust.
//! Clients connect over WebSockets and every text message a client sends is
//! rebroadcast to all other connected clients.
//!
//! ## Core Modules
//!
//! - `relay`: The connection registry and the broadcast fan-out.
//! - `client`: A chat client that sends text and listens for relayed messages.
//! - `config`: Handles loading and managing configuration.
//! - `transport`: Runs the WebSocket server and drives each connection.
//! - `utils`: Shared utilities, such as error types and logging setup.

pub mod client;
pub mod config;
pub mod relay;
pub mod transport;
pub mod utils;
