//! Error types for the relay server and the chat client.
//!
//! Failures to deliver a single broadcast are not represented here: the relay
//! recovers from them locally by evicting the unreachable connection.

use std::time::Duration;

use thiserror::Error;

/// Errors raised by the relay server.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("connection limit of {max} reached")]
    CapacityReached { max: usize },
}

/// Errors raised by [`crate::client::ChatClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// The TCP connect or the WebSocket handshake failed.
    #[error("failed to connect: {0}")]
    Connection(#[from] tungstenite::Error),

    #[error("connecting to {url} timed out after {after:?}")]
    Timeout { url: String, after: Duration },

    #[error("connection is closed")]
    Closed,

    #[error("incoming messages are already being listened to")]
    AlreadyListening,
}

impl ClientError {
    /// True for the failures that mean the handshake never completed.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Timeout { .. })
    }
}
