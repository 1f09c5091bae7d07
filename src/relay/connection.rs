use std::fmt;

use tokio::sync::mpsc::UnboundedSender;
use tungstenite::protocol::Message as WsMessage;
use uuid::Uuid;

/// Identifier of one connection, unique for the lifetime of the process.
pub type ConnectionId = String;

/// Lifecycle of a connection.
///
/// `Connecting` lasts for the WebSocket handshake. Only `Open` connections are
/// held by the relay; `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// A connected client as seen by the relay.
///
/// `sender` feeds the connection's writer task, which forwards every queued
/// frame to the socket.
#[derive(Debug)]
pub struct Connection {
    pub id: ConnectionId,
    pub state: ConnectionState,
    pub sender: UnboundedSender<WsMessage>,
}

impl Connection {
    /// Create a connection in the `Connecting` state with a fresh id.
    pub fn new(sender: UnboundedSender<WsMessage>) -> Self {
        Self {
            id: format!("client-{}", Uuid::new_v4()),
            state: ConnectionState::Connecting,
            sender,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    /// Queue a frame for this connection. Returns false once the writer task is gone.
    pub fn deliver(&self, frame: WsMessage) -> bool {
        self.sender.send(frame).is_ok()
    }
}
