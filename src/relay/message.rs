use chrono::Utc;

use crate::relay::connection::ConnectionId;

/// A chat message received from one connection and relayed to the others.
///
/// Only `payload` goes over the wire; the sender is used to exclude the
/// originating connection and `received_at` (Unix millis) is kept for logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub sender: ConnectionId,
    pub payload: String,
    pub received_at: i64,
}

impl Message {
    pub fn new(sender: impl Into<ConnectionId>, payload: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            payload: payload.into(),
            received_at: Utc::now().timestamp_millis(),
        }
    }

    /// Notice that `id` joined, sent on its behalf to everyone else.
    pub fn joined(id: &ConnectionId) -> Self {
        Self::new(id.clone(), format!("{id} has joined the chat"))
    }

    /// Notice that `id` left.
    pub fn left(id: &ConnectionId) -> Self {
        Self::new(id.clone(), format!("{id} left the chat"))
    }
}
