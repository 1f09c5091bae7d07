use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};
use tungstenite::protocol::Message as WsMessage;

use crate::config::RelaySettings;
use crate::relay::connection::{Connection, ConnectionId, ConnectionState};
use crate::relay::message::Message;
use crate::utils::error::RelayError;

/// The relay shared between every connection task.
pub type SharedRelay = Arc<Mutex<Relay>>;

/// Registry of open connections and the broadcast fan-out over them.
///
/// All mutation goes through `&mut self`, so callers hold the shared lock for
/// the whole of a register, remove or broadcast. A broadcast therefore always
/// sees a consistent set of connections.
#[derive(Debug)]
pub struct Relay {
    connections: HashMap<ConnectionId, Connection>,
    max_connections: usize,
}

impl Default for Relay {
    fn default() -> Self {
        Self::from_settings(&crate::config::Settings::default().relay)
    }
}

impl Relay {
    /// Creates an empty relay accepting at most `max_connections` open connections.
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: HashMap::new(),
            max_connections,
        }
    }

    pub fn from_settings(settings: &RelaySettings) -> Self {
        Self::new(settings.max_connections)
    }

    /// Wraps the relay for sharing between connection tasks.
    pub fn into_shared(self) -> SharedRelay {
        Arc::new(Mutex::new(self))
    }

    /// Registers a connection whose handshake has completed and marks it open.
    /// From here on it receives every broadcast not sent by itself.
    pub fn register_connection(&mut self, mut connection: Connection) -> Result<(), RelayError> {
        if self.connections.len() >= self.max_connections {
            return Err(RelayError::CapacityReached {
                max: self.max_connections,
            });
        }

        connection.state = ConnectionState::Open;
        info!(id = %connection.id, open = self.connections.len() + 1, "connection registered");
        self.connections.insert(connection.id.clone(), connection);
        Ok(())
    }

    /// Removes a connection and marks it closed.
    ///
    /// Dropping the returned connection drops its outbound sender, which ends
    /// its writer task. Removing an unknown id is a no-op.
    pub fn remove_connection(&mut self, id: &ConnectionId) -> Option<Connection> {
        let mut connection = self.connections.remove(id)?;
        connection.state = ConnectionState::Closed;
        info!(id = %id, open = self.connections.len(), "connection removed");
        Some(connection)
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.contains_key(id)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.connections.keys().cloned().collect()
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Sends `message` to every open connection except its sender.
    ///
    /// A connection whose outbound channel is closed is evicted; delivery to
    /// the others continues. Returns how many connections the message was
    /// queued for.
    pub fn broadcast(&mut self, message: &Message) -> usize {
        let frame = WsMessage::text(message.payload.clone());
        let mut delivered = 0;
        let mut unreachable = Vec::new();

        for (id, connection) in &self.connections {
            if *id == message.sender || !connection.is_open() {
                continue;
            }
            if connection.deliver(frame.clone()) {
                delivered += 1;
            } else {
                warn!(id = %id, "connection unreachable, evicting");
                unreachable.push(id.clone());
            }
        }

        for id in &unreachable {
            self.remove_connection(id);
        }

        debug!(
            sender = %message.sender,
            delivered,
            evicted = unreachable.len(),
            "broadcast"
        );
        delivered
    }
}

/// Locks the shared relay, recovering the guard if a previous holder panicked.
pub fn lock(relay: &SharedRelay) -> MutexGuard<'_, Relay> {
    relay.lock().unwrap_or_else(PoisonError::into_inner)
}
