use serde::Deserialize;

/// Top-level configuration settings for the application.
///
/// Includes settings for the relay server and for the chat client.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub relay: RelaySettings,
    pub client: ClientSettings,
}

/// Configuration settings for the server.
///
/// Defines the host and port the server binds to and the client connects to.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

/// Configuration settings for the relay.
#[derive(Debug, Deserialize, Clone)]
pub struct RelaySettings {
    pub max_connections: usize,
    /// Broadcast join/leave notices to the other connections.
    pub announce_presence: bool,
    /// Connections that have not finished the WebSocket upgrade by then are dropped.
    pub handshake_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClientSettings {
    pub connect_timeout_secs: u64,
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values are filled from defaults.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub relay: Option<PartialRelaySettings>,
    pub client: Option<PartialClientSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize)]
pub struct PartialRelaySettings {
    pub max_connections: Option<usize>,
    pub announce_presence: Option<bool>,
    pub handshake_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PartialClientSettings {
    pub connect_timeout_secs: Option<u64>,
}

impl Settings {
    /// Address the server listens on, as `host:port`.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// WebSocket URL a client uses to reach the configured server.
    pub fn server_url(&self) -> String {
        format!("ws://{}:{}", self.server.host, self.server.port)
    }

    /// Fills every field missing from `partial` with the value already in `self`.
    pub fn merged_with(self, partial: PartialSettings) -> Settings {
        let server = partial.server;
        let relay = partial.relay;
        let client = partial.client;

        Settings {
            server: ServerSettings {
                host: server
                    .as_ref()
                    .and_then(|s| s.host.clone())
                    .unwrap_or(self.server.host),
                port: server
                    .as_ref()
                    .and_then(|s| s.port)
                    .unwrap_or(self.server.port),
            },
            relay: RelaySettings {
                max_connections: relay
                    .as_ref()
                    .and_then(|r| r.max_connections)
                    .unwrap_or(self.relay.max_connections),
                announce_presence: relay
                    .as_ref()
                    .and_then(|r| r.announce_presence)
                    .unwrap_or(self.relay.announce_presence),
                handshake_timeout_secs: relay
                    .as_ref()
                    .and_then(|r| r.handshake_timeout_secs)
                    .unwrap_or(self.relay.handshake_timeout_secs),
            },
            client: ClientSettings {
                connect_timeout_secs: client
                    .as_ref()
                    .and_then(|c| c.connect_timeout_secs)
                    .unwrap_or(self.client.connect_timeout_secs),
            },
        }
    }
}

/// Provides default values for `Settings`.
///
/// Ensures the application has sensible defaults if no configuration is provided.
impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 8000,
            },
            relay: RelaySettings {
                max_connections: 1000,
                announce_presence: false,
                handshake_timeout_secs: 10,
            },
            client: ClientSettings {
                connect_timeout_secs: 5,
            },
        }
    }
}
