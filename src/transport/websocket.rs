use futures_util::{SinkExt, Stream, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::spawn;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tracing::{debug, info, warn};
use tungstenite::protocol::Message as WsMessage;
use tungstenite::protocol::frame::CloseFrame;
use tungstenite::protocol::frame::coding::CloseCode;

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::config::RelaySettings;
use crate::relay::engine::lock;
use crate::relay::{Connection, Message, Relay, SharedRelay};
use crate::utils::error::RelayError;

/// A bound relay server, ready to accept connections.
#[derive(Debug)]
pub struct RelayServer {
    listener: TcpListener,
    relay: SharedRelay,
    settings: RelaySettings,
}

impl RelayServer {
    /// Binds `addr` and creates an empty relay configured from `settings`.
    pub async fn bind(addr: &str, settings: RelaySettings) -> Result<Self, RelayError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| RelayError::Bind {
                addr: addr.to_string(),
                source,
            })?;

        Ok(Self {
            listener,
            relay: Relay::from_settings(&settings).into_shared(),
            settings,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Handle to the connection registry.
    pub fn relay(&self) -> SharedRelay {
        self.relay.clone()
    }

    /// Accepts connections until the task is dropped. Each connection runs
    /// on its own task so a slow client never stalls the others.
    pub async fn run(self) {
        match self.listener.local_addr() {
            Ok(local) => info!("WebSocket relay listening on ws://{local}"),
            Err(e) => warn!("WebSocket relay listening on unknown address: {e}"),
        }

        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    spawn(handle_connection(
                        stream,
                        peer,
                        self.relay.clone(),
                        self.settings.clone(),
                    ));
                }
                Err(e) => warn!("failed to accept connection: {e}"),
            }
        }
    }
}

/// Binds `addr` and serves the relay until the task is dropped.
pub async fn start_websocket_server(addr: &str, settings: RelaySettings) -> Result<(), RelayError> {
    RelayServer::bind(addr, settings).await?.run().await;
    Ok(())
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    relay: SharedRelay,
    settings: RelaySettings,
) {
    let handshake_timeout = Duration::from_secs(settings.handshake_timeout_secs);
    let ws_stream = match tokio::time::timeout(handshake_timeout, accept_async(stream)).await {
        Ok(Ok(ws)) => ws,
        Ok(Err(e)) => {
            warn!(%peer, "WebSocket handshake error: {e}");
            return;
        }
        Err(_) => {
            warn!(%peer, "WebSocket handshake timed out after {handshake_timeout:?}");
            return;
        }
    };
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();
    let connection = Connection::new(tx);
    let client_id = connection.id.clone();
    debug!(%peer, id = %client_id, state = %connection.state, "handshake complete");

    // Register before reading anything so no broadcast is missed
    let registered = lock(&relay).register_connection(connection);
    if let Err(e) = registered {
        warn!(%peer, "rejecting connection: {e}");
        let frame = CloseFrame {
            code: CloseCode::Again,
            reason: "server is full".into(),
        };
        let _ = ws_sender.send(WsMessage::Close(Some(frame))).await;
        return;
    }
    info!(%peer, id = %client_id, "client connected");

    if settings.announce_presence {
        lock(&relay).broadcast(&Message::joined(&client_id));
    }

    let cleanup_called = Arc::new(AtomicBool::new(false));

    let do_cleanup = {
        let relay = relay.clone();
        let client_id = client_id.clone();
        let cleanup_called = cleanup_called.clone();

        move || {
            if !cleanup_called.swap(true, Ordering::SeqCst) {
                let mut guard = lock(&relay);
                if guard.remove_connection(&client_id).is_some() && settings.announce_presence {
                    guard.broadcast(&Message::left(&client_id));
                }
                info!(id = %client_id, "client disconnected");
            }
        }
    };

    let mut writer = {
        let client_id = client_id.clone();
        let do_cleanup = do_cleanup.clone();

        spawn(async move {
            while let Some(frame) = rx.recv().await {
                if let Err(e) = ws_sender.send(frame).await {
                    warn!(id = %client_id, "failed to send message: {e}");
                    break;
                }
            }

            let _ = ws_sender.close().await;
            do_cleanup();
            debug!(id = %client_id, "send loop closed");
        })
    };

    // a failed write ends the writer, which closes the connection for reading too
    let writer_done = tokio::select! {
        _ = read_loop(&mut ws_receiver, &client_id, &relay, &cleanup_called) => false,
        _ = &mut writer => true,
    };

    do_cleanup();
    if !writer_done {
        let _ = writer.await;
    }
}

/// Relays every text frame from `frames` until the peer closes, the stream
/// fails, or `closed` is set by the connection's cleanup.
pub(crate) async fn read_loop<S>(
    frames: &mut S,
    client_id: &str,
    relay: &SharedRelay,
    closed: &AtomicBool,
) where
    S: Stream<Item = Result<WsMessage, tungstenite::Error>> + Unpin,
{
    while let Some(frame) = frames.next().await {
        if closed.load(Ordering::SeqCst) {
            debug!(id = %client_id, "connection closed, dropping incoming frames");
            break;
        }
        match frame {
            Ok(WsMessage::Text(text)) => {
                let message = Message::new(client_id, text.as_str());
                lock(relay).broadcast(&message);
            }
            Ok(WsMessage::Close(_)) => break,
            Ok(WsMessage::Binary(data)) => {
                warn!(id = %client_id, len = data.len(), "ignoring binary frame");
            }
            Ok(_) => {}
            Err(e) => {
                debug!(id = %client_id, "receive ended: {e}");
                break;
            }
        }
    }
}
