use std::pin::Pin;
use std::task::{Context, Poll, ready};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, Stream, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};
use tungstenite::protocol::Message as WsMessage;

use crate::client::producer::{Producer, run_producer};
use crate::utils::error::ClientError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One connection to a relay server.
///
/// `send` and producers only enqueue text; a writer task owns the socket's
/// sending half. The receiving half is handed out once through [`ChatClient::listen`].
///
/// Once the [`Incoming`] stream sees the server close the connection, `send`
/// and `spawn_producer` fail with [`ClientError::Closed`].
#[derive(Debug)]
pub struct ChatClient {
    url: String,
    outgoing: mpsc::UnboundedSender<String>,
    incoming: Option<Incoming>,
    remote_closed: watch::Receiver<bool>,
    shutdown: Option<oneshot::Sender<()>>,
    writer: JoinHandle<()>,
}

impl ChatClient {
    /// Connects to the relay at `url` (e.g. `ws://127.0.0.1:8000`).
    ///
    /// Fails with [`ClientError::Connection`] if the handshake fails and with
    /// [`ClientError::Timeout`] if it does not finish within `timeout`.
    /// No retry is attempted.
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let (ws_stream, _response) = match tokio::time::timeout(timeout, connect_async(url)).await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(ClientError::Timeout {
                    url: url.to_string(),
                    after: timeout,
                });
            }
        };
        info!(url, "connected to relay");

        let (sink, stream) = ws_stream.split();
        let (tx, rx) = mpsc::unbounded_channel::<String>();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (closed_tx, closed_rx) = watch::channel(false);
        let writer = tokio::spawn(write_loop(sink, rx, shutdown_rx, closed_rx.clone()));

        Ok(Self {
            url: url.to_string(),
            outgoing: tx,
            incoming: Some(Incoming::new(stream, closed_tx)),
            remote_closed: closed_rx,
            shutdown: Some(shutdown_tx),
            writer,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Queues `text` for the server. Never waits on the socket.
    pub fn send(&self, text: impl Into<String>) -> Result<(), ClientError> {
        if self.is_closed() {
            return Err(ClientError::Closed);
        }
        self.outgoing
            .send(text.into())
            .map_err(|_| ClientError::Closed)
    }

    /// Runs `producer` on the blocking thread pool, sending everything it
    /// yields. The returned handle resolves to the number of messages queued
    /// once the producer returns `None` or the connection closes.
    pub fn spawn_producer<P>(&self, producer: P) -> Result<JoinHandle<usize>, ClientError>
    where
        P: Producer + Send + 'static,
    {
        if self.is_closed() || self.outgoing.is_closed() {
            return Err(ClientError::Closed);
        }
        let outgoing = self.outgoing.clone();
        Ok(tokio::task::spawn_blocking(move || {
            run_producer(producer, outgoing)
        }))
    }

    /// Takes the stream of incoming messages. Can only be called once.
    pub fn listen(&mut self) -> Result<Incoming, ClientError> {
        self.incoming.take().ok_or(ClientError::AlreadyListening)
    }

    /// True after `close`, or after the server closed a connection that is
    /// being listened to.
    pub fn is_closed(&self) -> bool {
        self.shutdown.is_none() || *self.remote_closed.borrow()
    }

    /// Flushes queued messages and closes the connection.
    ///
    /// Later sends fail with [`ClientError::Closed`]; producers still running
    /// stop at their next message. Closing twice is a no-op.
    pub async fn close(&mut self) {
        let Some(shutdown) = self.shutdown.take() else {
            return;
        };
        let _ = shutdown.send(());
        if let Err(e) = (&mut self.writer).await {
            warn!("writer task failed: {e}");
        }
        info!(url = %self.url, "disconnected from relay");
    }
}

async fn write_loop(
    mut sink: SplitSink<WsStream, WsMessage>,
    mut outgoing: mpsc::UnboundedReceiver<String>,
    mut shutdown: oneshot::Receiver<()>,
    mut remote_closed: watch::Receiver<bool>,
) {
    // false once the `Incoming` side is dropped without seeing a close
    let mut watching = true;

    loop {
        let text = tokio::select! {
            text = outgoing.recv() => match text {
                Some(text) => text,
                None => break,
            },
            // also fires when the client is dropped without close()
            _ = &mut shutdown => {
                outgoing.close();
                while let Some(text) = outgoing.recv().await {
                    if let Err(e) = sink.send(WsMessage::text(text)).await {
                        warn!("failed to send message: {e}");
                        return;
                    }
                }
                break;
            }
            changed = remote_closed.changed(), if watching => {
                if changed.is_err() {
                    watching = false;
                } else if *remote_closed.borrow() {
                    outgoing.close();
                    debug!("connection closed by server, writer stopping");
                    return;
                }
                continue;
            }
        };

        if let Err(e) = sink.send(WsMessage::text(text)).await {
            warn!("failed to send message: {e}");
            return;
        }
    }

    if let Err(e) = sink.close().await {
        debug!("close handshake failed: {e}");
    }
}

/// Messages relayed to this client, in arrival order.
///
/// Ends when the server closes the connection or the connection fails, and
/// never yields again afterwards.
#[derive(Debug)]
pub struct Incoming {
    inner: SplitStream<WsStream>,
    closed: watch::Sender<bool>,
    done: bool,
}

impl Incoming {
    fn new(inner: SplitStream<WsStream>, closed: watch::Sender<bool>) -> Self {
        Self {
            inner,
            closed,
            done: false,
        }
    }

    fn finish(&mut self) {
        self.done = true;
        self.closed.send_replace(true);
    }
}

impl Stream for Incoming {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<String>> {
        if self.done {
            return Poll::Ready(None);
        }

        loop {
            match ready!(self.inner.poll_next_unpin(cx)) {
                Some(Ok(WsMessage::Text(text))) => {
                    return Poll::Ready(Some(text.as_str().to_owned()));
                }
                Some(Ok(WsMessage::Close(_))) | None => {
                    self.finish();
                    return Poll::Ready(None);
                }
                Some(Ok(WsMessage::Binary(_))) => debug!("ignoring binary frame"),
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("connection ended: {e}");
                    self.finish();
                    return Poll::Ready(None);
                }
            }
        }
    }
}
