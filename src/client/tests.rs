use std::io::Cursor;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use super::producer::{LineProducer, Producer, run_producer};
use super::{ChatClient, Incoming};
use crate::config::Settings;
use crate::relay::SharedRelay;
use crate::relay::engine::lock;
use crate::transport::RelayServer;
use crate::utils::error::ClientError;

const TIMEOUT: Duration = Duration::from_secs(5);

async fn start_server() -> (String, SharedRelay) {
    let server = RelayServer::bind("127.0.0.1:0", Settings::default().relay)
        .await
        .expect("Failed to bind");
    let url = format!("ws://{}", server.local_addr().unwrap());
    let relay = server.relay();
    tokio::spawn(server.run());
    (url, relay)
}

async fn wait_for_connections(relay: &SharedRelay, expected: usize) {
    tokio::time::timeout(TIMEOUT, async {
        while lock(relay).connection_count() != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("relay never reached {expected} connections"));
}

async fn next(incoming: &mut Incoming) -> Option<String> {
    tokio::time::timeout(TIMEOUT, incoming.next())
        .await
        .expect("timed out waiting for a message")
}

#[test]
fn test_line_producer_skips_blank_lines() {
    let input = Cursor::new("first\n\n   \r\nsecond\r\nthird");
    let mut producer = LineProducer::new(input);

    assert_eq!(producer.produce().as_deref(), Some("first"));
    assert_eq!(producer.produce().as_deref(), Some("second"));
    assert_eq!(producer.produce().as_deref(), Some("third"));
    assert_eq!(producer.produce(), None);
}

#[test]
fn test_closure_producer() {
    let mut remaining = vec!["b".to_string(), "a".to_string()];
    let mut producer = move || remaining.pop();

    assert_eq!(producer.produce().as_deref(), Some("a"));
    assert_eq!(producer.produce().as_deref(), Some("b"));
    assert_eq!(producer.produce(), None);
}

#[test]
fn test_run_producer_stops_when_queue_closes() {
    let (tx, rx) = mpsc::unbounded_channel::<String>();
    drop(rx);

    let mut calls = 0;
    let producer = move || {
        calls += 1;
        (calls < 100).then(|| format!("msg-{calls}"))
    };

    assert_eq!(run_producer(producer, tx), 0);
}

#[test]
fn test_run_producer_queues_in_order() {
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let producer = LineProducer::new(Cursor::new("one\ntwo\nthree\n"));

    assert_eq!(run_producer(producer, tx), 3);
    assert_eq!(rx.try_recv().unwrap(), "one");
    assert_eq!(rx.try_recv().unwrap(), "two");
    assert_eq!(rx.try_recv().unwrap(), "three");
}

#[tokio::test]
async fn test_connect_refused_is_connection_error() {
    // Grab a free port, then release it so nothing is listening
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = ChatClient::connect(&format!("ws://{addr}"), TIMEOUT)
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Connection(_)), "got {err:?}");
    assert!(err.is_connection_error());
}

#[tokio::test]
async fn test_connect_times_out_without_handshake() {
    // Accepts TCP but never answers the WebSocket upgrade
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let holder = tokio::spawn(async move {
        let (_stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
    });

    let timeout = Duration::from_millis(200);
    let err = ChatClient::connect(&format!("ws://{addr}"), timeout)
        .await
        .unwrap_err();
    match err {
        ClientError::Timeout { after, .. } => assert_eq!(after, timeout),
        other => panic!("Expected a timeout, got {other:?}"),
    }
    holder.abort();
}

#[tokio::test]
async fn test_listen_only_once() {
    let (url, _relay) = start_server().await;
    let mut client = ChatClient::connect(&url, TIMEOUT).await.unwrap();
    assert_eq!(client.url(), url);

    let _incoming = client.listen().unwrap();
    assert!(matches!(client.listen(), Err(ClientError::AlreadyListening)));
}

#[tokio::test]
async fn test_send_after_close_fails() {
    let (url, relay) = start_server().await;
    let mut client = ChatClient::connect(&url, TIMEOUT).await.unwrap();
    wait_for_connections(&relay, 1).await;

    client.close().await;
    assert!(matches!(client.send("late"), Err(ClientError::Closed)));
    assert!(matches!(
        client.spawn_producer(|| None::<String>),
        Err(ClientError::Closed)
    ));
    // closing twice is harmless
    client.close().await;

    wait_for_connections(&relay, 0).await;
}

#[tokio::test]
async fn test_close_flushes_queued_messages() {
    let (url, relay) = start_server().await;
    let mut sender = ChatClient::connect(&url, TIMEOUT).await.unwrap();
    let mut receiver = ChatClient::connect(&url, TIMEOUT).await.unwrap();
    let mut incoming = receiver.listen().unwrap();
    wait_for_connections(&relay, 2).await;

    for i in 0..10 {
        sender.send(format!("queued-{i}")).unwrap();
    }
    sender.close().await;

    for i in 0..10 {
        assert_eq!(next(&mut incoming).await.as_deref(), Some(format!("queued-{i}").as_str()));
    }
}

#[tokio::test]
async fn test_producer_runs_beside_listen() {
    let (url, relay) = start_server().await;
    let mut a = ChatClient::connect(&url, TIMEOUT).await.unwrap();
    let mut b = ChatClient::connect(&url, TIMEOUT).await.unwrap();
    let mut b_incoming = b.listen().unwrap();
    wait_for_connections(&relay, 2).await;

    // Blocks until released, like a user who has not typed yet
    let (release_tx, release_rx) = std::sync::mpsc::channel::<String>();
    let producer = a
        .spawn_producer(move || release_rx.recv().ok())
        .unwrap();

    // B's receive path works while A's producer is blocked
    b.send("from b").unwrap();
    let mut a_incoming = a.listen().unwrap();
    assert_eq!(next(&mut a_incoming).await.as_deref(), Some("from b"));

    release_tx.send("from a's producer".to_string()).unwrap();
    assert_eq!(
        next(&mut b_incoming).await.as_deref(),
        Some("from a's producer")
    );

    drop(release_tx);
    assert_eq!(producer.await.unwrap(), 1);
}

#[tokio::test]
async fn test_listen_ends_when_server_drops_connection() {
    let (url, relay) = start_server().await;
    let mut client = ChatClient::connect(&url, TIMEOUT).await.unwrap();
    let mut incoming = client.listen().unwrap();
    wait_for_connections(&relay, 1).await;

    let id = lock(&relay).connection_ids().remove(0);
    lock(&relay).remove_connection(&id);

    assert_eq!(next(&mut incoming).await, None);
    // and stays ended
    assert_eq!(incoming.next().await, None);
}

#[tokio::test]
async fn test_send_fails_right_after_server_close() {
    let (url, relay) = start_server().await;
    let mut client = ChatClient::connect(&url, TIMEOUT).await.unwrap();
    let mut incoming = client.listen().unwrap();
    wait_for_connections(&relay, 1).await;
    assert!(!client.is_closed());

    let id = lock(&relay).connection_ids().remove(0);
    lock(&relay).remove_connection(&id);
    assert_eq!(next(&mut incoming).await, None);

    // the very first send after the close is refused, not silently dropped
    assert!(client.is_closed());
    assert!(matches!(client.send("lost?"), Err(ClientError::Closed)));
    assert!(matches!(
        client.spawn_producer(|| None::<String>),
        Err(ClientError::Closed)
    ));

    // the writer has stopped, so close returns promptly
    tokio::time::timeout(TIMEOUT, client.close())
        .await
        .expect("close hung after server close");
}
