//! The `client` module implements the chat client side of the relay.
//!
//! A [`ChatClient`] owns one WebSocket connection. Outbound text goes through
//! a queue drained by a writer task, so sending never waits on the socket and
//! never delays the [`Incoming`] stream of relayed messages. Blocking input
//! sources implement [`Producer`] and run on the blocking thread pool.

pub mod chat_client;
pub mod producer;

pub use chat_client::{ChatClient, Incoming};
pub use producer::{LineProducer, Producer};

#[cfg(test)]
mod tests;
