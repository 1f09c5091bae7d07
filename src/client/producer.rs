use std::io::{self, BufRead, BufReader, Stdin};

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

/// A source of outbound chat messages that may block while producing.
///
/// Producers run on a dedicated blocking thread, never on the task that reads
/// incoming messages.
pub trait Producer {
    /// Returns the next message to send, blocking as long as needed.
    /// `None` ends production.
    fn produce(&mut self) -> Option<String>;
}

impl<F> Producer for F
where
    F: FnMut() -> Option<String>,
{
    fn produce(&mut self) -> Option<String> {
        self()
    }
}

/// Produces one message per non-blank input line.
#[derive(Debug)]
pub struct LineProducer<R> {
    reader: R,
}

impl<R: BufRead> LineProducer<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl LineProducer<BufReader<Stdin>> {
    /// Reads lines typed on the terminal.
    pub fn stdin() -> Self {
        Self::new(BufReader::new(io::stdin()))
    }
}

impl<R: BufRead> Producer for LineProducer<R> {
    fn produce(&mut self) -> Option<String> {
        let mut line = String::new();
        loop {
            line.clear();
            match self.reader.read_line(&mut line) {
                Ok(0) => return None,
                Ok(_) => {
                    let text = line.trim_end_matches(['\r', '\n']);
                    if !text.trim().is_empty() {
                        return Some(text.to_string());
                    }
                }
                Err(e) => {
                    warn!("failed to read input: {e}");
                    return None;
                }
            }
        }
    }
}

/// Drives `producer` until it is exhausted or the connection's outbound queue
/// closes. Returns the number of messages queued.
pub(crate) fn run_producer<P: Producer>(mut producer: P, outgoing: UnboundedSender<String>) -> usize {
    let mut queued = 0;
    while let Some(text) = producer.produce() {
        if outgoing.send(text).is_err() {
            debug!("connection closed, stopping producer");
            break;
        }
        queued += 1;
    }
    queued
}
