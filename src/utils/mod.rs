//! The `utils` module provides definitions shared across the `relaychat`
//! application: the error types returned by the relay and the client, and
//! the tracing subscriber setup used by the binary.

pub mod error;
pub mod logging;
