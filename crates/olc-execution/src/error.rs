use std::time::Duration;

use thiserror::Error;

use crate::connection::TransportError;

/// Failure of a blocking place/cancel workflow.
///
/// An unauthenticated connection is deliberately NOT an error: both workflows
/// log it and return `Ok(())` without sending anything.
#[derive(Debug, Error)]
pub enum WaitError {
    /// No matching update arrived within the wait window.
    #[error("timed out after {waited:?} waiting for {what}")]
    Timeout { what: String, waited: Duration },

    /// The waiter was dropped before it matched (registry cleared, dispatch
    /// pool gone).
    #[error("wait for {what} was interrupted before a matching update arrived")]
    Interrupted { what: String },

    /// Called from a thread that is driving an async runtime, where blocking
    /// is not possible. Nothing was sent.
    #[error("cannot wait for {what} from inside an async runtime; nothing was sent")]
    InsideAsyncRuntime { what: String },

    /// The transport refused the request before it left the process.
    #[error("transport refused the request: {0}")]
    Transport(#[source] TransportError),
}

impl WaitError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, WaitError::Timeout { .. })
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, WaitError::Interrupted { .. })
    }
}
