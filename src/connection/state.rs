//! Per-connection state machine.
//!
//! ```text
//! ClientReadingHeaders → BackendConnecting → BackendWritingRequest
//!     → BackendReadingResponse → ClientWritingResponse → (removed)
//! ```
//!
//! Only forward steps along this line are legal. Failure from any state skips
//! straight to removal, which is not a state: a closed connection no longer
//! exists in the registry.

use std::fmt;

use mio::Interest;

use crate::connection::tag::Side;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Accumulating the client's request until it frames.
    ClientReadingHeaders,
    /// Backend connect started, waiting for it to resolve.
    BackendConnecting,
    /// Sending the framed request to the backend.
    BackendWritingRequest,
    /// Waiting for the first response bytes.
    BackendReadingResponse,
    /// Relaying the response to the client.
    ClientWritingResponse,
}

impl ConnectionState {
    /// The only state this one may move to.
    pub fn successor(self) -> Option<Self> {
        use ConnectionState::*;
        match self {
            ClientReadingHeaders => Some(BackendConnecting),
            BackendConnecting => Some(BackendWritingRequest),
            BackendWritingRequest => Some(BackendReadingResponse),
            BackendReadingResponse => Some(ClientWritingResponse),
            ClientWritingResponse => None,
        }
    }

    pub fn can_transition_to(self, next: Self) -> bool {
        self.successor() == Some(next)
    }

    /// The socket and readiness this state waits on.
    pub fn interest(self) -> (Side, Interest) {
        use ConnectionState::*;
        match self {
            ClientReadingHeaders => (Side::Client, Interest::READABLE),
            BackendConnecting => (Side::Backend, Interest::WRITABLE),
            BackendWritingRequest => (Side::Backend, Interest::WRITABLE),
            BackendReadingResponse => (Side::Backend, Interest::READABLE),
            ClientWritingResponse => (Side::Client, Interest::WRITABLE),
        }
    }

    /// Short label for logs and metrics.
    pub fn as_str(self) -> &'static str {
        use ConnectionState::*;
        match self {
            ClientReadingHeaders => "client_reading_headers",
            BackendConnecting => "backend_connecting",
            BackendWritingRequest => "backend_writing_request",
            BackendReadingResponse => "backend_reading_response",
            ClientWritingResponse => "client_writing_response",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
