//! Per-connection failures and close reasons.
//!
//! Nothing here ever aborts the reactor. Each error closes exactly one
//! connection and is reported to the observer.

use std::io;

use thiserror::Error;

use crate::connection::state::ConnectionState;
use crate::connection::tag::Side;
use crate::http::FramingError;

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("malformed request: {0}")]
    Malformed(#[from] FramingError),

    #[error("{side} hung up")]
    HangUp { side: Side },

    #[error("{side} I/O error: {source}")]
    Io {
        side: Side,
        #[source]
        source: io::Error,
    },

    #[error("backend connect failed: {0}")]
    Connect(#[source] io::Error),

    #[error("backend connect timed out")]
    ConnectTimeout,

    #[error("{side} registration failed: {source}")]
    Register {
        side: Side,
        #[source]
        source: io::Error,
    },

    #[error("invalid transition {from} -> {to}")]
    InvalidTransition {
        from: ConnectionState,
        to: ConnectionState,
    },
}

impl ConnectionError {
    pub fn io(side: Side, source: io::Error) -> Self {
        Self::Io { side, source }
    }

    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "malformed",
            Self::HangUp { .. } => "hangup",
            Self::Io { .. } => "io_error",
            Self::Connect(_) => "connect_failed",
            Self::ConnectTimeout => "connect_timeout",
            Self::Register { .. } => "register_failed",
            Self::InvalidTransition { .. } => "invalid_transition",
        }
    }
}

/// Why a connection was removed.
#[derive(Debug)]
pub enum CloseReason {
    /// The response was fully delivered.
    Completed,
    /// The client closed before its request framed.
    ClientClosed,
    /// No progress within the idle timeout.
    IdleTimeout,
    /// The reactor is stopping.
    Shutdown,
    Failed(ConnectionError),
}

impl CloseReason {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::ClientClosed => "client_closed",
            Self::IdleTimeout => "idle_timeout",
            Self::Shutdown => "shutdown",
            Self::Failed(e) => e.label(),
        }
    }
}

impl From<ConnectionError> for CloseReason {
    fn from(err: ConnectionError) -> Self {
        Self::Failed(err)
    }
}
