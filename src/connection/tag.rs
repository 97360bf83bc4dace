//! Connection identifiers and multiplexer tokens.
//!
//! The multiplexer never carries anything but an integer. A token encodes the
//! owning connection's id and which of its two sockets fired:
//!
//! ```text
//! token = id << 1 | side      side: 0 = client, 1 = backend
//! ```
//!
//! Ids are never reused, so an event for a closed connection resolves to an id
//! that is no longer in the registry and is dropped as stale.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use mio::Token;

/// Process-wide id source. Starts at 1 so token 0 stays free for the listener.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

// Tokens pack a 64-bit id and a side bit into a `usize`, so only 64-bit
// targets are supported. Ids would need 2^63 connections to overflow.
const _: () = assert!(usize::BITS >= 64, "connection tokens require a 64-bit target");

/// Token of the listening socket. No connection id maps to it.
pub const LISTENER: Token = Token(0);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn next() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Which of a connection's two sockets an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Client,
    Backend,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Client => f.write_str("client"),
            Side::Backend => f.write_str("backend"),
        }
    }
}

/// Resolved form of a multiplexer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag {
    pub id: ConnectionId,
    pub side: Side,
}

impl Tag {
    pub fn new(id: ConnectionId, side: Side) -> Self {
        Self { id, side }
    }

    pub fn token(self) -> Token {
        let side = match self.side {
            Side::Client => 0,
            Side::Backend => 1,
        };
        Token(((self.id.0 as usize) << 1) | side)
    }

    /// Decode a token. The listener token decodes to `None`.
    pub fn from_token(token: Token) -> Option<Self> {
        let raw = token.0;
        let id = (raw >> 1) as u64;
        if id == 0 {
            return None;
        }
        let side = if raw & 1 == 0 {
            Side::Client
        } else {
            Side::Backend
        };
        Some(Self {
            id: ConnectionId(id),
            side,
        })
    }
}
