//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (non-blocking accept, drained until would-block)
//!     → connection manager (owns the stream from here on)
//!
//! Outgoing backend connection
//!     → backend.rs (non-blocking connect, pending-connect status)
//!
//! Bytes in flight
//!     → buffer.rs (growable read/write cursor buffer)
//! ```
//!
//! # Design Decisions
//! - Every socket is non-blocking; only the reactor's poll call blocks
//! - Transient accept errors never stop the listener

pub mod backend;
pub mod buffer;
pub mod listener;

pub use buffer::ByteBuffer;
pub use listener::{Acceptor, ListenerError};
