//! Connection subsystem.
//!
//! # Data Flow
//! ```text
//! Accepted client socket
//!     → manager.rs (registry entry, client registered for reads)
//!     → handlers.rs, one per state:
//!         ClientReadingHeaders   client → client_read, framed by http::framing
//!         BackendConnecting      non-blocking connect completes
//!         BackendWritingRequest  backend_write → backend
//!         BackendReadingResponse backend → client_write
//!         ClientWritingResponse  client_write → client
//!     → manager.rs (close: deregister, drop, report)
//! ```
//!
//! # Design Decisions
//! - The registry is the single owner of every Connection
//! - Multiplexer tokens are (id, side) pairs, never pointers
//! - State changes only through the transition table in state.rs
//! - One request per connection; the client is closed after the response

pub mod conn;
pub mod error;
mod handlers;
pub mod manager;
pub mod state;
pub mod tag;

pub use conn::{Connection, Fill, FillStatus};
pub use error::{CloseReason, ConnectionError};
pub use manager::{ConnectionManager, ManagerSettings, Readiness};
pub use state::ConnectionState;
pub use tag::{ConnectionId, Side, Tag, LISTENER};
