//! Single-threaded, non-blocking TCP reverse proxy.
//!
//! One reactor thread waits on a readiness multiplexer and drives every
//! connection through a fixed state machine: read and frame one HTTP/1.x
//! request, connect to the backend, forward the request, stream the response
//! back, close.

pub mod config;
pub mod connection;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod server;

pub use config::schema::ProxyConfig;
pub use lifecycle::Shutdown;
pub use server::{ProxyServer, ServerError};
