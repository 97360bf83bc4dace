//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → set the shutdown flag
//!
//! Shutdown (shutdown.rs):
//!     Flag set → reactor notices after its next wait → close all connections → return
//! ```
//!
//! # Design Decisions
//! - The flag is the only thing shared with signal handlers
//! - The reactor's bounded wait keeps shutdown latency at one poll timeout

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
