//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! ConnectionManager
//!     → observer.rs (lifecycle hooks, injected)
//!         → tracing events (logging.rs installs the subscriber)
//!         → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → Log aggregation (stdout, pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - The core never logs per-connection facts itself; it calls the observer
//! - Connection IDs flow through every lifecycle event

pub mod logging;
pub mod metrics;
pub mod observer;

pub use observer::{ConnectionObserver, Direction, NoopObserver, TelemetryObserver};
