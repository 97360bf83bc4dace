//! Connection lifecycle observer.
//!
//! The connection manager reports what happens to each connection through this
//! trait instead of logging directly. Production wires in
//! [`TelemetryObserver`]; tests plug in recorders.

use std::net::SocketAddr;

use crate::connection::{CloseReason, ConnectionId, ConnectionState};
use crate::http::RequestFrame;
use crate::observability::metrics;

/// Direction of forwarded bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Client request bytes written to the backend.
    Upstream,
    /// Backend response bytes staged for the client.
    Downstream,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Upstream => "upstream",
            Direction::Downstream => "downstream",
        }
    }
}

/// Hooks invoked by the connection manager. All default to no-ops.
pub trait ConnectionObserver {
    fn accepted(&self, _id: ConnectionId, _peer: SocketAddr) {}

    fn request_framed(&self, _id: ConnectionId, _frame: &RequestFrame) {}

    fn transitioned(&self, _id: ConnectionId, _from: ConnectionState, _to: ConnectionState) {}

    /// The backend socket was deregistered and closed.
    fn backend_released(&self, _id: ConnectionId) {}

    fn forwarded(&self, _id: ConnectionId, _direction: Direction, _bytes: usize) {}

    fn closed(&self, _id: ConnectionId, _reason: &CloseReason) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ConnectionObserver for NoopObserver {}

/// Structured logs plus metrics.
#[derive(Debug, Default, Clone, Copy)]
pub struct TelemetryObserver;

impl ConnectionObserver for TelemetryObserver {
    fn accepted(&self, id: ConnectionId, peer: SocketAddr) {
        tracing::debug!(connection_id = %id, peer_addr = %peer, "Connection accepted");
        metrics::record_accepted();
    }

    fn request_framed(&self, id: ConnectionId, frame: &RequestFrame) {
        tracing::debug!(
            connection_id = %id,
            header_bytes = frame.header_len,
            body_bytes = frame.body_len,
            "Request framed"
        );
        metrics::record_request_framed();
    }

    fn transitioned(&self, id: ConnectionId, from: ConnectionState, to: ConnectionState) {
        tracing::trace!(connection_id = %id, %from, %to, "State transition");
    }

    fn backend_released(&self, id: ConnectionId) {
        tracing::trace!(connection_id = %id, "Backend released");
    }

    fn forwarded(&self, id: ConnectionId, direction: Direction, bytes: usize) {
        tracing::trace!(connection_id = %id, direction = direction.as_str(), bytes, "Forwarded");
        metrics::record_forwarded(direction, bytes);
    }

    fn closed(&self, id: ConnectionId, reason: &CloseReason) {
        match reason {
            CloseReason::Failed(err) => {
                tracing::warn!(connection_id = %id, error = %err, "Connection failed");
            }
            _ => {
                tracing::debug!(connection_id = %id, reason = reason.label(), "Connection closed");
            }
        }
        metrics::record_closed(reason.label());
    }
}
