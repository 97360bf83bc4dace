//! Connection registry and event dispatcher.
//!
//! # Responsibilities
//! - Own every live [`Connection`], keyed by its id
//! - Register new clients with the multiplexer
//! - Route readiness events to the handler for the connection's state
//! - Close connections exactly once, deregistering before dropping
//! - Expire connections stuck connecting or idle
//!
//! Events are processed one at a time on the reactor thread, so a connection is
//! never dispatched twice concurrently and a closed connection is never seen by
//! a later event: it is gone from the registry before the next lookup.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use mio::event::Event;
use mio::net::TcpStream;
use mio::{Interest, Registry, Token};

use crate::config::ProxyConfig;
use crate::connection::conn::Connection;
use crate::connection::error::{CloseReason, ConnectionError};
use crate::connection::handlers::{Dispatch, Verdict};
use crate::connection::state::ConnectionState;
use crate::connection::tag::{ConnectionId, Side, Tag};
use crate::http::{FramingLimits, RequestFramer};
use crate::net::buffer::DEFAULT_CAPACITY;
use crate::observability::{ConnectionObserver, TelemetryObserver};

/// Readiness bits observed for one registration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Readiness {
    pub readable: bool,
    pub writable: bool,
    /// The peer shut down its write side (FIN seen).
    pub read_closed: bool,
    /// Both directions are closed.
    pub hangup: bool,
    pub error: bool,
}

impl Readiness {
    pub fn readable() -> Self {
        Self {
            readable: true,
            ..Self::default()
        }
    }

    pub fn writable() -> Self {
        Self {
            writable: true,
            ..Self::default()
        }
    }
}

impl From<&Event> for Readiness {
    fn from(event: &Event) -> Self {
        Self {
            readable: event.is_readable(),
            writable: event.is_writable(),
            read_closed: event.is_read_closed(),
            hangup: event.is_read_closed() && event.is_write_closed(),
            error: event.is_error(),
        }
    }
}

/// Tunables for the connection manager.
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    pub buffer_capacity: usize,
    pub framing: FramingLimits,
    pub response_high_water: usize,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_CAPACITY,
            framing: FramingLimits::default(),
            response_high_water: 64 * 1024,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(60),
        }
    }
}

impl From<&ProxyConfig> for ManagerSettings {
    fn from(config: &ProxyConfig) -> Self {
        Self {
            buffer_capacity: config.buffers.initial_capacity,
            framing: FramingLimits::from(&config.buffers),
            response_high_water: config.buffers.response_high_water,
            connect_timeout: config.timeouts.connect(),
            idle_timeout: config.timeouts.idle(),
        }
    }
}

/// Owns all live connections and enforces their lifecycle.
pub struct ConnectionManager {
    registry: Registry,
    backend_addr: SocketAddr,
    settings: ManagerSettings,
    framer: RequestFramer,
    connections: HashMap<ConnectionId, Connection>,
    observer: Box<dyn ConnectionObserver>,
}

impl ConnectionManager {
    /// Create a manager that reports through [`TelemetryObserver`].
    pub fn new(registry: Registry, backend_addr: SocketAddr, settings: ManagerSettings) -> Self {
        Self::with_observer(registry, backend_addr, settings, Box::new(TelemetryObserver))
    }

    /// Create a manager that reports through `observer`.
    pub fn with_observer(
        registry: Registry,
        backend_addr: SocketAddr,
        settings: ManagerSettings,
        observer: Box<dyn ConnectionObserver>,
    ) -> Self {
        Self {
            registry,
            backend_addr,
            framer: RequestFramer::new(settings.framing),
            settings,
            connections: HashMap::new(),
            observer,
        }
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether no connections are live.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Whether `id` is still live.
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    /// Current state of a live connection.
    pub fn state(&self, id: ConnectionId) -> Option<ConnectionState> {
        self.connections.get(&id).map(Connection::state)
    }

    /// Take ownership of a freshly accepted client.
    ///
    /// On registration failure the stream is dropped, which closes it.
    pub fn add_client(
        &mut self,
        stream: TcpStream,
        peer: SocketAddr,
    ) -> Result<ConnectionId, ConnectionError> {
        let id = ConnectionId::next();
        let mut conn = Connection::new(id, stream, self.settings.buffer_capacity);

        self.registry
            .register(
                conn.client_mut(),
                Tag::new(id, Side::Client).token(),
                Interest::READABLE,
            )
            .map_err(|source| ConnectionError::Register {
                side: Side::Client,
                source,
            })?;

        self.connections.insert(id, conn);
        self.observer.accepted(id, peer);
        Ok(id)
    }

    /// Dispatch one readiness event.
    ///
    /// Tokens that no longer resolve to a live connection are stale and
    /// ignored.
    pub fn handle_event(&mut self, token: Token, readiness: Readiness) {
        let Some(tag) = Tag::from_token(token) else {
            return;
        };
        let Some(conn) = self.connections.get_mut(&tag.id) else {
            tracing::trace!(connection_id = %tag.id, side = %tag.side, "Stale event ignored");
            return;
        };
        if conn.is_closing() {
            return;
        }

        let dispatch = Dispatch {
            registry: &self.registry,
            backend_addr: self.backend_addr,
            settings: &self.settings,
            framer: &self.framer,
            observer: self.observer.as_ref(),
            now: Instant::now(),
        };

        if let Verdict::Close(reason) = dispatch.dispatch(conn, tag.side, readiness) {
            self.close_connection(tag.id, reason);
        }
    }

    /// Close connections whose deadlines have passed. Returns how many closed.
    pub fn sweep_timeouts(&mut self, now: Instant) -> usize {
        let connect_timeout = self.settings.connect_timeout;
        let idle_timeout = self.settings.idle_timeout;

        let expired: Vec<(ConnectionId, CloseReason)> = self
            .connections
            .values()
            .filter_map(|conn| {
                let connecting = conn.state() == ConnectionState::BackendConnecting;
                let stuck = now.saturating_duration_since(conn.state_entered()) >= connect_timeout;
                if connecting && stuck {
                    Some((conn.id(), ConnectionError::ConnectTimeout.into()))
                } else if now.saturating_duration_since(conn.last_activity()) >= idle_timeout {
                    Some((conn.id(), CloseReason::IdleTimeout))
                } else {
                    None
                }
            })
            .collect();

        let count = expired.len();
        for (id, reason) in expired {
            self.close_connection(id, reason);
        }
        count
    }

    /// Close every live connection.
    pub fn close_all(&mut self) {
        let ids: Vec<ConnectionId> = self.connections.keys().copied().collect();
        for id in ids {
            self.close_connection(id, CloseReason::Shutdown);
        }
    }

    /// Deregister and drop one connection. A second call for the same id is a
    /// no-op. Returns whether this call closed it.
    fn close_connection(&mut self, id: ConnectionId, reason: CloseReason) -> bool {
        let Some(conn) = self.connections.get_mut(&id) else {
            return false;
        };
        if !conn.mark_closing() {
            return false;
        }

        conn.deregister_client(&self.registry);
        if conn.release_backend(&self.registry) {
            self.observer.backend_released(id);
        }

        // Dropping the connection closes both sockets.
        self.connections.remove(&id);
        self.observer.closed(id, &reason);
        true
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.close_all();
    }
}
