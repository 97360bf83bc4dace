//! Reactor loop.
//!
//! # Responsibilities
//! - Own the multiplexer, the listening socket and the connection manager
//! - Wait for readiness with a bounded timeout
//! - Drain the accept queue on listener readiness, enforcing the connection limit
//! - Hand every other event to the connection manager
//! - Sweep timeouts after each batch and stop when shutdown is requested

use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use mio::{Events, Poll};
use thiserror::Error;

use crate::config::ProxyConfig;
use crate::connection::{ConnectionManager, ManagerSettings, Readiness, LISTENER};
use crate::lifecycle::Shutdown;
use crate::net::listener::{is_transient_accept_error, Acceptor, ListenerError};
use crate::observability::{metrics, ConnectionObserver, TelemetryObserver};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to create poller: {0}")]
    Poll(#[source] io::Error),

    #[error("cannot resolve backend {address}: {source}")]
    Backend {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("poll failed: {0}")]
    Wait(#[source] io::Error),
}

/// Single-threaded reverse proxy.
pub struct ProxyServer {
    poll: Poll,
    events: Events,
    acceptor: Acceptor,
    manager: ConnectionManager,
    max_connections: usize,
    poll_timeout: Duration,
}

impl ProxyServer {
    /// Bind the listener and resolve the backend.
    pub fn new(config: &ProxyConfig) -> Result<Self, ServerError> {
        Self::with_observer(config, Box::new(TelemetryObserver))
    }

    /// Like [`ProxyServer::new`], reporting through `observer`.
    pub fn with_observer(
        config: &ProxyConfig,
        observer: Box<dyn ConnectionObserver>,
    ) -> Result<Self, ServerError> {
        let backend_addr = config
            .backend
            .resolve()
            .map_err(|source| ServerError::Backend {
                address: config.backend.address.clone(),
                source,
            })?;

        let poll = Poll::new().map_err(ServerError::Poll)?;
        let mut acceptor = Acceptor::bind(&config.listener)?;
        acceptor.register(poll.registry(), LISTENER)?;
        let registry = poll.registry().try_clone().map_err(ServerError::Poll)?;

        let manager = ConnectionManager::with_observer(
            registry,
            backend_addr,
            ManagerSettings::from(config),
            observer,
        );

        tracing::info!(
            address = %acceptor.local_addr(),
            backend = %backend_addr,
            max_connections = config.listener.max_connections,
            "Proxy listening"
        );

        Ok(Self {
            poll,
            events: Events::with_capacity(config.reactor.events_capacity),
            acceptor,
            manager,
            max_connections: config.listener.max_connections,
            poll_timeout: config.reactor.poll_timeout(),
        })
    }

    /// Address the proxy is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.acceptor.local_addr()
    }

    /// Run until `shutdown` is triggered, then close every connection.
    pub fn run(&mut self, shutdown: &Shutdown) -> Result<(), ServerError> {
        while !shutdown.is_triggered() {
            if let Err(e) = self.poll.poll(&mut self.events, Some(self.poll_timeout)) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                self.manager.close_all();
                return Err(ServerError::Wait(e));
            }

            for event in self.events.iter() {
                if event.token() == LISTENER {
                    accept_pending(&self.acceptor, &mut self.manager, self.max_connections);
                } else {
                    self.manager.handle_event(event.token(), Readiness::from(event));
                }
            }

            let expired = self.manager.sweep_timeouts(Instant::now());
            if expired > 0 {
                tracing::debug!(expired, "Timed out connections closed");
            }
        }

        tracing::info!(active = self.manager.len(), "Shutting down");
        self.manager.close_all();
        Ok(())
    }
}

/// Drain the accept queue. The listener is edge-triggered, so stopping early
/// would strand queued clients until the next arrival.
fn accept_pending(acceptor: &Acceptor, manager: &mut ConnectionManager, max_connections: usize) {
    loop {
        match acceptor.accept() {
            Ok(Some((stream, peer))) => {
                if manager.len() >= max_connections {
                    tracing::warn!(
                        peer_addr = %peer,
                        max_connections,
                        "Connection limit reached, rejecting"
                    );
                    metrics::record_rejected();
                    drop(stream);
                    continue;
                }
                if let Err(e) = manager.add_client(stream, peer) {
                    tracing::warn!(peer_addr = %peer, error = %e, "Failed to register client");
                }
            }
            Ok(None) => break,
            Err(e) if is_transient_accept_error(&e) => {
                tracing::debug!(error = %e, "Transient accept error");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Accept failed");
                break;
            }
        }
    }
}
