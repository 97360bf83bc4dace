//! Non-blocking TCP acceptor.
//!
//! # Responsibilities
//! - Bind to the configured address
//! - Register the listening socket with the multiplexer
//! - Accept incoming connections until the backlog is drained
//!
//! Accepted streams are already non-blocking; ownership passes straight to the
//! connection manager.

use std::io;
use std::net::SocketAddr;

use mio::net::{TcpListener, TcpStream};
use mio::{Interest, Registry, Token};
use thiserror::Error;

use crate::config::ListenerConfig;

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The configured address is not a socket address.
    #[error("Invalid bind address {0:?}")]
    Address(String),

    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    Bind(#[source] io::Error),

    /// Failed to register with the multiplexer.
    #[error("Failed to register listener: {0}")]
    Register(#[source] io::Error),
}

/// A non-blocking listening socket.
pub struct Acceptor {
    inner: TcpListener,
    local_addr: SocketAddr,
}

impl Acceptor {
    /// Bind to the configured address.
    pub fn bind(config: &ListenerConfig) -> Result<Self, ListenerError> {
        let addr: SocketAddr = config
            .bind_address
            .parse()
            .map_err(|_| ListenerError::Address(config.bind_address.clone()))?;

        let inner = TcpListener::bind(addr).map_err(ListenerError::Bind)?;
        let local_addr = inner.local_addr().map_err(ListenerError::Bind)?;

        tracing::info!(
            address = %local_addr,
            max_connections = config.max_connections,
            "Listener bound"
        );

        Ok(Self { inner, local_addr })
    }

    /// Register for read readiness under `token`.
    pub fn register(&mut self, registry: &Registry, token: Token) -> Result<(), ListenerError> {
        registry
            .register(&mut self.inner, token, Interest::READABLE)
            .map_err(ListenerError::Register)
    }

    /// Accept one pending connection.
    ///
    /// `Ok(None)` means the backlog is empty for now; the caller stops
    /// accepting until the next readiness event.
    pub fn accept(&self) -> io::Result<Option<(TcpStream, SocketAddr)>> {
        loop {
            match self.inner.accept() {
                Ok((stream, peer)) => return Ok(Some((stream, peer))),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

/// Accept errors that only affect the one pending connection.
pub fn is_transient_accept_error(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionAborted | io::ErrorKind::ConnectionReset
    )
}
