//! A single proxied exchange: one client socket, at most one backend socket,
//! and the four buffers that carry bytes between them.
//!
//! The connection owns its sockets. Dropping it closes both exactly once.

use std::io::{self, Read, Write};
use std::time::Instant;

use mio::net::TcpStream;
use mio::Registry;

use crate::connection::error::ConnectionError;
use crate::connection::state::ConnectionState;
use crate::connection::tag::ConnectionId;
use crate::net::ByteBuffer;

/// Smallest writable window offered to a single `read`.
const READ_CHUNK: usize = 4096;

#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    client: TcpStream,
    backend: Option<TcpStream>,

    client_read: ByteBuffer,
    client_write: ByteBuffer,
    backend_read: ByteBuffer,
    backend_write: ByteBuffer,

    state: ConnectionState,
    closing: bool,
    /// A backend read was skipped for backpressure and must be retried.
    backend_deferred: bool,

    state_entered: Instant,
    last_activity: Instant,
}

impl Connection {
    /// Create a connection for an accepted client, waiting for its request.
    pub fn new(id: ConnectionId, client: TcpStream, buffer_capacity: usize) -> Self {
        let now = Instant::now();
        Self {
            id,
            client,
            backend: None,
            client_read: ByteBuffer::with_capacity(buffer_capacity),
            client_write: ByteBuffer::with_capacity(buffer_capacity),
            backend_read: ByteBuffer::with_capacity(buffer_capacity),
            backend_write: ByteBuffer::with_capacity(buffer_capacity),
            state: ConnectionState::ClientReadingHeaders,
            closing: false,
            backend_deferred: false,
            state_entered: now,
            last_activity: now,
        }
    }

    /// Get the connection ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Get the current state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Move to `next`, which must be the current state's successor.
    pub fn transition(
        &mut self,
        next: ConnectionState,
        now: Instant,
    ) -> Result<ConnectionState, ConnectionError> {
        let from = self.state;
        if !from.can_transition_to(next) {
            return Err(ConnectionError::InvalidTransition { from, to: next });
        }
        self.state = next;
        self.state_entered = now;
        Ok(from)
    }

    /// Whether the connection has been flagged for removal.
    pub fn is_closing(&self) -> bool {
        self.closing
    }

    /// Flag the connection for removal. Returns `false` if it already was.
    pub fn mark_closing(&mut self) -> bool {
        !std::mem::replace(&mut self.closing, true)
    }

    /// Record I/O progress at `now`.
    pub fn touch(&mut self, now: Instant) {
        self.last_activity = now;
    }

    /// When I/O last made progress.
    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    /// When the current state was entered.
    pub fn state_entered(&self) -> Instant {
        self.state_entered
    }

    /// Mutable access to the client socket, for registration.
    pub fn client_mut(&mut self) -> &mut TcpStream {
        &mut self.client
    }

    /// The client socket.
    pub fn client(&self) -> &TcpStream {
        &self.client
    }

    /// The backend socket, once a connect has started.
    pub fn backend(&self) -> Option<&TcpStream> {
        self.backend.as_ref()
    }

    /// Mutable access to the backend socket.
    pub fn backend_mut(&mut self) -> Option<&mut TcpStream> {
        self.backend.as_mut()
    }

    /// Whether a backend socket is attached.
    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    /// Take ownership of a freshly connecting backend socket.
    pub fn attach_backend(&mut self, stream: TcpStream) {
        debug_assert!(self.backend.is_none(), "{} already has a backend", self.id);
        self.backend = Some(stream);
    }

    /// Deregister and drop the backend socket.
    ///
    /// Returns `true` only on the call that actually released it.
    pub fn release_backend(&mut self, registry: &Registry) -> bool {
        let Some(mut stream) = self.backend.take() else {
            return false;
        };
        if let Err(e) = registry.deregister(&mut stream) {
            tracing::trace!(connection_id = %self.id, error = %e, "backend deregister failed");
        }
        self.backend_deferred = false;
        true
    }

    pub fn deregister_client(&mut self, registry: &Registry) {
        if let Err(e) = registry.deregister(&mut self.client) {
            tracing::trace!(connection_id = %self.id, error = %e, "client deregister failed");
        }
    }

    /// Bytes received from the client and not yet framed.
    pub fn client_read_buffer(&self) -> &ByteBuffer {
        &self.client_read
    }

    /// Response bytes waiting to be written to the client.
    pub fn client_write_buffer(&self) -> &ByteBuffer {
        &self.client_write
    }

    /// Request bytes waiting to be written to the backend.
    pub fn backend_write_buffer(&self) -> &ByteBuffer {
        &self.backend_write
    }

    /// Whether a backend read was cut short and must be resumed.
    pub fn backend_deferred(&self) -> bool {
        self.backend_deferred
    }

    /// Mark a backend read as cut short, or clear the mark.
    pub fn set_backend_deferred(&mut self, deferred: bool) {
        self.backend_deferred = deferred;
    }

    /// Read from the client into the client-read buffer.
    pub fn fill_from_client(&mut self, limit: usize) -> io::Result<Fill> {
        fill(&mut self.client, &mut self.client_read, limit)
    }

    /// Read from the backend into the backend-read buffer.
    pub fn fill_from_backend(&mut self, limit: usize) -> io::Result<Fill> {
        match self.backend.as_mut() {
            Some(stream) => fill(stream, &mut self.backend_read, limit),
            None => Ok(Fill {
                bytes: 0,
                status: FillStatus::Eof,
            }),
        }
    }

    /// Copy the first `len` buffered request bytes into the backend-write
    /// buffer and discard everything the client sent.
    pub fn stage_request(&mut self, len: usize) {
        let request = &self.client_read.readable()[..len];
        self.backend_write.extend_from_slice(request);
        self.client_read.clear();
    }

    /// Move everything read from the backend into the client-write buffer.
    pub fn stage_response(&mut self) -> usize {
        let n = self.backend_read.readable_len();
        self.client_write.extend_from_slice(self.backend_read.readable());
        self.backend_read.clear();
        n
    }

    /// Write as much of the backend-write buffer as the backend accepts.
    pub fn flush_to_backend(&mut self) -> io::Result<usize> {
        match self.backend.as_mut() {
            Some(stream) => drain(stream, &mut self.backend_write),
            None => Err(io::Error::from(io::ErrorKind::NotConnected)),
        }
    }

    /// Write as much of the client-write buffer as the client accepts.
    pub fn flush_to_client(&mut self) -> io::Result<usize> {
        drain(&mut self.client, &mut self.client_write)
    }
}

/// Why a fill stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillStatus {
    /// The socket has nothing more right now.
    WouldBlock,
    /// The buffer reached the caller's limit; more data may be pending.
    Limited,
    /// The peer closed its write side.
    Eof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fill {
    pub bytes: usize,
    pub status: FillStatus,
}

/// Read until would-block, EOF, or `buf` holds at least `limit` bytes.
fn fill<R: Read>(src: &mut R, buf: &mut ByteBuffer, limit: usize) -> io::Result<Fill> {
    let mut bytes = 0;
    loop {
        if buf.readable_len() >= limit {
            return Ok(Fill {
                bytes,
                status: FillStatus::Limited,
            });
        }

        buf.reserve(READ_CHUNK);
        match src.read(buf.writable()) {
            Ok(0) => {
                return Ok(Fill {
                    bytes,
                    status: FillStatus::Eof,
                })
            }
            Ok(n) => {
                buf.commit(n);
                bytes += n;
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                return Ok(Fill {
                    bytes,
                    status: FillStatus::WouldBlock,
                })
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Write until `buf` is empty or the sink would block.
fn drain<W: Write>(dst: &mut W, buf: &mut ByteBuffer) -> io::Result<usize> {
    let mut written = 0;
    while !buf.is_empty() {
        match dst.write(buf.readable()) {
            Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero)),
            Ok(n) => {
                buf.consume(n);
                written += n;
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(written)
}
