//! Per-state event handlers.
//!
//! Each handler runs with the connection borrowed out of the registry and
//! returns a [`Verdict`]. Handlers never close anything themselves: a
//! `Verdict::Close` is carried back to the manager, which owns the close
//! protocol.

use std::io;
use std::net::SocketAddr;
use std::time::Instant;

use mio::net::TcpStream;
use mio::Registry;

use crate::connection::conn::{Connection, FillStatus};
use crate::connection::error::{CloseReason, ConnectionError};
use crate::connection::manager::{ManagerSettings, Readiness};
use crate::connection::state::ConnectionState;
use crate::connection::tag::{Side, Tag};
use crate::http::{Framing, FramingError, RequestFrame, RequestFramer};
use crate::net::backend::{self, ConnectStatus};
use crate::observability::{ConnectionObserver, Direction};

/// Outcome of one dispatch.
#[derive(Debug)]
pub(crate) enum Verdict {
    Continue,
    Close(CloseReason),
}

/// Everything a handler may touch besides the connection itself.
pub(crate) struct Dispatch<'a> {
    pub registry: &'a Registry,
    pub backend_addr: SocketAddr,
    pub settings: &'a ManagerSettings,
    pub framer: &'a RequestFramer,
    pub observer: &'a dyn ConnectionObserver,
    pub now: Instant,
}

impl Dispatch<'_> {
    pub fn dispatch(&self, conn: &mut Connection, side: Side, readiness: Readiness) -> Verdict {
        match self.step(conn, side, readiness) {
            Ok(verdict) => verdict,
            Err(err) => Verdict::Close(CloseReason::Failed(err)),
        }
    }

    fn step(
        &self,
        conn: &mut Connection,
        side: Side,
        readiness: Readiness,
    ) -> Result<Verdict, ConnectionError> {
        if side == Side::Backend && !conn.has_backend() {
            return Ok(Verdict::Continue);
        }

        let state = conn.state();
        let streaming = matches!(
            state,
            ConnectionState::BackendReadingResponse | ConnectionState::ClientWritingResponse
        );

        if readiness.error {
            let err = pending_error(conn, side);
            if side == Side::Backend && state == ConnectionState::BackendConnecting {
                return Err(ConnectionError::Connect(err));
            }
            return Err(ConnectionError::io(side, err));
        }

        // A backend that hangs up mid-response has finished; its remaining
        // bytes are picked up by the read path below.
        if readiness.hangup && !(side == Side::Backend && streaming) {
            if side == Side::Backend && state == ConnectionState::BackendConnecting {
                return Err(ConnectionError::Connect(io::ErrorKind::ConnectionRefused.into()));
            }
            return Err(ConnectionError::HangUp { side });
        }

        let inbound = readiness.readable || readiness.read_closed || readiness.hangup;
        let matched = match (state, side) {
            (ConnectionState::ClientReadingHeaders, Side::Client) => inbound,
            (ConnectionState::BackendConnecting, Side::Backend) => readiness.writable,
            (ConnectionState::BackendWritingRequest, Side::Backend) => readiness.writable,
            (ConnectionState::BackendReadingResponse, Side::Backend) => inbound,
            (ConnectionState::ClientWritingResponse, Side::Client) => readiness.writable,
            (ConnectionState::ClientWritingResponse, Side::Backend) => inbound,
            _ => false,
        };
        if !matched {
            return Ok(Verdict::Continue);
        }
        conn.touch(self.now);

        match state {
            ConnectionState::ClientReadingHeaders => self.read_request(conn),
            ConnectionState::BackendConnecting => self.finish_connect(conn),
            ConnectionState::BackendWritingRequest => self.write_request(conn),
            ConnectionState::BackendReadingResponse => self.read_response(conn),
            ConnectionState::ClientWritingResponse => self.relay_response(conn),
        }
    }

    fn read_request(&self, conn: &mut Connection) -> Result<Verdict, ConnectionError> {
        let limits = self.framer.limits();
        let cap = limits.max_header_bytes.saturating_add(limits.max_body_bytes);
        let fill = conn
            .fill_from_client(cap)
            .map_err(|e| ConnectionError::io(Side::Client, e))?;

        match self.framer.detect(conn.client_read_buffer().readable()) {
            Framing::Malformed(err) => Err(err.into()),
            Framing::Complete(frame) => {
                self.observer.request_framed(conn.id(), &frame);
                self.start_backend(conn, frame)
            }
            Framing::Incomplete => match fill.status {
                FillStatus::WouldBlock => Ok(Verdict::Continue),
                FillStatus::Eof => Ok(Verdict::Close(CloseReason::ClientClosed)),
                // Under the cap every well-formed request frames, so a full
                // buffer without a frame has an oversized header block.
                FillStatus::Limited => Err(FramingError::HeaderTooLarge {
                    limit: limits.max_header_bytes,
                }
                .into()),
            },
        }
    }

    fn start_backend(
        &self,
        conn: &mut Connection,
        frame: RequestFrame,
    ) -> Result<Verdict, ConnectionError> {
        conn.stage_request(frame.total_len());

        let stream = backend::connect(self.backend_addr).map_err(ConnectionError::Connect)?;
        conn.attach_backend(stream);
        let (side, interest) = ConnectionState::BackendConnecting.interest();
        let token = Tag::new(conn.id(), side).token();
        if let Some(stream) = conn.backend_mut() {
            self.registry
                .register(stream, token, interest)
                .map_err(|source| ConnectionError::Register { side, source })?;
        }

        self.advance(conn, ConnectionState::BackendConnecting)?;
        Ok(Verdict::Continue)
    }

    fn finish_connect(&self, conn: &mut Connection) -> Result<Verdict, ConnectionError> {
        let Some(stream) = conn.backend() else {
            return Ok(Verdict::Continue);
        };
        match backend::connect_status(stream) {
            ConnectStatus::InProgress => Ok(Verdict::Continue),
            ConnectStatus::Failed(err) => Err(ConnectionError::Connect(err)),
            ConnectStatus::Connected => {
                // Still registered for writability, so write straight away.
                self.advance(conn, ConnectionState::BackendWritingRequest)?;
                self.write_request(conn)
            }
        }
    }

    fn write_request(&self, conn: &mut Connection) -> Result<Verdict, ConnectionError> {
        let written = conn
            .flush_to_backend()
            .map_err(|e| ConnectionError::io(Side::Backend, e))?;
        if written > 0 {
            self.observer.forwarded(conn.id(), Direction::Upstream, written);
        }
        if !conn.backend_write_buffer().is_empty() {
            return Ok(Verdict::Continue);
        }

        self.rearm(conn, ConnectionState::BackendReadingResponse)?;
        self.advance(conn, ConnectionState::BackendReadingResponse)?;
        Ok(Verdict::Continue)
    }

    fn read_response(&self, conn: &mut Connection) -> Result<Verdict, ConnectionError> {
        let (staged, eof) = self.pull_response(conn)?;
        if staged == 0 && !eof {
            return Ok(Verdict::Continue);
        }

        self.rearm(conn, ConnectionState::ClientWritingResponse)?;
        self.advance(conn, ConnectionState::ClientWritingResponse)?;
        Ok(Verdict::Continue)
    }

    /// Move response bytes towards the client until one side stalls.
    ///
    /// The exchange completes once the client-write buffer drains. The
    /// backend is read again only while a read was cut short by the
    /// high-water mark and data is still pending; its EOF is never awaited.
    fn relay_response(&self, conn: &mut Connection) -> Result<Verdict, ConnectionError> {
        let high_water = self.settings.response_high_water;
        loop {
            let room = conn.client_write_buffer().readable_len() < high_water;
            if conn.backend_deferred() && room {
                self.pull_response(conn)?;
            }

            let written = conn
                .flush_to_client()
                .map_err(|e| ConnectionError::io(Side::Client, e))?;
            if written > 0 {
                conn.touch(self.now);
            }

            let drained = conn.client_write_buffer().is_empty();
            if drained && !conn.backend_deferred() {
                return Ok(Verdict::Close(CloseReason::Completed));
            }
            let room = conn.client_write_buffer().readable_len() < high_water;
            if !(conn.backend_deferred() && room) {
                return Ok(Verdict::Continue);
            }
        }
    }

    /// Read what the backend has, stage it for the client, and release the
    /// backend on EOF. Returns the staged byte count and whether EOF was seen.
    fn pull_response(&self, conn: &mut Connection) -> Result<(usize, bool), ConnectionError> {
        let room = self
            .settings
            .response_high_water
            .saturating_sub(conn.client_write_buffer().readable_len())
            .max(1);
        let fill = conn
            .fill_from_backend(room)
            .map_err(|e| ConnectionError::io(Side::Backend, e))?;

        let staged = conn.stage_response();
        if staged > 0 {
            self.observer.forwarded(conn.id(), Direction::Downstream, staged);
        }

        conn.set_backend_deferred(fill.status == FillStatus::Limited);
        let eof = fill.status == FillStatus::Eof;
        if eof && conn.release_backend(self.registry) {
            self.observer.backend_released(conn.id());
        }
        Ok((staged, eof))
    }

    /// Point the socket `next` waits on at the readiness it waits for.
    fn rearm(&self, conn: &mut Connection, next: ConnectionState) -> Result<(), ConnectionError> {
        let (side, interest) = next.interest();
        let token = Tag::new(conn.id(), side).token();
        let stream = match side {
            Side::Client => Some(conn.client_mut()),
            Side::Backend => conn.backend_mut(),
        };
        match stream {
            Some(stream) => self
                .registry
                .reregister(stream, token, interest)
                .map_err(|source| ConnectionError::Register { side, source }),
            None => Ok(()),
        }
    }

    fn advance(&self, conn: &mut Connection, next: ConnectionState) -> Result<(), ConnectionError> {
        let from = conn.transition(next, self.now)?;
        self.observer.transitioned(conn.id(), from, next);
        Ok(())
    }
}

/// The socket error behind an error readiness bit.
fn pending_error(conn: &Connection, side: Side) -> io::Error {
    let stream = match side {
        Side::Client => Some(conn.client()),
        Side::Backend => conn.backend(),
    };
    match stream.map(TcpStream::take_error) {
        Some(Ok(Some(err))) | Some(Err(err)) => err,
        _ => io::Error::other("socket reported an error condition"),
    }
}
