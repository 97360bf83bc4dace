//! Backend connection establishment.
//!
//! Connects are initiated non-blocking; completion is observed later through
//! write readiness and confirmed with [`connect_status`].

use std::io;
use std::net::SocketAddr;

use mio::net::TcpStream;

/// Result of checking a connect that was started earlier.
#[derive(Debug)]
pub enum ConnectStatus {
    Connected,
    /// Spurious readiness; the handshake is still running.
    InProgress,
    Failed(io::Error),
}

/// Start a non-blocking connect to `addr`.
pub fn connect(addr: SocketAddr) -> io::Result<TcpStream> {
    let stream = TcpStream::connect(addr)?;
    // Small request/response exchanges; do not wait on Nagle.
    if let Err(e) = stream.set_nodelay(true) {
        tracing::trace!(error = %e, "set_nodelay failed on backend socket");
    }
    Ok(stream)
}

/// Inspect the pending error status of a connecting socket.
pub fn connect_status(stream: &TcpStream) -> ConnectStatus {
    match stream.take_error() {
        Ok(Some(e)) | Err(e) => return ConnectStatus::Failed(e),
        Ok(None) => {}
    }

    match stream.peer_addr() {
        Ok(_) => ConnectStatus::Connected,
        Err(e) if e.kind() == io::ErrorKind::NotConnected => ConnectStatus::InProgress,
        Err(e) => ConnectStatus::Failed(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn wait_for(stream: &TcpStream) -> ConnectStatus {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            match connect_status(stream) {
                ConnectStatus::InProgress if Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(5));
                }
                other => return other,
            }
        }
    }

    #[test]
    fn connects_to_listening_backend() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let stream = connect(listener.local_addr().unwrap()).unwrap();
        assert!(matches!(wait_for(&stream), ConnectStatus::Connected));
    }

    #[test]
    fn refused_connect_is_reported() {
        // Bind then drop to get a port with nothing behind it.
        let addr = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        match connect(addr) {
            Ok(stream) => assert!(matches!(wait_for(&stream), ConnectStatus::Failed(_))),
            Err(e) => assert_eq!(e.kind(), io::ErrorKind::ConnectionRefused),
        }
    }
}
