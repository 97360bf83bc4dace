//! Shared utilities for integration tests.
//!
//! The proxy runs on an ephemeral port in a background thread; mock backends
//! are plain blocking std sockets, one thread per accepted connection.

#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use reactor_proxy::config::ProxyConfig;
use reactor_proxy::{ProxyServer, ServerError, Shutdown};

pub const IO_TIMEOUT: Duration = Duration::from_secs(5);

/// A proxy running in a background thread. Dropping it stops the proxy.
pub struct ProxyHandle {
    pub addr: SocketAddr,
    shutdown: Shutdown,
    thread: Option<JoinHandle<Result<(), ServerError>>>,
}

impl ProxyHandle {
    /// Trigger shutdown and wait for the reactor to return.
    pub fn stop(mut self) -> Result<(), ServerError> {
        self.shutdown.trigger();
        self.thread
            .take()
            .expect("proxy thread already joined")
            .join()
            .expect("proxy thread panicked")
    }
}

impl Drop for ProxyHandle {
    fn drop(&mut self) {
        self.shutdown.trigger();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Config pointing at `backend`, listening on an ephemeral loopback port.
pub fn test_config(backend: SocketAddr) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.backend.address = backend.to_string();
    config.reactor.poll_timeout_ms = 20;
    config
}

pub fn start_proxy(config: ProxyConfig) -> ProxyHandle {
    let shutdown = Shutdown::new();
    let flag = shutdown.clone();
    let (tx, rx) = mpsc::channel();

    let thread = thread::spawn(move || {
        let mut server = match ProxyServer::new(&config) {
            Ok(server) => server,
            Err(e) => {
                let _ = tx.send(Err(e.to_string()));
                return Ok(());
            }
        };
        let _ = tx.send(Ok(server.local_addr()));
        server.run(&flag)
    });

    let addr = rx
        .recv_timeout(IO_TIMEOUT)
        .expect("proxy did not start")
        .expect("proxy failed to start");

    ProxyHandle {
        addr,
        shutdown,
        thread: Some(thread),
    }
}

/// Requests a mock backend has received, in arrival order.
pub type Received = Arc<Mutex<Vec<Vec<u8>>>>;

/// Start a backend that reads one full request per connection, answers with
/// `respond(request)` and closes.
pub fn start_backend<F>(respond: F) -> (SocketAddr, Received)
where
    F: Fn(&[u8]) -> Vec<u8> + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let received: Received = Arc::default();
    let log = Arc::clone(&received);
    let respond = Arc::new(respond);

    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { break };
            let log = Arc::clone(&log);
            let respond = Arc::clone(&respond);
            thread::spawn(move || {
                let Some(request) = read_request(&mut stream) else {
                    return;
                };
                log.lock().unwrap().push(request.clone());
                let _ = stream.write_all(&respond(&request));
            });
        }
    });

    (addr, received)
}

/// Start a backend that always answers with `response`.
pub fn start_fixed_backend(response: Vec<u8>) -> (SocketAddr, Received) {
    start_backend(move |_| response.clone())
}

/// Start a backend that answers every request with `response` and then keeps
/// the socket open until the test process exits.
pub fn start_keepalive_backend(response: Vec<u8>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    thread::spawn(move || {
        let mut held = Vec::new();
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { break };
            if read_request(&mut stream).is_some() {
                let _ = stream.write_all(&response);
            }
            held.push(stream);
        }
    });

    addr
}

/// An address nothing listens on.
pub fn dead_address() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

pub fn http_response(body: &[u8]) -> Vec<u8> {
    let head = format!(
        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    let mut out = head.into_bytes();
    out.extend_from_slice(body);
    out
}

/// Read one Content-Length framed request from a blocking socket.
pub fn read_request(stream: &mut TcpStream) -> Option<Vec<u8>> {
    stream.set_read_timeout(Some(IO_TIMEOUT)).ok()?;
    let mut data = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        if let Some(end) = find_header_end(&data) {
            let total = end + content_length(&data[..end]);
            if data.len() >= total {
                data.truncate(total);
                return Some(data);
            }
        }
        match stream.read(&mut chunk) {
            Ok(0) | Err(_) => return None,
            Ok(n) => data.extend_from_slice(&chunk[..n]),
        }
    }
}

fn find_header_end(data: &[u8]) -> Option<usize> {
    data.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4)
}

fn content_length(headers: &[u8]) -> usize {
    String::from_utf8_lossy(headers)
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(0)
}

pub fn connect(addr: SocketAddr) -> TcpStream {
    let stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(IO_TIMEOUT)).unwrap();
    stream
}

/// Send `request` in one write and collect everything until the proxy closes.
pub fn exchange(addr: SocketAddr, request: &[u8]) -> Vec<u8> {
    let mut stream = connect(addr);
    stream.write_all(request).unwrap();
    read_all(&mut stream)
}

/// Read until EOF. A reset after the proxy closed counts as EOF.
pub fn read_all(stream: &mut TcpStream) -> Vec<u8> {
    let mut out = Vec::new();
    let mut chunk = [0u8; 16 * 1024];
    loop {
        match stream.read(&mut chunk) {
            Ok(0) => return out,
            Ok(n) => out.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == std::io::ErrorKind::ConnectionReset => return out,
            Err(e) => panic!("read failed: {e}"),
        }
    }
}

pub fn post(path: &str, body: &[u8]) -> Vec<u8> {
    let head = format!(
        "POST {path} HTTP/1.1\r\nHost: test\r\nContent-Length: {}\r\n\r\n",
        body.len()
    );
    let mut out = head.into_bytes();
    out.extend_from_slice(body);
    out
}
