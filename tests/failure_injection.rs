//! Failure injection tests for the reverse proxy.

use std::io::{Read, Write};
use std::thread;
use std::time::{Duration, Instant};

mod common;

use common::*;

#[test]
fn unreachable_backend_closes_client_without_response() {
    let proxy = start_proxy(test_config(dead_address()));

    assert!(exchange(proxy.addr, &post("/", b"x")).is_empty());

    // The reactor survives and keeps serving.
    assert!(exchange(proxy.addr, &post("/", b"y")).is_empty());
}

#[test]
fn malformed_request_never_reaches_the_backend() {
    let (backend, received) = start_fixed_backend(http_response(b"ok"));
    let proxy = start_proxy(test_config(backend));

    let bad = b"POST / HTTP/1.1\r\nContent-Length: 12abc\r\n\r\n";
    assert!(exchange(proxy.addr, bad).is_empty());

    let chunked = b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n0\r\n\r\n";
    assert!(exchange(proxy.addr, chunked).is_empty());

    thread::sleep(Duration::from_millis(50));
    assert!(received.lock().unwrap().is_empty());
}

#[test]
fn oversized_headers_are_rejected() {
    let (backend, received) = start_fixed_backend(http_response(b"ok"));
    let mut config = test_config(backend);
    config.buffers.max_header_bytes = 256;
    let proxy = start_proxy(config);

    let mut request = b"GET / HTTP/1.1\r\nX-Filler: ".to_vec();
    request.extend(std::iter::repeat(b'a').take(1024));
    request.extend_from_slice(b"\r\n\r\n");
    assert!(exchange(proxy.addr, &request).is_empty());

    let mut too_big_body = test_config(dead_address());
    too_big_body.buffers.max_body_bytes = 8;
    let strict = start_proxy(too_big_body);
    assert!(exchange(strict.addr, &post("/", b"0123456789")).is_empty());

    assert!(received.lock().unwrap().is_empty());
}

#[test]
fn backend_closing_early_still_delivers_partial_response() {
    let (backend, _) = start_fixed_backend(b"0123456789".to_vec());
    let proxy = start_proxy(test_config(backend));

    assert_eq!(exchange(proxy.addr, &post("/", b"abc")), b"0123456789");
}

#[test]
fn backend_closing_without_response_closes_client() {
    let (backend, received) = start_fixed_backend(Vec::new());
    let proxy = start_proxy(test_config(backend));

    assert!(exchange(proxy.addr, &post("/", b"abc")).is_empty());
    assert_eq!(received.lock().unwrap().len(), 1);
}

#[test]
fn client_leaving_early_does_not_disturb_others() {
    let (backend, _) = start_fixed_backend(http_response(b"ok"));
    let proxy = start_proxy(test_config(backend));

    for _ in 0..8 {
        let mut gone = connect(proxy.addr);
        gone.write_all(b"POST / HTTP/1.1\r\n").unwrap();
    }

    assert_eq!(exchange(proxy.addr, &post("/", b"")), http_response(b"ok"));
}

#[test]
fn connections_over_the_limit_are_closed_immediately() {
    let (backend, _) = start_fixed_backend(http_response(b"first"));
    let mut config = test_config(backend);
    config.listener.max_connections = 1;
    let proxy = start_proxy(config);

    let mut first = connect(proxy.addr);
    first.write_all(b"POST / HTTP/1.1\r\n").unwrap();
    thread::sleep(Duration::from_millis(100));

    let mut second = connect(proxy.addr);
    assert!(read_all(&mut second).is_empty());

    first.write_all(b"Content-Length: 0\r\n\r\n").unwrap();
    assert_eq!(read_all(&mut first), http_response(b"first"));
}

#[test]
fn idle_client_is_timed_out() {
    let (backend, _) = start_fixed_backend(http_response(b"ok"));
    let mut config = test_config(backend);
    config.timeouts.idle_secs = 1;
    let proxy = start_proxy(config);

    let started = Instant::now();
    let mut idle = connect(proxy.addr);
    idle.write_all(b"GET / HTTP/1.1\r\n").unwrap();

    assert!(read_all(&mut idle).is_empty());
    assert!(started.elapsed() >= Duration::from_millis(900));
}

#[test]
fn silent_backend_is_bounded_by_idle_timeout() {
    // Reads the request, then neither answers nor closes.
    let backend = start_keepalive_backend(Vec::new());
    let mut config = test_config(backend);
    config.timeouts.idle_secs = 1;
    let proxy = start_proxy(config);

    let mut client = connect(proxy.addr);
    client.write_all(&post("/", b"x")).unwrap();
    let mut buf = [0u8; 16];
    assert_eq!(client.read(&mut buf).unwrap_or(0), 0);
}
