use pulse::ServerBuilder;

use std::io::{Read, Write};
use std::net::{Ipv4Addr, SocketAddr, TcpStream as StdTcpStream};
use std::thread;
use std::time::Duration;

/// Starts a server on a kernel-chosen port in a background thread.
///
/// The loop never returns; the thread dies with the test process.
fn spawn_server(builder: ServerBuilder) -> SocketAddr {
    let mut server = builder
        .address(Ipv4Addr::LOCALHOST)
        .port(0)
        .build()
        .expect("build server");
    let address = server.local_addr().expect("local addr");

    thread::spawn(move || {
        let _ = server.run();
    });

    address
}

fn request(address: SocketAddr, payload: &[u8]) -> Vec<u8> {
    let mut client = StdTcpStream::connect(address).expect("connect");
    client
        .set_read_timeout(Some(Duration::from_secs(10)))
        .expect("read timeout");
    client.write_all(payload).expect("write request");

    let mut received = Vec::new();
    client.read_to_end(&mut received).expect("read_to_end");
    received
}

fn assert_fixed_response(received: &[u8], body_length: usize) {
    let head = format!("HTTP/1.1 200 OK\r\nContent-Length: {body_length}\r\n\r\n");
    assert!(
        received.starts_with(head.as_bytes()),
        "unexpected head: {:?}",
        String::from_utf8_lossy(&received[..received.len().min(64)])
    );

    let body = &received[head.len()..];
    assert_eq!(body.len(), body_length);
    assert!(
        body.iter()
            .enumerate()
            .all(|(index, &byte)| byte == b'a' + (index % 26) as u8)
    );
}

#[test]
fn test_single_byte_request_gets_fixed_response() {
    let address = spawn_server(ServerBuilder::new());

    let received = request(address, b"x");

    assert_fixed_response(&received, pulse::DEFAULT_BODY_LENGTH);
}

#[test]
fn test_http_request_is_ignored() {
    let address = spawn_server(ServerBuilder::new().body_length(100));

    let received = request(address, b"GET /anything HTTP/1.1\r\nHost: localhost\r\n\r\n");

    assert_fixed_response(&received, 100);
}

#[test]
fn test_repeated_connections_are_byte_identical() {
    let address = spawn_server(ServerBuilder::new());

    let first = request(address, b"a");
    for _ in 0..10 {
        assert_eq!(request(address, b"b"), first);
    }
}

#[test]
fn test_large_body_survives_partial_writes() {
    const BODY_LENGTH: usize = 8 * 1024 * 1024;
    let address = spawn_server(ServerBuilder::new().body_length(BODY_LENGTH));

    let received = request(address, b"x");

    assert_fixed_response(&received, BODY_LENGTH);
}

#[test]
fn test_small_event_batches_still_serve_everyone() {
    let address = spawn_server(ServerBuilder::new().max_events(1).read_buffer_size(1));

    let handles: Vec<_> = (0..16)
        .map(|_| thread::spawn(move || request(address, b"hello")))
        .collect();

    for handle in handles {
        let received = handle.join().expect("client thread");
        assert_fixed_response(&received, pulse::DEFAULT_BODY_LENGTH);
    }
}

#[test]
fn test_slow_client_does_not_stall_others() {
    let address = spawn_server(ServerBuilder::new());

    let _idle = StdTcpStream::connect(address).expect("connect idle client");

    let received = request(address, b"x");
    assert_fixed_response(&received, pulse::DEFAULT_BODY_LENGTH);
}

#[test]
fn test_request_in_two_segments_ends_with_clean_eof() {
    const BODY_LENGTH: usize = 8 * 1024 * 1024;
    let address = spawn_server(ServerBuilder::new().body_length(BODY_LENGTH));

    let mut client = StdTcpStream::connect(address).expect("connect");
    client
        .set_read_timeout(Some(Duration::from_secs(10)))
        .expect("read timeout");

    client.write_all(b"GET / HTTP/1.1\r\n").expect("write first segment");
    thread::sleep(Duration::from_millis(100));
    client.write_all(b"Host: x\r\n\r\n").expect("write second segment");
    thread::sleep(Duration::from_millis(300));

    let mut received = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        match client.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => received.extend_from_slice(&chunk[..n]),
            Err(err) => panic!("read failed after {} bytes: {err}", received.len()),
        }
    }

    assert_fixed_response(&received, BODY_LENGTH);
}
