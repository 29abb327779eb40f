use pulse::{EventLoop, ServerBuilder, Stats};

use std::io::{Read, Write};
use std::mem;
use std::net::{Ipv4Addr, Shutdown, TcpStream as StdTcpStream};
use std::os::fd::AsRawFd;
use std::thread;
use std::time::{Duration, Instant};

fn local_loop() -> EventLoop {
    ServerBuilder::new()
        .address(Ipv4Addr::LOCALHOST)
        .port(0)
        .build()
        .expect("build event loop")
}

/// Turns the loop until `done` holds, failing after a few seconds.
fn drive(event_loop: &mut EventLoop, done: impl Fn(&Stats) -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);

    while !done(&event_loop.stats()) {
        assert!(Instant::now() < deadline, "timed out: {:?}", event_loop.stats());
        event_loop.turn(Some(Duration::from_millis(20))).expect("turn");
    }
}

#[test]
fn test_listener_registered_before_first_wait() {
    let event_loop = local_loop();

    assert_eq!(event_loop.pending_changes().len(), 1);
    assert_eq!(event_loop.connections(), 0);
}

#[test]
fn test_turn_times_out_without_events() {
    let mut event_loop = local_loop();

    event_loop.turn(Some(Duration::from_millis(10))).expect("turn");
    let handled = event_loop.turn(Some(Duration::from_millis(10))).expect("turn");

    assert_eq!(handled, 0);
    assert!(event_loop.pending_changes().is_empty());
}

#[test]
fn test_pending_connections_accepted_in_one_turn() {
    let mut event_loop = local_loop();
    let address = event_loop.local_addr().expect("local addr");

    let clients: Vec<StdTcpStream> = (0..8)
        .map(|_| StdTcpStream::connect(address).expect("connect"))
        .collect();

    thread::sleep(Duration::from_millis(100));
    event_loop.turn(Some(Duration::from_secs(1))).expect("turn");

    let stats = event_loop.stats();
    assert_eq!(stats.accepted, 8);
    assert_eq!(stats.accept_failures, 0);
    assert_eq!(event_loop.connections(), 8);
    assert_eq!(event_loop.pending_changes().len(), 8);

    drop(clients);
}

#[test]
fn test_peer_closing_before_sending_gets_no_response() {
    let mut event_loop = local_loop();
    let address = event_loop.local_addr().expect("local addr");

    let mut client = StdTcpStream::connect(address).expect("connect");
    client.shutdown(Shutdown::Write).expect("shutdown");

    drive(&mut event_loop, |stats| stats.closed == 1);

    let stats = event_loop.stats();
    assert_eq!(stats.requests, 0);
    assert_eq!(stats.responses, 0);
    assert_eq!(event_loop.connections(), 0);

    client
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("read timeout");
    let mut received = Vec::new();
    client.read_to_end(&mut received).expect("read_to_end");
    assert!(received.is_empty());
}

#[test]
fn test_dropped_client_is_closed() {
    let mut event_loop = local_loop();
    let address = event_loop.local_addr().expect("local addr");

    drop(StdTcpStream::connect(address).expect("connect"));

    drive(&mut event_loop, |stats| stats.closed == 1);
    assert_eq!(event_loop.stats().responses, 0);
    assert_eq!(event_loop.connections(), 0);
}

#[test]
fn test_concurrent_clients_get_full_response() {
    const CLIENTS: usize = 32;

    let mut event_loop = local_loop();
    let address = event_loop.local_addr().expect("local addr");
    let expected = event_loop.response().as_bytes().to_vec();

    let handles: Vec<_> = (0..CLIENTS)
        .map(|index| {
            thread::spawn(move || {
                let mut client = StdTcpStream::connect(address).expect("connect");
                client
                    .set_read_timeout(Some(Duration::from_secs(10)))
                    .expect("read timeout");
                client
                    .write_all(&vec![b'x'; index + 1])
                    .expect("write request");

                let mut received = Vec::new();
                client.read_to_end(&mut received).expect("read_to_end");
                received
            })
        })
        .collect();

    drive(&mut event_loop, |stats| stats.closed == CLIENTS as u64);

    for handle in handles {
        let received = handle.join().expect("client thread");
        assert_eq!(received, expected);
    }

    let stats = event_loop.stats();
    let sent: u64 = (1..=CLIENTS as u64).sum();
    assert_eq!(stats.accepted, CLIENTS as u64);
    assert_eq!(stats.requests, CLIENTS as u64);
    assert_eq!(stats.bytes_received, sent);
    assert_eq!(stats.responses, CLIENTS as u64);
    assert_eq!(stats.errors, 0);
    assert_eq!(event_loop.connections(), 0);
}

#[test]
fn test_idle_connection_is_swept() {
    let mut event_loop = ServerBuilder::new()
        .address(Ipv4Addr::LOCALHOST)
        .port(0)
        .idle_timeout(Duration::from_millis(100))
        .build()
        .expect("build event loop");
    let address = event_loop.local_addr().expect("local addr");

    let mut client = StdTcpStream::connect(address).expect("connect");

    drive(&mut event_loop, |stats| stats.idle_closed == 1);

    let stats = event_loop.stats();
    assert_eq!(stats.closed, 1);
    assert_eq!(stats.responses, 0);

    client
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("read timeout");
    let mut received = Vec::new();
    client.read_to_end(&mut received).expect("read_to_end");
    assert!(received.is_empty());
}

#[test]
fn test_reset_connection_is_closed_as_error() {
    let mut event_loop = local_loop();
    let address = event_loop.local_addr().expect("local addr");

    let client = StdTcpStream::connect(address).expect("connect");
    drive(&mut event_loop, |stats| stats.accepted == 1);

    // A zero linger turns the close into a reset.
    let linger = libc::linger {
        l_onoff: 1,
        l_linger: 0,
    };
    let ret = unsafe {
        libc::setsockopt(
            client.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_LINGER,
            &linger as *const libc::linger as *const libc::c_void,
            mem::size_of::<libc::linger>() as libc::socklen_t,
        )
    };
    assert_eq!(ret, 0, "setsockopt(SO_LINGER) failed");
    drop(client);

    drive(&mut event_loop, |stats| stats.closed == 1);

    let stats = event_loop.stats();
    assert_eq!(stats.errors, 1);
    assert_eq!(stats.responses, 0);
    assert_eq!(event_loop.connections(), 0);
}

#[test]
fn test_served_connection_waits_for_peer_eof() {
    let mut event_loop = local_loop();
    let address = event_loop.local_addr().expect("local addr");
    let expected = event_loop.response().as_bytes().to_vec();

    let mut client = StdTcpStream::connect(address).expect("connect");
    client
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("read timeout");
    client.write_all(b"x").expect("write request");

    drive(&mut event_loop, |stats| stats.responses == 1);

    // Response is out but the peer has not closed yet.
    assert_eq!(event_loop.stats().closed, 0);
    assert_eq!(event_loop.connections(), 1);

    let mut received = Vec::new();
    client.read_to_end(&mut received).expect("read_to_end");
    assert_eq!(received, expected);
    drop(client);

    drive(&mut event_loop, |stats| stats.closed == 1);

    let stats = event_loop.stats();
    assert!(stats.progressed >= 3, "accept, read and write: {stats:?}");
    assert_eq!(event_loop.connections(), 0);
}
