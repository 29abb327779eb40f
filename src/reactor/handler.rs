//! Per-event connection state machine.
//!
//! | State          | Event              | Action                          | Next           |
//! |----------------|--------------------|---------------------------------|----------------|
//! | -              | listener readable  | accept, register for read       | AwaitingRead   |
//! | AwaitingRead   | readable, bytes    | discard bytes, switch to write  | AwaitingWrite  |
//! | AwaitingRead   | readable, EOF/err  | close                           | -              |
//! | AwaitingWrite  | writable, partial  | advance cursor                  | AwaitingWrite  |
//! | AwaitingWrite  | writable, complete | shut down writes, switch to read| Draining       |
//! | Draining       | readable / hangup  | discard until EOF, close        | -              |
//! | other          | hangup             | close                           | -              |
//! | any            | error              | log, close                      | -              |
//!
//! Draining exists because closing a socket with unread request bytes makes
//! the kernel send a reset, which can discard the tail of the response.

use crate::reactor::event::{Change, ChangeList, Event, Interest, Readiness};
use crate::reactor::io::{Connection, ConnectionState};
use crate::reactor::socket::{Listener, set_nonblocking};
use crate::response::Response;

use log::{debug, warn};
use std::collections::HashMap;
use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::time::{Duration, Instant};

/// Result of handling one readiness event for a connection.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The connection moved on, or wrote part of the response.
    Progressed,
    /// Nothing could be done yet; wait for the next readiness event.
    Retryable,
    /// The connection is finished and has been closed.
    ConnectionClosed,
}

/// Counters kept by the handler since startup.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub accepted: u64,
    pub accept_failures: u64,
    /// Connections that received at least one byte.
    pub requests: u64,
    pub bytes_received: u64,
    /// Responses flushed in full.
    pub responses: u64,
    pub partial_writes: u64,
    pub closed: u64,
    pub idle_closed: u64,
    /// Connections closed because the kernel reported an error on them.
    pub errors: u64,
    /// Events that moved some connection forward.
    pub progressed: u64,
    /// Events that found nothing to do.
    pub retried: u64,
}

pub(crate) struct ConnectionHandler {
    listener: Listener,
    connections: HashMap<RawFd, Connection>,
    buffer: Box<[u8]>,
    response: Response,
    stats: Stats,
}

impl ConnectionHandler {
    pub(crate) fn new(listener: Listener, response: Response, buffer_size: usize) -> Self {
        Self {
            listener,
            connections: HashMap::new(),
            buffer: vec![0u8; buffer_size.max(1)].into_boxed_slice(),
            response,
            stats: Stats::default(),
        }
    }

    pub(crate) fn listener(&self) -> &Listener {
        &self.listener
    }

    pub(crate) fn response(&self) -> &Response {
        &self.response
    }

    pub(crate) fn stats(&self) -> Stats {
        self.stats
    }

    pub(crate) fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Tallies the outcome of one handled event.
    pub(crate) fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Progressed => self.stats.progressed += 1,
            Outcome::Retryable => self.stats.retried += 1,
            Outcome::ConnectionClosed => {}
        }
    }

    /// Applies one readiness event, queueing any follow-up interest changes.
    pub(crate) fn handle(&mut self, event: &Event, changes: &mut ChangeList) -> Outcome {
        let file_descriptor = event.file_descriptor();

        if file_descriptor == self.listener.as_raw_fd() {
            if let Readiness::Error(code) = event.readiness() {
                warn!("listener error: {}", io::Error::from_raw_os_error(code));
                return Outcome::Retryable;
            }

            return self.accept_incoming(event.data(), changes);
        }

        let Some(connection) = self.connections.get_mut(&file_descriptor) else {
            debug!("event for unknown descriptor {file_descriptor}, ignoring");
            return Outcome::Retryable;
        };

        let outcome = match (event.readiness(), connection.state) {
            (Readiness::Error(code), _) => {
                self.stats.errors += 1;
                warn!(
                    "connection {file_descriptor} error: {}",
                    io::Error::from_raw_os_error(code)
                );
                Outcome::ConnectionClosed
            }
            (Readiness::Readable | Readiness::Hangup, ConnectionState::Draining) => {
                drain(connection, &mut self.buffer)
            }
            (Readiness::Hangup, _) => Outcome::ConnectionClosed,
            (Readiness::Readable, ConnectionState::AwaitingRead) => {
                read_request(connection, &mut self.buffer, &mut self.stats, changes)
            }
            (Readiness::Writable, ConnectionState::AwaitingWrite { written }) => write_response(
                connection,
                written,
                &self.response,
                &mut self.stats,
                changes,
            ),
            // Readiness left over from the interest this connection just dropped.
            _ => Outcome::Retryable,
        };

        if outcome == Outcome::ConnectionClosed {
            self.close(file_descriptor, changes);
        }

        outcome
    }

    /// Accepts `pending` connections, or until `accept` would block when the
    /// kernel did not say how many are waiting.
    fn accept_incoming(&mut self, pending: Option<usize>, changes: &mut ChangeList) -> Outcome {
        let mut attempts = 0;

        while pending.is_none_or(|pending| attempts < pending) {
            let socket = match self.listener.accept() {
                Ok(socket) => socket,
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    attempts += 1;
                    self.stats.accept_failures += 1;
                    warn!("accept failed: {err}");

                    // Without a count, a persistent failure such as EMFILE would spin.
                    if pending.is_none() {
                        break;
                    }
                    continue;
                }
            };

            attempts += 1;

            let file_descriptor = socket.as_raw_fd();
            if let Err(err) = set_nonblocking(file_descriptor) {
                self.stats.accept_failures += 1;
                warn!("failed to make connection {file_descriptor} non-blocking: {err}");
                continue;
            }

            changes.push(Change::register(file_descriptor, Interest::Read));
            self.connections.insert(file_descriptor, Connection::new(socket));
            self.stats.accepted += 1;

            debug!("accepted connection {file_descriptor}");
        }

        if attempts == 0 {
            Outcome::Retryable
        } else {
            Outcome::Progressed
        }
    }

    /// Closes every connection that has been quiet for at least `timeout`.
    pub(crate) fn close_idle(
        &mut self,
        timeout: Duration,
        now: Instant,
        changes: &mut ChangeList,
    ) -> usize {
        let idle: Vec<RawFd> = self
            .connections
            .iter()
            .filter(|(_, connection)| {
                now.saturating_duration_since(connection.last_activity) >= timeout
            })
            .map(|(file_descriptor, _)| *file_descriptor)
            .collect();

        for &file_descriptor in &idle {
            debug!("connection {file_descriptor} idle, closing");
            self.close(file_descriptor, changes);
        }

        self.stats.idle_closed += idle.len() as u64;
        idle.len()
    }

    fn close(&mut self, file_descriptor: RawFd, changes: &mut ChangeList) {
        // Dropping the socket closes it, which also removes it from the interest set.
        if let Some(connection) = self.connections.remove(&file_descriptor) {
            changes.cancel(file_descriptor);
            self.stats.closed += 1;

            debug!(
                "closed connection {file_descriptor} ({:?}, {} bytes received)",
                connection.interest(),
                connection.received
            );
        }
    }
}

/// Drains whatever the peer sent into the shared buffer and switches the
/// connection over to write interest.
fn read_request(
    connection: &mut Connection,
    buffer: &mut [u8],
    stats: &mut Stats,
    changes: &mut ChangeList,
) -> Outcome {
    let file_descriptor = connection.socket.as_raw_fd();
    let mut received = 0;

    loop {
        match connection.socket.read(buffer) {
            Ok(0) if received == 0 => return Outcome::ConnectionClosed,
            Ok(0) => break,
            Ok(n) => {
                received += n;
                if n < buffer.len() {
                    break;
                }
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                if received == 0 {
                    return Outcome::Retryable;
                }
                break;
            }
            Err(err) => {
                debug!("read from {file_descriptor} failed: {err}");
                return Outcome::ConnectionClosed;
            }
        }
    }

    connection.received += received;
    connection.state = ConnectionState::AwaitingWrite { written: 0 };
    connection.touch();

    stats.requests += 1;
    stats.bytes_received += received as u64;

    changes.push(Change::reregister(
        file_descriptor,
        Interest::Read,
        Interest::Write,
    ));

    Outcome::Progressed
}

/// Makes one write attempt from the connection's cursor.
///
/// Once the last byte is out, the write side is shut down and the connection
/// goes back to read interest to wait for the peer's EOF.
fn write_response(
    connection: &mut Connection,
    written: usize,
    response: &Response,
    stats: &mut Stats,
    changes: &mut ChangeList,
) -> Outcome {
    let file_descriptor = connection.socket.as_raw_fd();
    let remaining = &response.as_bytes()[written..];

    match connection.socket.write(remaining) {
        Ok(n) if n == remaining.len() => {
            stats.responses += 1;

            if let Err(err) = connection.socket.shutdown_write() {
                debug!("shutdown of {file_descriptor} failed: {err}");
                return Outcome::ConnectionClosed;
            }

            connection.state = ConnectionState::Draining;
            connection.touch();

            changes.push(Change::reregister(
                file_descriptor,
                Interest::Write,
                Interest::Read,
            ));

            Outcome::Progressed
        }
        Ok(0) => Outcome::Retryable,
        Ok(n) => {
            stats.partial_writes += 1;
            debug!(
                "short write to {file_descriptor}: {n} of {} bytes",
                remaining.len()
            );

            connection.state = ConnectionState::AwaitingWrite { written: written + n };
            connection.touch();

            Outcome::Progressed
        }
        Err(err)
            if matches!(
                err.kind(),
                io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
            ) =>
        {
            Outcome::Retryable
        }
        Err(err) => {
            debug!("write to {file_descriptor} failed: {err}");
            Outcome::ConnectionClosed
        }
    }
}

/// Discards whatever the peer still sends after the response, closing on EOF.
fn drain(connection: &mut Connection, buffer: &mut [u8]) -> Outcome {
    loop {
        match connection.socket.read(buffer) {
            Ok(0) => return Outcome::ConnectionClosed,
            Ok(_) => connection.touch(),
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => return Outcome::Retryable,
            Err(err) => {
                debug!(
                    "read from draining {} failed: {err}",
                    connection.socket.as_raw_fd()
                );
                return Outcome::ConnectionClosed;
            }
        }
    }
}
