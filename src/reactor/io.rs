use crate::reactor::event::Interest;
use crate::reactor::socket::Socket;

use std::time::Instant;

/// Where a connection is in its single request/response exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    AwaitingRead,
    /// `written` bytes of the response have been flushed so far.
    AwaitingWrite { written: usize },
    /// Response sent and write side shut down; reading until the peer's EOF.
    Draining,
}

pub(crate) struct Connection {
    pub(crate) socket: Socket,
    pub(crate) state: ConnectionState,
    pub(crate) received: usize,
    pub(crate) last_activity: Instant,
}

impl Connection {
    pub(crate) fn new(socket: Socket) -> Self {
        Self {
            socket,
            state: ConnectionState::AwaitingRead,
            received: 0,
            last_activity: Instant::now(),
        }
    }

    /// The readiness kind this connection is registered for.
    pub(crate) fn interest(&self) -> Interest {
        match self.state {
            ConnectionState::AwaitingRead | ConnectionState::Draining => Interest::Read,
            ConnectionState::AwaitingWrite { .. } => Interest::Write,
        }
    }

    pub(crate) fn touch(&mut self) {
        self.last_activity = Instant::now();
    }
}
