use crate::builder::ServerConfig;
use crate::error::{Error, Result};
use crate::reactor::event::{Change, ChangeList, Events, Interest};
use crate::reactor::handler::{ConnectionHandler, Stats};
use crate::reactor::poller::Poller;
use crate::reactor::socket::Listener;
use crate::response::Response;

use log::debug;
use std::convert::Infallible;
use std::io;
use std::net::SocketAddr;
use std::os::fd::AsRawFd;
use std::time::{Duration, Instant};

const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(10);

/// The single-threaded readiness loop.
///
/// Each [`turn`](Self::turn) submits the interest changes queued by the
/// previous turn, blocks in the kernel until something is ready, and runs
/// every ready event through the connection state machine. The wait is the
/// only place the loop ever blocks.
///
/// Built by [`ServerBuilder`](crate::ServerBuilder).
pub struct EventLoop {
    poller: Poller,
    events: Events,
    changes: ChangeList,
    handler: ConnectionHandler,
    idle_timeout: Option<Duration>,
    last_sweep: Instant,
}

impl EventLoop {
    pub(crate) fn new(
        listener: Listener,
        response: Response,
        config: &ServerConfig,
    ) -> Result<Self> {
        let poller = Poller::new(config.max_events).map_err(Error::Poller)?;

        let mut changes = ChangeList::new();
        changes.push(Change::register(listener.as_raw_fd(), Interest::Read));

        Ok(Self {
            poller,
            events: Events::with_capacity(config.max_events),
            changes,
            handler: ConnectionHandler::new(listener, response, config.read_buffer_size),
            idle_timeout: config.idle_timeout,
            last_sweep: Instant::now(),
        })
    }

    /// Address of the listening socket.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.handler.listener().local_addr()
    }

    pub fn response(&self) -> &Response {
        self.handler.response()
    }

    pub fn stats(&self) -> Stats {
        self.handler.stats()
    }

    /// Number of connections currently open.
    pub fn connections(&self) -> usize {
        self.handler.connection_count()
    }

    /// Interest changes waiting for the next wait.
    pub fn pending_changes(&self) -> &ChangeList {
        &self.changes
    }

    /// Runs one iteration: submit, wait, dispatch.
    ///
    /// `timeout` bounds the wait; `None` blocks until an event arrives. When
    /// an idle timeout is configured, overdue connections are swept after
    /// dispatching.
    ///
    /// # Returns
    /// The number of events handled.
    pub fn turn(&mut self, timeout: Option<Duration>) -> Result<usize> {
        self.poller
            .submit_and_wait(&mut self.changes, &mut self.events, timeout)
            .map_err(Error::Wait)?;

        for event in self.events.iter() {
            let outcome = self.handler.handle(event, &mut self.changes);
            self.handler.record(outcome);
        }

        if let Some(idle_timeout) = self.idle_timeout {
            let now = Instant::now();
            if now.saturating_duration_since(self.last_sweep) >= sweep_interval(idle_timeout) {
                let closed = self.handler.close_idle(idle_timeout, now, &mut self.changes);
                if closed > 0 {
                    debug!("closed {closed} idle connections");
                }
                self.last_sweep = now;
            }
        }

        Ok(self.events.len())
    }

    /// Runs until a wait fails. There is no other way out.
    pub fn run(&mut self) -> Result<Infallible> {
        let timeout = self.idle_timeout.map(sweep_interval);

        loop {
            self.turn(timeout)?;
        }
    }
}

fn sweep_interval(idle_timeout: Duration) -> Duration {
    (idle_timeout / 2).max(MIN_SWEEP_INTERVAL)
}
