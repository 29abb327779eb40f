//! Server configuration and the fluent builder that applies it.

use crate::error::Result;
use crate::reactor::core::EventLoop;
use crate::reactor::socket::create_listener;
use crate::response::{DEFAULT_BODY_LENGTH, Response};

use std::net::Ipv4Addr;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 9091;
pub const DEFAULT_BACKLOG: i32 = 10240;
pub const DEFAULT_MAX_EVENTS: usize = 4096;
pub const DEFAULT_READ_BUFFER_SIZE: usize = 4096;

/// Everything the server needs to know at startup.
///
/// The defaults are what the `pulse` binary runs with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub address: Ipv4Addr,
    pub port: u16,
    /// Completed connections the kernel queues before `accept`.
    pub backlog: i32,
    pub body_length: usize,
    /// Most events handled per wait.
    pub max_events: usize,
    pub read_buffer_size: usize,
    /// Close connections quiet for this long. `None` keeps them forever.
    pub idle_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: Ipv4Addr::UNSPECIFIED,
            port: DEFAULT_PORT,
            backlog: DEFAULT_BACKLOG,
            body_length: DEFAULT_BODY_LENGTH,
            max_events: DEFAULT_MAX_EVENTS,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            idle_timeout: None,
        }
    }
}

/// Builder for constructing an [`EventLoop`] with a fluent API.
///
/// # Example
/// ```no_run
/// use pulse::ServerBuilder;
/// use std::net::Ipv4Addr;
///
/// let mut server = ServerBuilder::new()
///     .address(Ipv4Addr::LOCALHOST)
///     .port(8080)
///     .build()?;
/// server.run()?;
/// # Ok::<(), pulse::Error>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct ServerBuilder {
    config: ServerConfig,
}

impl ServerBuilder {
    /// Creates a builder holding the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from an existing configuration.
    pub fn from_config(config: ServerConfig) -> Self {
        Self { config }
    }

    pub fn address(mut self, address: Ipv4Addr) -> Self {
        self.config.address = address;
        self
    }

    /// Port to listen on. `0` lets the kernel pick one.
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn backlog(mut self, backlog: i32) -> Self {
        self.config.backlog = backlog;
        self
    }

    pub fn body_length(mut self, body_length: usize) -> Self {
        self.config.body_length = body_length;
        self
    }

    pub fn max_events(mut self, max_events: usize) -> Self {
        self.config.max_events = max_events.max(1);
        self
    }

    pub fn read_buffer_size(mut self, read_buffer_size: usize) -> Self {
        self.config.read_buffer_size = read_buffer_size.max(1);
        self
    }

    pub fn idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.config.idle_timeout = Some(idle_timeout);
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Performs every startup step and returns the ready-to-run loop.
    ///
    /// Creates the listening socket, precomputes the response and opens the
    /// kernel readiness queue with the listener queued for read interest.
    ///
    /// # Returns
    /// An [`EventLoop`], or the first startup [`Error`](crate::Error).
    pub fn build(self) -> Result<EventLoop> {
        let listener = create_listener(self.config.address, self.config.port, self.config.backlog)?;
        let response = Response::fixed(self.config.body_length);

        EventLoop::new(listener, response, &self.config)
    }
}
