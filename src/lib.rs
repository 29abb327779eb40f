//! Single-threaded, readiness-driven TCP server answering every connection
//! with one fixed HTTP response.
//!
//! # Architecture
//!
//! - **ServerBuilder**: configuration and startup
//! - **Response**: the fixed reply, built once
//! - **socket**: listening socket creation and non-blocking setup
//! - **Poller**: kqueue or epoll, batching interest changes with the wait
//! - **ConnectionHandler**: accept / read / write state machine
//! - **EventLoop**: submit changes, wait, dispatch, repeat

mod builder;
mod error;
pub mod reactor;
mod response;

pub use builder::{
    DEFAULT_BACKLOG, DEFAULT_MAX_EVENTS, DEFAULT_PORT, DEFAULT_READ_BUFFER_SIZE, ServerBuilder,
    ServerConfig,
};
pub use error::{Error, Result};
pub use reactor::core::EventLoop;
pub use reactor::handler::{Outcome, Stats};
pub use response::{DEFAULT_BODY_LENGTH, Response};
