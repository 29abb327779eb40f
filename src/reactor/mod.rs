//! Readiness-driven serving core.
//!
//! - [`core`]: the [`EventLoop`](core::EventLoop)
//! - [`event`]: portable events and interest changes
//! - [`handler`]: per-connection state machine
//! - [`socket`]: listening socket setup and raw socket I/O
//! - `poller`: kqueue / epoll backends
//! - `io`: connection state

pub mod core;
pub mod event;
pub mod handler;
pub(crate) mod io;
pub(crate) mod poller;
pub mod socket;
