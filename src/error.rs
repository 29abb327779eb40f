//! Startup and loop failures.
//!
//! Per-connection problems never surface here: they close the connection in
//! question and the loop carries on. Everything in [`Error`] is fatal.

use std::io;
use std::net::Ipv4Addr;
use std::os::fd::RawFd;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to create readiness queue: {0}")]
    Poller(#[source] io::Error),

    #[error("failed to create listening socket: {0}")]
    Socket(#[source] io::Error),

    #[error("failed to set {option}: {source}")]
    SetOption {
        option: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("failed to bind {address}:{port}: {source}")]
    Bind {
        address: Ipv4Addr,
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("failed to listen: {0}")]
    Listen(#[source] io::Error),

    #[error("failed to make descriptor {file_descriptor} non-blocking: {source}")]
    NonBlocking {
        file_descriptor: RawFd,
        #[source]
        source: io::Error,
    },

    #[error("failed to wait for readiness events: {0}")]
    Wait(#[source] io::Error),
}
