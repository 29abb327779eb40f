//! Kernel readiness backends.
//!
//! Both expose the same `Poller` with a single `submit_and_wait` entry point:
//! flush the pending [`ChangeList`](super::event::ChangeList), block until
//! something is ready, and fill an [`Events`](super::event::Events) batch.

#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "dragonfly",
    target_os = "openbsd"
))]
mod kqueue;

#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "dragonfly",
    target_os = "openbsd"
))]
pub(crate) use kqueue::Poller;

#[cfg(any(target_os = "linux", target_os = "android"))]
mod epoll;

#[cfg(any(target_os = "linux", target_os = "android"))]
pub(crate) use epoll::Poller;

#[cfg(not(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "dragonfly",
    target_os = "openbsd",
    target_os = "linux",
    target_os = "android"
)))]
compile_error!("pulse needs kqueue or epoll");
