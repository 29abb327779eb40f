//! Portable readiness events and interest changes.
//!
//! The backends in [`poller`](super::poller) translate between these types and
//! the kernel's own structures.

use std::os::fd::RawFd;
use std::slice;

/// Readiness kind a descriptor can be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    Read,
    Write,
}

/// A request to start or switch monitoring of a descriptor.
///
/// There is no removal request: closing a descriptor drops it from the
/// kernel's interest set, and [`ChangeList::cancel`] discards anything still
/// queued for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Register {
        file_descriptor: RawFd,
        interest: Interest,
    },
    Reregister {
        file_descriptor: RawFd,
        from: Interest,
        to: Interest,
    },
}

impl Change {
    pub fn register(file_descriptor: RawFd, interest: Interest) -> Self {
        Self::Register {
            file_descriptor,
            interest,
        }
    }

    pub fn reregister(file_descriptor: RawFd, from: Interest, to: Interest) -> Self {
        Self::Reregister {
            file_descriptor,
            from,
            to,
        }
    }

    pub fn file_descriptor(&self) -> RawFd {
        match *self {
            Self::Register {
                file_descriptor, ..
            }
            | Self::Reregister {
                file_descriptor, ..
            } => file_descriptor,
        }
    }
}

/// Interest changes accumulated during one loop iteration.
///
/// Order is preserved. The whole list is handed to the kernel by the next
/// wait and is empty afterwards.
#[derive(Debug, Default)]
pub struct ChangeList {
    changes: Vec<Change>,
}

impl ChangeList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, change: Change) {
        self.changes.push(change);
    }

    /// Drops every queued change for `file_descriptor`.
    ///
    /// Must be called when the descriptor is closed, before its number can be
    /// handed out again by `accept`.
    pub fn cancel(&mut self, file_descriptor: RawFd) {
        self.changes
            .retain(|change| change.file_descriptor() != file_descriptor);
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn iter(&self) -> slice::Iter<'_, Change> {
        self.changes.iter()
    }

    pub(crate) fn clear(&mut self) {
        self.changes.clear();
    }
}

/// What the kernel reported for a descriptor.
///
/// When a kernel event carries several conditions the most severe wins:
/// `Error`, then `Hangup`, then plain readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Readable,
    Writable,
    /// The peer closed its side of the connection.
    Hangup,
    /// The descriptor is in error. Holds the OS error code, `0` if unknown.
    Error(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    file_descriptor: RawFd,
    readiness: Readiness,
    data: Option<usize>,
}

impl Event {
    pub fn new(file_descriptor: RawFd, readiness: Readiness, data: Option<usize>) -> Self {
        Self {
            file_descriptor,
            readiness,
            data,
        }
    }

    pub fn file_descriptor(&self) -> RawFd {
        self.file_descriptor
    }

    pub fn readiness(&self) -> Readiness {
        self.readiness
    }

    /// Filter-specific value reported by the kernel, when it reports one.
    ///
    /// For a listening socket this is the number of connections waiting to
    /// be accepted. kqueue always provides it, epoll never does.
    pub fn data(&self) -> Option<usize> {
        self.data
    }
}

/// A bounded batch of ready events filled by one wait.
#[derive(Debug)]
pub struct Events {
    events: Vec<Event>,
    capacity: usize,
}

impl Events {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);

        Self {
            events: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> slice::Iter<'_, Event> {
        self.events.iter()
    }

    /// Room left in this batch.
    pub(crate) fn remaining(&self) -> usize {
        self.capacity.saturating_sub(self.events.len())
    }

    /// Appends `event` unless the batch is full.
    pub(crate) fn push(&mut self, event: Event) -> bool {
        if self.events.len() == self.capacity {
            return false;
        }

        self.events.push(event);
        true
    }

    /// Appends the error event for a change the kernel refused, even past
    /// capacity. Dropping it would leave the connection registered for nothing.
    pub(crate) fn push_rejected(&mut self, event: Event) {
        self.events.push(event);
    }

    pub(crate) fn clear(&mut self) {
        self.events.clear();
    }
}
