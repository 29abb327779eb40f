use crate::reactor::event::{Change, ChangeList, Event, Events, Interest, Readiness};

use libc::{
    EPOLL_CLOEXEC, EPOLL_CTL_ADD, EPOLL_CTL_MOD, EPOLLERR, EPOLLHUP, EPOLLIN, EPOLLOUT,
    EPOLLRDHUP, SO_ERROR, SOL_SOCKET, c_int, c_void, close, epoll_create1, epoll_ctl, epoll_event,
    epoll_wait, getsockopt, socklen_t,
};
use std::io;
use std::mem;
use std::os::fd::RawFd;
use std::time::Duration;

/// epoll backend.
///
/// epoll has no batched registration, so each queued change costs one
/// `epoll_ctl` right before `epoll_wait`. A rejected change is reported as an
/// error event for its descriptor, the same way kqueue reports it.
pub(crate) struct Poller {
    epoll: RawFd,
    events: Vec<epoll_event>,
}

impl Poller {
    pub(crate) fn new(capacity: usize) -> io::Result<Self> {
        let epoll = unsafe { epoll_create1(EPOLL_CLOEXEC) };
        if epoll < 0 {
            return Err(io::Error::last_os_error());
        }

        let empty = epoll_event { events: 0, u64: 0 };

        Ok(Self {
            epoll,
            events: vec![empty; capacity.max(1)],
        })
    }

    pub(crate) fn submit_and_wait(
        &mut self,
        changes: &mut ChangeList,
        events: &mut Events,
        timeout: Option<Duration>,
    ) -> io::Result<()> {
        events.clear();

        for change in changes.iter() {
            let (op, file_descriptor, interest) = match *change {
                Change::Register {
                    file_descriptor,
                    interest,
                } => (EPOLL_CTL_ADD, file_descriptor, interest),
                Change::Reregister {
                    file_descriptor,
                    to,
                    ..
                } => (EPOLL_CTL_MOD, file_descriptor, to),
            };

            let mut event = epoll_event {
                events: mask(interest),
                u64: file_descriptor as u64,
            };

            if unsafe { epoll_ctl(self.epoll, op, file_descriptor, &mut event) } < 0 {
                let code = io::Error::last_os_error().raw_os_error().unwrap_or(0);
                events.push_rejected(Event::new(file_descriptor, Readiness::Error(code), None));
            }
        }

        changes.clear();

        // Rejected changes already filled the batch; hand them out first.
        let capacity = events.remaining().min(self.events.len());
        if capacity == 0 {
            return Ok(());
        }

        let timeout = if events.is_empty() {
            timeout_millis(timeout)
        } else {
            0
        };

        let n_events = unsafe {
            epoll_wait(
                self.epoll,
                self.events.as_mut_ptr(),
                capacity as c_int,
                timeout,
            )
        };

        if n_events < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(());
            }

            return Err(err);
        }

        for raw in &self.events[..n_events as usize] {
            let flags = raw.events;
            let file_descriptor = raw.u64 as RawFd;

            events.push(Event::new(
                file_descriptor,
                readiness(file_descriptor, flags),
                None,
            ));
        }

        Ok(())
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        unsafe {
            close(self.epoll);
        }
    }
}

fn mask(interest: Interest) -> u32 {
    match interest {
        Interest::Read => (EPOLLIN | EPOLLRDHUP) as u32,
        Interest::Write => EPOLLOUT as u32,
    }
}

fn readiness(file_descriptor: RawFd, flags: u32) -> Readiness {
    if flags & EPOLLERR as u32 != 0 {
        Readiness::Error(socket_error(file_descriptor))
    } else if flags & (EPOLLHUP | EPOLLRDHUP) as u32 != 0 {
        Readiness::Hangup
    } else if flags & EPOLLOUT as u32 != 0 {
        Readiness::Writable
    } else {
        Readiness::Readable
    }
}

/// Reads and clears the pending error on a socket, `0` if there is none.
fn socket_error(file_descriptor: RawFd) -> i32 {
    let mut code: c_int = 0;
    let mut length = mem::size_of::<c_int>() as socklen_t;
    let ret = unsafe {
        getsockopt(
            file_descriptor,
            SOL_SOCKET,
            SO_ERROR,
            &mut code as *mut c_int as *mut c_void,
            &mut length,
        )
    };

    if ret < 0 { 0 } else { code }
}

/// Milliseconds for `epoll_wait`, `-1` meaning forever.
///
/// Rounds up so a short non-zero timeout never turns into a busy poll.
fn timeout_millis(timeout: Option<Duration>) -> c_int {
    match timeout {
        None => -1,
        Some(duration) => {
            let millis = duration.as_nanos().div_ceil(1_000_000);
            millis.min(c_int::MAX as u128) as c_int
        }
    }
}
