use crate::reactor::event::{Change, ChangeList, Event, Events, Interest, Readiness};

use libc::{
    EV_ADD, EV_DELETE, EV_ENABLE, EV_EOF, EV_ERROR, EVFILT_READ, EVFILT_WRITE, close, kevent,
    kqueue, timespec,
};
use std::io;
use std::mem;
use std::os::fd::RawFd;
use std::ptr;
use std::time::Duration;

/// kqueue backend. Changes and events travel through one `kevent()` call.
pub(crate) struct Poller {
    queue: RawFd,
    changes: Vec<kevent>,
    events: Vec<kevent>,
}

impl Poller {
    pub(crate) fn new(capacity: usize) -> io::Result<Self> {
        let queue = unsafe { kqueue() };
        if queue < 0 {
            return Err(io::Error::last_os_error());
        }

        let empty: kevent = unsafe { mem::zeroed() };

        Ok(Self {
            queue,
            changes: Vec::new(),
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

        self.changes.clear();
        for change in changes.iter() {
            match *change {
                Change::Register {
                    file_descriptor,
                    interest,
                } => self.changes.push(add(file_descriptor, interest)),
                Change::Reregister {
                    file_descriptor,
                    from,
                    to,
                } => {
                    self.changes.push(delete(file_descriptor, from));
                    self.changes.push(add(file_descriptor, to));
                }
            }
        }

        let ts = timeout.map(|duration| timespec {
            tv_sec: duration.as_secs() as _,
            tv_nsec: duration.subsec_nanos() as _,
        });
        let ts_ptr = ts
            .as_ref()
            .map_or(ptr::null(), |ts| ts as *const timespec);

        // Leave room for one EV_ERROR per change on top of the ready events,
        // otherwise a rejected change fails the whole call.
        let capacity = events.capacity() + self.changes.len();
        if self.events.len() < capacity {
            let empty: kevent = unsafe { mem::zeroed() };
            self.events.resize(capacity, empty);
        }
        let n_events = unsafe {
            kevent(
                self.queue,
                self.changes.as_ptr(),
                self.changes.len() as _,
                self.events.as_mut_ptr(),
                capacity as _,
                ts_ptr,
            )
        };

        // Even on EINTR every change has been applied.
        changes.clear();

        if n_events < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(());
            }

            return Err(err);
        }

        for raw in &self.events[..n_events as usize] {
            let event = translate(raw);
            if raw.flags & EV_ERROR != 0 {
                events.push_rejected(event);
            } else {
                // Registrations are level-triggered; anything cut off is reported again.
                events.push(event);
            }
        }

        Ok(())
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        unsafe {
            close(self.queue);
        }
    }
}

fn add(file_descriptor: RawFd, interest: Interest) -> kevent {
    let mut event: kevent = unsafe { mem::zeroed() };
    event.ident = file_descriptor as _;
    event.filter = filter(interest);
    event.flags = EV_ADD | EV_ENABLE;
    event
}

fn delete(file_descriptor: RawFd, interest: Interest) -> kevent {
    let mut event: kevent = unsafe { mem::zeroed() };
    event.ident = file_descriptor as _;
    event.filter = filter(interest);
    event.flags = EV_DELETE;
    event
}

fn filter(interest: Interest) -> i16 {
    match interest {
        Interest::Read => EVFILT_READ,
        Interest::Write => EVFILT_WRITE,
    }
}

fn translate(raw: &kevent) -> Event {
    let file_descriptor = raw.ident as RawFd;
    let data = raw.data as i64;

    // EV_ERROR marks a rejected change; EV_EOF with fflags set carries a socket error.
    let readiness = if raw.flags & EV_ERROR != 0 {
        Readiness::Error(data as i32)
    } else if raw.flags & EV_EOF != 0 {
        if raw.fflags != 0 {
            Readiness::Error(raw.fflags as i32)
        } else {
            Readiness::Hangup
        }
    } else if raw.filter == EVFILT_WRITE {
        Readiness::Writable
    } else {
        Readiness::Readable
    };

    Event::new(file_descriptor, readiness, Some(data.max(0) as usize))
}
