//! Listening socket setup, acceptance and raw stream I/O.

use crate::error::{Error, Result};

use libc::{
    AF_INET, F_GETFL, F_SETFL, O_NONBLOCK, SHUT_WR, SO_REUSEADDR, SOCK_STREAM, SOL_SOCKET, accept,
    bind, c_int, c_void, close, fcntl, getsockname, listen, read, setsockopt, shutdown, sockaddr,
    sockaddr_in, socket, socklen_t, write,
};
use std::io;
use std::mem;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::os::fd::{AsRawFd, RawFd};
use std::ptr;

/// Owned socket descriptor, closed on drop.
#[derive(Debug)]
pub struct Socket {
    file_descriptor: RawFd,
}

impl Socket {
    fn from_raw(file_descriptor: RawFd) -> Self {
        Self { file_descriptor }
    }

    pub(crate) fn read(&self, buffer: &mut [u8]) -> io::Result<usize> {
        let res = unsafe {
            read(
                self.file_descriptor,
                buffer.as_mut_ptr() as *mut c_void,
                buffer.len(),
            )
        };

        if res < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(res as usize)
    }

    pub(crate) fn write(&self, buffer: &[u8]) -> io::Result<usize> {
        let res = unsafe {
            write(
                self.file_descriptor,
                buffer.as_ptr() as *const c_void,
                buffer.len(),
            )
        };

        if res < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(res as usize)
    }

    /// Sends FIN to the peer while keeping the read side open.
    pub(crate) fn shutdown_write(&self) -> io::Result<()> {
        if unsafe { shutdown(self.file_descriptor, SHUT_WR) } < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(())
    }
}

impl AsRawFd for Socket {
    fn as_raw_fd(&self) -> RawFd {
        self.file_descriptor
    }
}

impl Drop for Socket {
    fn drop(&mut self) {
        unsafe {
            close(self.file_descriptor);
        }
    }
}

/// The process-wide listening socket.
#[derive(Debug)]
pub struct Listener {
    socket: Socket,
}

impl Listener {
    /// Returns the address the listener is bound to.
    ///
    /// Useful after binding port `0` to find the port the kernel picked.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        let mut address: sockaddr_in = unsafe { mem::zeroed() };
        let mut length = mem::size_of::<sockaddr_in>() as socklen_t;
        let result = unsafe {
            getsockname(
                self.socket.as_raw_fd(),
                &mut address as *mut _ as *mut sockaddr,
                &mut length,
            )
        };

        if result < 0 {
            return Err(io::Error::last_os_error());
        }

        let ip = Ipv4Addr::from(u32::from_be(address.sin_addr.s_addr));
        let port = u16::from_be(address.sin_port);

        Ok(SocketAddr::V4(SocketAddrV4::new(ip, port)))
    }

    /// Accepts one pending connection.
    ///
    /// The returned socket is still in blocking mode.
    pub(crate) fn accept(&self) -> io::Result<Socket> {
        let file_descriptor =
            unsafe { accept(self.socket.as_raw_fd(), ptr::null_mut(), ptr::null_mut()) };

        if file_descriptor < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(Socket::from_raw(file_descriptor))
    }
}

impl AsRawFd for Listener {
    fn as_raw_fd(&self) -> RawFd {
        self.socket.as_raw_fd()
    }
}

/// Creates a non-blocking listening socket bound to `address:port`.
///
/// Steps, in order:
/// 1. create an IPv4 stream socket
/// 2. set `SO_REUSEADDR` so a restart does not trip over `TIME_WAIT`
/// 3. bind
/// 4. switch to non-blocking mode
/// 5. listen with the given backlog
///
/// Any failure is returned as the matching [`Error`] variant; the socket is
/// closed before returning.
///
/// # Example
/// ```no_run
/// use pulse::reactor::socket::create_listener;
/// use std::net::Ipv4Addr;
///
/// let listener = create_listener(Ipv4Addr::UNSPECIFIED, 9091, 10240)?;
/// println!("listening on {}", listener.local_addr()?);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn create_listener(address: Ipv4Addr, port: u16, backlog: i32) -> Result<Listener> {
    let file_descriptor = unsafe { socket(AF_INET, SOCK_STREAM, 0) };
    if file_descriptor < 0 {
        return Err(Error::Socket(io::Error::last_os_error()));
    }

    let socket = Socket::from_raw(file_descriptor);

    let enable: c_int = 1;
    let ret = unsafe {
        setsockopt(
            file_descriptor,
            SOL_SOCKET,
            SO_REUSEADDR,
            &enable as *const c_int as *const c_void,
            mem::size_of::<c_int>() as socklen_t,
        )
    };

    if ret < 0 {
        return Err(Error::SetOption {
            option: "SO_REUSEADDR",
            source: io::Error::last_os_error(),
        });
    }

    let socket_address = to_sockaddr(address, port);
    let ret = unsafe {
        bind(
            file_descriptor,
            &socket_address as *const sockaddr_in as *const sockaddr,
            mem::size_of::<sockaddr_in>() as socklen_t,
        )
    };

    if ret < 0 {
        return Err(Error::Bind {
            address,
            port,
            source: io::Error::last_os_error(),
        });
    }

    set_nonblocking(file_descriptor).map_err(|source| Error::NonBlocking {
        file_descriptor,
        source,
    })?;

    let ret = unsafe { listen(file_descriptor, backlog) };
    if ret < 0 {
        return Err(Error::Listen(io::Error::last_os_error()));
    }

    Ok(Listener { socket })
}

/// Sets `O_NONBLOCK` on a descriptor, keeping its other status flags.
pub fn set_nonblocking(file_descriptor: RawFd) -> io::Result<()> {
    let flags = unsafe { fcntl(file_descriptor, F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }

    if unsafe { fcntl(file_descriptor, F_SETFL, flags | O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

fn to_sockaddr(address: Ipv4Addr, port: u16) -> sockaddr_in {
    let mut socket_address: sockaddr_in = unsafe { mem::zeroed() };

    #[cfg(any(
        target_os = "macos",
        target_os = "ios",
        target_os = "freebsd",
        target_os = "dragonfly",
        target_os = "openbsd"
    ))]
    {
        socket_address.sin_len = mem::size_of::<sockaddr_in>() as u8;
    }

    socket_address.sin_family = AF_INET as _;
    socket_address.sin_port = port.to_be();
    socket_address.sin_addr.s_addr = u32::from(address).to_be();

    socket_address
}
