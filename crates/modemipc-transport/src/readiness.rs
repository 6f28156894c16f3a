//! Readable/writable readiness for a raw file descriptor.

use std::os::fd::RawFd;
use std::time::Duration;

use crate::error::{Result, TransportError};

/// Conditions a caller wants to be woken for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interest {
    pub readable: bool,
    pub writable: bool,
}

impl Interest {
    pub const READABLE: Self = Self {
        readable: true,
        writable: false,
    };
    pub const WRITABLE: Self = Self {
        readable: false,
        writable: true,
    };
    pub const BOTH: Self = Self {
        readable: true,
        writable: true,
    };

    fn as_events(self) -> libc::c_short {
        let mut events = 0;
        if self.readable {
            events |= libc::POLLIN;
        }
        if self.writable {
            events |= libc::POLLOUT;
        }
        events
    }
}

/// Conditions reported by the kernel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Readiness {
    pub readable: bool,
    pub writable: bool,
    /// Peer hung up or the descriptor is in an error state.
    pub closed: bool,
}

impl Readiness {
    /// Nothing became ready before the timeout.
    pub fn is_idle(&self) -> bool {
        !self.readable && !self.writable && !self.closed
    }
}

/// Wait until `fd` matches `interest` or `timeout` elapses.
///
/// `None` blocks indefinitely. An interrupted wait reports idle readiness.
pub fn wait_fd(fd: RawFd, interest: Interest, timeout: Option<Duration>) -> Result<Readiness> {
    let timeout_ms: libc::c_int = match timeout {
        None => -1,
        Some(d) => d.as_millis().min(libc::c_int::MAX as u128) as libc::c_int,
    };

    let mut pfd = libc::pollfd {
        fd,
        events: interest.as_events(),
        revents: 0,
    };

    // SAFETY: `pfd` is a single valid pollfd and the count passed is 1.
    let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
    if rc < 0 {
        let err = std::io::Error::last_os_error();
        if err.kind() == std::io::ErrorKind::Interrupted {
            return Ok(Readiness::default());
        }
        return Err(TransportError::Poll(err));
    }

    let revents = pfd.revents;
    Ok(Readiness {
        readable: revents & libc::POLLIN != 0,
        writable: revents & libc::POLLOUT != 0,
        closed: revents & (libc::POLLHUP | libc::POLLERR | libc::POLLNVAL) != 0,
    })
}
