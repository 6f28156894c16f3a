use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::Duration;

use tracing::debug;

use crate::error::{Result, TransportError};
use crate::readiness::{wait_fd, Interest, Readiness};

/// A connected byte stream to a baseband endpoint — implements Read + Write.
///
/// Either a modem character device (the FMT or RFS node exposed by the
/// kernel driver) or a Unix domain socket, which is what the emulator and
/// the tests speak.
pub struct IpcStream {
    inner: IpcStreamInner,
}

enum IpcStreamInner {
    Unix(UnixStream),
    Device(File),
}

impl Read for IpcStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            IpcStreamInner::Unix(stream) => stream.read(buf),
            IpcStreamInner::Device(file) => file.read(buf),
        }
    }
}

impl Write for IpcStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            IpcStreamInner::Unix(stream) => stream.write(buf),
            IpcStreamInner::Device(file) => file.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            IpcStreamInner::Unix(stream) => stream.flush(),
            IpcStreamInner::Device(file) => file.flush(),
        }
    }
}

impl IpcStream {
    pub(crate) fn from_unix(stream: UnixStream) -> Self {
        Self {
            inner: IpcStreamInner::Unix(stream),
        }
    }

    /// Open a modem device node for reading and writing.
    ///
    /// The node must already be booted; this does not run any ioctl sequence.
    pub fn open_device(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY)
            .open(path)
            .map_err(|e| TransportError::Open {
                path: path.to_path_buf(),
                source: e,
            })?;
        debug!(?path, "opened modem device");
        Ok(Self {
            inner: IpcStreamInner::Device(file),
        })
    }

    /// A connected in-process pair, handy for loopback setups.
    pub fn pair() -> Result<(Self, Self)> {
        let (left, right) = UnixStream::pair()?;
        Ok((Self::from_unix(left), Self::from_unix(right)))
    }

    /// Set read timeout on the underlying stream.
    ///
    /// Device nodes have no kernel-level timeouts; only `None` is accepted.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match &self.inner {
            IpcStreamInner::Unix(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
            IpcStreamInner::Device(_) => device_timeout(timeout),
        }
    }

    /// Set write timeout on the underlying stream.
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match &self.inner {
            IpcStreamInner::Unix(stream) => stream.set_write_timeout(timeout).map_err(Into::into),
            IpcStreamInner::Device(_) => device_timeout(timeout),
        }
    }

    /// Try to clone this stream (creates a new file descriptor).
    pub fn try_clone(&self) -> Result<Self> {
        let inner = match &self.inner {
            IpcStreamInner::Unix(stream) => IpcStreamInner::Unix(stream.try_clone()?),
            IpcStreamInner::Device(file) => IpcStreamInner::Device(file.try_clone()?),
        };
        Ok(Self { inner })
    }

    /// Block until the stream matches `interest` or `timeout` elapses.
    pub fn wait_ready(&self, interest: Interest, timeout: Option<Duration>) -> Result<Readiness> {
        wait_fd(self.as_raw_fd(), interest, timeout)
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match &self.inner {
            IpcStreamInner::Unix(_) => "unix-domain-socket",
            IpcStreamInner::Device(_) => "modem-device",
        }
    }
}

fn device_timeout(timeout: Option<Duration>) -> Result<()> {
    match timeout {
        None => Ok(()),
        Some(_) => Err(TransportError::Io(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "modem device nodes do not support I/O timeouts",
        ))),
    }
}

impl AsRawFd for IpcStream {
    fn as_raw_fd(&self) -> RawFd {
        match &self.inner {
            IpcStreamInner::Unix(stream) => stream.as_raw_fd(),
            IpcStreamInner::Device(file) => file.as_raw_fd(),
        }
    }
}

impl std::fmt::Debug for IpcStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpcStream")
            .field("type", &self.transport_name())
            .field("fd", &self.as_raw_fd())
            .finish()
    }
}
