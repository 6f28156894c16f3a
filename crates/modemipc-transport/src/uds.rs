use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::IpcStream;

/// Listening Unix domain socket standing in for a baseband endpoint.
///
/// Used by the emulator and by tests. The socket file is removed on drop
/// unless something else has replaced it in the meantime.
pub struct SocketEndpoint {
    listener: UnixListener,
    path: PathBuf,
    identity: (u64, u64),
}

impl SocketEndpoint {
    /// Permission mode applied to created socket files.
    pub const SOCKET_MODE: u32 = 0o600;
    /// `sockaddr_un.sun_path` capacity.
    #[cfg(target_os = "linux")]
    const MAX_PATH_LEN: usize = 108;
    #[cfg(not(target_os = "linux"))]
    const MAX_PATH_LEN: usize = 104;

    /// Bind and listen at `path`, replacing a stale socket file if present.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let bind_err = |source: std::io::Error| TransportError::Bind {
            path: path.clone(),
            source,
        };

        let len = path.as_os_str().len();
        if len >= Self::MAX_PATH_LEN {
            return Err(TransportError::PathTooLong {
                path,
                len,
                max: Self::MAX_PATH_LEN,
            });
        }

        if let Ok(existing) = std::fs::symlink_metadata(&path) {
            if !existing.file_type().is_socket() {
                return Err(bind_err(std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    "existing path is not a unix socket",
                )));
            }
            debug!(?path, "removing stale socket");
            std::fs::remove_file(&path).map_err(bind_err)?;
        }

        let listener = UnixListener::bind(&path).map_err(bind_err)?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(Self::SOCKET_MODE))
            .map_err(bind_err)?;
        let created = std::fs::symlink_metadata(&path).map_err(bind_err)?;

        info!(?path, "baseband endpoint listening");

        Ok(Self {
            listener,
            identity: (created.dev(), created.ino()),
            path,
        })
    }

    /// Accept one host connection (blocking).
    pub fn accept(&self) -> Result<IpcStream> {
        let (stream, _addr) = self.listener.accept().map_err(TransportError::Accept)?;
        debug!(path = ?self.path, "host connected");
        Ok(IpcStream::from_unix(stream))
    }

    /// Connect to a listening endpoint (blocking).
    pub fn connect(path: impl AsRef<Path>) -> Result<IpcStream> {
        let path = path.as_ref();
        let stream = UnixStream::connect(path).map_err(|e| TransportError::Connect {
            path: path.to_path_buf(),
            source: e,
        })?;
        debug!(?path, "connected to baseband endpoint");
        Ok(IpcStream::from_unix(stream))
    }

    /// The path this endpoint is bound to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SocketEndpoint {
    fn drop(&mut self) {
        let Ok(metadata) = std::fs::symlink_metadata(&self.path) else {
            return;
        };
        if metadata.file_type().is_socket() && (metadata.dev(), metadata.ino()) == self.identity {
            debug!(path = ?self.path, "removing socket file");
            let _ = std::fs::remove_file(&self.path);
        } else {
            debug!(path = ?self.path, "socket path replaced; leaving it alone");
        }
    }
}

/// Open whatever lives at `path`: a socket is connected to, anything else is
/// opened as a modem device node.
pub fn open_endpoint(path: impl AsRef<Path>) -> Result<IpcStream> {
    let path = path.as_ref();
    let is_socket = std::fs::metadata(path)
        .map(|m| m.file_type().is_socket())
        .unwrap_or(false);
    if is_socket {
        SocketEndpoint::connect(path)
    } else {
        IpcStream::open_device(path)
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};

    use super::*;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("modemipc-{tag}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn bind_accept_connect() {
        let dir = scratch_dir("uds");
        let sock_path = dir.join("fmt.sock");

        let endpoint = SocketEndpoint::bind(&sock_path).unwrap();
        let mode = std::fs::metadata(&sock_path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, SocketEndpoint::SOCKET_MODE);

        let path_clone = sock_path.clone();
        let host = std::thread::spawn(move || {
            let mut stream = open_endpoint(&path_clone).unwrap();
            stream.write_all(b"hello").unwrap();
        });

        let mut modem = endpoint.accept().unwrap();
        let mut buf = [0u8; 5];
        modem.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");
        host.join().unwrap();

        drop(endpoint);
        assert!(!sock_path.exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn path_too_long() {
        let long_path = "/tmp/".to_string() + &"m".repeat(200) + ".sock";
        let result = SocketEndpoint::bind(&long_path);
        assert!(matches!(result, Err(TransportError::PathTooLong { .. })));
    }

    #[test]
    fn bind_refuses_regular_file() {
        let dir = scratch_dir("uds-file");
        let path = dir.join("not-a-socket");
        std::fs::write(&path, b"data").unwrap();

        let result = SocketEndpoint::bind(&path);
        assert!(matches!(result, Err(TransportError::Bind { .. })));
        assert!(path.exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn drop_leaves_replaced_path() {
        let dir = scratch_dir("uds-replaced");
        let path = dir.join("rfs.sock");

        let endpoint = SocketEndpoint::bind(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        std::fs::write(&path, b"replacement").unwrap();

        drop(endpoint);
        assert!(path.exists());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
