/// Errors that can occur while encoding or decoding messages.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The length field is smaller than the header itself.
    #[error("invalid frame length {length} (header alone is {min} bytes)")]
    InvalidLength { length: usize, min: usize },

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing messages.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The channel was closed, possibly in the middle of a message.
    #[error("connection closed")]
    ConnectionClosed,
}

impl FrameError {
    /// The peer went away: clean EOF, or a reset or broken pipe from a peer
    /// that exited with data still unread.
    pub fn is_disconnect(&self) -> bool {
        match self {
            Self::ConnectionClosed => true,
            Self::Io(io) => matches!(
                io.kind(),
                std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
            ),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;

#[cfg(test)]
mod tests {
    use std::io::{Error, ErrorKind};

    use super::*;

    #[test]
    fn resets_and_eof_are_disconnects() {
        assert!(FrameError::ConnectionClosed.is_disconnect());
        assert!(FrameError::Io(Error::from(ErrorKind::ConnectionReset)).is_disconnect());
        assert!(FrameError::Io(Error::from(ErrorKind::ConnectionAborted)).is_disconnect());
        assert!(FrameError::Io(Error::from(ErrorKind::BrokenPipe)).is_disconnect());

        assert!(!FrameError::Io(Error::from(ErrorKind::WouldBlock)).is_disconnect());
        assert!(!FrameError::InvalidLength { length: 3, min: 7 }.is_disconnect());
    }
}
