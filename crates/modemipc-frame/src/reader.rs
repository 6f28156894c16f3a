use std::io::{ErrorKind, Read};

use bytes::{Buf, BytesMut};
use modemipc_transport::IpcStream;
use tracing::warn;

use crate::codec::{decode_message, peek_frame_len, Direction, FrameConfig, Message, HEADER_SIZE};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete messages from any `Read` stream.
///
/// Handles partial reads internally. After a decode error the reader
/// resynchronizes on its own: an oversized frame is skipped by its declared
/// length, a corrupt length field discards everything buffered.
pub struct MessageReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
    direction: Direction,
    skip: usize,
}

impl<T: Read> MessageReader<T> {
    /// Create a reader with default configuration.
    pub fn new(inner: T, direction: Direction) -> Self {
        Self::with_config(inner, direction, FrameConfig::default())
    }

    /// Create a reader with explicit configuration.
    pub fn with_config(inner: T, direction: Direction, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
            direction,
            skip: 0,
        }
    }

    /// Read the next complete message (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached.
    pub fn read_message(&mut self) -> Result<Message> {
        loop {
            if let Some(msg) = self.decode_buffered()? {
                return Ok(msg);
            }
            self.fill()?;
        }
    }

    /// Perform at most one read and return a message if one is complete.
    ///
    /// Meant to be called when the stream has signalled readable, so the
    /// single read does not block. `Ok(None)` means more bytes are needed.
    pub fn try_read_message(&mut self) -> Result<Option<Message>> {
        if let Some(msg) = self.decode_buffered()? {
            return Ok(Some(msg));
        }
        if !self.fill()? {
            return Ok(None);
        }
        self.decode_buffered()
    }

    /// True when a complete message is already buffered and the next
    /// `try_read_message` will not touch the stream.
    pub fn has_buffered_message(&self) -> bool {
        let rest = self.buf.get(self.skip..).unwrap_or(&[]);
        match peek_frame_len(rest) {
            Some(total) => total < HEADER_SIZE || rest.len() >= total,
            None => false,
        }
    }

    fn decode_buffered(&mut self) -> Result<Option<Message>> {
        if self.skip > 0 {
            let n = self.skip.min(self.buf.len());
            self.buf.advance(n);
            self.skip -= n;
            if self.skip > 0 {
                return Ok(None);
            }
        }

        match decode_message(&mut self.buf, self.direction, self.config.max_payload_size) {
            Ok(msg) => Ok(msg),
            Err(err) => {
                self.resync(&err);
                Err(err)
            }
        }
    }

    fn resync(&mut self, err: &FrameError) {
        match err {
            FrameError::PayloadTooLarge { size, .. } => {
                warn!(size, "skipping oversized frame");
                self.skip = HEADER_SIZE + size;
            }
            _ => {
                warn!(dropped = self.buf.len(), "discarding buffered bytes after decode error");
                self.buf.clear();
            }
        }
    }

    /// One read into the buffer. Returns `false` if the read was interrupted
    /// or would block.
    fn fill(&mut self) -> Result<bool> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        let read = match self.inner.read(&mut chunk) {
            Ok(n) => n,
            Err(err) if err.kind() == ErrorKind::Interrupted => return Ok(false),
            Err(err) => return Err(FrameError::Io(err)),
        };

        if read == 0 {
            return Err(FrameError::ConnectionClosed);
        }

        self.buf.extend_from_slice(&chunk[..read]);
        Ok(true)
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl MessageReader<IpcStream> {
    /// Create a reader for `IpcStream` and apply the read timeout from config.
    pub fn with_config_ipc(
        inner: IpcStream,
        direction: Direction,
        config: FrameConfig,
    ) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, direction, config))
    }
}

pub(crate) fn transport_to_frame_error(err: modemipc_transport::TransportError) -> FrameError {
    match err {
        modemipc_transport::TransportError::Io(io)
        | modemipc_transport::TransportError::Accept(io)
        | modemipc_transport::TransportError::Poll(io) => FrameError::Io(io),
        modemipc_transport::TransportError::Bind { source, .. }
        | modemipc_transport::TransportError::Connect { source, .. }
        | modemipc_transport::TransportError::Open { source, .. } => FrameError::Io(source),
        other => FrameError::Io(std::io::Error::other(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::{BufMut, BytesMut};

    use super::*;
    use crate::codec::{encode_message, Header, MessageType};

    fn wire(messages: &[(Header, &[u8])]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for (header, payload) in messages {
            encode_message(header, payload, &mut buf).unwrap();
        }
        buf.to_vec()
    }

    #[test]
    fn reads_messages_in_order() {
        let bytes = wire(&[
            (Header::response(1, 1, 0x0501), &b"one"[..]),
            (Header::unsolicited(2, 0x0801, MessageType::Notification), &b"two"[..]),
        ]);
        let mut reader = MessageReader::new(Cursor::new(bytes), Direction::FromModem);

        let first = reader.read_message().unwrap();
        let second = reader.read_message().unwrap();
        assert_eq!(first.kind(), MessageType::Resp);
        assert_eq!(first.payload.as_ref(), b"one");
        assert_eq!(second.kind(), MessageType::Notification);
        assert!(matches!(
            reader.read_message(),
            Err(FrameError::ConnectionClosed)
        ));
    }

    #[test]
    fn partial_reads_are_reassembled() {
        let bytes = wire(&[(Header::request(3, 0x0A01, MessageType::Get), &b"slow"[..])]);
        let mut reader = MessageReader::new(
            ByteByByteReader { bytes, pos: 0 },
            Direction::ToModem,
        );

        let msg = reader.read_message().unwrap();
        assert_eq!(msg.header.mseq, 3);
        assert_eq!(msg.kind(), MessageType::Get);
        assert_eq!(msg.payload.as_ref(), b"slow");
    }

    #[test]
    fn try_read_reports_incomplete_without_error() {
        let bytes = wire(&[(Header::response(1, 1, 0x0501), &b"abcdef"[..])]);
        let mut reader = MessageReader::new(
            ByteByByteReader { bytes, pos: 0 },
            Direction::FromModem,
        );

        assert!(reader.try_read_message().unwrap().is_none());
        assert!(!reader.has_buffered_message());
        let msg = loop {
            if let Some(msg) = reader.try_read_message().unwrap() {
                break msg;
            }
        };
        assert_eq!(msg.payload.as_ref(), b"abcdef");
    }

    #[test]
    fn buffered_second_message_is_visible() {
        let bytes = wire(&[
            (Header::unsolicited(1, 0x0701, MessageType::Notification), &b"a"[..]),
            (Header::unsolicited(2, 0x0701, MessageType::Notification), &b"b"[..]),
        ]);
        let mut reader = MessageReader::new(Cursor::new(bytes), Direction::FromModem);

        let first = reader.try_read_message().unwrap().unwrap();
        assert_eq!(first.payload.as_ref(), b"a");
        assert!(reader.has_buffered_message());
        let second = reader.try_read_message().unwrap().unwrap();
        assert_eq!(second.payload.as_ref(), b"b");
        assert!(!reader.has_buffered_message());
    }

    #[test]
    fn oversized_frame_is_skipped() {
        let mut bytes = wire(&[(
            Header::unsolicited(1, 0x0401, MessageType::Indication),
            &[0xEE; 32][..],
        )]);
        bytes.extend(wire(&[(Header::response(2, 5, 0x0501), &b"ok"[..])]));

        let cfg = FrameConfig {
            max_payload_size: 8,
            ..FrameConfig::default()
        };
        let mut reader =
            MessageReader::with_config(Cursor::new(bytes), Direction::FromModem, cfg);

        assert!(matches!(
            reader.read_message(),
            Err(FrameError::PayloadTooLarge { size: 32, .. })
        ));
        let next = reader.read_message().unwrap();
        assert_eq!(next.header.aseq, 5);
        assert_eq!(next.payload.as_ref(), b"ok");
    }

    #[test]
    fn corrupt_length_discards_buffer() {
        let mut bytes = BytesMut::new();
        bytes.put_u16_le(2);
        bytes.put_slice(&[0xFF; 5]);
        let mut reader = MessageReader::new(Cursor::new(bytes.to_vec()), Direction::FromModem);

        assert!(matches!(
            reader.read_message(),
            Err(FrameError::InvalidLength { .. })
        ));
        assert!(matches!(
            reader.read_message(),
            Err(FrameError::ConnectionClosed)
        ));
    }

    #[test]
    fn interrupted_read_retries() {
        let bytes = wire(&[(Header::response(1, 8, 0x0501), &b"ok"[..])]);
        let mut reader = MessageReader::new(
            InterruptedThenData {
                interrupted: false,
                inner: Cursor::new(bytes),
            },
            Direction::FromModem,
        );
        let msg = reader.read_message().unwrap();
        assert_eq!(msg.header.aseq, 8);
    }

    #[test]
    fn reads_over_ipc_stream_pair() {
        let (left, right) = IpcStream::pair().unwrap();
        let mut writer = crate::writer::MessageWriter::new(left);
        let mut reader =
            MessageReader::with_config_ipc(right, Direction::ToModem, FrameConfig::default())
                .unwrap();

        writer
            .send(&Header::request(4, 0x0102, MessageType::Exec), &b"\x02\x02"[..])
            .unwrap();
        let msg = reader.read_message().unwrap();
        assert_eq!(msg.kind(), MessageType::Exec);
        assert_eq!(msg.payload.as_ref(), b"\x02\x02");
    }

    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    struct InterruptedThenData {
        interrupted: bool,
        inner: Cursor<Vec<u8>>,
    }

    impl Read for InterruptedThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.inner.read(buf)
        }
    }
}
