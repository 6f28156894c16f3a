use std::os::fd::{AsRawFd, RawFd};
use std::path::Path;
use std::time::Duration;

use modemipc_frame::{
    Direction, FrameConfig, FrameError, Header, Message, MessageReader, MessageType,
    MessageWriter,
};
use modemipc_transport::{open_endpoint, Interest, IpcStream, Readiness};

use crate::error::{MuxError, Result};
use crate::sequence::SequenceId;

/// The physical link the transport drives.
///
/// `send` hands one whole message to the link. `receive` is called once the
/// link reported readable and decodes at most one message; `Ok(None)` means
/// the bytes read so far do not complete a message yet. A closed link must
/// surface as [`MuxError::Closed`].
pub trait Channel {
    fn send(
        &mut self,
        sequence: SequenceId,
        command: u16,
        kind: MessageType,
        payload: &[u8],
    ) -> Result<()>;

    fn receive(&mut self) -> Result<Option<Message>>;

    fn wait_ready(&self, interest: Interest, timeout: Option<Duration>) -> Result<Readiness>;

    /// A complete message is already buffered and can be received without
    /// waiting for readiness.
    fn has_buffered_input(&self) -> bool {
        false
    }
}

/// [`Channel`] over an [`IpcStream`], speaking the host side of the FMT
/// wire format.
pub struct StreamChannel {
    reader: MessageReader<IpcStream>,
    writer: MessageWriter<IpcStream>,
}

impl StreamChannel {
    pub fn new(stream: IpcStream) -> Result<Self> {
        Self::with_config(stream, FrameConfig::default())
    }

    pub fn with_config(stream: IpcStream, config: FrameConfig) -> Result<Self> {
        let write_half = stream.try_clone()?;
        let reader = MessageReader::with_config_ipc(stream, Direction::FromModem, config.clone())?;
        let writer = MessageWriter::with_config_ipc(write_half, config)?;
        Ok(Self { reader, writer })
    }

    /// Open a modem device node or connect to a socket, whichever `path` is.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(open_endpoint(path)?)
    }

    pub fn transport_name(&self) -> &'static str {
        self.reader.get_ref().transport_name()
    }
}

impl Channel for StreamChannel {
    fn send(
        &mut self,
        sequence: SequenceId,
        command: u16,
        kind: MessageType,
        payload: &[u8],
    ) -> Result<()> {
        let header = Header::request(sequence.get(), command, kind);
        self.writer.send(&header, payload).map_err(closed_or_frame)
    }

    fn receive(&mut self) -> Result<Option<Message>> {
        self.reader.try_read_message().map_err(closed_or_frame)
    }

    fn wait_ready(&self, interest: Interest, timeout: Option<Duration>) -> Result<Readiness> {
        Ok(self.reader.get_ref().wait_ready(interest, timeout)?)
    }

    fn has_buffered_input(&self) -> bool {
        self.reader.has_buffered_message()
    }
}

impl AsRawFd for StreamChannel {
    fn as_raw_fd(&self) -> RawFd {
        self.reader.get_ref().as_raw_fd()
    }
}

fn closed_or_frame(err: FrameError) -> MuxError {
    if err.is_disconnect() {
        MuxError::Closed
    } else {
        MuxError::Frame(err)
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use std::collections::VecDeque;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) struct Sent {
        pub(crate) sequence: u8,
        pub(crate) command: u16,
        pub(crate) kind: MessageType,
        pub(crate) payload: Vec<u8>,
    }

    /// Records sends and replays scripted inbound messages.
    #[derive(Default)]
    pub(crate) struct MockChannel {
        pub(crate) sent: Vec<Sent>,
        pub(crate) inbound: VecDeque<Result<Option<Message>>>,
        pub(crate) fail_sends: usize,
        pub(crate) closed: bool,
    }

    impl MockChannel {
        pub(crate) fn push_inbound(&mut self, message: Message) {
            self.inbound.push_back(Ok(Some(message)));
        }
    }

    impl Channel for MockChannel {
        fn send(
            &mut self,
            sequence: SequenceId,
            command: u16,
            kind: MessageType,
            payload: &[u8],
        ) -> Result<()> {
            if self.closed {
                return Err(MuxError::Closed);
            }
            if self.fail_sends > 0 {
                self.fail_sends -= 1;
                return Err(MuxError::Frame(FrameError::Io(std::io::Error::other(
                    "write rejected",
                ))));
            }
            self.sent.push(Sent {
                sequence: sequence.get(),
                command,
                kind,
                payload: payload.to_vec(),
            });
            Ok(())
        }

        fn receive(&mut self) -> Result<Option<Message>> {
            if let Some(next) = self.inbound.pop_front() {
                return next;
            }
            if self.closed {
                return Err(MuxError::Closed);
            }
            Ok(None)
        }

        fn wait_ready(&self, interest: Interest, _timeout: Option<Duration>) -> Result<Readiness> {
            Ok(Readiness {
                readable: interest.readable && !self.inbound.is_empty(),
                writable: interest.writable && !self.closed,
                closed: self.closed,
            })
        }
    }
}
