use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::command;
use crate::error::{FrameError, Result};

/// Frame header: length (2) + mseq (1) + aseq (1) + group (1) + index (1) + type (1).
pub const HEADER_SIZE: usize = 7;

/// Largest frame the 16-bit length field can describe.
pub const MAX_FRAME_LEN: usize = u16::MAX as usize;

/// Default maximum payload size: whatever fits in one frame.
pub const DEFAULT_MAX_PAYLOAD: usize = MAX_FRAME_LEN - HEADER_SIZE;

/// Sequence value meaning "no sequence id".
pub const NO_SEQUENCE: u8 = 0xFF;

/// Which way a message travels. Type bytes are interpreted per direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Host to baseband: requests.
    ToModem,
    /// Baseband to host: responses, notifications, indications.
    FromModem,
}

/// Message type carried in the last header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Exec,
    Get,
    Set,
    Resp,
    Notification,
    Indication,
    /// A type byte this codec does not know, kept for logging.
    Unknown(u8),
}

impl MessageType {
    /// GET, SET and EXEC are the only types a host may send.
    pub fn is_request(self) -> bool {
        matches!(self, Self::Exec | Self::Get | Self::Set)
    }

    /// The direction this type travels in, if known.
    pub fn direction(self) -> Option<Direction> {
        match self {
            Self::Exec | Self::Get | Self::Set => Some(Direction::ToModem),
            Self::Resp | Self::Notification | Self::Indication => Some(Direction::FromModem),
            Self::Unknown(_) => None,
        }
    }

    pub fn wire_value(self) -> u8 {
        match self {
            Self::Exec | Self::Indication => 0x01,
            Self::Get | Self::Resp => 0x02,
            Self::Set | Self::Notification => 0x03,
            Self::Unknown(raw) => raw,
        }
    }

    pub fn from_wire(raw: u8, direction: Direction) -> Self {
        match (direction, raw) {
            (Direction::ToModem, 0x01) => Self::Exec,
            (Direction::ToModem, 0x02) => Self::Get,
            (Direction::ToModem, 0x03) => Self::Set,
            (Direction::FromModem, 0x01) => Self::Indication,
            (Direction::FromModem, 0x02) => Self::Resp,
            (Direction::FromModem, 0x03) => Self::Notification,
            (_, other) => Self::Unknown(other),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exec => "EXEC",
            Self::Get => "GET",
            Self::Set => "SET",
            Self::Resp => "RESP",
            Self::Notification => "NOTI",
            Self::Indication => "INDI",
            Self::Unknown(_) => "UNKNOWN",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown(raw) => write!(f, "UNKNOWN({raw:#04x})"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Fixed-size part of every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Sender's sequence id. Requests carry their allocated id here.
    pub mseq: u8,
    /// Acknowledged sequence id. Responses echo the request's `mseq` here.
    pub aseq: u8,
    /// Command id (`group << 8 | index`).
    pub command: u16,
    pub kind: MessageType,
}

impl Header {
    /// Header for a host request tagged with `seq`.
    pub fn request(seq: u8, command: u16, kind: MessageType) -> Self {
        Self {
            mseq: seq,
            aseq: NO_SEQUENCE,
            command,
            kind,
        }
    }

    /// Header for a baseband reply to the request tagged `request_seq`.
    pub fn response(mseq: u8, request_seq: u8, command: u16) -> Self {
        Self {
            mseq,
            aseq: request_seq,
            command,
            kind: MessageType::Resp,
        }
    }

    /// Header for an unsolicited baseband message.
    pub fn unsolicited(mseq: u8, command: u16, kind: MessageType) -> Self {
        Self {
            mseq,
            aseq: NO_SEQUENCE,
            command,
            kind,
        }
    }
}

/// One decoded message. The payload is reference-counted and cheap to clone.
#[derive(Debug, Clone)]
pub struct Message {
    pub header: Header,
    pub payload: Bytes,
}

impl Message {
    pub fn new(header: Header, payload: impl Into<Bytes>) -> Self {
        Self {
            header,
            payload: payload.into(),
        }
    }

    pub fn command(&self) -> u16 {
        self.header.command
    }

    pub fn kind(&self) -> MessageType {
        self.header.kind
    }

    /// The total wire size of this message (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} mseq={} aseq={} len={}",
            self.header.kind,
            command::describe(self.header.command),
            self.header.mseq,
            self.header.aseq,
            self.payload.len()
        )
    }
}

/// Encode one message into the wire format.
///
/// ```text
/// ┌────────────┬──────┬──────┬───────┬───────┬──────┬───────────────┐
/// │ Length     │ mseq │ aseq │ group │ index │ type │ Payload        │
/// │ (2B LE)    │ (1B) │ (1B) │ (1B)  │ (1B)  │ (1B) │ (Length - 7 B) │
/// └────────────┴──────┴──────┴───────┴───────┴──────┴───────────────┘
/// ```
///
/// Length counts the header too.
pub fn encode_message(header: &Header, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > DEFAULT_MAX_PAYLOAD {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: DEFAULT_MAX_PAYLOAD,
        });
    }
    let total = HEADER_SIZE + payload.len();
    dst.reserve(total);
    dst.put_u16_le(total as u16);
    dst.put_u8(header.mseq);
    dst.put_u8(header.aseq);
    dst.put_u8(command::command_group(header.command));
    dst.put_u8(command::command_index(header.command));
    dst.put_u8(header.kind.wire_value());
    dst.put_slice(payload);
    Ok(())
}

/// Length of the frame at the front of `src`, once its length field is buffered.
pub(crate) fn peek_frame_len(src: &[u8]) -> Option<usize> {
    if src.len() < 2 {
        return None;
    }
    Some(u16::from_le_bytes([src[0], src[1]]) as usize)
}

/// Decode one message from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete message yet.
/// On success, consumes the message bytes from the buffer. On error nothing
/// is consumed; the caller decides how to resynchronize.
pub fn decode_message(
    src: &mut BytesMut,
    direction: Direction,
    max_payload: usize,
) -> Result<Option<Message>> {
    let Some(total) = peek_frame_len(src) else {
        return Ok(None);
    };

    if total < HEADER_SIZE {
        return Err(FrameError::InvalidLength {
            length: total,
            min: HEADER_SIZE,
        });
    }

    let payload_len = total - HEADER_SIZE;
    if payload_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    if src.len() < total {
        return Ok(None);
    }

    src.advance(2);
    let mseq = src.get_u8();
    let aseq = src.get_u8();
    let group = src.get_u8();
    let index = src.get_u8();
    let kind = MessageType::from_wire(src.get_u8(), direction);
    let payload = src.split_to(payload_len).freeze();

    Ok(Some(Message {
        header: Header {
            mseq,
            aseq,
            command: command::command_id(group, index),
            kind,
        },
        payload,
    }))
}

/// Configuration for message readers and writers.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: the frame limit.
    pub max_payload_size: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            read_timeout: None,
            write_timeout: None,
        }
    }
}
