//! Wire codec for the baseband FMT channel.
//!
//! Every message starts with a 7-byte header:
//! - 2-byte little-endian total length (header included)
//! - 1-byte sender sequence id (`mseq`)
//! - 1-byte acknowledged sequence id (`aseq`), echoed by responses
//! - 2-byte command id (group, index)
//! - 1-byte message type, interpreted per [`Direction`]
//!
//! Readers and writers deal in whole messages; callers never see partial
//! frames.

#[cfg(feature = "async")]
pub mod async_codec;
pub mod codec;
pub mod command;
pub mod error;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub use async_codec::MessageCodec;
pub use codec::{
    decode_message, encode_message, Direction, FrameConfig, Header, Message, MessageType,
    DEFAULT_MAX_PAYLOAD, HEADER_SIZE, MAX_FRAME_LEN, NO_SEQUENCE,
};
pub use command::{
    command_group, command_id, command_index, describe, group_from_name, group_name,
};
pub use error::{FrameError, Result};
pub use reader::MessageReader;
pub use writer::MessageWriter;
