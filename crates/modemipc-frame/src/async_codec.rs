//! `tokio_util::codec` adapter for use with `Framed` on async streams.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{decode_message, encode_message, Direction, Message, DEFAULT_MAX_PAYLOAD};
use crate::error::FrameError;

/// Decodes messages travelling in one direction and encodes any message.
#[derive(Debug, Clone)]
pub struct MessageCodec {
    direction: Direction,
    max_payload: usize,
}

impl MessageCodec {
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            max_payload: DEFAULT_MAX_PAYLOAD,
        }
    }

    pub fn with_max_payload(mut self, max_payload: usize) -> Self {
        self.max_payload = max_payload;
        self
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, FrameError> {
        decode_message(src, self.direction, self.max_payload)
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), FrameError> {
        encode_message(&item.header, item.payload.as_ref(), dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Header, MessageType};

    #[test]
    fn encoder_output_feeds_decoder() {
        let mut codec = MessageCodec::new(Direction::FromModem);
        let mut buf = BytesMut::new();
        let msg = Message::new(
            Header::unsolicited(3, 0x0801, MessageType::Notification),
            &b"\x02"[..],
        );

        codec.encode(msg, &mut buf).unwrap();
        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.kind(), MessageType::Notification);
        assert_eq!(decoded.payload.as_ref(), b"\x02");
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn decoder_honours_payload_cap() {
        let mut codec = MessageCodec::new(Direction::FromModem).with_max_payload(1);
        let mut buf = BytesMut::new();
        encode_message(&Header::response(1, 1, 0x0501), b"too long", &mut buf).unwrap();
        assert!(matches!(
            codec.decode(&mut buf),
            Err(FrameError::PayloadTooLarge { .. })
        ));
    }
}
