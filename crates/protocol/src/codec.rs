//! Native messaging framing.
//!
//! Each message is a UTF-8 JSON document preceded by its length as a
//! 32-bit unsigned integer in native byte order.

use std::io;

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::constants::{LENGTH_PREFIX_SIZE, MAX_INBOUND_MESSAGE_SIZE, MAX_OUTBOUND_MESSAGE_SIZE};
use crate::envelope::Message;

/// Errors from framing or parsing a message.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("message of {size} bytes exceeds the {max} byte limit")]
    TooLarge { size: usize, max: usize },
}

/// One decoded frame.
///
/// A body that is not a valid message is reported per frame, so the
/// stream stays usable after it; only I/O and size errors end the stream.
pub type DecodedFrame = Result<Message, serde_json::Error>;

/// Codec for length-prefixed JSON messages.
#[derive(Debug, Clone)]
pub struct NativeMessageCodec {
    max_decode_size: usize,
    max_encode_size: usize,
}

impl NativeMessageCodec {
    /// Creates a codec with the browser's limits: 1 MiB from the host,
    /// 64 MiB towards it.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_decode_size: MAX_INBOUND_MESSAGE_SIZE,
            max_encode_size: MAX_OUTBOUND_MESSAGE_SIZE,
        }
    }

    /// Overrides the largest accepted inbound message.
    #[must_use]
    pub const fn with_max_decode_size(mut self, size: usize) -> Self {
        self.max_decode_size = size;
        self
    }

    /// Overrides the largest message that may be written.
    #[must_use]
    pub const fn with_max_encode_size(mut self, size: usize) -> Self {
        self.max_encode_size = size;
        self
    }
}

impl Default for NativeMessageCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for NativeMessageCodec {
    type Item = DecodedFrame;
    type Error = CodecError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<DecodedFrame>, CodecError> {
        if buf.len() < LENGTH_PREFIX_SIZE {
            return Ok(None);
        }

        let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
        prefix.copy_from_slice(&buf[..LENGTH_PREFIX_SIZE]);
        let len = u32::from_ne_bytes(prefix) as usize;

        if len > self.max_decode_size {
            return Err(CodecError::TooLarge {
                size: len,
                max: self.max_decode_size,
            });
        }

        let frame_len = LENGTH_PREFIX_SIZE + len;
        if buf.len() < frame_len {
            buf.reserve(frame_len - buf.len());
            return Ok(None);
        }

        buf.advance(LENGTH_PREFIX_SIZE);
        let body = buf.split_to(len);
        Ok(Some(serde_json::from_slice(&body)))
    }
}

impl Encoder<Message> for NativeMessageCodec {
    type Error = CodecError;

    fn encode(&mut self, msg: Message, buf: &mut BytesMut) -> Result<(), CodecError> {
        let body = serde_json::to_vec(&msg)?;
        if body.len() > self.max_encode_size {
            return Err(CodecError::TooLarge {
                size: body.len(),
                max: self.max_encode_size,
            });
        }

        buf.reserve(LENGTH_PREFIX_SIZE + body.len());
        buf.put_slice(&(body.len() as u32).to_ne_bytes());
        buf.put_slice(&body);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::MessageType;

    fn frame(json: &str) -> BytesMut {
        let mut buf = BytesMut::new();
        buf.put_slice(&(json.len() as u32).to_ne_bytes());
        buf.put_slice(json.as_bytes());
        buf
    }

    #[test]
    fn encode_writes_native_endian_prefix() {
        let mut codec = NativeMessageCodec::new();
        let mut buf = BytesMut::new();
        let msg = Message::new(MessageType::Ping).with_id("p1");
        codec.encode(msg, &mut buf).unwrap();

        let len = u32::from_ne_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        assert_eq!(len, buf.len() - LENGTH_PREFIX_SIZE);
        let body: serde_json::Value = serde_json::from_slice(&buf[4..]).unwrap();
        assert_eq!(body["type"], "ping");
        assert_eq!(body["id"], "p1");
    }

    #[test]
    fn decode_waits_for_full_frame() {
        let mut codec = NativeMessageCodec::new();
        let full = frame(r#"{"type":"progress","downloadId":"d1","progress":5}"#);

        let mut partial = BytesMut::from(&full[..full.len() - 3]);
        assert!(codec.decode(&mut partial).unwrap().is_none());

        partial.put_slice(&full[full.len() - 3..]);
        let msg = codec.decode(&mut partial).unwrap().unwrap().unwrap();
        assert!(msg.is_type(&MessageType::Progress));
        assert!(partial.is_empty());
    }

    #[test]
    fn decode_handles_back_to_back_frames() {
        let mut codec = NativeMessageCodec::new();
        let mut buf = frame(r#"{"id":"a"}"#);
        buf.extend_from_slice(&frame(r#"{"id":"b"}"#));

        let first = codec.decode(&mut buf).unwrap().unwrap().unwrap();
        let second = codec.decode(&mut buf).unwrap().unwrap().unwrap();
        assert_eq!(first.id.as_deref(), Some("a"));
        assert_eq!(second.id.as_deref(), Some("b"));
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn decode_rejects_oversized_prefix() {
        let mut codec = NativeMessageCodec::new().with_max_decode_size(8);
        let mut buf = frame(r#"{"id":"too-long"}"#);
        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, CodecError::TooLarge { max: 8, .. }));
    }

    #[test]
    fn malformed_body_is_reported_and_skipped() {
        let mut codec = NativeMessageCodec::new();
        let mut buf = frame(r#"{"id":42,"result":"ok"}"#);
        buf.extend_from_slice(&frame("not json {{{"));
        buf.extend_from_slice(&frame(r#"{"type":"progress","downloadId":"d1","progress":1}"#));

        assert!(codec.decode(&mut buf).unwrap().unwrap().is_err());
        assert!(codec.decode(&mut buf).unwrap().unwrap().is_err());
        let msg = codec.decode(&mut buf).unwrap().unwrap().unwrap();
        assert!(msg.is_type(&MessageType::Progress));
        assert!(buf.is_empty());
    }

    #[test]
    fn encode_rejects_oversized_message() {
        let mut codec = NativeMessageCodec::new().with_max_encode_size(16);
        let msg = Message::new(MessageType::Download).with_field("url", "x".repeat(64));
        let mut buf = BytesMut::new();
        assert!(matches!(
            codec.encode(msg, &mut buf),
            Err(CodecError::TooLarge { .. })
        ));
        assert!(buf.is_empty());
    }
}
