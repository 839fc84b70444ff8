//! Tokio codecs for chunked Bolt messages.
//!
//! [`BoltCodec`] combines the frame parser, the chunked read/write
//! buffers, and the PackStream codec into a `tokio_util`
//! [`Decoder`]/[`Encoder`] pair working on whole PackStream values.
//! [`RequestCodec`] and [`ResponseCodec`] layer the typed message enums
//! on top for the server and client side respectively.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::BoltError;
use crate::framing::{ChunkedReadBuffer, ChunkedWriteBuffer, FrameParser};
use crate::message::{Request, Response};
use crate::packstream::{self, PackStreamError, Value};

/// Default limit on the size of one assembled message (16 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Codec for whole PackStream values in chunked framing.
#[derive(Debug)]
pub struct BoltCodec {
    parser: FrameParser,
    read_buffer: ChunkedReadBuffer,
    write_buffer: ChunkedWriteBuffer,
    max_message_size: usize,
}

impl BoltCodec {
    /// Create a codec with default settings.
    pub fn new() -> Self {
        Self {
            parser: FrameParser::new(),
            read_buffer: ChunkedReadBuffer::new(),
            write_buffer: ChunkedWriteBuffer::new(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }

    /// Create a codec with a custom maximum message size.
    pub fn with_max_size(max_message_size: usize) -> Self {
        Self {
            max_message_size,
            ..Self::new()
        }
    }

    /// Create a codec with a custom outgoing chunk payload size.
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            write_buffer: ChunkedWriteBuffer::with_chunk_size(chunk_size),
            ..Self::new()
        }
    }
}

impl Default for BoltCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for BoltCodec {
    type Item = Value;
    type Error = BoltError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if !src.is_empty() {
            let data = src.split();
            self.parser.feed(&data, &mut self.read_buffer);
        }

        if self.read_buffer.assembling_len() > self.max_message_size {
            return Err(BoltError::MessageTooLarge {
                size: self.read_buffer.assembling_len(),
                max: self.max_message_size,
            });
        }

        while let Some(message) = self.read_buffer.next_message() {
            // Zero-length message: keep-alive noop, skip it
            if message.is_empty() {
                continue;
            }
            if message.len() > self.max_message_size {
                return Err(BoltError::MessageTooLarge {
                    size: message.len(),
                    max: self.max_message_size,
                });
            }

            let mut decoder = packstream::Decoder::new(&message);
            let value = decoder.decode()?;
            if !decoder.is_empty() {
                return Err(PackStreamError::InvalidStructure(format!(
                    "{} trailing bytes after message",
                    decoder.remaining()
                ))
                .into());
            }
            return Ok(Some(value));
        }

        Ok(None)
    }
}

impl Encoder<Value> for BoltCodec {
    type Error = BoltError;

    fn encode(&mut self, item: Value, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let body = packstream::encode(&item)?;
        self.write_buffer.append(&body);
        self.write_buffer.end_message();
        dst.extend_from_slice(&self.write_buffer.take());
        Ok(())
    }
}

/// Server-side codec: decodes [`Request`]s, encodes [`Response`]s.
#[derive(Debug, Default)]
pub struct RequestCodec {
    inner: BoltCodec,
}

impl RequestCodec {
    /// Create a new request codec.
    pub fn new() -> Self {
        Self {
            inner: BoltCodec::new(),
        }
    }
}

impl Decoder for RequestCodec {
    type Item = Request;
    type Error = BoltError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.inner.decode(src)? {
            Some(value) => {
                let structure = value
                    .as_structure()
                    .ok_or_else(|| BoltError::protocol("Message must be a structure"))?;
                Ok(Some(Request::from_structure(structure)?))
            }
            None => Ok(None),
        }
    }
}

impl Encoder<Response> for RequestCodec {
    type Error = BoltError;

    fn encode(&mut self, item: Response, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.inner
            .encode(Value::Structure(item.to_structure()), dst)
    }
}

/// Client-side codec: decodes [`Response`]s, encodes [`Request`]s.
#[derive(Debug, Default)]
pub struct ResponseCodec {
    inner: BoltCodec,
}

impl ResponseCodec {
    /// Create a new response codec.
    pub fn new() -> Self {
        Self {
            inner: BoltCodec::new(),
        }
    }
}

impl Decoder for ResponseCodec {
    type Item = Response;
    type Error = BoltError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.inner.decode(src)? {
            Some(value) => {
                let structure = value
                    .as_structure()
                    .ok_or_else(|| BoltError::protocol("Message must be a structure"))?;
                Ok(Some(Response::from_structure(structure)?))
            }
            None => Ok(None),
        }
    }
}

impl Encoder<Request> for ResponseCodec {
    type Error = BoltError;

    fn encode(&mut self, item: Request, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.inner
            .encode(Value::Structure(item.to_structure()), dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::END_MARKER;
    use crate::packstream::ValueMap;
    use bytes::BufMut;

    #[test]
    fn test_encode_decode_value() {
        let mut codec = BoltCodec::new();
        let mut buf = BytesMut::new();

        let value = Value::String("Hello, Bolt!".to_string());
        codec.encode(value.clone(), &mut buf).unwrap();

        // Chunk header + body + end marker
        assert!(buf.len() > 2);
        assert_eq!(&buf[buf.len() - 2..], &END_MARKER);

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_chunked_large_message() {
        let mut codec = BoltCodec::new();
        let mut buf = BytesMut::new();

        let large = "x".repeat(crate::framing::DEFAULT_CHUNK_SIZE * 2 + 100);
        codec.encode(Value::String(large.clone()), &mut buf).unwrap();

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.as_str().unwrap(), large);
    }

    #[test]
    fn test_chunk_size_does_not_affect_decoding() {
        let value = Value::String("y".repeat(1000));
        for chunk_size in [1, 3, 64, 999, 1000, 8192] {
            let mut writer = BoltCodec::with_chunk_size(chunk_size);
            let mut buf = BytesMut::new();
            writer.encode(value.clone(), &mut buf).unwrap();

            let mut reader = BoltCodec::new();
            let decoded = reader.decode(&mut buf).unwrap().unwrap();
            assert_eq!(decoded, value, "chunk_size={}", chunk_size);
        }
    }

    #[test]
    fn test_partial_input() {
        let mut codec = BoltCodec::new();
        let mut buf = BytesMut::new();

        codec.encode(Value::Integer(42), &mut buf).unwrap();
        let full = buf.clone();

        // Only the chunk header: no message yet
        let mut partial = BytesMut::from(&full[..2]);
        assert!(codec.decode(&mut partial).unwrap().is_none());

        // Rest of the bytes complete the message
        let mut rest = BytesMut::from(&full[2..]);
        let decoded = codec.decode(&mut rest).unwrap().unwrap();
        assert_eq!(decoded.as_int().unwrap(), 42);
    }

    #[test]
    fn test_multiple_messages() {
        let mut codec = BoltCodec::new();
        let mut buf = BytesMut::new();

        codec.encode(Value::Integer(1), &mut buf).unwrap();
        codec.encode(Value::Integer(2), &mut buf).unwrap();
        codec.encode(Value::Integer(3), &mut buf).unwrap();

        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().as_int().unwrap(), 1);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().as_int().unwrap(), 2);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().as_int().unwrap(), 3);
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_empty_message_skipped() {
        let mut codec = BoltCodec::new();
        let mut buf = BytesMut::new();

        // Bare end marker (noop), then a real message
        buf.put_slice(&END_MARKER);
        codec.encode(Value::Boolean(true), &mut buf).unwrap();

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.as_bool().unwrap(), true);
    }

    #[test]
    fn test_message_too_large() {
        let mut codec = BoltCodec::with_max_size(100);
        let mut buf = BytesMut::new();

        buf.put_u16(200);
        buf.extend_from_slice(&[0u8; 200]);

        let result = codec.decode(&mut buf);
        assert!(matches!(result, Err(BoltError::MessageTooLarge { .. })));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut buf = BytesMut::new();
        // One chunk holding two encoded values: only one value per message allowed
        buf.put_u16(2);
        buf.put_u8(0x01);
        buf.put_u8(0x02);
        buf.put_slice(&END_MARKER);

        let mut codec = BoltCodec::new();
        let result = codec.decode(&mut buf);
        assert!(matches!(result, Err(BoltError::Malformed(_))));
    }

    #[test]
    fn test_request_codec_roundtrip() {
        let mut codec = RequestCodec::new();
        let mut buf = BytesMut::new();

        let response = Response::success(ValueMap::from([("server", "AsyncBolt/1.0")]));
        codec.encode(response, &mut buf).unwrap();

        // A client-side codec can read it back
        let mut client_codec = ResponseCodec::new();
        let decoded = client_codec.decode(&mut buf).unwrap().unwrap();
        assert!(decoded.is_success());
    }

    #[test]
    fn test_response_codec_roundtrip() {
        let mut codec = ResponseCodec::new();
        let mut buf = BytesMut::new();

        let request = Request::run("RETURN 1 AS num", ValueMap::new());
        codec.encode(request.clone(), &mut buf).unwrap();

        let mut server_codec = RequestCodec::new();
        let decoded = server_codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn test_non_structure_message_rejected() {
        let mut value_codec = BoltCodec::new();
        let mut buf = BytesMut::new();
        value_codec.encode(Value::Integer(7), &mut buf).unwrap();

        let mut codec = ResponseCodec::new();
        let result = codec.decode(&mut buf);
        assert!(matches!(result, Err(BoltError::ProtocolViolation(_))));
    }
}
