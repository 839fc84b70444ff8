//! Chunked write buffer.

use bytes::{BufMut, BytesMut};

use super::{DEFAULT_CHUNK_SIZE, END_MARKER, MAX_CHUNK_PAYLOAD};

/// Buffers outgoing messages and splits them into chunks.
///
/// Callers `append` the serialized message body in any number of
/// pieces, then call `end_message` to chunk it: the body is emitted as
/// chunks of at most the configured payload size, each preceded by a
/// big-endian `u16` length header, followed by the `0x0000` terminator.
/// Several messages can be queued before the wire bytes are taken, which
/// is what makes request pipelining possible.
#[derive(Debug)]
pub struct ChunkedWriteBuffer {
    max_chunk_size: usize,
    /// Body of the message currently being appended
    pending: BytesMut,
    /// Chunked wire bytes ready to be flushed
    out: BytesMut,
}

impl ChunkedWriteBuffer {
    /// Create a write buffer with the default chunk size.
    pub fn new() -> Self {
        Self::with_chunk_size(DEFAULT_CHUNK_SIZE)
    }

    /// Create a write buffer with a specific maximum chunk payload size.
    ///
    /// Sizes above the wire maximum of 65,535 are clamped; a zero size
    /// is bumped to one.
    pub fn with_chunk_size(max_chunk_size: usize) -> Self {
        Self {
            max_chunk_size: max_chunk_size.clamp(1, MAX_CHUNK_PAYLOAD),
            pending: BytesMut::with_capacity(256),
            out: BytesMut::with_capacity(1024),
        }
    }

    /// Append bytes to the message currently being built.
    pub fn append(&mut self, data: &[u8]) {
        self.pending.extend_from_slice(data);
    }

    /// Finish the current message: chunk it and append the terminator.
    pub fn end_message(&mut self) {
        let body = self.pending.split();
        let mut offset = 0;
        while offset < body.len() {
            let chunk_len = (body.len() - offset).min(self.max_chunk_size);
            self.out.put_u16(chunk_len as u16);
            self.out.extend_from_slice(&body[offset..offset + chunk_len]);
            offset += chunk_len;
        }
        self.out.extend_from_slice(&END_MARKER);
    }

    /// Number of wire bytes ready to flush.
    pub fn wire_len(&self) -> usize {
        self.out.len()
    }

    /// Whether there are no wire bytes and no partial message buffered.
    pub fn is_empty(&self) -> bool {
        self.out.is_empty() && self.pending.is_empty()
    }

    /// Take all buffered wire bytes, leaving the buffer ready for reuse.
    pub fn take(&mut self) -> BytesMut {
        self.out.split()
    }

    /// The configured maximum chunk payload size.
    pub fn max_chunk_size(&self) -> usize {
        self.max_chunk_size
    }
}

impl Default for ChunkedWriteBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_chunk_message() {
        let mut buf = ChunkedWriteBuffer::new();
        buf.append(b"hello");
        buf.end_message();
        let wire = buf.take();

        // 2-byte header + payload + terminator
        assert_eq!(&wire[..], &[0x00, 0x05, b'h', b'e', b'l', b'l', b'o', 0x00, 0x00]);
    }

    #[test]
    fn test_message_split_across_chunks() {
        let mut buf = ChunkedWriteBuffer::with_chunk_size(4);
        buf.append(b"abcdefghij");
        buf.end_message();
        let wire = buf.take();

        assert_eq!(
            &wire[..],
            &[
                0x00, 0x04, b'a', b'b', b'c', b'd', //
                0x00, 0x04, b'e', b'f', b'g', b'h', //
                0x00, 0x02, b'i', b'j', //
                0x00, 0x00,
            ]
        );
    }

    #[test]
    fn test_chunk_payloads_sum_to_message() {
        let message = vec![0x5Au8; 20000];
        let mut buf = ChunkedWriteBuffer::new();
        buf.append(&message);
        buf.end_message();
        let wire = buf.take();

        // Walk the chunks manually
        let mut collected = Vec::new();
        let mut pos = 0;
        let mut terminated = false;
        while pos < wire.len() {
            let len = u16::from_be_bytes([wire[pos], wire[pos + 1]]) as usize;
            pos += 2;
            if len == 0 {
                terminated = true;
                break;
            }
            assert!(len <= MAX_CHUNK_PAYLOAD);
            collected.extend_from_slice(&wire[pos..pos + len]);
            pos += len;
        }
        assert!(terminated);
        assert_eq!(pos, wire.len());
        assert_eq!(collected, message);
    }

    #[test]
    fn test_large_message_needs_multiple_chunks() {
        let message = vec![1u8; DEFAULT_CHUNK_SIZE + 1];
        let mut buf = ChunkedWriteBuffer::new();
        buf.append(&message);
        buf.end_message();
        let wire = buf.take();

        let first_len = u16::from_be_bytes([wire[0], wire[1]]) as usize;
        assert_eq!(first_len, DEFAULT_CHUNK_SIZE);
        // header + chunk + header + 1 byte + terminator
        assert_eq!(wire.len(), 2 + DEFAULT_CHUNK_SIZE + 2 + 1 + 2);
    }

    #[test]
    fn test_multiple_messages_queue_in_order() {
        let mut buf = ChunkedWriteBuffer::new();
        buf.append(b"one");
        buf.end_message();
        buf.append(b"two");
        buf.end_message();
        let wire = buf.take();

        assert_eq!(
            &wire[..],
            &[
                0x00, 0x03, b'o', b'n', b'e', 0x00, 0x00, //
                0x00, 0x03, b't', b'w', b'o', 0x00, 0x00,
            ]
        );
    }

    #[test]
    fn test_append_in_pieces() {
        let mut buf = ChunkedWriteBuffer::new();
        buf.append(b"hel");
        buf.append(b"lo");
        buf.end_message();
        let wire = buf.take();
        assert_eq!(&wire[..], &[0x00, 0x05, b'h', b'e', b'l', b'l', b'o', 0x00, 0x00]);
    }

    #[test]
    fn test_empty_message_is_bare_terminator() {
        let mut buf = ChunkedWriteBuffer::new();
        buf.end_message();
        assert_eq!(&buf.take()[..], &END_MARKER);
    }

    #[test]
    fn test_take_resets() {
        let mut buf = ChunkedWriteBuffer::new();
        buf.append(b"x");
        buf.end_message();
        assert!(!buf.is_empty());
        let _ = buf.take();
        assert!(buf.is_empty());
        assert_eq!(buf.wire_len(), 0);
    }

    #[test]
    fn test_chunk_size_clamped_to_wire_maximum() {
        let buf = ChunkedWriteBuffer::with_chunk_size(1_000_000);
        assert_eq!(buf.max_chunk_size(), MAX_CHUNK_PAYLOAD);
    }
}
