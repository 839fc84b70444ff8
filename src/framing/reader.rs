//! Chunked read buffer.

use std::collections::VecDeque;

use bytes::{Buf, Bytes, BytesMut};

use super::FramingError;

/// Reassembles chunk payloads into complete messages.
///
/// The parser feeds payload bytes in with `feed_chunk` and marks the end
/// of each message with `feed_eof`. Readers then consume message bytes
/// with `read`, which serves any span within the current message
/// regardless of where the wire chunks were split, but never crosses a
/// message boundary.
#[derive(Debug)]
pub struct ChunkedReadBuffer {
    /// Completed messages not yet being read
    messages: VecDeque<Bytes>,
    /// Chunks of the message currently being assembled
    assembling: BytesMut,
    /// Message currently being read
    current: Bytes,
}

impl ChunkedReadBuffer {
    /// Create an empty read buffer.
    pub fn new() -> Self {
        Self {
            messages: VecDeque::new(),
            assembling: BytesMut::with_capacity(1024),
            current: Bytes::new(),
        }
    }

    /// Append chunk payload bytes to the message being assembled.
    pub fn feed_chunk(&mut self, chunk: &[u8]) {
        self.assembling.extend_from_slice(chunk);
    }

    /// Mark the end of the message being assembled.
    pub fn feed_eof(&mut self) {
        let message = self.assembling.split().freeze();
        self.messages.push_back(message);
    }

    /// Whether a complete message is available to read.
    pub fn ready(&self) -> bool {
        self.current.has_remaining() || !self.messages.is_empty()
    }

    /// Bytes left in the message currently being read.
    pub fn remaining_in_message(&self) -> usize {
        self.current.remaining()
    }

    /// Number of completed messages waiting behind the current one.
    pub fn queued_messages(&self) -> usize {
        self.messages.len()
    }

    /// Bytes accumulated for the message still being assembled.
    pub fn assembling_len(&self) -> usize {
        self.assembling.len()
    }

    /// Read exactly `n` bytes from the current message.
    ///
    /// Moves on to the next completed message when the current one is
    /// exhausted. A read that would cross the end of the current message
    /// fails with [`FramingError::Underflow`]; reading with nothing
    /// buffered fails with [`FramingError::Empty`].
    pub fn read(&mut self, n: usize) -> Result<Bytes, FramingError> {
        if !self.current.has_remaining() {
            self.current = self.messages.pop_front().ok_or(FramingError::Empty)?;
        }
        if n > self.current.remaining() {
            return Err(FramingError::Underflow {
                wanted: n,
                available: self.current.remaining(),
            });
        }
        Ok(self.current.split_to(n))
    }

    /// Take the remainder of the current message, or the next completed
    /// message if the current one is exhausted.
    pub fn next_message(&mut self) -> Option<Bytes> {
        if self.current.has_remaining() {
            return Some(std::mem::take(&mut self.current));
        }
        self.messages.pop_front()
    }

    /// Discard everything buffered, including the message being
    /// assembled.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.assembling.clear();
        self.current = Bytes::new();
    }
}

impl Default for ChunkedReadBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_within_message() {
        let mut buf = ChunkedReadBuffer::new();
        buf.feed_chunk(&[1, 2, 3, 4, 5]);
        buf.feed_eof();

        assert!(buf.ready());
        assert_eq!(&buf.read(2).unwrap()[..], &[1, 2]);
        assert_eq!(&buf.read(3).unwrap()[..], &[3, 4, 5]);
        assert!(!buf.ready());
    }

    #[test]
    fn test_read_across_chunk_boundaries() {
        let mut buf = ChunkedReadBuffer::new();
        buf.feed_chunk(&[1, 2]);
        buf.feed_chunk(&[3, 4]);
        buf.feed_chunk(&[5]);
        buf.feed_eof();

        assert_eq!(&buf.read(5).unwrap()[..], &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_read_does_not_cross_message_boundary() {
        let mut buf = ChunkedReadBuffer::new();
        buf.feed_chunk(&[1, 2]);
        buf.feed_eof();
        buf.feed_chunk(&[3, 4]);
        buf.feed_eof();

        assert_eq!(&buf.read(1).unwrap()[..], &[1]);
        let err = buf.read(3).unwrap_err();
        assert_eq!(
            err,
            FramingError::Underflow {
                wanted: 3,
                available: 1
            }
        );
        // Finish the first message, then the second becomes readable
        assert_eq!(&buf.read(1).unwrap()[..], &[2]);
        assert_eq!(&buf.read(2).unwrap()[..], &[3, 4]);
    }

    #[test]
    fn test_read_empty_buffer() {
        let mut buf = ChunkedReadBuffer::new();
        assert_eq!(buf.read(1).unwrap_err(), FramingError::Empty);
    }

    #[test]
    fn test_incomplete_message_not_ready() {
        let mut buf = ChunkedReadBuffer::new();
        buf.feed_chunk(&[1, 2, 3]);
        // No feed_eof yet
        assert!(!buf.ready());
        buf.feed_eof();
        assert!(buf.ready());
    }

    #[test]
    fn test_next_message() {
        let mut buf = ChunkedReadBuffer::new();
        buf.feed_chunk(b"first");
        buf.feed_eof();
        buf.feed_chunk(b"second");
        buf.feed_eof();

        assert_eq!(&buf.next_message().unwrap()[..], b"first");
        assert_eq!(&buf.next_message().unwrap()[..], b"second");
        assert!(buf.next_message().is_none());
    }

    #[test]
    fn test_next_message_returns_current_remainder() {
        let mut buf = ChunkedReadBuffer::new();
        buf.feed_chunk(&[1, 2, 3, 4]);
        buf.feed_eof();

        assert_eq!(&buf.read(1).unwrap()[..], &[1]);
        assert_eq!(&buf.next_message().unwrap()[..], &[2, 3, 4]);
    }

    #[test]
    fn test_empty_message_queued() {
        let mut buf = ChunkedReadBuffer::new();
        buf.feed_eof();
        assert!(buf.ready());
        assert_eq!(buf.next_message().unwrap().len(), 0);
    }

    #[test]
    fn test_clear() {
        let mut buf = ChunkedReadBuffer::new();
        buf.feed_chunk(&[1, 2]);
        buf.feed_eof();
        buf.feed_chunk(&[3]);
        buf.clear();
        assert!(!buf.ready());
        assert_eq!(buf.queued_messages(), 0);
    }
}
