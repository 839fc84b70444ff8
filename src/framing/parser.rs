//! Byte-driven chunk parser.

use super::ChunkedReadBuffer;

/// Consumer interface for parser events.
///
/// The parser requires this capability from whoever assembles messages:
/// payload bytes arrive through `on_chunk`, and `on_message_complete`
/// fires when the zero-length terminator is seen.
pub trait ChunkSink {
    /// Called with payload bytes of the chunk currently being read.
    ///
    /// A single wire chunk may arrive over several calls when the input
    /// is fed in fragments; the concatenation of all slices between two
    /// `on_message_complete` events is the full message body.
    fn on_chunk(&mut self, chunk: &[u8]);

    /// Called when a message terminator (`0x0000`) has been read.
    fn on_message_complete(&mut self);
}

impl ChunkSink for ChunkedReadBuffer {
    fn on_chunk(&mut self, chunk: &[u8]) {
        self.feed_chunk(chunk);
    }

    fn on_message_complete(&mut self) {
        self.feed_eof();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParserState {
    /// Between chunks, nothing buffered
    Idle,
    /// Accumulating the 2-byte chunk length header
    ReadingLength,
    /// Inside a chunk payload
    ReadingPayload,
}

/// Resumable parser for the chunked transfer encoding.
///
/// Holds no payload of its own: the only state carried across calls is
/// the in-flight length header and the byte count remaining in the
/// current chunk, so input may be fed in arbitrary fragments, down to
/// one byte at a time.
#[derive(Debug)]
pub struct FrameParser {
    state: ParserState,
    header: [u8; 2],
    header_len: usize,
    /// Payload bytes left in the chunk being read
    remaining: usize,
}

impl FrameParser {
    /// Create a parser in the idle state.
    pub fn new() -> Self {
        Self {
            state: ParserState::Idle,
            header: [0; 2],
            header_len: 0,
            remaining: 0,
        }
    }

    /// Whether the parser is between messages and chunks.
    pub fn is_idle(&self) -> bool {
        self.state == ParserState::Idle
    }

    /// Feed bytes into the parser, emitting events to `sink`.
    pub fn feed<S: ChunkSink>(&mut self, mut data: &[u8], sink: &mut S) {
        while !data.is_empty() {
            match self.state {
                ParserState::Idle | ParserState::ReadingLength => {
                    self.header[self.header_len] = data[0];
                    self.header_len += 1;
                    data = &data[1..];

                    if self.header_len < 2 {
                        self.state = ParserState::ReadingLength;
                        continue;
                    }

                    self.header_len = 0;
                    let len = u16::from_be_bytes(self.header) as usize;
                    if len == 0 {
                        sink.on_message_complete();
                        self.state = ParserState::Idle;
                    } else {
                        self.remaining = len;
                        self.state = ParserState::ReadingPayload;
                    }
                }
                ParserState::ReadingPayload => {
                    let take = self.remaining.min(data.len());
                    sink.on_chunk(&data[..take]);
                    data = &data[take..];
                    self.remaining -= take;
                    if self.remaining == 0 {
                        self.state = ParserState::Idle;
                    }
                }
            }
        }
    }
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        chunks: Vec<Vec<u8>>,
        completions: usize,
    }

    impl ChunkSink for Recorder {
        fn on_chunk(&mut self, chunk: &[u8]) {
            self.chunks.push(chunk.to_vec());
        }

        fn on_message_complete(&mut self) {
            self.completions += 1;
        }
    }

    #[test]
    fn test_single_chunk_and_terminator() {
        let mut parser = FrameParser::new();
        let mut sink = Recorder::default();

        parser.feed(&[0x00, 0x03, 1, 2, 3, 0x00, 0x00], &mut sink);

        assert_eq!(sink.chunks, vec![vec![1, 2, 3]]);
        assert_eq!(sink.completions, 1);
        assert!(parser.is_idle());
    }

    #[test]
    fn test_message_in_two_chunks() {
        let mut parser = FrameParser::new();
        let mut sink = Recorder::default();

        parser.feed(&[0x00, 0x02, 1, 2, 0x00, 0x01, 3, 0x00, 0x00], &mut sink);

        assert_eq!(sink.chunks.concat(), vec![1, 2, 3]);
        assert_eq!(sink.completions, 1);
    }

    #[test]
    fn test_two_messages_back_to_back() {
        let mut parser = FrameParser::new();
        let mut sink = Recorder::default();

        parser.feed(
            &[0x00, 0x01, 0xAA, 0x00, 0x00, 0x00, 0x01, 0xBB, 0x00, 0x00],
            &mut sink,
        );

        assert_eq!(sink.chunks, vec![vec![0xAA], vec![0xBB]]);
        assert_eq!(sink.completions, 2);
    }

    #[test]
    fn test_resumes_after_partial_header() {
        let mut parser = FrameParser::new();
        let mut sink = Recorder::default();

        parser.feed(&[0x00], &mut sink);
        assert!(!parser.is_idle());
        parser.feed(&[0x02], &mut sink);
        parser.feed(&[9], &mut sink);
        parser.feed(&[8, 0x00], &mut sink);
        parser.feed(&[0x00], &mut sink);

        assert_eq!(sink.chunks.concat(), vec![9, 8]);
        assert_eq!(sink.completions, 1);
        assert!(parser.is_idle());
    }

    #[test]
    fn test_byte_at_a_time() {
        let wire = [0x00, 0x03, 7, 8, 9, 0x00, 0x00, 0x00, 0x00];
        let mut parser = FrameParser::new();
        let mut sink = Recorder::default();

        for b in wire {
            parser.feed(&[b], &mut sink);
        }

        assert_eq!(sink.chunks.concat(), vec![7, 8, 9]);
        // One real message plus one empty message
        assert_eq!(sink.completions, 2);
    }

    #[test]
    fn test_empty_input_is_noop() {
        let mut parser = FrameParser::new();
        let mut sink = Recorder::default();
        parser.feed(&[], &mut sink);
        assert!(sink.chunks.is_empty());
        assert_eq!(sink.completions, 0);
    }

    #[test]
    fn test_bare_terminator() {
        let mut parser = FrameParser::new();
        let mut sink = Recorder::default();
        parser.feed(&[0x00, 0x00], &mut sink);
        assert!(sink.chunks.is_empty());
        assert_eq!(sink.completions, 1);
    }
}
