//! Chunked message transfer framing.
//!
//! Bolt messages travel as one or more length-prefixed chunks followed
//! by a zero-length terminator. A chunk is a big-endian `u16` payload
//! length plus that many payload bytes; `0x0000` marks the end of a
//! message. Chunk boundaries are independent of message content.
//!
//! Three pieces cooperate here:
//!
//! - [`ChunkedWriteBuffer`] splits outgoing messages into chunks and
//!   appends the terminator.
//! - [`FrameParser`] is a resumable byte-driven state machine that
//!   splits incoming bytes back into chunk payloads and
//!   message-complete events, delivered through the [`ChunkSink`]
//!   callback trait.
//! - [`ChunkedReadBuffer`] reassembles chunk payloads into complete
//!   messages and serves reads across chunk boundaries.

pub mod parser;
pub mod reader;
pub mod writer;

pub use parser::{ChunkSink, FrameParser};
pub use reader::ChunkedReadBuffer;
pub use writer::ChunkedWriteBuffer;

use std::fmt;

/// End of message marker (0x00 0x00)
pub const END_MARKER: [u8; 2] = [0x00, 0x00];

/// Largest payload a single chunk can carry.
pub const MAX_CHUNK_PAYLOAD: usize = u16::MAX as usize;

/// Default chunk payload size used by the write buffer.
pub const DEFAULT_CHUNK_SIZE: usize = 8192;

/// Errors raised by the framing buffers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramingError {
    /// A read crossed the current message boundary
    Underflow { wanted: usize, available: usize },
    /// A read was attempted with no complete message buffered
    Empty,
}

impl fmt::Display for FramingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FramingError::Underflow { wanted, available } => write!(
                f,
                "Read of {} bytes crosses message boundary ({} available)",
                wanted, available
            ),
            FramingError::Empty => write!(f, "No complete message buffered"),
        }
    }
}

impl std::error::Error for FramingError {}
