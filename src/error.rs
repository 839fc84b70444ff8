//! Error types for the Bolt protocol core.

use std::fmt;
use std::io;

use thiserror::Error;

use crate::framing::FramingError;
use crate::packstream::PackStreamError;

/// Result type for Bolt operations.
pub type BoltResult<T> = Result<T, BoltError>;

/// Errors surfaced by sessions, codecs, and connections.
#[derive(Error, Debug)]
pub enum BoltError {
    /// Underlying byte stream failed; the session is closed.
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    /// Version negotiation failed.
    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    /// PackStream data was invalid, truncated, or nested too deep.
    #[error("malformed input: {0}")]
    Malformed(#[from] PackStreamError),

    /// Chunked framing was violated.
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),

    /// A message arrived that is not valid in the current state, or the
    /// response queue fell out of step with the requests sent.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// An assembled message exceeded the configured size limit.
    #[error("message of {size} bytes exceeds maximum of {max}")]
    MessageTooLarge {
        /// Observed message size
        size: usize,
        /// Configured limit
        max: usize,
    },

    /// The server answered a request with FAILURE. Recoverable with
    /// ACK_FAILURE or RESET.
    #[error("server failure: {code}: {message}")]
    ServerFailure {
        /// Failure code, e.g. `Neo.ClientError.Statement.SyntaxError`
        code: String,
        /// Human-readable failure message
        message: String,
    },

    /// A queued request was not executed because of an earlier failure.
    #[error("request ignored by server after earlier failure")]
    Ignored,

    /// The server rejected the INIT credentials.
    #[error("authentication failed: {code}: {message}")]
    AuthFailure {
        /// Failure code from the server
        code: String,
        /// Human-readable failure message
        message: String,
    },

    /// The local consumer abandoned the stream before it finished.
    #[error("stream cancelled by consumer")]
    Cancelled,

    /// The session is closed.
    #[error("session closed")]
    Closed,

    /// Too many requests pipelined without consuming responses.
    #[error("pipeline limit of {0} outstanding requests exceeded")]
    PipelineFull(usize),
}

impl BoltError {
    /// Build a protocol violation error.
    pub fn protocol(msg: impl Into<String>) -> Self {
        BoltError::ProtocolViolation(msg.into())
    }

    /// Build a server failure error from FAILURE metadata, falling back
    /// to an unknown code when the server sent none.
    pub fn server_failure(code: Option<&str>, message: Option<&str>) -> Self {
        BoltError::ServerFailure {
            code: code.unwrap_or("Neo.DatabaseError.General.UnknownError").to_string(),
            message: message.unwrap_or_default().to_string(),
        }
    }

    /// Whether the session can be recovered with ACK_FAILURE or RESET.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            BoltError::ServerFailure { .. } | BoltError::Ignored
        )
    }
}

/// Handshake-specific errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    /// The preamble did not start with the Bolt magic bytes
    InvalidMagic {
        /// Expected magic sequence
        expected: [u8; 4],
        /// Bytes actually received
        received: [u8; 4],
    },

    /// No proposed version is supported
    NoCompatibleVersion,

    /// The peer selected a version this implementation does not speak
    UnsupportedVersion(u32),

    /// Preamble was malformed (wrong size, etc.)
    InvalidData(String),
}

impl fmt::Display for HandshakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeError::InvalidMagic { expected, received } => {
                write!(
                    f,
                    "Invalid magic number: expected {:02X?}, received {:02X?}",
                    expected, received
                )
            }
            HandshakeError::NoCompatibleVersion => {
                write!(f, "No compatible protocol version found")
            }
            HandshakeError::UnsupportedVersion(v) => {
                write!(f, "Unsupported protocol version: 0x{:08X}", v)
            }
            HandshakeError::InvalidData(msg) => {
                write!(f, "Invalid handshake data: {}", msg)
            }
        }
    }
}

impl std::error::Error for HandshakeError {}

/// Well-known Bolt failure codes.
pub struct FailureCode;

impl FailureCode {
    /// Credentials rejected during INIT
    pub const UNAUTHORIZED: &'static str = "Neo.ClientError.Security.Unauthorized";
    /// Statement could not be parsed
    pub const SYNTAX_ERROR: &'static str = "Neo.ClientError.Statement.SyntaxError";
    /// A message arrived that is invalid in the session's current state
    pub const INVALID_MESSAGE: &'static str = "Protocol.InvalidMessage";
    /// Catch-all server-side error
    pub const GENERAL_ERROR: &'static str = "Neo.DatabaseError.General.UnknownError";
}
