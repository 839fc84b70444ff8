//! Client side of the Bolt protocol.
//!
//! [`Connection`] wraps a byte stream with the handshake and message
//! framing; [`ClientSession`] layers the session state machine on top:
//! initialization, request pipelining, streamed record delivery, and
//! failure recovery.

pub mod connection;
pub mod session;

pub use connection::Connection;
pub use session::{ClientResponse, ClientSession, RecordStream, SessionConfig, SessionState};
