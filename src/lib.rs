//! # AsyncBolt
//!
//! An async client/server implementation of the Bolt v1 wire protocol,
//! the binary protocol used to talk to property-graph database servers.
//!
//! ## Features
//!
//! - **PackStream** - the self-describing binary serialization format,
//!   with insertion-ordered maps for deterministic encoding
//! - **Chunked framing** - messages split across 64 KiB-max chunks with
//!   a resumable byte-driven parser
//! - **Client sessions** - handshake, INIT, pipelined RUN/PULL_ALL, and
//!   lazy record streams built on Tokio
//! - **Server sessions** - the full server state machine with query
//!   execution delegated to an application-supplied service
//!
//! ## Client Usage
//!
//! ```rust,no_run
//! use asyncbolt::{ClientSession, SessionConfig, ValueMap};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SessionConfig::default().with_basic_auth("neo4j", "password");
//!     let mut session = ClientSession::connect("127.0.0.1:7687", config).await?;
//!
//!     // Stream results lazily
//!     let mut stream = session.run("RETURN 1 AS num", ValueMap::new()).await?;
//!     while let Some(response) = stream.next().await? {
//!         println!("{:?}", response.fields);
//!     }
//!
//!     // Or pipeline several statements into one round trip
//!     session.pipeline("CREATE (n:Node)", ValueMap::new())?;
//!     session.pipeline("CREATE (m:Node)", ValueMap::new())?;
//!     let responses = session.run_pipelined().await?.collect().await?;
//!     println!("{} responses", responses.len());
//!
//!     session.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Server Usage
//!
//! ```rust,no_run
//! use asyncbolt::{BoltServer, BoltService, QueryResult, ServiceError, Value, ValueMap};
//!
//! struct EchoService;
//!
//! #[async_trait::async_trait]
//! impl BoltService for EchoService {
//!     async fn run(
//!         &self,
//!         statement: &str,
//!         _parameters: &ValueMap,
//!     ) -> Result<QueryResult, ServiceError> {
//!         Ok(QueryResult::new(vec!["echo".to_string()])
//!             .with_record(vec![Value::from(statement)])
//!             .with_summary(ValueMap::from([("type", "r")])))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = BoltServer::bind("127.0.0.1:7687", EchoService).await?;
//!     server.serve().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Failure Handling
//!
//! A FAILURE from the server puts the session into a failed state: the
//! consumer that caused it observes [`BoltError::ServerFailure`], and
//! every pipelined successor observes [`BoltError::Ignored`] until the
//! session is recovered with
//! [`ack_failure`](client::ClientSession::ack_failure) (soft, keeps
//! server-side session state) or [`reset`](client::ClientSession::reset)
//! (hard, clears it). Neither is ever sent implicitly.
//!
//! ## Modules
//!
//! - [`packstream`] - value types and the binary codec
//! - [`framing`] - chunked transfer encoding
//! - [`message`] - typed request/response messages
//! - [`handshake`] - version negotiation
//! - [`codec`] - tokio codecs tying framing and PackStream together
//! - [`client`] - client connection and session
//! - [`server`] - server listener, session, and service trait
//! - [`error`] - the error taxonomy

#![warn(missing_docs)]

pub mod client;
pub mod codec;
pub mod error;
pub mod framing;
pub mod handshake;
pub mod message;
pub mod packstream;
pub mod server;

// Re-exports for convenience
pub use client::{
    ClientResponse, ClientSession, Connection, RecordStream, SessionConfig, SessionState,
};
pub use error::{BoltError, BoltResult, FailureCode, HandshakeError};
pub use message::{Request, Response};
pub use packstream::{PackStreamError, Structure, Value, ValueMap};
pub use server::{BoltServer, BoltService, QueryResult, ServerSession, ServiceError};
