//! Server session state machine.
//!
//! One session per accepted connection. The session performs the
//! handshake, waits for INIT, then dispatches requests according to the
//! protocol state machine, delegating statement execution to the
//! [`BoltService`](super::BoltService) it was built with.

use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::BoltCodec;
use crate::error::{BoltError, BoltResult, FailureCode, HandshakeError};
use crate::handshake::{self, HANDSHAKE_SIZE};
use crate::message::{Request, Response};
use crate::packstream::{Value, ValueMap};

use super::service::{BoltService, QueryResult};

/// Server-side session states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Waiting for the 20-byte client preamble
    AwaitingHandshake,
    /// Handshake done, waiting for INIT
    AwaitingInit,
    /// Initialized and idle
    Ready,
    /// A RUN has produced a result awaiting PULL_ALL or DISCARD_ALL
    Streaming,
    /// A failure was reported and not yet acknowledged
    Failed,
    /// The connection is finished
    Closed,
}

/// A Bolt server session over an arbitrary byte stream.
pub struct ServerSession<S, H> {
    stream: S,
    service: Arc<H>,
    codec: BoltCodec,
    read_buffer: BytesMut,
    write_buffer: BytesMut,
    state: ServerState,
    /// Records and summary produced by the last RUN, awaiting retrieval
    result: Option<QueryResult>,
}

impl<S, H> ServerSession<S, H>
where
    S: AsyncRead + AsyncWrite + Unpin,
    H: BoltService,
{
    /// Create a session for an accepted connection.
    pub fn new(stream: S, service: Arc<H>) -> Self {
        Self {
            stream,
            service,
            codec: BoltCodec::new(),
            read_buffer: BytesMut::with_capacity(8192),
            write_buffer: BytesMut::with_capacity(8192),
            state: ServerState::AwaitingHandshake,
            result: None,
        }
    }

    /// Current session state.
    pub fn state(&self) -> ServerState {
        self.state
    }

    /// Drive the session until the peer disconnects or a fatal error
    /// occurs.
    pub async fn run(mut self) -> BoltResult<()> {
        self.handshake().await?;

        loop {
            let request = match self.recv().await? {
                Some(request) => request,
                None => break,
            };
            self.dispatch(request).await?;
            if self.state == ServerState::Closed {
                break;
            }
        }

        self.state = ServerState::Closed;
        Ok(())
    }

    /// Read the client preamble and answer with the chosen version.
    async fn handshake(&mut self) -> BoltResult<()> {
        let mut preamble = [0u8; HANDSHAKE_SIZE];
        self.stream.read_exact(&mut preamble).await?;

        let outcome = handshake::negotiate(&preamble);
        self.stream
            .write_all(&handshake::encode_response(&outcome))
            .await?;
        self.stream.flush().await?;

        match outcome {
            Ok(version) => {
                tracing::debug!(version, "handshake negotiated");
                self.state = ServerState::AwaitingInit;
                Ok(())
            }
            Err(e) => {
                self.state = ServerState::Closed;
                let _ = self.stream.shutdown().await;
                Err(BoltError::Handshake(e))
            }
        }
    }

    /// Receive the next request, or `None` when the peer closed.
    ///
    /// A structurally valid message with an unknown or malformed request
    /// shape is answered per the state machine (FAILURE, or IGNORED when
    /// already failed) rather than treated as fatal.
    async fn recv(&mut self) -> BoltResult<Option<Request>> {
        loop {
            if let Some(value) = self.codec.decode(&mut self.read_buffer)? {
                match value
                    .as_structure()
                    .ok_or(())
                    .and_then(|s| Request::from_structure(s).map_err(|_| ()))
                {
                    Ok(request) => return Ok(Some(request)),
                    Err(()) => {
                        if self.state == ServerState::Failed {
                            self.send(Response::Ignored)?;
                        } else {
                            self.send(Response::failure(
                                FailureCode::INVALID_MESSAGE,
                                "Message not valid for this protocol version",
                            ))?;
                            self.state = ServerState::Failed;
                        }
                        self.flush().await?;
                        continue;
                    }
                }
            }

            let n = self.stream.read_buf(&mut self.read_buffer).await?;
            if n == 0 {
                return Ok(None);
            }
        }
    }

    async fn dispatch(&mut self, request: Request) -> BoltResult<()> {
        tracing::debug!(request = request.name(), state = ?self.state, "dispatch");
        match self.state {
            ServerState::AwaitingInit => self.on_awaiting_init(request).await,
            ServerState::Ready => self.on_ready(request).await,
            ServerState::Streaming => self.on_streaming(request).await,
            ServerState::Failed => self.on_failed(request).await,
            ServerState::AwaitingHandshake => Err(BoltError::Handshake(
                HandshakeError::InvalidData("Message before handshake".to_string()),
            )),
            ServerState::Closed => Ok(()),
        }
    }

    async fn on_awaiting_init(&mut self, request: Request) -> BoltResult<()> {
        match request {
            Request::Init {
                client_name,
                auth_token,
            } => {
                if self.service.verify_auth_token(&auth_token).await {
                    tracing::debug!(%client_name, "session initialized");
                    self.send(Response::success(self.service.server_metadata()))?;
                    self.flush().await?;
                    self.state = ServerState::Ready;
                } else {
                    // Credentials rejected: FAILURE, then the connection
                    // is closed for good
                    self.send(Response::failure(
                        FailureCode::UNAUTHORIZED,
                        "The client is unauthorized due to authentication failure.",
                    ))?;
                    self.flush().await?;
                    let _ = self.stream.shutdown().await;
                    self.state = ServerState::Closed;
                }
                Ok(())
            }
            _ => self.unexpected_message().await,
        }
    }

    async fn on_ready(&mut self, request: Request) -> BoltResult<()> {
        match request {
            Request::Run {
                statement,
                parameters,
            } => match self.service.run(&statement, &parameters).await {
                Ok(result) => {
                    let mut metadata = ValueMap::new();
                    metadata.insert(
                        "fields",
                        Value::List(
                            result.fields.iter().map(|f| Value::from(f.as_str())).collect(),
                        ),
                    );
                    metadata.insert("result_available_after", 0i64);
                    self.send(Response::success(metadata))?;
                    self.flush().await?;
                    self.result = Some(result);
                    self.state = ServerState::Streaming;
                    Ok(())
                }
                Err(e) => {
                    tracing::debug!(code = %e.code, "statement failed");
                    self.send(Response::failure(e.code, e.message))?;
                    self.flush().await?;
                    self.state = ServerState::Failed;
                    Ok(())
                }
            },
            Request::Reset => self.reset().await,
            _ => self.unexpected_message().await,
        }
    }

    async fn on_streaming(&mut self, request: Request) -> BoltResult<()> {
        match request {
            Request::PullAll => {
                let result = self.result.take().unwrap_or_default();
                for record in result.records {
                    self.send(Response::record(record))?;
                }
                self.send(Response::success(finish_summary(result.summary)))?;
                self.flush().await?;
                self.state = ServerState::Ready;
                Ok(())
            }
            Request::DiscardAll => {
                // Drain without emitting records
                let result = self.result.take().unwrap_or_default();
                self.send(Response::success(finish_summary(result.summary)))?;
                self.flush().await?;
                self.state = ServerState::Ready;
                Ok(())
            }
            Request::Reset => self.reset().await,
            _ => {
                self.result = None;
                self.unexpected_message().await
            }
        }
    }

    async fn on_failed(&mut self, request: Request) -> BoltResult<()> {
        match request {
            Request::AckFailure => {
                self.send(Response::success(ValueMap::new()))?;
                self.flush().await?;
                self.state = ServerState::Ready;
                Ok(())
            }
            Request::Reset => self.reset().await,
            _ => {
                self.send(Response::Ignored)?;
                self.flush().await?;
                Ok(())
            }
        }
    }

    /// Drop any in-flight stream, clear the failed flag, and confirm.
    async fn reset(&mut self) -> BoltResult<()> {
        self.result = None;
        self.send(Response::success(ValueMap::new()))?;
        self.flush().await?;
        self.state = ServerState::Ready;
        Ok(())
    }

    async fn unexpected_message(&mut self) -> BoltResult<()> {
        self.send(Response::failure(
            FailureCode::INVALID_MESSAGE,
            "Message not allowed in current session state",
        ))?;
        self.flush().await?;
        self.state = ServerState::Failed;
        Ok(())
    }

    fn send(&mut self, response: Response) -> BoltResult<()> {
        self.codec
            .encode(Value::Structure(response.to_structure()), &mut self.write_buffer)
    }

    async fn flush(&mut self) -> BoltResult<()> {
        if self.write_buffer.is_empty() {
            return Ok(());
        }
        let outgoing = self.write_buffer.split();
        self.stream.write_all(&outgoing).await?;
        self.stream.flush().await?;
        Ok(())
    }
}

/// Add the consumed-after timing to a stream summary unless the service
/// already reported one.
fn finish_summary(mut summary: ValueMap) -> ValueMap {
    if !summary.contains_key("result_consumed_after") {
        summary.insert("result_consumed_after", 0i64);
    }
    summary
}

impl<S, H> std::fmt::Debug for ServerSession<S, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerSession")
            .field("state", &self.state)
            .field("has_result", &self.result.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Connection;
    use crate::server::ServiceError;
    use tokio::io::duplex;

    struct EchoService;

    #[async_trait::async_trait]
    impl BoltService for EchoService {
        async fn run(
            &self,
            statement: &str,
            _parameters: &ValueMap,
        ) -> Result<QueryResult, ServiceError> {
            if statement == "fail" {
                return Err(ServiceError::syntax_error("bad statement"));
            }
            Ok(QueryResult::new(vec!["echo".to_string()])
                .with_record(vec![Value::from(statement)])
                .with_summary(ValueMap::from([("type", "r")])))
        }
    }

    /// Handshake and INIT a raw client connection against a spawned
    /// server session.
    async fn ready_connection() -> Connection<tokio::io::DuplexStream> {
        let (client_end, server_end) = duplex(65536);
        tokio::spawn(async move {
            let _ = ServerSession::new(server_end, Arc::new(EchoService)).run().await;
        });

        let mut conn = Connection::new(client_end);
        conn.handshake().await.unwrap();
        conn.enqueue(Request::Init {
            client_name: "AsyncBolt/1.0".to_string(),
            auth_token: ValueMap::from([("scheme", "none")]),
        })
        .unwrap();
        conn.flush().await.unwrap();
        let response = conn.recv().await.unwrap();
        assert!(response.is_success());
        conn
    }

    #[tokio::test]
    async fn test_run_pull_all_cycle() {
        let mut conn = ready_connection().await;

        conn.enqueue(Request::run("hello", ValueMap::new())).unwrap();
        conn.enqueue(Request::PullAll).unwrap();
        conn.flush().await.unwrap();

        let run_summary = conn.recv().await.unwrap();
        match &run_summary {
            Response::Success { metadata } => {
                assert_eq!(
                    metadata.get("fields"),
                    Some(&Value::List(vec![Value::from("echo")]))
                );
                assert_eq!(metadata.get_int("result_available_after"), Some(0));
            }
            other => panic!("Expected SUCCESS, got {}", other.name()),
        }

        match conn.recv().await.unwrap() {
            Response::Record { fields } => assert_eq!(fields, vec![Value::from("hello")]),
            other => panic!("Expected RECORD, got {}", other.name()),
        }

        match conn.recv().await.unwrap() {
            Response::Success { metadata } => {
                assert_eq!(metadata.get_str("type"), Some("r"));
                assert_eq!(metadata.get_int("result_consumed_after"), Some(0));
            }
            other => panic!("Expected SUCCESS, got {}", other.name()),
        }
    }

    #[tokio::test]
    async fn test_discard_all_emits_no_records() {
        let mut conn = ready_connection().await;

        conn.enqueue(Request::run("hello", ValueMap::new())).unwrap();
        conn.enqueue(Request::DiscardAll).unwrap();
        conn.flush().await.unwrap();

        assert!(conn.recv().await.unwrap().is_success());
        // Straight to the summary, no RECORD in between
        match conn.recv().await.unwrap() {
            Response::Success { metadata } => {
                assert_eq!(metadata.get_str("type"), Some("r"));
            }
            other => panic!("Expected SUCCESS, got {}", other.name()),
        }
    }

    #[tokio::test]
    async fn test_failure_then_ignored_until_ack() {
        let mut conn = ready_connection().await;

        conn.enqueue(Request::run("fail", ValueMap::new())).unwrap();
        conn.enqueue(Request::PullAll).unwrap();
        conn.enqueue(Request::run("hello", ValueMap::new())).unwrap();
        conn.enqueue(Request::PullAll).unwrap();
        conn.flush().await.unwrap();

        let failure = conn.recv().await.unwrap();
        assert_eq!(
            failure.failure_code(),
            Some("Neo.ClientError.Statement.SyntaxError")
        );
        // Everything queued behind the failure is ignored
        assert_eq!(conn.recv().await.unwrap(), Response::Ignored);
        assert_eq!(conn.recv().await.unwrap(), Response::Ignored);
        assert_eq!(conn.recv().await.unwrap(), Response::Ignored);

        conn.enqueue(Request::AckFailure).unwrap();
        conn.flush().await.unwrap();
        assert!(conn.recv().await.unwrap().is_success());

        // Ready again
        conn.enqueue(Request::run("hello", ValueMap::new())).unwrap();
        conn.enqueue(Request::PullAll).unwrap();
        conn.flush().await.unwrap();
        assert!(conn.recv().await.unwrap().is_success());
        assert!(conn.recv().await.unwrap().is_record());
        assert!(conn.recv().await.unwrap().is_success());
    }

    #[tokio::test]
    async fn test_reset_clears_failed() {
        let mut conn = ready_connection().await;

        conn.enqueue(Request::run("fail", ValueMap::new())).unwrap();
        conn.flush().await.unwrap();
        assert!(conn.recv().await.unwrap().is_failure());

        conn.enqueue(Request::Reset).unwrap();
        conn.flush().await.unwrap();
        assert!(conn.recv().await.unwrap().is_success());

        conn.enqueue(Request::run("hello", ValueMap::new())).unwrap();
        conn.enqueue(Request::PullAll).unwrap();
        conn.flush().await.unwrap();
        assert!(conn.recv().await.unwrap().is_success());
    }

    #[tokio::test]
    async fn test_reset_drops_inflight_stream() {
        let mut conn = ready_connection().await;

        conn.enqueue(Request::run("hello", ValueMap::new())).unwrap();
        conn.flush().await.unwrap();
        assert!(conn.recv().await.unwrap().is_success());

        // RESET instead of PULL_ALL: pending records are dropped
        conn.enqueue(Request::Reset).unwrap();
        conn.flush().await.unwrap();
        assert!(conn.recv().await.unwrap().is_success());

        conn.enqueue(Request::run("again", ValueMap::new())).unwrap();
        conn.enqueue(Request::PullAll).unwrap();
        conn.flush().await.unwrap();
        assert!(conn.recv().await.unwrap().is_success());
        match conn.recv().await.unwrap() {
            Response::Record { fields } => assert_eq!(fields, vec![Value::from("again")]),
            other => panic!("Expected RECORD, got {}", other.name()),
        }
        assert!(conn.recv().await.unwrap().is_success());
    }

    #[tokio::test]
    async fn test_unexpected_message_fails_session() {
        let mut conn = ready_connection().await;

        // PULL_ALL with no preceding RUN
        conn.enqueue(Request::PullAll).unwrap();
        conn.flush().await.unwrap();

        let failure = conn.recv().await.unwrap();
        assert_eq!(failure.failure_code(), Some("Protocol.InvalidMessage"));

        // Session is now failed: further requests are ignored
        conn.enqueue(Request::run("hello", ValueMap::new())).unwrap();
        conn.flush().await.unwrap();
        assert_eq!(conn.recv().await.unwrap(), Response::Ignored);
    }

    #[tokio::test]
    async fn test_ack_failure_outside_failed_state() {
        let mut conn = ready_connection().await;

        conn.enqueue(Request::AckFailure).unwrap();
        conn.flush().await.unwrap();
        let failure = conn.recv().await.unwrap();
        assert_eq!(failure.failure_code(), Some("Protocol.InvalidMessage"));
    }

    #[tokio::test]
    async fn test_non_init_before_init_fails() {
        let (client_end, server_end) = duplex(65536);
        tokio::spawn(async move {
            let _ = ServerSession::new(server_end, Arc::new(EchoService)).run().await;
        });

        let mut conn = Connection::new(client_end);
        conn.handshake().await.unwrap();
        conn.enqueue(Request::run("hello", ValueMap::new())).unwrap();
        conn.flush().await.unwrap();

        let failure = conn.recv().await.unwrap();
        assert_eq!(failure.failure_code(), Some("Protocol.InvalidMessage"));
    }

    #[tokio::test]
    async fn test_bad_magic_closes_connection() {
        let (client_end, server_end) = duplex(65536);
        let server = tokio::spawn(async move {
            ServerSession::new(server_end, Arc::new(EchoService)).run().await
        });

        let mut raw = client_end;
        let mut preamble = [0u8; HANDSHAKE_SIZE];
        preamble[0..4].copy_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
        raw.write_all(&preamble).await.unwrap();

        let mut response = [0u8; 4];
        raw.read_exact(&mut response).await.unwrap();
        assert_eq!(response, [0, 0, 0, 0]);

        let result = server.await.unwrap();
        assert!(matches!(result, Err(BoltError::Handshake(_))));
    }

    #[tokio::test]
    async fn test_unsupported_version_gets_zero_response() {
        let (client_end, server_end) = duplex(65536);
        tokio::spawn(async move {
            let _ = ServerSession::new(server_end, Arc::new(EchoService)).run().await;
        });

        let mut raw = client_end;
        let mut preamble = [0u8; HANDSHAKE_SIZE];
        preamble[0..4].copy_from_slice(&handshake::BOLT_MAGIC);
        preamble[4..8].copy_from_slice(&9u32.to_be_bytes());
        raw.write_all(&preamble).await.unwrap();

        let mut response = [0u8; 4];
        raw.read_exact(&mut response).await.unwrap();
        assert_eq!(response, [0, 0, 0, 0]);
    }
}
