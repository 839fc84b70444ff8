//! Client session state machine.
//!
//! A session owns one connection and drives it through the protocol
//! lifecycle: handshake, INIT, then request/response cycles. Requests
//! can be pipelined ahead of any response; responses are matched to
//! their requests strictly in FIFO order and streamed records are
//! delivered lazily through [`RecordStream`].

use std::collections::VecDeque;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::error::{BoltError, BoltResult};
use crate::message::{Request, Response};
use crate::packstream::{Value, ValueMap};

use super::connection::Connection;

/// Default cap on pipelined requests awaiting responses.
pub const DEFAULT_MAX_INFLIGHT: usize = 1024;

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, handshake not yet performed
    Uninitialized,
    /// Handshake done, INIT not yet acknowledged
    Connected,
    /// Initialized and idle
    Ready,
    /// A record stream is being consumed
    Streaming,
    /// The server reported a failure that has not been acknowledged
    Failed,
    /// The transport is gone
    Closed,
}

/// What a pending request expects back from the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResponseCardinality {
    /// Exactly one SUCCESS/FAILURE/IGNORED summary
    SingleSummary,
    /// Zero or more RECORDs, then a summary
    RecordStreamThenSummary,
}

/// Request kinds tracked in the pending FIFO.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestKind {
    Run,
    PullAll,
    AckFailure,
    Reset,
}

impl RequestKind {
    fn cardinality(self) -> ResponseCardinality {
        match self {
            RequestKind::PullAll => ResponseCardinality::RecordStreamThenSummary,
            _ => ResponseCardinality::SingleSummary,
        }
    }
}

/// One entry in the pending-request FIFO.
#[derive(Debug, Clone, Copy)]
struct PendingRequest {
    kind: RequestKind,
    cardinality: ResponseCardinality,
}

impl PendingRequest {
    fn new(kind: RequestKind) -> Self {
        Self {
            kind,
            cardinality: kind.cardinality(),
        }
    }
}

/// Configuration for establishing a client session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Client name and version reported in INIT
    pub client_name: String,
    /// Authentication token sent in INIT
    pub auth_token: ValueMap,
    /// Cap on pipelined requests awaiting responses
    pub max_inflight: usize,
}

impl SessionConfig {
    /// Config with the given client name and no authentication.
    pub fn new(client_name: impl Into<String>) -> Self {
        Self {
            client_name: client_name.into(),
            auth_token: ValueMap::from([("scheme", "none")]),
            max_inflight: DEFAULT_MAX_INFLIGHT,
        }
    }

    /// Use basic authentication.
    pub fn with_basic_auth(
        mut self,
        principal: impl Into<String>,
        credentials: impl Into<String>,
    ) -> Self {
        self.auth_token = ValueMap::from([
            ("scheme", Value::from("basic")),
            ("principal", Value::String(principal.into())),
            ("credentials", Value::String(credentials.into())),
        ]);
        self
    }

    /// Use a caller-built authentication token.
    pub fn with_auth_token(mut self, auth_token: ValueMap) -> Self {
        self.auth_token = auth_token;
        self
    }

    /// Override the pipelining cap.
    pub fn with_max_inflight(mut self, max_inflight: usize) -> Self {
        self.max_inflight = max_inflight;
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new("AsyncBolt/1.0")
    }
}

/// One response frame delivered to a record stream consumer.
///
/// Each RECORD yields `fields: Some(..)` with the metadata of the RUN
/// summary that opened the stream; the terminal SUCCESS yields
/// `fields: None` with the summary metadata and `eof` set.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientResponse {
    /// Record field values, `None` for the terminal summary frame
    pub fields: Option<Vec<Value>>,
    /// RUN metadata for records, summary metadata for the terminal frame
    pub metadata: ValueMap,
    /// Whether this frame ends the stream
    pub eof: bool,
}

/// A Bolt client session over an arbitrary byte stream.
pub struct ClientSession<S> {
    conn: Connection<S>,
    state: SessionState,
    /// Requests sent or queued, in wire order
    pending: VecDeque<PendingRequest>,
    /// Leading pending entries that have actually been flushed
    flushed: usize,
    max_inflight: usize,
    server_metadata: ValueMap,
}

impl ClientSession<TcpStream> {
    /// Connect over TCP, handshake, and initialize the session.
    pub async fn connect(address: &str, config: SessionConfig) -> BoltResult<Self> {
        let conn = Connection::connect(address).await?;
        Self::establish(conn, config).await
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> ClientSession<S> {
    /// Handshake and initialize a session over an existing connection.
    pub async fn establish(mut conn: Connection<S>, config: SessionConfig) -> BoltResult<Self> {
        if conn.version().is_none() {
            conn.handshake().await?;
        }

        let mut session = Self {
            conn,
            state: SessionState::Connected,
            pending: VecDeque::new(),
            flushed: 0,
            max_inflight: config.max_inflight,
            server_metadata: ValueMap::new(),
        };
        session.init(config.client_name, config.auth_token).await?;
        Ok(session)
    }

    /// Send INIT and await the server's verdict.
    ///
    /// The server closes the connection after a FAILURE to INIT, so a
    /// rejected session is unusable afterwards.
    async fn init(&mut self, client_name: String, auth_token: ValueMap) -> BoltResult<()> {
        self.conn.enqueue(Request::Init {
            client_name,
            auth_token,
        })?;
        self.conn.flush().await?;

        match self.conn.recv().await? {
            Response::Success { metadata } => {
                tracing::debug!(server = metadata.get_str("server"), "session initialized");
                self.server_metadata = metadata;
                self.state = SessionState::Ready;
                Ok(())
            }
            Response::Failure { metadata } => {
                self.state = SessionState::Closed;
                let _ = self.conn.close().await;
                Err(BoltError::AuthFailure {
                    code: metadata
                        .get_str("code")
                        .unwrap_or("Neo.ClientError.Security.Unauthorized")
                        .to_string(),
                    message: metadata.get_str("message").unwrap_or_default().to_string(),
                })
            }
            other => Err(BoltError::protocol(format!(
                "Unexpected response to INIT: {}",
                other.name()
            ))),
        }
    }

    /// Queue a statement for execution without flushing.
    ///
    /// Appends a RUN and a PULL_ALL to the outbound buffer and returns
    /// immediately; the requests reach the wire on the next flush, so
    /// several statements can ride in one write. Never suspends.
    pub fn pipeline(&mut self, statement: &str, parameters: ValueMap) -> BoltResult<()> {
        self.ensure_open()?;
        if self.pending.len() + 2 > self.max_inflight {
            return Err(BoltError::PipelineFull(self.max_inflight));
        }

        self.conn.enqueue(Request::run(statement, parameters))?;
        self.conn.enqueue(Request::PullAll)?;
        self.pending.push_back(PendingRequest::new(RequestKind::Run));
        self.pending.push_back(PendingRequest::new(RequestKind::PullAll));
        tracing::debug!(statement, "pipelined RUN + PULL_ALL");
        Ok(())
    }

    /// Execute a statement and stream its records.
    ///
    /// Flushes everything pipelined so far plus this statement; the
    /// returned stream yields the responses for all of them in order.
    /// The terminal summary of each result is consumed internally.
    pub async fn run(
        &mut self,
        statement: &str,
        parameters: ValueMap,
    ) -> BoltResult<RecordStream<'_, S>> {
        self.run_inner(Some((statement, parameters)), false).await
    }

    /// Like [`run`](Self::run), but the stream also yields each terminal
    /// summary as a frame with `fields: None` and `eof: true`.
    pub async fn run_with_summary(
        &mut self,
        statement: &str,
        parameters: ValueMap,
    ) -> BoltResult<RecordStream<'_, S>> {
        self.run_inner(Some((statement, parameters)), true).await
    }

    /// Flush previously pipelined statements and stream their records.
    pub async fn run_pipelined(&mut self) -> BoltResult<RecordStream<'_, S>> {
        self.run_inner(None, false).await
    }

    async fn run_inner(
        &mut self,
        statement: Option<(&str, ValueMap)>,
        yield_summary: bool,
    ) -> BoltResult<RecordStream<'_, S>> {
        self.ensure_open()?;

        // Responses still owed to consumers that abandoned their stream
        let skip = self.flushed;

        if let Some((stmt, params)) = statement {
            self.pipeline(stmt, params)?;
        }
        self.conn.flush().await?;
        self.flushed = self.pending.len();

        Ok(RecordStream {
            session: self,
            skip,
            yield_summary,
            run_metadata: None,
        })
    }

    /// Acknowledge a failure, restoring the session without discarding
    /// server-side session state.
    ///
    /// Responses owed to earlier requests are read and discarded first
    /// so the FIFO stays in step.
    pub async fn ack_failure(&mut self) -> BoltResult<ValueMap> {
        self.recover(Request::AckFailure, RequestKind::AckFailure)
            .await
    }

    /// Reset the session to a clean Ready state.
    ///
    /// Discards every in-flight consumer and clears server-side state.
    pub async fn reset(&mut self) -> BoltResult<ValueMap> {
        self.recover(Request::Reset, RequestKind::Reset).await
    }

    async fn recover(&mut self, request: Request, kind: RequestKind) -> BoltResult<ValueMap> {
        self.ensure_open()?;

        self.conn.enqueue(request)?;
        self.pending.push_back(PendingRequest::new(kind));
        self.conn.flush().await?;
        self.flushed = self.pending.len();

        // Drain responses for everything queued ahead of the recovery
        // message
        while self.pending.len() > 1 {
            self.discard_front().await?;
        }

        match self.conn.recv().await? {
            Response::Success { metadata } => {
                self.pop_front();
                self.state = SessionState::Ready;
                Ok(metadata)
            }
            Response::Failure { metadata } => {
                self.pop_front();
                self.state = SessionState::Failed;
                Err(BoltError::server_failure(
                    metadata.get_str("code"),
                    metadata.get_str("message"),
                ))
            }
            Response::Ignored => {
                self.pop_front();
                Err(BoltError::Ignored)
            }
            Response::Record { .. } => {
                Err(BoltError::protocol("Unexpected RECORD during recovery"))
            }
        }
    }

    /// Close the session and shut the transport down.
    pub async fn close(mut self) -> BoltResult<()> {
        self.state = SessionState::Closed;
        self.conn.close().await
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Metadata the server returned for INIT.
    pub fn server_metadata(&self) -> &ValueMap {
        &self.server_metadata
    }

    /// Number of requests awaiting responses.
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    fn ensure_open(&self) -> BoltResult<()> {
        if self.state == SessionState::Closed || self.conn.is_closed() {
            return Err(BoltError::Closed);
        }
        Ok(())
    }

    fn pop_front(&mut self) {
        self.pending.pop_front();
        self.flushed = self.flushed.saturating_sub(1);
    }

    /// Read and discard all responses owed to the front pending entry.
    ///
    /// Draining keeps the FIFO synchronized with the wire even when a
    /// consumer no longer wants the result; state transitions driven by
    /// the discarded responses still apply.
    async fn discard_front(&mut self) -> BoltResult<()> {
        let entry = match self.pending.front() {
            Some(entry) => *entry,
            None => return Ok(()),
        };

        loop {
            match self.conn.recv().await? {
                Response::Record { .. }
                    if entry.cardinality == ResponseCardinality::RecordStreamThenSummary =>
                {
                    continue;
                }
                Response::Success { .. } | Response::Ignored => {
                    self.pop_front();
                    return Ok(());
                }
                Response::Failure { .. } => {
                    self.state = SessionState::Failed;
                    self.pop_front();
                    return Ok(());
                }
                Response::Record { .. } => {
                    return Err(BoltError::protocol(
                        "RECORD received for a request expecting a single summary",
                    ));
                }
            }
        }
    }
}

impl<S> std::fmt::Debug for ClientSession<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSession")
            .field("state", &self.state)
            .field("pending", &self.pending.len())
            .field("flushed", &self.flushed)
            .finish()
    }
}

/// Lazy sequence of responses for the requests committed by a flush.
///
/// `next` suspends until a RECORD or terminal summary arrives. Dropping
/// the stream early does not desynchronize the session: responses still
/// owed are drained and discarded before the next operation touches the
/// wire.
pub struct RecordStream<'a, S> {
    session: &'a mut ClientSession<S>,
    /// Leading pending entries owed to abandoned consumers
    skip: usize,
    yield_summary: bool,
    run_metadata: Option<ValueMap>,
}

impl<'a, S: AsyncRead + AsyncWrite + Unpin> RecordStream<'a, S> {
    /// Await the next response frame.
    ///
    /// Returns `Ok(None)` once every pending request has been answered.
    /// A server failure surfaces as [`BoltError::ServerFailure`] for the
    /// request that caused it and [`BoltError::Ignored`] for each
    /// pipelined successor until the session is recovered.
    pub async fn next(&mut self) -> BoltResult<Option<ClientResponse>> {
        while self.skip > 0 && !self.session.pending.is_empty() {
            self.session.discard_front().await?;
            self.skip -= 1;
        }
        self.skip = 0;

        loop {
            let entry = match self.session.pending.front() {
                Some(entry) => *entry,
                None => return Ok(None),
            };

            match entry.kind {
                RequestKind::Run => match self.session.conn.recv().await? {
                    Response::Success { metadata } => {
                        self.session.pop_front();
                        self.session.state = SessionState::Streaming;
                        self.run_metadata = Some(metadata);
                    }
                    Response::Failure { metadata } => {
                        self.session.pop_front();
                        self.session.state = SessionState::Failed;
                        return Err(BoltError::server_failure(
                            metadata.get_str("code"),
                            metadata.get_str("message"),
                        ));
                    }
                    Response::Ignored => {
                        self.session.pop_front();
                        return Err(BoltError::Ignored);
                    }
                    Response::Record { .. } => {
                        return Err(BoltError::protocol("RECORD received in reply to RUN"));
                    }
                },
                RequestKind::PullAll => match self.session.conn.recv().await? {
                    Response::Record { fields } => {
                        return Ok(Some(ClientResponse {
                            fields: Some(fields),
                            metadata: self.run_metadata.clone().unwrap_or_default(),
                            eof: false,
                        }));
                    }
                    Response::Success { metadata } => {
                        self.session.pop_front();
                        self.session.state = SessionState::Ready;
                        self.run_metadata = None;
                        if self.yield_summary {
                            return Ok(Some(ClientResponse {
                                fields: None,
                                metadata,
                                eof: true,
                            }));
                        }
                    }
                    Response::Failure { metadata } => {
                        self.session.pop_front();
                        self.session.state = SessionState::Failed;
                        return Err(BoltError::server_failure(
                            metadata.get_str("code"),
                            metadata.get_str("message"),
                        ));
                    }
                    Response::Ignored => {
                        self.session.pop_front();
                        return Err(BoltError::Ignored);
                    }
                },
                RequestKind::AckFailure | RequestKind::Reset => {
                    return Err(BoltError::protocol(
                        "Recovery request pending inside a record stream",
                    ));
                }
            }
        }
    }

    /// Collect every remaining frame, failing on the first error.
    pub async fn collect(mut self) -> BoltResult<Vec<ClientResponse>> {
        let mut responses = Vec::new();
        while let Some(response) = self.next().await? {
            responses.push(response);
        }
        Ok(responses)
    }

    /// Adapt into a [`futures::Stream`] of response frames.
    pub fn into_stream(self) -> impl futures::Stream<Item = BoltResult<ClientResponse>> + 'a
    where
        S: 'a,
    {
        futures::stream::unfold(self, |mut stream| async move {
            match stream.next().await {
                Ok(Some(response)) => Some((Ok(response), stream)),
                Ok(None) => None,
                Err(e) => Some((Err(e), stream)),
            }
        })
    }
}
