//! Client-side Bolt connection.
//!
//! Owns the transport, performs the version handshake, and frames
//! messages in both directions. Requests are encoded into a local write
//! buffer and only hit the wire on [`Connection::flush`], which is what
//! allows the session layer to pipeline several requests into one
//! write.

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::ResponseCodec;
use crate::error::{BoltError, BoltResult};
use crate::handshake::{self, HANDSHAKE_RESPONSE_SIZE};
use crate::message::{Request, Response};

/// Client-side connection over any ordered byte stream.
pub struct Connection<S> {
    stream: S,
    codec: ResponseCodec,
    read_buffer: BytesMut,
    write_buffer: BytesMut,
    version: Option<u32>,
    closed: bool,
}

impl Connection<TcpStream> {
    /// Connect to a Bolt server over TCP.
    pub async fn connect(address: &str) -> BoltResult<Self> {
        let stream = TcpStream::connect(address).await?;
        stream.set_nodelay(true).ok();
        Ok(Self::new(stream))
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> Connection<S> {
    /// Wrap an already-established byte stream.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            codec: ResponseCodec::new(),
            read_buffer: BytesMut::with_capacity(8192),
            write_buffer: BytesMut::with_capacity(8192),
            version: None,
            closed: false,
        }
    }

    /// Perform the Bolt handshake.
    ///
    /// Sends the magic preamble with the version proposals and reads the
    /// server's 4-byte choice.
    pub async fn handshake(&mut self) -> BoltResult<u32> {
        if self.version.is_some() {
            return Err(BoltError::protocol("Handshake already completed"));
        }

        self.stream
            .write_all(&handshake::build_client_preamble())
            .await?;
        self.stream.flush().await?;

        let mut response = [0u8; HANDSHAKE_RESPONSE_SIZE];
        self.stream.read_exact(&mut response).await?;

        let version = handshake::parse_response(response)?;
        tracing::debug!(version, "bolt handshake complete");
        self.version = Some(version);
        Ok(version)
    }

    /// Encode a request into the local write buffer without flushing.
    pub fn enqueue(&mut self, request: Request) -> BoltResult<()> {
        if self.closed {
            return Err(BoltError::Closed);
        }
        self.codec.encode(request, &mut self.write_buffer)
    }

    /// Number of buffered outbound bytes awaiting a flush.
    pub fn outbound_len(&self) -> usize {
        self.write_buffer.len()
    }

    /// Write all buffered requests to the transport and drain it.
    pub async fn flush(&mut self) -> BoltResult<()> {
        if self.closed {
            return Err(BoltError::Closed);
        }
        if self.write_buffer.is_empty() {
            return Ok(());
        }
        let outgoing = self.write_buffer.split();
        self.stream.write_all(&outgoing).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Receive the next response message.
    pub async fn recv(&mut self) -> BoltResult<Response> {
        if self.closed {
            return Err(BoltError::Closed);
        }

        loop {
            if let Some(response) = self.codec.decode(&mut self.read_buffer)? {
                return Ok(response);
            }

            let n = self.stream.read_buf(&mut self.read_buffer).await?;
            if n == 0 {
                self.closed = true;
                return Err(BoltError::Closed);
            }
        }
    }

    /// Shut the transport down.
    pub async fn close(&mut self) -> BoltResult<()> {
        if !self.closed {
            self.closed = true;
            let _ = self.stream.shutdown().await;
        }
        Ok(())
    }

    /// The negotiated protocol version, if the handshake has run.
    pub fn version(&self) -> Option<u32> {
        self.version
    }

    /// Whether the transport is closed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl<S> std::fmt::Debug for Connection<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("version", &self.version)
            .field("closed", &self.closed)
            .field("outbound_len", &self.write_buffer.len())
            .finish()
    }
}
