//! Server side of the Bolt protocol.
//!
//! [`BoltServer`] accepts TCP connections and spawns one
//! [`ServerSession`] task per connection; each session performs the
//! handshake, authenticates the client, and dispatches requests to the
//! application-supplied [`BoltService`].

pub mod service;
pub mod session;

pub use service::{BoltService, QueryResult, ServiceError};
pub use session::{ServerSession, ServerState};

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::error::BoltResult;

/// Conventional Bolt port.
pub const DEFAULT_PORT: u16 = 7687;

/// A Bolt server: a TCP listener plus the service shared by all
/// sessions.
pub struct BoltServer<H> {
    listener: TcpListener,
    service: Arc<H>,
}

impl<H: BoltService> BoltServer<H> {
    /// Bind a listener on the given address.
    pub async fn bind(address: &str, service: H) -> BoltResult<Self> {
        let listener = TcpListener::bind(address).await?;
        Ok(Self {
            listener,
            service: Arc::new(service),
        })
    }

    /// The address the listener is bound to.
    pub fn local_addr(&self) -> BoltResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections forever, one session task per connection.
    pub async fn serve(self) -> BoltResult<()> {
        loop {
            let (stream, peer) = self.listener.accept().await?;
            stream.set_nodelay(true).ok();

            let service = Arc::clone(&self.service);
            tokio::spawn(async move {
                tracing::debug!(%peer, "connection accepted");
                if let Err(e) = ServerSession::new(stream, service).run().await {
                    tracing::warn!(%peer, error = %e, "session ended with error");
                }
                tracing::debug!(%peer, "connection closed");
            });
        }
    }
}

impl<H> std::fmt::Debug for BoltServer<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoltServer")
            .field("local_addr", &self.listener.local_addr().ok())
            .finish()
    }
}
