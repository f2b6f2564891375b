use std::fmt::Debug;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::TransportError;

/// A bidirectional byte stream — the one concrete thing both the QUIC and
/// TCP+multiplexer backends produce (spec §4.2: `Stream: Read + Write +
/// Close`). Blanket-implemented so any `AsyncRead + AsyncWrite` type from
/// either backend can be boxed into a `Box<dyn Stream>` and handed to the
/// relay without the caller caring which transport produced it.
pub trait Stream: AsyncRead + AsyncWrite + Send + Unpin + Debug {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin + Debug> Stream for T {}

/// A connection that can open and accept multiple streams (spec §4.2).
#[async_trait]
pub trait StreamConnection: Send + Sync + Debug {
    /// Open a new stream to the remote peer.
    async fn open_stream(&self) -> Result<Box<dyn Stream>, TransportError>;

    /// Accept the next stream opened by the remote peer. `Ok(None)` means
    /// the connection closed gracefully and no more streams will arrive.
    async fn accept_stream(&self) -> Result<Option<Box<dyn Stream>>, TransportError>;

    /// Close the connection with an application-level code and reason
    /// (spec §4.2, §4.5, §4.6 — code 0 is `ApplicationOk`, every other
    /// code is an error).
    async fn close_with(&self, code: u64, reason: &str);

    /// Borrow a ready stream from the pool, or open a fresh one. On the
    /// QUIC substrate this degenerates to `open_stream` (spec §4.2).
    async fn get_stream(&self) -> Result<Box<dyn Stream>, TransportError> {
        self.open_stream().await
    }

    /// Return a stream to the pool, or drop (closing) it if there's no
    /// room. On the QUIC substrate this degenerates to closing the stream.
    async fn put_stream(&self, stream: Box<dyn Stream>) {
        drop(stream);
    }

    fn is_closed(&self) -> bool;

    fn remote_address(&self) -> SocketAddr;
}

/// Server-side: accepts incoming [`StreamConnection`]s (spec §4.2).
#[async_trait]
pub trait StreamListener: Send + Sync {
    async fn accept(&self) -> Result<(Arc<dyn StreamConnection>, SocketAddr), TransportError>;

    fn local_addr(&self) -> Result<SocketAddr, TransportError>;

    async fn close(&self);
}

/// Client-side: dials outgoing connections. Server-side: listens for them.
/// One implementation per substrate (QUIC-native, TCP+multiplexer).
#[async_trait]
pub trait Transport: Send + Sync {
    async fn dial(&self, addr: &str) -> Result<Arc<dyn StreamConnection>, TransportError>;

    async fn listen(&self, addr: &str) -> Result<Arc<dyn StreamListener>, TransportError>;

    /// Human-readable transport name, used in logs ("QUIC", "TCP+yamux").
    fn name(&self) -> &'static str;
}
