use std::net::SocketAddr;

use async_trait::async_trait;
use quinn::Connection;
use raido_transport::{Stream, StreamConnection, TransportError};
use tracing::{debug, error, trace};

use crate::stream::QuicStream;

#[derive(Debug, Clone)]
pub struct QuicConnection {
    inner: Connection,
}

impl QuicConnection {
    pub fn new(inner: Connection) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl StreamConnection for QuicConnection {
    async fn open_stream(&self) -> Result<Box<dyn Stream>, TransportError> {
        let (send, recv) = self
            .inner
            .open_bi()
            .await
            .map_err(|e| TransportError::DialFailed(e.to_string()))?;

        trace!(stream = send.id().index(), "opened quic bidi stream");
        Ok(Box::new(QuicStream::new(send, recv)))
    }

    async fn accept_stream(&self) -> Result<Option<Box<dyn Stream>>, TransportError> {
        match self.inner.accept_bi().await {
            Ok((send, recv)) => {
                trace!(stream = send.id().index(), "accepted quic bidi stream");
                Ok(Some(Box::new(QuicStream::new(send, recv))))
            }
            Err(quinn::ConnectionError::ApplicationClosed(_))
            | Err(quinn::ConnectionError::ConnectionClosed(_))
            | Err(quinn::ConnectionError::LocallyClosed)
            | Err(quinn::ConnectionError::TimedOut)
            | Err(quinn::ConnectionError::Reset) => {
                debug!("quic connection closed, no more streams");
                Ok(None)
            }
            Err(e) => {
                error!(error = %e, "error accepting quic stream, treating as closed");
                Ok(None)
            }
        }
    }

    async fn close_with(&self, code: u64, reason: &str) {
        self.inner.close(quinn::VarInt::from_u64(code).unwrap_or(quinn::VarInt::MAX), reason.as_bytes());
    }

    fn is_closed(&self) -> bool {
        self.inner.close_reason().is_some()
    }

    fn remote_address(&self) -> SocketAddr {
        self.inner.remote_address()
    }
}
