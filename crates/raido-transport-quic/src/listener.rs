use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use quinn::Endpoint;
use raido_transport::{StreamConnection, StreamListener, TransportError};
use tracing::{debug, error, info};

use crate::connection::QuicConnection;

#[derive(Debug)]
pub struct QuicListener {
    endpoint: Endpoint,
}

impl QuicListener {
    pub fn new(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }
}

#[async_trait]
impl StreamListener for QuicListener {
    async fn accept(&self) -> Result<(Arc<dyn StreamConnection>, SocketAddr), TransportError> {
        loop {
            let connecting = self
                .endpoint
                .accept()
                .await
                .ok_or_else(|| TransportError::ListenFailed("quic endpoint closed".to_string()))?;

            let remote = connecting.remote_address();
            match connecting.await {
                Ok(connection) => {
                    info!(%remote, "quic connection established");
                    return Ok((Arc::new(QuicConnection::new(connection)), remote));
                }
                Err(e) => {
                    error!(%remote, error = %e, "failed to establish incoming quic connection");
                    continue;
                }
            }
        }
    }

    fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.endpoint.local_addr().map_err(TransportError::Io)
    }

    async fn close(&self) {
        self.endpoint.close(0u32.into(), b"listener closed");
        debug!("quic listener closed");
    }
}
