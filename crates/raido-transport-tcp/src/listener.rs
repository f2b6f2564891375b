use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use raido_transport::{StreamConnection, StreamListener, TransportError};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tokio_util::compat::TokioAsyncReadCompatExt;
use tracing::{error, info};

use crate::connection::{TcpMuxConnection, DEFAULT_POOL_CAPACITY};

pub struct TcpMuxListener {
    listener: TcpListener,
    acceptor: TlsAcceptor,
}

impl TcpMuxListener {
    pub fn new(listener: TcpListener, acceptor: TlsAcceptor) -> Self {
        Self { listener, acceptor }
    }
}

#[async_trait]
impl StreamListener for TcpMuxListener {
    async fn accept(&self) -> Result<(Arc<dyn StreamConnection>, SocketAddr), TransportError> {
        loop {
            let (tcp_stream, remote_addr) = self.listener.accept().await.map_err(TransportError::Io)?;

            let tls_stream = match self.acceptor.accept(tcp_stream).await {
                Ok(stream) => stream,
                Err(e) => {
                    error!(%remote_addr, error = %e, "tls handshake failed, dropping connection");
                    continue;
                }
            };

            let yamux_config = yamux::Config::default();
            let connection = yamux::Connection::new(tls_stream.compat(), yamux_config, yamux::Mode::Server);
            let conn = TcpMuxConnection::spawn(connection, remote_addr, DEFAULT_POOL_CAPACITY);

            info!(%remote_addr, "tcp+tls+yamux connection established");
            return Ok((Arc::new(conn), remote_addr));
        }
    }

    fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.listener.local_addr().map_err(TransportError::Io)
    }

    async fn close(&self) {
        // Dropping the TcpListener is sufficient; accept() calls in flight
        // simply fail once the socket is gone.
    }
}
