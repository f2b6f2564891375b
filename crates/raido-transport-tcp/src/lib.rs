//! TCP + TLS + yamux implementation of the `raido-transport` traits — the
//! fallback substrate for networks that block UDP/QUIC (spec §4.2). TLS
//! gives it the same pinned-fingerprint trust model as the QUIC backend;
//! yamux gives it the same multiplexed-stream shape, backed by a bounded
//! pool of pre-opened streams since, unlike QUIC, opening a yamux stream
//! costs a round trip.

mod connection;
mod listener;
mod stream;

pub use connection::{TcpMuxConnection, DEFAULT_POOL_CAPACITY};
pub use listener::TcpMuxListener;
pub use stream::TcpMuxStream;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use raido_transport::{ClientTrust, StreamConnection, StreamListener, Transport, TransportError};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tokio_rustls::TlsConnector;
use tokio_util::compat::TokioAsyncReadCompatExt;
use tracing::info;

pub struct TcpMuxTransport {
    trust: ClientTrust,
    cert_dir: PathBuf,
    server_host: String,
    pool_capacity: usize,
}

impl TcpMuxTransport {
    pub fn new(trust: ClientTrust, cert_dir: PathBuf, server_host: String) -> Self {
        Self {
            trust,
            cert_dir,
            server_host,
            pool_capacity: DEFAULT_POOL_CAPACITY,
        }
    }

    /// `0` disables pooling — every relayed connection opens a fresh
    /// yamux stream on demand (spec §4.2).
    pub fn with_pool_capacity(mut self, capacity: usize) -> Self {
        self.pool_capacity = capacity;
        self
    }
}

#[async_trait]
impl Transport for TcpMuxTransport {
    async fn dial(&self, addr: &str) -> Result<Arc<dyn StreamConnection>, TransportError> {
        let socket_addr: SocketAddr = addr
            .parse()
            .map_err(|e| TransportError::DialFailed(format!("invalid address {addr}: {e}")))?;

        let tcp_stream = TcpStream::connect(socket_addr)
            .await
            .map_err(TransportError::Io)?;
        tcp_stream.set_nodelay(true).map_err(TransportError::Io)?;

        let tls_config = raido_transport::build_client_tls_config(self.trust.clone(), vec![raido_transport::ALPN_PROTOCOL.to_vec()])?;
        let connector = TlsConnector::from(Arc::new(tls_config));

        let server_name = rustls::pki_types::ServerName::try_from(self.server_host.clone())
            .map_err(|e| TransportError::Tls(format!("invalid server name: {e}")))?;

        let tls_stream = connector
            .connect(server_name, tcp_stream)
            .await
            .map_err(TransportError::Io)?;

        let yamux_config = yamux::Config::default();
        let connection = yamux::Connection::new(tls_stream.compat(), yamux_config, yamux::Mode::Client);
        let conn = connection::TcpMuxConnection::spawn(connection, socket_addr, self.pool_capacity);

        info!(%addr, "tcp+tls+yamux connection established");
        Ok(Arc::new(conn))
    }

    async fn listen(&self, addr: &str) -> Result<Arc<dyn StreamListener>, TransportError> {
        let bind_addr: SocketAddr = addr
            .parse()
            .map_err(|e| TransportError::ListenFailed(format!("invalid address {addr}: {e}")))?;

        let identity = raido_transport::load_or_generate_server_identity(&self.cert_dir, &self.server_host)?;
        let tls_config = raido_transport::build_server_tls_config(&identity, vec![raido_transport::ALPN_PROTOCOL.to_vec()])?;
        let acceptor = TlsAcceptor::from(Arc::new(tls_config));

        let listener = TcpListener::bind(bind_addr).await.map_err(TransportError::Io)?;
        info!(local = %listener.local_addr().map_err(TransportError::Io)?, "tcp+tls+yamux listener bound");

        Ok(Arc::new(listener::TcpMuxListener::new(listener, acceptor)))
    }

    fn name(&self) -> &'static str {
        "TCP+yamux"
    }
}
