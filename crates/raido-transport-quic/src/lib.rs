//! QUIC-native implementation of the `raido-transport` traits, built on
//! quinn. QUIC's mandatory TLS 1.3 and native stream multiplexing give the
//! agent/server a connection that already satisfies `StreamConnection`
//! without any pooling layer (spec §4.2 — QUIC's `get_stream`/`put_stream`
//! degenerate to plain open/drop).

mod config;
mod connection;
mod listener;
mod stream;

pub use connection::QuicConnection;
pub use listener::QuicListener;
pub use stream::QuicStream;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use quinn::Endpoint;
use raido_transport::{ClientTrust, StreamConnection, StreamListener, Transport, TransportError};
use tracing::info;

/// Builds dialers and listeners over QUIC. One instance handles both roles;
/// which methods get called depends on whether the process is an agent
/// (dial only) or a proxy server (listen, then per-agent dial is never
/// needed since QUIC streams flow over the single accepted connection).
pub struct QuicTransport {
    trust: ClientTrust,
    cert_dir: PathBuf,
    server_host: String,
}

impl QuicTransport {
    pub fn new(trust: ClientTrust, cert_dir: PathBuf, server_host: String) -> Self {
        Self {
            trust,
            cert_dir,
            server_host,
        }
    }
}

#[async_trait]
impl Transport for QuicTransport {
    async fn dial(&self, addr: &str) -> Result<Arc<dyn StreamConnection>, TransportError> {
        let socket_addr: SocketAddr = addr
            .parse()
            .map_err(|e| TransportError::DialFailed(format!("invalid address {addr}: {e}")))?;

        let client_cfg = config::client_config(self.trust.clone())?;

        let bind_addr: SocketAddr = if socket_addr.is_ipv6() {
            "[::]:0".parse().unwrap()
        } else {
            "0.0.0.0:0".parse().unwrap()
        };
        let mut endpoint = Endpoint::client(bind_addr).map_err(TransportError::Io)?;
        endpoint.set_default_client_config(client_cfg);

        let connecting = endpoint
            .connect(socket_addr, &self.server_host)
            .map_err(|e| TransportError::DialFailed(e.to_string()))?;

        let connection = connecting
            .await
            .map_err(|e| TransportError::DialFailed(e.to_string()))?;

        info!(%addr, "quic connection established");
        Ok(Arc::new(QuicConnection::new(connection)))
    }

    async fn listen(&self, addr: &str) -> Result<Arc<dyn StreamListener>, TransportError> {
        let bind_addr: SocketAddr = addr
            .parse()
            .map_err(|e| TransportError::ListenFailed(format!("invalid address {addr}: {e}")))?;

        let identity = raido_transport::load_or_generate_server_identity(&self.cert_dir, &self.server_host)?;
        let server_cfg = config::server_config(&identity)?;

        let endpoint = Endpoint::server(server_cfg, bind_addr).map_err(TransportError::Io)?;
        info!(local = %endpoint.local_addr().map_err(TransportError::Io)?, "quic listener bound");

        Ok(Arc::new(QuicListener::new(endpoint)))
    }

    fn name(&self) -> &'static str {
        "QUIC"
    }
}
