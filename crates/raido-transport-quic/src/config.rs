//! quinn endpoint configuration, pinned to the floor values spec §4.2
//! requires regardless of what quinn's own defaults happen to be: a 5s
//! handshake/idle timeout, 1s keepalive, effectively unbounded concurrent
//! bidirectional streams, a 30 MiB connection receive window and a 6 MiB
//! per-stream receive window.

use std::sync::Arc;
use std::time::Duration;

use quinn::crypto::rustls::{QuicClientConfig, QuicServerConfig};
use raido_transport::{ClientTrust, ServerIdentity, TransportError, ALPN_PROTOCOL};

const IDLE_TIMEOUT: Duration = Duration::from_secs(5);
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(1);
const CONNECTION_RECEIVE_WINDOW: u32 = 30 * 1024 * 1024;
const STREAM_RECEIVE_WINDOW: u32 = 6 * 1024 * 1024;

fn transport_config() -> Arc<quinn::TransportConfig> {
    let mut transport = quinn::TransportConfig::default();
    transport
        .max_idle_timeout(Some(IDLE_TIMEOUT.try_into().expect("idle timeout fits in VarInt")))
        .keep_alive_interval(Some(KEEPALIVE_INTERVAL))
        .max_concurrent_bidi_streams(quinn::VarInt::MAX)
        .max_concurrent_uni_streams(0u32.into())
        .receive_window(quinn::VarInt::from_u32(CONNECTION_RECEIVE_WINDOW))
        .stream_receive_window(quinn::VarInt::from_u32(STREAM_RECEIVE_WINDOW));
    Arc::new(transport)
}

pub fn server_config(identity: &ServerIdentity) -> Result<quinn::ServerConfig, TransportError> {
    let tls_config = raido_transport::build_server_tls_config(identity, vec![ALPN_PROTOCOL.to_vec()])?;
    let quic_tls: QuicServerConfig = QuicServerConfig::try_from(tls_config)
        .map_err(|e| TransportError::Tls(format!("quic server tls: {e}")))?;

    let mut server_config = quinn::ServerConfig::with_crypto(Arc::new(quic_tls));
    server_config.transport_config(transport_config());
    Ok(server_config)
}

pub fn client_config(trust: ClientTrust) -> Result<quinn::ClientConfig, TransportError> {
    let tls_config = raido_transport::build_client_tls_config(trust, vec![ALPN_PROTOCOL.to_vec()])?;
    let quic_tls: QuicClientConfig = QuicClientConfig::try_from(tls_config)
        .map_err(|e| TransportError::Tls(format!("quic client tls: {e}")))?;

    let mut client_config = quinn::ClientConfig::new(Arc::new(quic_tls));
    client_config.transport_config(transport_config());
    Ok(client_config)
}
