//! Transport-agnostic connection and stream traits (spec §4.2), plus the
//! pinned self-signed TLS trust model shared by both concrete backends:
//! [`raido-transport-quic`](../raido_transport_quic) (QUIC-native) and
//! [`raido-transport-tcp`](../raido_transport_tcp) (TCP + yamux).

mod error;
mod tls;
mod traits;

pub use error::TransportError;
pub use tls::{
    build_client_tls_config, build_server_tls_config, fingerprint_of, load_or_generate_server_identity,
    parse_fingerprint_hex, ClientTrust, Fingerprint, PinnedFingerprintVerifier, ServerIdentity,
    ALPN_PROTOCOL,
};
pub use traits::{Stream, StreamConnection, StreamListener, Transport};
