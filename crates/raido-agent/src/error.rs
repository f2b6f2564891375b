use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("transport error: {0}")]
    Transport(#[from] raido_transport::TransportError),

    #[error("wire codec error: {0}")]
    Proto(#[from] raido_proto::ProtoError),

    #[error("could not enumerate local addresses: {0}")]
    SysNet(#[from] raido_sysnet::SysNetError),

    #[error("dial backoff exhausted after {attempts} attempts: {source}")]
    BackoffExhausted {
        attempts: u32,
        source: raido_transport::TransportError,
    },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
