use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("wire codec error: {0}")]
    Proto(#[from] raido_proto::ProtoError),

    #[error("agent not found: {0}")]
    AgentNotFound(String),

    #[error("proxy is not running")]
    ProxyNotRunning,

    #[error("proxy is already running")]
    ProxyAlreadyRunning,

    #[error("{0}")]
    Rejected(String),
}
