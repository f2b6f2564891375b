use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetStackError {
    #[error("tun device error: {0}")]
    Tun(#[from] tun::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("socket set exhausted, cannot accept more concurrent flows")]
    SocketSetExhausted,
}
