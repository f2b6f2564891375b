use thiserror::Error;

/// Transport-level errors (spec §7's `Transport` and `Fatal` kinds).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("dial failed: {0}")]
    DialFailed(String),

    #[error("listen failed: {0}")]
    ListenFailed(String),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("stream closed")]
    StreamClosed,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("tls configuration error: {0}")]
    Tls(String),

    #[error("application close: code={code} reason={reason}")]
    ApplicationClose { code: u64, reason: String },
}

impl TransportError {
    /// True when this error represents the benign `ApplicationOk` close
    /// code (spec §3 invariant: the registry removes an agent record only
    /// on a *benign* closure, not any closure).
    pub fn is_benign_close(&self) -> bool {
        matches!(self, TransportError::ApplicationClose { code, .. } if *code == raido_proto::APPLICATION_OK)
    }
}
