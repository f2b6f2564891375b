use thiserror::Error;

/// Errors from the reverse handshake (spec §4.6). `raido-control`'s
/// `ControlError` carries the operator-facing errors for everything else
/// `ServerController` does.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("transport error: {0}")]
    Transport(#[from] raido_transport::TransportError),

    #[error("wire codec error: {0}")]
    Proto(#[from] raido_proto::ProtoError),
}
