use thiserror::Error;

/// Errors raised while encoding or decoding a frame on a Raido stream.
///
/// A `Malformed` frame is always a reason to close the stream that produced
/// it; it never kills the underlying transport connection (see spec §7).
#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("malformed frame: {0}")]
    Malformed(String),

    #[error("frame serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("frame exceeds maximum size of {max} bytes (got {got})")]
    TooLarge { max: usize, got: usize },
}
