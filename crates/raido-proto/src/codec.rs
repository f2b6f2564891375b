//! Length-prefixed bincode framing shared by the tunnel wire protocol and
//! the operator control-RPC channel (see SPEC_FULL.md's Open Question #1).
//!
//! Format: `[length: u32 BE][payload: bincode-serialized value]`. This is
//! the same self-describing-enough scheme the teacher's `tunnel-proto`
//! crate uses for `TunnelMessage`; Raido reuses it for `Envelope` and for
//! every payload carried inside an envelope body.

use bytes::{Buf, BytesMut};
use serde::{de::DeserializeOwned, Serialize};

use crate::error::ProtoError;

/// Frames larger than this are rejected outright (mirrors the teacher's
/// `TunnelCodec::MAX_MESSAGE_SIZE`).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

const LENGTH_PREFIX_SIZE: usize = 4;

/// Encode `value` as a length-prefixed frame.
pub fn encode_frame<T: Serialize>(value: &T) -> Result<Vec<u8>, ProtoError> {
    let payload = bincode::serialize(value)?;
    if payload.len() > MAX_FRAME_SIZE {
        return Err(ProtoError::TooLarge {
            max: MAX_FRAME_SIZE,
            got: payload.len(),
        });
    }

    let mut out = Vec::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Try to decode one frame out of `buf`, consuming it on success.
///
/// Returns `Ok(None)` if `buf` doesn't yet hold a complete frame.
pub fn decode_frame<T: DeserializeOwned>(buf: &mut BytesMut) -> Result<Option<T>, ProtoError> {
    if buf.len() < LENGTH_PREFIX_SIZE {
        return Ok(None);
    }

    let mut length_bytes = [0u8; LENGTH_PREFIX_SIZE];
    length_bytes.copy_from_slice(&buf[..LENGTH_PREFIX_SIZE]);
    let length = u32::from_be_bytes(length_bytes) as usize;

    if length > MAX_FRAME_SIZE {
        return Err(ProtoError::TooLarge {
            max: MAX_FRAME_SIZE,
            got: length,
        });
    }

    if buf.len() < LENGTH_PREFIX_SIZE + length {
        return Ok(None);
    }

    buf.advance(LENGTH_PREFIX_SIZE);
    let payload = buf.split_to(length);
    let value = bincode::deserialize(&payload)?;
    Ok(Some(value))
}

/// Read exactly one frame's worth of bytes from an async reader, parsing
/// the length prefix first. Used by transports that hand us a plain
/// `AsyncRead + AsyncWrite` stream rather than a framed codec.
pub async fn read_frame<R, T>(mut reader: R) -> Result<T, ProtoError>
where
    R: tokio::io::AsyncRead + Unpin,
    T: DeserializeOwned,
{
    use tokio::io::AsyncReadExt;

    let mut length_bytes = [0u8; LENGTH_PREFIX_SIZE];
    reader
        .read_exact(&mut length_bytes)
        .await
        .map_err(|e| ProtoError::Malformed(format!("reading frame length: {e}")))?;
    let length = u32::from_be_bytes(length_bytes) as usize;
    if length > MAX_FRAME_SIZE {
        return Err(ProtoError::TooLarge {
            max: MAX_FRAME_SIZE,
            got: length,
        });
    }

    let mut payload = vec![0u8; length];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(|e| ProtoError::Malformed(format!("reading frame payload: {e}")))?;
    Ok(bincode::deserialize(&payload)?)
}

/// Write one frame to an async writer using the same length-prefixed shape.
pub async fn write_frame<W, T>(mut writer: W, value: &T) -> Result<(), ProtoError>
where
    W: tokio::io::AsyncWrite + Unpin,
    T: Serialize,
{
    use tokio::io::AsyncWriteExt;

    let framed = encode_frame(value)?;
    writer
        .write_all(&framed)
        .await
        .map_err(|e| ProtoError::Malformed(format!("writing frame: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Envelope;

    #[test]
    fn encode_decode_envelope() {
        let env = Envelope::new("GetRoutesReq", vec![1, 2, 3]);
        let bytes = encode_frame(&env).unwrap();
        let mut buf = BytesMut::from(&bytes[..]);
        let decoded: Envelope = decode_frame(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, env);
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_incomplete_returns_none() {
        let env = Envelope::new("GetRoutesReq", vec![1, 2, 3]);
        let bytes = encode_frame(&env).unwrap();
        let mut buf = BytesMut::from(&bytes[..bytes.len() - 1]);
        let decoded: Option<Envelope> = decode_frame(&mut buf).unwrap();
        assert!(decoded.is_none());
    }

    #[test]
    fn envelope_shorter_than_header_is_malformed() {
        // Fewer than 4 bytes total can never hold a length prefix.
        let mut buf = BytesMut::from(&b"ab"[..]);
        let decoded: Option<Envelope> = decode_frame(&mut buf).unwrap();
        assert!(decoded.is_none());
    }

    #[test]
    fn oversized_length_prefix_is_rejected() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&((MAX_FRAME_SIZE + 1) as u32).to_be_bytes());
        let result: Result<Option<Envelope>, _> = decode_frame(&mut buf);
        assert!(matches!(result, Err(ProtoError::TooLarge { .. })));
    }
}
