//! Bidirectional copy between two byte streams (spec §4.3). Each
//! direction runs concurrently, pulls its buffer from a shared
//! [`BufferPool`], and shuts down the destination's write half once its
//! source reaches EOF. Benign closes ([`error::is_suppressed`]) are
//! swallowed; anything else is returned, joined if both directions
//! failed.
//!
//! Grounded on the teacher's `tunnel-agent`/`tunnel-server-tcp` forwarder
//! copy loops, generalized from a message-framed tunnel stream to a raw
//! `AsyncRead + AsyncWrite` pair so it works identically whether the
//! stream came from the QUIC or the TCP+yamux backend.

mod error;
mod pool;

pub use error::{is_benign_close, is_host_negative_response, is_suppressed, JoinedIoError, RelayError};
pub use pool::{BufferPool, PooledBuffer, DEFAULT_BUFFER_SIZE};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

/// Bytes copied in each direction, returned on a clean completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub a_to_b: u64,
    pub b_to_a: u64,
}

/// Relay bytes between `a` and `b` until both directions see EOF, using
/// buffers from `pool`. Runs both directions concurrently on the calling
/// task; callers that want relays to proceed independently should spawn
/// this on its own task.
pub async fn relay<A, B>(a: A, b: B, pool: &BufferPool) -> Result<RelayStats, RelayError>
where
    A: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    let (mut a_read, mut a_write) = tokio::io::split(a);
    let (mut b_read, mut b_write) = tokio::io::split(b);

    let a_to_b = copy_direction(&mut a_read, &mut b_write, pool);
    let b_to_a = copy_direction(&mut b_read, &mut a_write, pool);

    let (a_to_b_result, b_to_a_result) = tokio::join!(a_to_b, b_to_a);

    match (a_to_b_result, b_to_a_result) {
        (Ok(a_to_b), Ok(b_to_a)) => Ok(RelayStats { a_to_b, b_to_a }),
        (Err(e), Ok(_)) => Err(RelayError::SourceToDestination(e)),
        (Ok(_), Err(e)) => Err(RelayError::DestinationToSource(e)),
        (Err(source_to_dest), Err(dest_to_source)) => Err(RelayError::Both(JoinedIoError {
            source_to_dest,
            dest_to_source,
        })),
    }
}

async fn copy_direction<R, W>(reader: &mut R, writer: &mut W, pool: &BufferPool) -> Result<u64, std::io::Error>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = pool.acquire();
    let mut total = 0u64;

    let result = loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break Ok(total),
            Ok(n) => n,
            Err(e) if is_suppressed(&e) => break Ok(total),
            Err(e) => break Err(e),
        };

        if let Err(e) = writer.write_all(&buf[..n]).await {
            if is_suppressed(&e) {
                break Ok(total);
            }
            break Err(e);
        }
        total += n as u64;
        trace!(bytes = n, total, "relayed chunk");
    };

    match writer.shutdown().await {
        Ok(()) => {}
        Err(e) if is_suppressed(&e) => {}
        Err(e) => debug!(error = %e, "error shutting down relay destination"),
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn relays_bytes_both_directions() {
        let (a, mut a_peer) = duplex(64);
        let (b, mut b_peer) = duplex(64);
        let pool = BufferPool::new(16);

        let relay_task = tokio::spawn(async move { relay(a, b, &pool).await });

        a_peer.write_all(b"hello from a").await.unwrap();
        a_peer.shutdown().await.unwrap();

        let mut from_a = Vec::new();
        b_peer.read_to_end(&mut from_a).await.unwrap();
        assert_eq!(&from_a, b"hello from a");

        b_peer.write_all(b"hello from b").await.unwrap();
        drop(b_peer);

        let stats = relay_task.await.unwrap().unwrap();
        assert_eq!(stats.a_to_b, "hello from a".len() as u64);
    }

    #[test]
    fn connection_reset_is_suppressed() {
        let err = std::io::Error::from(std::io::ErrorKind::ConnectionReset);
        assert!(is_suppressed(&err));
        assert!(is_host_negative_response(&err));
        assert!(!is_benign_close(&err));
    }

    #[test]
    fn unexpected_eof_is_benign() {
        let err = std::io::Error::from(std::io::ErrorKind::UnexpectedEof);
        assert!(is_benign_close(&err));
    }

    #[test]
    fn generic_error_is_not_suppressed() {
        let err = std::io::Error::other("disk full");
        assert!(!is_suppressed(&err));
    }
}
