//! The byte-stream (TCP) / datagram-stream (UDP) handle that a forwarder
//! hands to the transport and, eventually, to `raido-relay` (spec §4.8:
//! "convert it into a byte stream... the operator-side socket facing
//! user code in the stack").
//!
//! Bytes written here are handed to the stack's poll loop over an
//! unbounded channel and pushed into the matching smoltcp socket's send
//! buffer on the next poll; bytes the stack pulls out of the socket's
//! receive buffer arrive over the paired channel.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::mpsc;

pub struct EndpointStream {
    outbound_tx: mpsc::UnboundedSender<Bytes>,
    inbound_rx: mpsc::UnboundedReceiver<Bytes>,
    pending: BytesMut,
    closed: Arc<AtomicBool>,
}

impl EndpointStream {
    pub(crate) fn new(
        outbound_tx: mpsc::UnboundedSender<Bytes>,
        inbound_rx: mpsc::UnboundedReceiver<Bytes>,
        closed: Arc<AtomicBool>,
    ) -> Self {
        Self {
            outbound_tx,
            inbound_rx,
            pending: BytesMut::new(),
            closed,
        }
    }
}

impl AsyncRead for EndpointStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        if self.pending.is_empty() {
            match self.inbound_rx.poll_recv(cx) {
                Poll::Ready(Some(chunk)) => self.pending = BytesMut::from(&chunk[..]),
                Poll::Ready(None) => return Poll::Ready(Ok(())),
                Poll::Pending => return Poll::Pending,
            }
        }

        let take = self.pending.len().min(buf.remaining());
        let chunk = self.pending.split_to(take);
        buf.put_slice(&chunk);
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for EndpointStream {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        if self.outbound_tx.send(Bytes::copy_from_slice(buf)).is_err() {
            return Poll::Ready(Ok(buf.len())); // peer side gone; drop silently, EOF follows on read
        }
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        self.closed.store(true, Ordering::SeqCst);
        Poll::Ready(Ok(()))
    }
}
