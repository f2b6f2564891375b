//! Adapts a connected [`UdpSocket`] into an `AsyncRead + AsyncWrite` byte
//! stream so UDP targets can go through the same [`raido_relay::relay`]
//! call TCP targets use (spec §4.5 hands both off to C3 identically).

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::UdpSocket;

pub struct ConnectedUdp(Arc<UdpSocket>);

impl ConnectedUdp {
    pub fn new(socket: UdpSocket) -> Self {
        Self(Arc::new(socket))
    }
}

impl AsyncRead for ConnectedUdp {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        self.0.poll_recv(cx, buf)
    }
}

impl AsyncWrite for ConnectedUdp {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        self.0.poll_send(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
