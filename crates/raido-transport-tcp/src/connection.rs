//! Wraps a yamux connection driven over a TLS+TCP socket. Unlike QUIC,
//! yamux gives no free stream pool, so `get_stream`/`put_stream` keep a
//! bounded pool of pre-opened streams (default capacity 16, spec §4.2) to
//! avoid paying a round trip on every relayed connection.
//!
//! yamux 0.13 dropped the `Control`/`ControlledConnection` handle; a
//! `Connection` is driven by repeatedly polling it from a single task, so
//! this wraps one in a background task and exposes it to the rest of the
//! crate over channels: `open_tx` requests an outbound stream and gets the
//! result back on a oneshot, `accept_rx` receives inbound streams as they
//! arrive, and dropping `close_tx` (or sending on it) asks the task to run
//! `poll_close` and stop.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::future::poll_fn;
use raido_transport::{Stream, StreamConnection, TransportError};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, trace, warn};

use crate::stream::TcpMuxStream;

pub const DEFAULT_POOL_CAPACITY: usize = 16;

type OpenWaiter = oneshot::Sender<Result<yamux::Stream, TransportError>>;

pub struct TcpMuxConnection {
    open_tx: mpsc::Sender<OpenWaiter>,
    accept_rx: Mutex<mpsc::Receiver<yamux::Stream>>,
    close_tx: Mutex<Option<oneshot::Sender<()>>>,
    pool: Mutex<VecDeque<Box<dyn Stream>>>,
    pool_capacity: usize,
    closed: Arc<AtomicBool>,
    remote_addr: SocketAddr,
}

impl std::fmt::Debug for TcpMuxConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpMuxConnection")
            .field("remote_addr", &self.remote_addr)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

impl TcpMuxConnection {
    /// Spawns the background task that drives the yamux connection and
    /// dispatches inbound streams, then returns a handle that talks to it
    /// over channels.
    pub fn spawn<T>(connection: yamux::Connection<T>, remote_addr: SocketAddr, pool_capacity: usize) -> Self
    where
        T: futures::AsyncRead + futures::AsyncWrite + Unpin + Send + 'static,
    {
        let (accept_tx, accept_rx) = mpsc::channel(64);
        let (open_tx, open_rx) = mpsc::channel(64);
        let (close_tx, close_rx) = oneshot::channel();
        let closed = Arc::new(AtomicBool::new(false));

        tokio::spawn(drive(connection, accept_tx, open_rx, close_rx, closed.clone()));

        Self {
            open_tx,
            accept_rx: Mutex::new(accept_rx),
            close_tx: Mutex::new(Some(close_tx)),
            pool: Mutex::new(VecDeque::with_capacity(pool_capacity)),
            pool_capacity,
            closed,
            remote_addr,
        }
    }
}

enum DriveEvent {
    Inbound(Option<Result<yamux::Stream, yamux::ConnectionError>>),
    Outbound(Result<yamux::Stream, yamux::ConnectionError>),
}

/// Owns the `yamux::Connection` for its lifetime; nothing outside this
/// function ever touches it directly. Services at most one outbound-open
/// request at a time (yamux streams are cheap to open, so queueing depth
/// beyond the pool's own bound of `DEFAULT_POOL_CAPACITY` never matters
/// in practice) and forwards every inbound stream to `accept_tx`.
async fn drive<T>(
    mut connection: yamux::Connection<T>,
    accept_tx: mpsc::Sender<yamux::Stream>,
    mut open_rx: mpsc::Receiver<OpenWaiter>,
    mut close_rx: oneshot::Receiver<()>,
    closed: Arc<AtomicBool>,
) where
    T: futures::AsyncRead + futures::AsyncWrite + Unpin + Send + 'static,
{
    let mut pending_open: VecDeque<OpenWaiter> = VecDeque::new();

    'drive: loop {
        while let Ok(waiter) = open_rx.try_recv() {
            pending_open.push_back(waiter);
        }

        let next = poll_fn(|cx: &mut Context<'_>| {
            if !pending_open.is_empty() {
                if let Poll::Ready(result) = connection.poll_new_outbound(cx) {
                    return Poll::Ready(DriveEvent::Outbound(result));
                }
            }
            match connection.poll_next_inbound(cx) {
                Poll::Ready(item) => Poll::Ready(DriveEvent::Inbound(item)),
                Poll::Pending => Poll::Pending,
            }
        });

        tokio::select! {
            event = next => match event {
                DriveEvent::Inbound(Some(Ok(stream))) => {
                    trace!("accepted yamux stream");
                    if accept_tx.send(stream).await.is_err() {
                        break 'drive;
                    }
                }
                DriveEvent::Inbound(Some(Err(e))) => {
                    warn!(error = %e, "yamux connection driver error");
                    break 'drive;
                }
                DriveEvent::Inbound(None) => {
                    debug!("yamux connection closed gracefully");
                    break 'drive;
                }
                DriveEvent::Outbound(result) => {
                    if let Some(waiter) = pending_open.pop_front() {
                        let _ = waiter.send(result.map_err(|e| TransportError::DialFailed(e.to_string())));
                    }
                }
            },
            waiter = open_rx.recv() => match waiter {
                Some(waiter) => pending_open.push_back(waiter),
                // Every sender (the `TcpMuxConnection` itself) is gone, so
                // nothing can ever request another outbound stream again;
                // without this arm the branch would fire Ready on every
                // future poll and spin the task.
                None => break 'drive,
            },
            _ = &mut close_rx => {
                break 'drive;
            }
        }
    }

    let _ = poll_fn(|cx| connection.poll_close(cx)).await;
    closed.store(true, Ordering::SeqCst);
    while let Some(waiter) = pending_open.pop_front() {
        let _ = waiter.send(Err(TransportError::ConnectionClosed));
    }
}

#[async_trait]
impl StreamConnection for TcpMuxConnection {
    async fn open_stream(&self) -> Result<Box<dyn Stream>, TransportError> {
        let (tx, rx) = oneshot::channel();
        self.open_tx
            .send(tx)
            .await
            .map_err(|_| TransportError::ConnectionClosed)?;
        let stream = rx.await.map_err(|_| TransportError::ConnectionClosed)??;
        Ok(Box::new(TcpMuxStream::new(stream)))
    }

    async fn accept_stream(&self) -> Result<Option<Box<dyn Stream>>, TransportError> {
        let mut rx = self.accept_rx.lock().await;
        Ok(rx.recv().await.map(|s| Box::new(TcpMuxStream::new(s)) as Box<dyn Stream>))
    }

    async fn close_with(&self, code: u64, reason: &str) {
        debug!(code, reason, "closing tcp+yamux connection");
        self.closed.store(true, Ordering::SeqCst);
        if let Some(tx) = self.close_tx.lock().await.take() {
            let _ = tx.send(());
        }
    }

    async fn get_stream(&self) -> Result<Box<dyn Stream>, TransportError> {
        if self.pool_capacity == 0 {
            return self.open_stream().await;
        }
        if let Some(stream) = self.pool.lock().await.pop_front() {
            return Ok(stream);
        }
        self.open_stream().await
    }

    async fn put_stream(&self, stream: Box<dyn Stream>) {
        if self.pool_capacity == 0 {
            drop(stream);
            return;
        }
        let mut pool = self.pool.lock().await;
        if pool.len() < self.pool_capacity {
            pool.push_back(stream);
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }

    fn remote_address(&self) -> SocketAddr {
        self.remote_addr
    }
}
