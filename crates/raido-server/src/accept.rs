//! Listener accept loop (spec §4.6): one task per running proxy listener,
//! submitting each accepted connection's handshake to the worker pool
//! (C4) and exiting cleanly on cancellation.

use std::sync::Arc;

use raido_registry::Registry;
use raido_relay::BufferPool;
use raido_transport::StreamListener;
use raido_workerpool::WorkerPool;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub async fn run(
    listener: Arc<dyn StreamListener>,
    registry: Arc<Registry>,
    pool: WorkerPool,
    buffers: BufferPool,
    cancel: CancellationToken,
) {
    loop {
        let accepted = tokio::select! {
            result = listener.accept() => result,
            _ = cancel.cancelled() => {
                listener.close().await;
                return;
            }
        };

        match accepted {
            Ok((connection, remote)) => {
                info!(%remote, "agent connection accepted");
                let registry = registry.clone();
                let buffers = buffers.clone();
                pool.submit(async move {
                    crate::handshake::handshake(connection, registry, buffers).await;
                })
                .await;
            }
            Err(e) if e.is_benign_close() => {
                info!("listener closed cleanly");
                return;
            }
            Err(e) => {
                warn!(error = %e, "accept failed, stopping listener loop");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::net::SocketAddr;
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use raido_transport::{Stream, StreamConnection, TransportError};

    use super::*;

    #[derive(Debug)]
    struct NullConnection;

    #[async_trait]
    impl StreamConnection for NullConnection {
        async fn open_stream(&self) -> Result<Box<dyn Stream>, TransportError> {
            Err(TransportError::ConnectionClosed)
        }

        async fn accept_stream(&self) -> Result<Option<Box<dyn Stream>>, TransportError> {
            Ok(None)
        }

        async fn close_with(&self, _code: u64, _reason: &str) {}

        fn is_closed(&self) -> bool {
            false
        }

        fn remote_address(&self) -> SocketAddr {
            "127.0.0.1:0".parse().unwrap()
        }
    }

    struct ScriptedListener {
        results: StdMutex<VecDeque<Result<(Arc<dyn StreamConnection>, SocketAddr), TransportError>>>,
    }

    #[async_trait]
    impl StreamListener for ScriptedListener {
        async fn accept(&self) -> Result<(Arc<dyn StreamConnection>, SocketAddr), TransportError> {
            self.results.lock().unwrap().pop_front().unwrap_or(Err(TransportError::ConnectionClosed))
        }

        fn local_addr(&self) -> Result<SocketAddr, TransportError> {
            Ok("127.0.0.1:0".parse().unwrap())
        }

        async fn close(&self) {}
    }

    #[tokio::test]
    async fn stops_cleanly_on_benign_accept_error() {
        let listener: Arc<dyn StreamListener> = Arc::new(ScriptedListener {
            results: StdMutex::new(VecDeque::from([Err(TransportError::ApplicationClose {
                code: raido_proto::APPLICATION_OK,
                reason: "listener closed".to_string(),
            })])),
        });
        let registry = Arc::new(Registry::new());
        let pool = WorkerPool::new(raido_workerpool::WorkerPoolConfig::default());
        let buffers = BufferPool::default();
        let cancel = CancellationToken::new();

        run(listener, registry.clone(), pool, buffers, cancel).await;

        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn accepted_connections_reach_the_handshake() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let listener: Arc<dyn StreamListener> = Arc::new(ScriptedListener {
            results: StdMutex::new(VecDeque::from([
                Ok((Arc::new(NullConnection) as Arc<dyn StreamConnection>, addr)),
                Err(TransportError::ApplicationClose {
                    code: raido_proto::APPLICATION_OK,
                    reason: "listener closed".to_string(),
                }),
            ])),
        });
        let registry = Arc::new(Registry::new());
        let pool = WorkerPool::new(raido_workerpool::WorkerPoolConfig::default());
        let buffers = BufferPool::default();
        let cancel = CancellationToken::new();

        run(listener, registry.clone(), pool, buffers, cancel).await;

        // NullConnection's open_stream always fails, so the submitted
        // handshake is guaranteed to have run and bailed out by the time
        // its task is scheduled; this just confirms run() doesn't itself
        // panic or hang wiring a real connection through to the handshake.
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(registry.is_empty());
    }
}
