//! Agent-side stream dispatcher (spec §4.5, component C5). Dials the
//! proxy server, answers the handshake's `GetRoutesReq`, and then
//! services `EstablishConnection` requests for whichever targets the
//! operator points tunnels at.
//!
//! Grounded on `original_source/proxy/dialer.go`'s `Dialer`/`dialAndServer`:
//! a dial loop wrapped in bounded exponential backoff, an accept loop that
//! hands every stream off to a worker pool, and a shutdown watcher that
//! closes the connection with `ApplicationOk` on cancellation. Ambient
//! shape (config struct, `thiserror` error enum, `tracing` fields) carried
//! from `tunnel-agent`.

mod backoff;
mod dispatch;
mod error;
mod identity;
mod udp_stream;

pub use error::AgentError;

use std::sync::Arc;

use raido_relay::BufferPool;
use raido_transport::{StreamConnection, Transport};
use raido_workerpool::{WorkerPool, WorkerPoolConfig};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const CLOSE_REASON_SHUTTING_DOWN: &str = "client closing down";

pub struct AgentConfig {
    pub proxy_addr: String,
}

/// Runs the dial/accept loop for as long as `cancel` is not triggered.
pub struct Agent {
    transport: Arc<dyn Transport>,
    config: AgentConfig,
    pool: WorkerPool,
    buffers: BufferPool,
}

impl Agent {
    pub fn new(transport: Arc<dyn Transport>, config: AgentConfig) -> Self {
        Self {
            transport,
            config,
            pool: WorkerPool::new(WorkerPoolConfig::default()),
            buffers: BufferPool::new(raido_relay::DEFAULT_BUFFER_SIZE),
        }
    }

    /// Dial, serve, and reconnect with backoff until `cancel` fires (spec
    /// §4.5, §6 scenario 5). Returns once the cancellation is observed and
    /// the connection has been closed cleanly.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) -> Result<(), AgentError> {
        let mut attempt = 0u32;

        loop {
            let delay = backoff::delay_for_attempt(attempt);
            if !delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => return Ok(()),
                }
            }

            let dial = tokio::select! {
                result = self.transport.dial(&self.config.proxy_addr) => result,
                _ = cancel.cancelled() => return Ok(()),
            };

            let connection = match dial {
                Ok(conn) => conn,
                Err(e) => {
                    attempt += 1;
                    if attempt >= backoff::STEPS {
                        return Err(AgentError::BackoffExhausted {
                            attempts: attempt,
                            source: e,
                        });
                    }
                    warn!(error = %e, attempt, "dial failed, backing off");
                    continue;
                }
            };

            attempt = 0;
            info!(transport = self.transport.name(), "connected to proxy");

            self.serve(connection.clone(), cancel.clone()).await;

            if cancel.is_cancelled() {
                connection.close_with(raido_proto::APPLICATION_OK, CLOSE_REASON_SHUTTING_DOWN).await;
                return Ok(());
            }

            warn!("connection to proxy lost, reconnecting");
        }
    }

    /// Accept streams off `connection` until it closes or `cancel` fires,
    /// handing each one to the worker pool (spec §4.5 step 1).
    async fn serve(&self, connection: Arc<dyn StreamConnection>, cancel: CancellationToken) {
        loop {
            let accepted = tokio::select! {
                result = connection.accept_stream() => result,
                _ = cancel.cancelled() => {
                    connection.close_with(raido_proto::APPLICATION_OK, CLOSE_REASON_SHUTTING_DOWN).await;
                    return;
                }
            };

            match accepted {
                Ok(Some(stream)) => {
                    let pool = self.buffers.clone();
                    self.pool
                        .submit(async move {
                            dispatch::handle_stream(stream, &pool).await;
                        })
                        .await;
                }
                Ok(None) => {
                    info!("proxy closed the connection");
                    return;
                }
                Err(e) if e.is_benign_close() => {
                    info!("proxy closed the connection cleanly");
                    return;
                }
                Err(e) => {
                    warn!(error = %e, "accept_stream failed");
                    return;
                }
            }
        }
    }
}
