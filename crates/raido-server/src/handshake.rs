//! Per-connection reverse handshake and closure supervisor (spec §4.6).
//! Submitted to the worker pool (C4) for each freshly accepted agent
//! connection.
//!
//! Grounded on `original_source/proxy/server.go`'s `handleConnection` /
//! `getAgentRoutes` (open a stream, send `GetRoutesReq`, read back
//! hostname+routes) and its post-registration goroutine that watches the
//! connection for closure.

use std::sync::Arc;

use raido_proto::Envelope;
use raido_registry::{generate_agent_id, AgentRecord, Registry};
use raido_relay::BufferPool;
use raido_transport::StreamConnection;
use tracing::{info, warn};

/// Runs the handshake to completion, registering an [`AgentRecord`] on
/// success. Logs and drops the connection on any failure — per spec §7,
/// a failed per-connection handshake kills only that connection.
pub async fn handshake(connection: Arc<dyn StreamConnection>, registry: Arc<Registry>, pool: BufferPool) {
    match run_handshake(&connection, &registry, pool).await {
        Ok(id) => {
            tokio::spawn(supervise(id, connection, registry));
        }
        Err(e) => {
            warn!(error = %e, "handshake failed, dropping connection");
            connection.close_with(raido_proto::APPLICATION_ERROR, "handshake failed").await;
        }
    }
}

async fn run_handshake(
    connection: &Arc<dyn StreamConnection>,
    registry: &Arc<Registry>,
    pool: BufferPool,
) -> Result<String, crate::error::ServerError> {
    let mut stream = connection.open_stream().await?;

    raido_proto::write_frame(&mut stream, &Envelope::get_routes_request()).await?;
    let response: raido_proto::GetRoutesResp = raido_proto::read_frame(&mut stream).await?;

    let routes = raido_registry::filter_advertised_routes(&response.routes);
    let id = generate_agent_id();

    let record = AgentRecord::new(id.clone(), response.name.clone(), routes, connection.clone(), pool);
    registry.add(record);

    info!(%id, hostname = %response.name, remote = %connection.remote_address(), "agent registered");
    Ok(id)
}

/// Loops on `accept_stream` purely to detect connection closure (spec
/// §4.6 step 5). The agent never opens streams of its own in this
/// protocol, so this call just blocks until the connection ends.
async fn supervise(id: String, connection: Arc<dyn StreamConnection>, registry: Arc<Registry>) {
    loop {
        match connection.accept_stream().await {
            Ok(Some(stream)) => {
                warn!(%id, "agent unexpectedly opened a stream, ignoring");
                drop(stream);
            }
            Ok(None) => {
                info!(%id, "agent connection closed");
                let _ = registry.remove(&id).await;
                return;
            }
            Err(e) if e.is_benign_close() => {
                info!(%id, "agent connection closed cleanly");
                let _ = registry.remove(&id).await;
                return;
            }
            Err(e) => {
                warn!(%id, error = %e, "agent connection supervisor ending");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use raido_transport::Stream;
    use tokio::io::DuplexStream;

    use super::*;

    #[derive(Debug)]
    struct DuplexConnection {
        server_half: StdMutex<Option<DuplexStream>>,
    }

    #[async_trait]
    impl StreamConnection for DuplexConnection {
        async fn open_stream(&self) -> Result<Box<dyn Stream>, raido_transport::TransportError> {
            self.server_half
                .lock()
                .unwrap()
                .take()
                .map(|s| Box::new(s) as Box<dyn Stream>)
                .ok_or(raido_transport::TransportError::ConnectionClosed)
        }

        async fn accept_stream(&self) -> Result<Option<Box<dyn Stream>>, raido_transport::TransportError> {
            std::future::pending().await
        }

        async fn close_with(&self, _code: u64, _reason: &str) {}

        fn is_closed(&self) -> bool {
            false
        }

        fn remote_address(&self) -> SocketAddr {
            "127.0.0.1:0".parse().unwrap()
        }
    }

    #[tokio::test]
    async fn successful_handshake_registers_an_agent_record() {
        let (mut agent_side, server_side) = tokio::io::duplex(8192);
        let connection: Arc<dyn StreamConnection> = Arc::new(DuplexConnection {
            server_half: StdMutex::new(Some(server_side)),
        });
        let registry = Arc::new(Registry::new());

        let agent_task = tokio::spawn(async move {
            let _req: Envelope = raido_proto::read_frame(&mut agent_side).await.unwrap();
            let response = raido_proto::GetRoutesResp {
                name: "user@host".to_string(),
                routes: vec!["10.0.0.0/24".to_string(), "127.0.0.1/32".to_string()],
            };
            raido_proto::write_frame(&mut agent_side, &response).await.unwrap();
        });

        let id = run_handshake(&connection, &registry, BufferPool::default()).await.unwrap();
        agent_task.await.unwrap();

        let record = registry.get(&id).expect("agent record registered");
        assert_eq!(record.hostname(), "user@host");
        assert_eq!(record.advertised_routes().len(), 1);
    }

    #[tokio::test]
    async fn handshake_drops_connection_on_open_stream_failure() {
        let connection: Arc<dyn StreamConnection> = Arc::new(DuplexConnection {
            server_half: StdMutex::new(None),
        });
        let registry = Arc::new(Registry::new());

        handshake(connection, registry.clone(), BufferPool::default()).await;

        assert!(registry.is_empty());
    }
}
