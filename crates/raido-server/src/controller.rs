//! [`ProxyController`] implementation: owns the registry and the
//! currently-running listener (if any), and is the sole thing `raido-cli`
//! talks to over the control socket (spec §4.11, §6).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ipnet::IpNet;
use raido_control::{AgentSummary, ControlError, ProxyController, TransportKind, TunnelSummary};
use raido_netstack::NetStackConfig;
use raido_registry::Registry;
use raido_relay::BufferPool;
use raido_transport::Transport;
use raido_workerpool::{WorkerPool, WorkerPoolConfig};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Deadline for `proxy_stop`'s graceful shutdown (spec §4.6, §6).
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(2);

struct RunningProxy {
    listener: Arc<dyn raido_transport::StreamListener>,
    cancel: CancellationToken,
    accept_task: tokio::task::JoinHandle<()>,
}

pub struct ServerController {
    registry: Arc<Registry>,
    cert_dir: PathBuf,
    server_host: String,
    handshake_pool: WorkerPool,
    buffers: BufferPool,
    running: Mutex<Option<RunningProxy>>,
}

impl ServerController {
    pub fn new(cert_dir: PathBuf, server_host: String) -> Self {
        Self {
            registry: Arc::new(Registry::new()),
            cert_dir,
            server_host,
            handshake_pool: WorkerPool::new(WorkerPoolConfig::default()),
            buffers: BufferPool::default(),
            running: Mutex::new(None),
        }
    }

    fn build_transport(&self, transport: TransportKind) -> Arc<dyn Transport> {
        match transport {
            TransportKind::Quic => Arc::new(raido_transport_quic::QuicTransport::new(
                raido_transport::ClientTrust::Insecure,
                self.cert_dir.clone(),
                self.server_host.clone(),
            )),
            TransportKind::Tcp => Arc::new(raido_transport_tcp::TcpMuxTransport::new(
                raido_transport::ClientTrust::Insecure,
                self.cert_dir.clone(),
                self.server_host.clone(),
            )),
        }
    }
}

fn parse_routes(routes: &[String]) -> Result<Vec<IpNet>, ControlError> {
    routes
        .iter()
        .map(|r| {
            r.parse::<IpNet>()
                .map_err(|e| ControlError::Rejected(format!("invalid route {r:?}: {e}")))
        })
        .collect()
}

fn map_registry_err(e: raido_registry::RegistryError) -> ControlError {
    match e {
        raido_registry::RegistryError::AgentNotFound(id) => ControlError::AgentNotFound(id),
        other => ControlError::Rejected(other.to_string()),
    }
}

#[async_trait]
impl ProxyController for ServerController {
    async fn proxy_start(&self, listen_addr: String, transport: TransportKind) -> Result<Vec<u8>, ControlError> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(ControlError::ProxyAlreadyRunning);
        }

        // Loading/generating the identity here (rather than letting
        // `listen` do it implicitly) is what lets `proxy_start` hand the
        // fingerprint back to the caller (spec §6's ProxyStart `Out`).
        let identity = raido_transport::load_or_generate_server_identity(&self.cert_dir, &self.server_host)
            .map_err(|e| ControlError::Rejected(e.to_string()))?;

        let transport_impl = self.build_transport(transport);
        let listener = transport_impl
            .listen(&listen_addr)
            .await
            .map_err(|e| ControlError::Rejected(e.to_string()))?;

        let cancel = CancellationToken::new();
        let accept_task = tokio::spawn(crate::accept::run(
            listener.clone(),
            self.registry.clone(),
            self.handshake_pool.clone(),
            self.buffers.clone(),
            cancel.clone(),
        ));

        *running = Some(RunningProxy {
            listener,
            cancel,
            accept_task,
        });

        info!(%listen_addr, "proxy listener started");
        Ok(identity.fingerprint.to_vec())
    }

    async fn proxy_stop(&self) -> Result<(), ControlError> {
        let proxy = {
            let mut running = self.running.lock().await;
            running.take()
        };
        let Some(proxy) = proxy else {
            return Err(ControlError::ProxyNotRunning);
        };

        proxy.cancel.cancel();

        let registry = self.registry.clone();
        let shutdown = async {
            // Close the tunnel and send the shutdown-specific reason
            // ourselves first (spec §4.6): `registry.cleanup()` would
            // otherwise close with its own "agent removed" reason, and on
            // the QUIC backend only the first `close_with` call's reason
            // reaches the peer.
            for agent in registry.list() {
                if let Err(e) = agent.tunnel_close().await {
                    warn!(id = agent.id(), error = %e, "error closing tunnel during shutdown");
                }
                agent
                    .connection()
                    .close_with(raido_proto::APPLICATION_OK, "server closing down")
                    .await;
            }
            let _ = registry.cleanup().await;
            let _ = proxy.accept_task.await;
        };

        if tokio::time::timeout(SHUTDOWN_DEADLINE, shutdown).await.is_err() {
            warn!("proxy shutdown exceeded deadline, continuing in background");
        }

        info!("proxy listener stopped");
        Ok(())
    }

    async fn agent_list(&self) -> Result<Vec<AgentSummary>, ControlError> {
        Ok(self
            .registry
            .list()
            .into_iter()
            .map(|record| AgentSummary {
                id: record.id().to_string(),
                hostname: record.hostname().to_string(),
                advertised_routes: record.advertised_routes().iter().map(|r| r.to_string()).collect(),
            })
            .collect())
    }

    async fn agent_remove(&self, id: String) -> Result<(), ControlError> {
        self.registry.remove(&id).await.map_err(map_registry_err)
    }

    async fn tunnel_start(&self, id: String, routes: Vec<String>) -> Result<(), ControlError> {
        let record = self.registry.get(&id).ok_or_else(|| ControlError::AgentNotFound(id))?;
        let routes = parse_routes(&routes)?;
        record
            .tunnel_start(routes, NetStackConfig::default())
            .await
            .map_err(map_registry_err)
    }

    async fn tunnel_stop(&self, id: String) -> Result<(), ControlError> {
        let record = self.registry.get(&id).ok_or_else(|| ControlError::AgentNotFound(id))?;
        record.tunnel_close().await.map_err(map_registry_err)
    }

    async fn tunnel_add_route(&self, id: String, routes: Vec<String>) -> Result<(), ControlError> {
        let record = self.registry.get(&id).ok_or_else(|| ControlError::AgentNotFound(id))?;
        let routes = parse_routes(&routes)?;
        record.tunnel_add_routes(&routes).await.map_err(map_registry_err)
    }

    async fn tunnel_remove_route(&self, id: String, routes: Vec<String>) -> Result<(), ControlError> {
        let record = self.registry.get(&id).ok_or_else(|| ControlError::AgentNotFound(id))?;
        let routes = parse_routes(&routes)?;
        record.tunnel_remove_routes(&routes).await.map_err(map_registry_err)
    }

    async fn tunnel_pause(&self, id: String) -> Result<(), ControlError> {
        let record = self.registry.get(&id).ok_or_else(|| ControlError::AgentNotFound(id))?;
        record.tunnel_pause().await.map_err(map_registry_err)
    }

    async fn tunnel_resume(&self, id: String) -> Result<(), ControlError> {
        let record = self.registry.get(&id).ok_or_else(|| ControlError::AgentNotFound(id))?;
        record.tunnel_resume().await.map_err(map_registry_err)
    }

    async fn tunnel_list(&self) -> Result<Vec<TunnelSummary>, ControlError> {
        let mut out = Vec::new();
        for record in self.registry.list() {
            if !record.has_tunnel().await {
                continue;
            }
            let routes = record
                .tunnel_active_routes()
                .await
                .map_err(map_registry_err)?
                .iter()
                .map(|r| r.to_string())
                .collect();
            let status = record.tunnel_status().await.map_err(map_registry_err)?;
            let interface = record.tunnel_name().await.map_err(map_registry_err)?;
            let loopback_standin = record.tunnel_loopback_route().await.map_err(map_registry_err)?.to_string();
            out.push(TunnelSummary {
                id: record.id().to_string(),
                interface,
                routes,
                status,
                loopback_standin,
            });
        }
        Ok(out)
    }
}
