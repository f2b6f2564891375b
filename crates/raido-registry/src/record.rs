//! [`AgentRecord`] and its [`Tunnel`] (spec §3, §4.10): the per-agent
//! state the registry hands out, and the TUN-backed tunnel each record
//! may own at most one of at a time.

use std::sync::Arc;

use ipnet::{IpNet, Ipv4Net};
use raido_netstack::{run_forwarders, start_tunnel_stack, NetStackConfig};
use raido_proto::APPLICATION_OK;
use raido_relay::BufferPool;
use raido_sysnet::Link;
use raido_transport::StreamConnection;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::RegistryError;
use crate::routes::reject_loopback_or_link_local;

/// State machine: `absent → up ↔ down → destroyed` (spec §4.10). `absent`
/// and `destroyed` are represented by the enclosing `Option<Tunnel>` being
/// `None`; this type only ever holds the `Up`/`Down` half.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelState {
    Up,
    Down,
}

/// A TUN device, the user-space stack bound to it, and the kernel-side
/// link state (spec §3's Tunnel). Owns the forwarder task that dispatches
/// synthesized flows onto the agent's transport connection.
pub struct Tunnel {
    name: String,
    link: Link,
    active_routes: Vec<IpNet>,
    loopback_standin: Ipv4Net,
    state: TunnelState,
    forwarders: JoinHandle<()>,
}

impl Tunnel {
    /// Opens a fresh TUN, starts its netstack, adopts the resulting link,
    /// brings it up, installs the loopback stand-in and every route in
    /// `routes`, then spawns the forwarder task against `connection`.
    pub(crate) async fn start(
        connection: Arc<dyn StreamConnection>,
        routes: Vec<IpNet>,
        config: NetStackConfig,
        pool: BufferPool,
    ) -> Result<Self, RegistryError> {
        let (name, new_flow_rx) = start_tunnel_stack(config).await?;

        let link = Link::open(&name).await?;
        link.up().await?;
        let loopback_standin = link.allocate_and_install_standin().await?;
        for route in &routes {
            link.add_route(*route).await?;
        }

        let forwarders = tokio::spawn(run_forwarders(new_flow_rx, connection, pool));

        debug!(%name, routes = routes.len(), "tunnel started");

        Ok(Self {
            name,
            link,
            active_routes: routes,
            loopback_standin,
            state: TunnelState::Up,
            forwarders,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn active_routes(&self) -> &[IpNet] {
        &self.active_routes
    }

    pub fn loopback_route(&self) -> Ipv4Net {
        self.loopback_standin
    }

    pub fn state(&self) -> TunnelState {
        self.state
    }

    pub async fn status(&self) -> Result<String, RegistryError> {
        Ok(self.link.status().await?)
    }

    pub async fn pause(&mut self) -> Result<(), RegistryError> {
        self.link.pause().await?;
        self.state = TunnelState::Down;
        Ok(())
    }

    pub async fn resume(&mut self) -> Result<(), RegistryError> {
        self.link
            .resume(&self.active_routes, self.loopback_standin)
            .await?;
        self.state = TunnelState::Up;
        Ok(())
    }

    pub async fn add_routes(&mut self, routes: &[IpNet]) -> Result<(), RegistryError> {
        if let Err(offender) = reject_loopback_or_link_local(routes) {
            return Err(RegistryError::InvalidRoute(format!(
                "{offender} is loopback or link-local"
            )));
        }
        for route in routes {
            self.link.add_route(*route).await?;
            if !self.active_routes.contains(route) {
                self.active_routes.push(*route);
            }
        }
        Ok(())
    }

    pub async fn remove_routes(&mut self, routes: &[IpNet]) -> Result<(), RegistryError> {
        for route in routes {
            self.link.remove_route(*route).await?;
            self.active_routes.retain(|r| r != route);
        }
        Ok(())
    }

    /// Tears down the forwarder task, the netstack, and the kernel link.
    pub(crate) async fn close(self) -> Result<(), RegistryError> {
        self.forwarders.abort();
        self.link.destroy().await?;
        Ok(())
    }
}

/// Identifier, advertised hostname, the immutable filtered route list from
/// the handshake, the owning connection, and an optional [`Tunnel`] (spec
/// §3). The tunnel slot carries its own lock so mutations never hold the
/// registry's map lock across the suspension points tunnel operations
/// require (spec §5).
pub struct AgentRecord {
    id: String,
    hostname: String,
    advertised_routes: Vec<IpNet>,
    connection: Arc<dyn StreamConnection>,
    tunnel: RwLock<Option<Tunnel>>,
    pool: BufferPool,
}

impl AgentRecord {
    pub fn new(
        id: String,
        hostname: String,
        advertised_routes: Vec<IpNet>,
        connection: Arc<dyn StreamConnection>,
        pool: BufferPool,
    ) -> Self {
        Self {
            id,
            hostname,
            advertised_routes,
            connection,
            tunnel: RwLock::new(None),
            pool,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn advertised_routes(&self) -> &[IpNet] {
        &self.advertised_routes
    }

    pub fn connection(&self) -> &Arc<dyn StreamConnection> {
        &self.connection
    }

    pub async fn has_tunnel(&self) -> bool {
        self.tunnel.read().await.is_some()
    }

    /// No-op if a Tunnel already exists (spec §4.10). `routes` empty means
    /// "use the advertised routes".
    pub async fn tunnel_start(
        &self,
        routes: Vec<IpNet>,
        config: NetStackConfig,
    ) -> Result<(), RegistryError> {
        let mut slot = self.tunnel.write().await;
        if slot.is_some() {
            return Ok(());
        }
        let routes = if routes.is_empty() {
            self.advertised_routes.clone()
        } else {
            routes
        };
        let tunnel = Tunnel::start(self.connection.clone(), routes, config, self.pool.clone())
            .await?;
        *slot = Some(tunnel);
        Ok(())
    }

    pub async fn tunnel_close(&self) -> Result<(), RegistryError> {
        let mut slot = self.tunnel.write().await;
        match slot.take() {
            Some(tunnel) => tunnel.close().await,
            None => Ok(()),
        }
    }

    pub async fn tunnel_pause(&self) -> Result<(), RegistryError> {
        let mut slot = self.tunnel.write().await;
        let tunnel = slot.as_mut().ok_or(RegistryError::TunnelNotStarted)?;
        tunnel.pause().await
    }

    pub async fn tunnel_resume(&self) -> Result<(), RegistryError> {
        let mut slot = self.tunnel.write().await;
        let tunnel = slot.as_mut().ok_or(RegistryError::TunnelNotStarted)?;
        tunnel.resume().await
    }

    pub async fn tunnel_add_routes(&self, routes: &[IpNet]) -> Result<(), RegistryError> {
        let mut slot = self.tunnel.write().await;
        let tunnel = slot.as_mut().ok_or(RegistryError::TunnelNotStarted)?;
        tunnel.add_routes(routes).await
    }

    pub async fn tunnel_remove_routes(&self, routes: &[IpNet]) -> Result<(), RegistryError> {
        let mut slot = self.tunnel.write().await;
        let tunnel = slot.as_mut().ok_or(RegistryError::TunnelNotStarted)?;
        tunnel.remove_routes(routes).await
    }

    pub async fn tunnel_active_routes(&self) -> Result<Vec<IpNet>, RegistryError> {
        let slot = self.tunnel.read().await;
        let tunnel = slot.as_ref().ok_or(RegistryError::TunnelNotStarted)?;
        Ok(tunnel.active_routes().to_vec())
    }

    pub async fn tunnel_loopback_route(&self) -> Result<Ipv4Net, RegistryError> {
        let slot = self.tunnel.read().await;
        let tunnel = slot.as_ref().ok_or(RegistryError::TunnelNotStarted)?;
        Ok(tunnel.loopback_route())
    }

    pub async fn tunnel_status(&self) -> Result<String, RegistryError> {
        let slot = self.tunnel.read().await;
        let tunnel = slot.as_ref().ok_or(RegistryError::TunnelNotStarted)?;
        tunnel.status().await
    }

    pub async fn tunnel_name(&self) -> Result<String, RegistryError> {
        let slot = self.tunnel.read().await;
        let tunnel = slot.as_ref().ok_or(RegistryError::TunnelNotStarted)?;
        Ok(tunnel.name().to_string())
    }

    /// `TunnelClose` then transport close-with `ApplicationOK` (spec §4.10).
    pub async fn close(&self) -> Result<(), RegistryError> {
        if let Err(e) = self.tunnel_close().await {
            warn!(id = %self.id, error = %e, "error closing tunnel during record close");
        }
        self.connection
            .close_with(APPLICATION_OK, "agent removed")
            .await;
        Ok(())
    }
}
