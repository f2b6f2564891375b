//! The seam between the control-RPC server and whatever owns the actual
//! listener and registry (spec §4.11 delegates every operation to C6/C10;
//! this crate only owns the RPC plumbing). `raido-server`'s binary
//! implements this trait over its own listener handle and `raido-registry`
//! instance; `raido-control` never depends on either directly.

use async_trait::async_trait;

use crate::error::ControlError;
use crate::messages::{AgentSummary, TransportKind, TunnelSummary};

#[async_trait]
pub trait ProxyController: Send + Sync {
    async fn proxy_start(
        &self,
        listen_addr: String,
        transport: TransportKind,
    ) -> Result<Vec<u8>, ControlError>;

    async fn proxy_stop(&self) -> Result<(), ControlError>;

    async fn agent_list(&self) -> Result<Vec<AgentSummary>, ControlError>;

    async fn agent_remove(&self, id: String) -> Result<(), ControlError>;

    async fn tunnel_start(&self, id: String, routes: Vec<String>) -> Result<(), ControlError>;

    async fn tunnel_stop(&self, id: String) -> Result<(), ControlError>;

    async fn tunnel_add_route(&self, id: String, routes: Vec<String>)
        -> Result<(), ControlError>;

    async fn tunnel_remove_route(
        &self,
        id: String,
        routes: Vec<String>,
    ) -> Result<(), ControlError>;

    async fn tunnel_pause(&self, id: String) -> Result<(), ControlError>;

    async fn tunnel_resume(&self, id: String) -> Result<(), ControlError>;

    async fn tunnel_list(&self) -> Result<Vec<TunnelSummary>, ControlError>;
}
