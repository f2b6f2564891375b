use thiserror::Error;

/// Error taxonomy for registry and tunnel-lifecycle operations (spec §7:
/// `ResourceMissing`, `Conflict`, `Fatal`).
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no agent registered with id {0}")]
    AgentNotFound(String),

    #[error("no tunnel is active for this agent")]
    TunnelNotStarted,

    #[error("sysnet operation failed: {0}")]
    SysNet(#[from] raido_sysnet::SysNetError),

    #[error("netstack operation failed: {0}")]
    NetStack(#[from] raido_netstack::NetStackError),

    #[error("route parse error: {0}")]
    InvalidRoute(String),
}
