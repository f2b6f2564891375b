//! Agent registry and Tunnel lifecycle (spec §3, §4.10, component C10).
//!
//! The registry is explicitly constructed per proxy-server instance, not
//! a process-wide singleton (spec §9's Design Notes override §4.10's
//! literal "singleton" phrasing): two `Registry` values never share
//! state, which matters for running more than one proxy server in the
//! same process (tests, or a multi-listener deployment).
//!
//! Grounded on `localup-control/src/agent_registry.rs`'s reader-writer
//! lock over a `HashMap`, matching spec §5's explicit "the registry's
//! map ... uses a reader-writer lock" (not a lock-free map).

mod error;
mod record;
mod registry;
mod routes;

pub use error::RegistryError;
pub use record::{AgentRecord, Tunnel, TunnelState};
pub use registry::Registry;
pub use routes::{filter_advertised_routes, reject_loopback_or_link_local};

/// Mint a fresh agent identifier: 128 bits of entropy rendered as ASCII
/// (spec §3's "short unique string, 128-bit entropy minimum, rendered
/// base-57 or similar ASCII"). Grounded on `localup-agent/src/main.rs`,
/// which mints agent ids the same way.
pub fn generate_agent_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
