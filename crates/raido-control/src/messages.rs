//! Request/response types for the operator control channel (spec §4.11,
//! §6's operation table). Carried as an [`raido_proto::Envelope`] body,
//! encoded with the same length-prefixed bincode framing the tunnel wire
//! protocol uses (see crate docs).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TransportKind {
    Quic,
    Tcp,
}

/// One row of an `AgentList` response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentSummary {
    pub id: String,
    pub hostname: String,
    pub advertised_routes: Vec<String>,
}

/// One row of a `TunnelList` response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TunnelSummary {
    pub id: String,
    pub interface: String,
    pub routes: Vec<String>,
    pub status: String,
    pub loopback_standin: String,
}

/// Requests the CLI sends over the control socket (spec §6's table, one
/// variant per row).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ControlRequest {
    ProxyStart {
        listen_addr: String,
        transport: TransportKind,
    },
    ProxyStop,
    AgentList,
    AgentRemove {
        id: String,
    },
    TunnelStart {
        id: String,
        routes: Vec<String>,
    },
    TunnelStop {
        id: String,
    },
    TunnelAddRoute {
        id: String,
        routes: Vec<String>,
    },
    TunnelRemoveRoute {
        id: String,
        routes: Vec<String>,
    },
    TunnelPause {
        id: String,
    },
    TunnelResume {
        id: String,
    },
    TunnelList,
}

/// Responses, matching the "Out" column of spec §6's table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ControlResponse {
    ProxyStarted { fingerprint: Vec<u8> },
    Ok,
    AgentList(Vec<AgentSummary>),
    TunnelList(Vec<TunnelSummary>),
    Error { message: String },
}
