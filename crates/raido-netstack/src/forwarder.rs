//! TCP/UDP forwarder callbacks (spec §4.8): take a freshly synthesized
//! flow, rewrite a loopback-stand-in destination to `127.0.0.1`, borrow a
//! stream from the transport's pool, run the `EstablishConnection`
//! handshake, and relay bytes until either side closes.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use raido_proto::{ConnectResponse, ConnectionRequest, Envelope, TransportProtocol};
use raido_relay::BufferPool;
use raido_transport::StreamConnection;
use tracing::{debug, warn};

use crate::stack::NewFlow;

/// Rewrites an address inside the `240.0.0.0/4` loopback-stand-in block
/// to `127.0.0.1` (spec §4.8, §8 scenario 3): the agent dials its own
/// loopback for the stand-in rather than a literal `240.x.x.x` address.
fn rewrite_loopback_standin(addr: SocketAddr) -> SocketAddr {
    match addr.ip() {
        IpAddr::V4(v4) if v4.octets()[0] == 240 => {
            SocketAddr::new(IpAddr::V4(std::net::Ipv4Addr::LOCALHOST), addr.port())
        }
        _ => addr,
    }
}

/// Dispatch a single synthesized flow to the agent over `connection`,
/// spawned as its own task by the caller.
pub async fn handle_flow(flow: NewFlow, connection: Arc<dyn StreamConnection>, pool: BufferPool) {
    match flow {
        NewFlow::Tcp { local, peer, stream } => {
            handle_one(local, peer, stream, connection, pool, TransportProtocol::Tcp).await;
        }
        NewFlow::Udp { local, peer, stream } => {
            handle_one(local, peer, stream, connection, pool, TransportProtocol::Udp).await;
        }
    }
}

async fn handle_one(
    local: SocketAddr,
    peer: SocketAddr,
    user_stream: crate::endpoint::EndpointStream,
    connection: Arc<dyn StreamConnection>,
    pool: BufferPool,
    protocol: TransportProtocol,
) {
    let target = rewrite_loopback_standin(local);
    debug!(%peer, %local, %target, ?protocol, "dispatching synthesized flow");

    let agent_stream = match connection.get_stream().await {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "could not obtain stream from transport for new flow");
            return;
        }
    };

    let request = ConnectionRequest::new(target.ip(), target.port(), protocol);
    let envelope = Envelope::establish_connection(request.encode());

    let mut agent_stream = agent_stream;
    if raido_proto::write_frame(&mut agent_stream, &envelope).await.is_err() {
        warn!("failed to send EstablishConnection envelope");
        connection.put_stream(agent_stream).await;
        return;
    }

    let response: Result<ConnectResponse, _> = raido_proto::read_frame(&mut agent_stream).await;
    match response {
        Ok(ConnectResponse { established: true }) => {}
        Ok(ConnectResponse { established: false }) => {
            debug!(%target, "agent could not establish local connection");
            connection.put_stream(agent_stream).await;
            return;
        }
        Err(e) => {
            warn!(error = %e, "malformed ConnectResponse");
            connection.put_stream(agent_stream).await;
            return;
        }
    }

    if let Err(e) = raido_relay::relay(user_stream, agent_stream, &pool).await {
        debug!(error = %e, %peer, "flow relay ended with error");
    }
}
