//! Accept loop and request dispatch for the operator control channel
//! (spec §4.11). Grounded on `service/server.go`'s unary-RPC handler shape,
//! generalized from a protobuf/ConnectRPC service to a plain framed socket
//! per Open Question #1.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{info, warn};

use crate::controller::ProxyController;
use crate::error::ControlError;
use crate::messages::{ControlRequest, ControlResponse};

async fn dispatch(controller: &dyn ProxyController, request: ControlRequest) -> ControlResponse {
    match handle(controller, request).await {
        Ok(response) => response,
        Err(e) => ControlResponse::Error {
            message: e.to_string(),
        },
    }
}

async fn handle(
    controller: &dyn ProxyController,
    request: ControlRequest,
) -> Result<ControlResponse, ControlError> {
    use ControlRequest::*;

    match request {
        ProxyStart {
            listen_addr,
            transport,
        } => {
            let fingerprint = controller.proxy_start(listen_addr, transport).await?;
            Ok(ControlResponse::ProxyStarted { fingerprint })
        }
        ProxyStop => {
            controller.proxy_stop().await?;
            Ok(ControlResponse::Ok)
        }
        AgentList => Ok(ControlResponse::AgentList(controller.agent_list().await?)),
        AgentRemove { id } => {
            controller.agent_remove(id).await?;
            Ok(ControlResponse::Ok)
        }
        TunnelStart { id, routes } => {
            controller.tunnel_start(id, routes).await?;
            Ok(ControlResponse::Ok)
        }
        TunnelStop { id } => {
            controller.tunnel_stop(id).await?;
            Ok(ControlResponse::Ok)
        }
        TunnelAddRoute { id, routes } => {
            controller.tunnel_add_route(id, routes).await?;
            Ok(ControlResponse::Ok)
        }
        TunnelRemoveRoute { id, routes } => {
            controller.tunnel_remove_route(id, routes).await?;
            Ok(ControlResponse::Ok)
        }
        TunnelPause { id } => {
            controller.tunnel_pause(id).await?;
            Ok(ControlResponse::Ok)
        }
        TunnelResume { id } => {
            controller.tunnel_resume(id).await?;
            Ok(ControlResponse::Ok)
        }
        TunnelList => Ok(ControlResponse::TunnelList(
            controller.tunnel_list().await?,
        )),
    }
}

/// Unary request/response over one connection: read exactly one
/// `ControlRequest` frame, dispatch it, write exactly one
/// `ControlResponse` frame, then let the stream close (spec §4.11, mirroring
/// `service/client.go`'s one-call-per-RPC usage).
async fn handle_connection<S>(mut stream: S, controller: Arc<dyn ProxyController>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let request: ControlRequest = match raido_proto::read_frame(&mut stream).await {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "malformed control request");
            return;
        }
    };

    let response = dispatch(controller.as_ref(), request).await;
    if let Err(e) = raido_proto::write_frame(&mut stream, &response).await {
        warn!(error = %e, "failed to write control response");
    }
}

/// Default control-socket endpoint (spec §6): a UNIX domain socket path on
/// POSIX, a TCP loopback address on Windows.
#[cfg(unix)]
pub const DEFAULT_ENDPOINT: &str = "/var/run/raido.sock";
#[cfg(windows)]
pub const DEFAULT_ENDPOINT: &str = "127.0.0.1:11051";

/// Bind the control socket and serve requests until the listener itself
/// errors (a `Fatal` condition per spec §7 — bind failures abort the
/// affected subsystem, they are not retried here).
#[cfg(unix)]
pub async fn serve(
    socket_path: impl AsRef<std::path::Path>,
    controller: Arc<dyn ProxyController>,
) -> Result<(), ControlError> {
    use tokio::net::UnixListener;

    let path = socket_path.as_ref();
    if path.exists() {
        std::fs::remove_file(path)?;
    }

    let listener = UnixListener::bind(path)?;
    info!(path = %path.display(), "control socket listening");

    loop {
        let (stream, _) = listener.accept().await?;
        let controller = controller.clone();
        tokio::spawn(handle_connection(stream, controller));
    }
}

#[cfg(windows)]
pub async fn serve(
    addr: impl AsRef<str>,
    controller: Arc<dyn ProxyController>,
) -> Result<(), ControlError> {
    use tokio::net::TcpListener;

    let listener = TcpListener::bind(addr.as_ref()).await?;
    info!(addr = addr.as_ref(), "control socket listening");

    loop {
        let (stream, _) = listener.accept().await?;
        let controller = controller.clone();
        tokio::spawn(handle_connection(stream, controller));
    }
}
