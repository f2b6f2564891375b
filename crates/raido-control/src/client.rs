//! A thin client for the operator control channel, used by `raido-cli`.
//! Each method opens exactly one request/response round trip, matching
//! `service/client.go`'s one-method-per-RPC shape.

use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::ControlError;
use crate::messages::{
    AgentSummary, ControlRequest, ControlResponse, TransportKind, TunnelSummary,
};

trait DuplexStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> DuplexStream for T {}

pub struct ControlClient {
    stream: Box<dyn DuplexStream>,
}

impl ControlClient {
    #[cfg(unix)]
    pub async fn connect(socket_path: impl AsRef<std::path::Path>) -> Result<Self, ControlError> {
        let stream = tokio::net::UnixStream::connect(socket_path).await?;
        Ok(Self {
            stream: Box::new(stream),
        })
    }

    #[cfg(windows)]
    pub async fn connect(addr: impl AsRef<str>) -> Result<Self, ControlError> {
        let stream = tokio::net::TcpStream::connect(addr.as_ref()).await?;
        Ok(Self {
            stream: Box::new(stream),
        })
    }

    async fn call(&mut self, request: ControlRequest) -> Result<ControlResponse, ControlError> {
        raido_proto::write_frame(&mut self.stream, &request).await?;
        raido_proto::read_frame(&mut self.stream).await.map_err(Into::into)
    }

    async fn expect_ok(&mut self, request: ControlRequest) -> Result<(), ControlError> {
        match self.call(request).await? {
            ControlResponse::Ok => Ok(()),
            ControlResponse::Error { message } => Err(ControlError::Rejected(message)),
            other => Err(unexpected(other)),
        }
    }

    pub async fn proxy_start(
        &mut self,
        listen_addr: impl Into<String>,
        transport: TransportKind,
    ) -> Result<Vec<u8>, ControlError> {
        match self
            .call(ControlRequest::ProxyStart {
                listen_addr: listen_addr.into(),
                transport,
            })
            .await?
        {
            ControlResponse::ProxyStarted { fingerprint } => Ok(fingerprint),
            ControlResponse::Error { message } => Err(ControlError::Rejected(message)),
            other => Err(unexpected(other)),
        }
    }

    pub async fn proxy_stop(&mut self) -> Result<(), ControlError> {
        self.expect_ok(ControlRequest::ProxyStop).await
    }

    pub async fn agent_list(&mut self) -> Result<Vec<AgentSummary>, ControlError> {
        match self.call(ControlRequest::AgentList).await? {
            ControlResponse::AgentList(agents) => Ok(agents),
            ControlResponse::Error { message } => Err(ControlError::Rejected(message)),
            other => Err(unexpected(other)),
        }
    }

    pub async fn agent_remove(&mut self, id: impl Into<String>) -> Result<(), ControlError> {
        self.expect_ok(ControlRequest::AgentRemove { id: id.into() })
            .await
    }

    pub async fn tunnel_start(
        &mut self,
        id: impl Into<String>,
        routes: Vec<String>,
    ) -> Result<(), ControlError> {
        self.expect_ok(ControlRequest::TunnelStart {
            id: id.into(),
            routes,
        })
        .await
    }

    pub async fn tunnel_stop(&mut self, id: impl Into<String>) -> Result<(), ControlError> {
        self.expect_ok(ControlRequest::TunnelStop { id: id.into() })
            .await
    }

    pub async fn tunnel_add_route(
        &mut self,
        id: impl Into<String>,
        routes: Vec<String>,
    ) -> Result<(), ControlError> {
        self.expect_ok(ControlRequest::TunnelAddRoute {
            id: id.into(),
            routes,
        })
        .await
    }

    pub async fn tunnel_remove_route(
        &mut self,
        id: impl Into<String>,
        routes: Vec<String>,
    ) -> Result<(), ControlError> {
        self.expect_ok(ControlRequest::TunnelRemoveRoute {
            id: id.into(),
            routes,
        })
        .await
    }

    pub async fn tunnel_pause(&mut self, id: impl Into<String>) -> Result<(), ControlError> {
        self.expect_ok(ControlRequest::TunnelPause { id: id.into() })
            .await
    }

    pub async fn tunnel_resume(&mut self, id: impl Into<String>) -> Result<(), ControlError> {
        self.expect_ok(ControlRequest::TunnelResume { id: id.into() })
            .await
    }

    pub async fn tunnel_list(&mut self) -> Result<Vec<TunnelSummary>, ControlError> {
        match self.call(ControlRequest::TunnelList).await? {
            ControlResponse::TunnelList(tunnels) => Ok(tunnels),
            ControlResponse::Error { message } => Err(ControlError::Rejected(message)),
            other => Err(unexpected(other)),
        }
    }
}

fn unexpected(response: ControlResponse) -> ControlError {
    ControlError::Rejected(format!("unexpected control response: {response:?}"))
}
