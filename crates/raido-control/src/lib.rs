//! Operator control-plane RPC (spec §4.11, component C11): unary
//! request/response over a UNIX domain socket on POSIX, a TCP loopback
//! address on Windows.
//!
//! The original (`service/client.go`, `service/server.go`) carries this
//! over a protobuf service on ConnectRPC/HTTP3. The teacher crate family
//! has no protobuf/tonic dependency anywhere, so this reuses
//! `raido-proto`'s existing length-prefixed bincode framing instead of
//! introducing one (see SPEC_FULL.md's Open Question #1).

mod client;
mod controller;
mod error;
mod messages;
mod server;

pub use client::ControlClient;
pub use controller::ProxyController;
pub use error::ControlError;
pub use messages::{
    AgentSummary, ControlRequest, ControlResponse, TransportKind, TunnelSummary,
};
pub use server::{serve, DEFAULT_ENDPOINT};

#[cfg(all(test, unix))]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;

    struct FakeController;

    #[async_trait]
    impl ProxyController for FakeController {
        async fn proxy_start(
            &self,
            _listen_addr: String,
            _transport: TransportKind,
        ) -> Result<Vec<u8>, ControlError> {
            Ok(vec![0xde, 0xad, 0xbe, 0xef])
        }

        async fn proxy_stop(&self) -> Result<(), ControlError> {
            Ok(())
        }

        async fn agent_list(&self) -> Result<Vec<AgentSummary>, ControlError> {
            Ok(vec![AgentSummary {
                id: "abc123".to_string(),
                hostname: "alice@host".to_string(),
                advertised_routes: vec!["10.0.0.0/24".to_string()],
            }])
        }

        async fn agent_remove(&self, _id: String) -> Result<(), ControlError> {
            Ok(())
        }

        async fn tunnel_start(
            &self,
            _id: String,
            _routes: Vec<String>,
        ) -> Result<(), ControlError> {
            Ok(())
        }

        async fn tunnel_stop(&self, _id: String) -> Result<(), ControlError> {
            Ok(())
        }

        async fn tunnel_add_route(
            &self,
            _id: String,
            _routes: Vec<String>,
        ) -> Result<(), ControlError> {
            Ok(())
        }

        async fn tunnel_remove_route(
            &self,
            _id: String,
            _routes: Vec<String>,
        ) -> Result<(), ControlError> {
            Ok(())
        }

        async fn tunnel_pause(&self, _id: String) -> Result<(), ControlError> {
            Ok(())
        }

        async fn tunnel_resume(&self, id: String) -> Result<(), ControlError> {
            if id == "missing" {
                return Err(ControlError::AgentNotFound(id));
            }
            Ok(())
        }

        async fn tunnel_list(&self) -> Result<Vec<TunnelSummary>, ControlError> {
            Ok(vec![TunnelSummary {
                id: "abc123".to_string(),
                interface: "raido0".to_string(),
                routes: vec!["10.0.0.0/24".to_string()],
                status: "up".to_string(),
                loopback_standin: "240.1.0.0/32".to_string(),
            }])
        }
    }

    async fn start_server() -> std::path::PathBuf {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("raido.sock");
        let controller: Arc<dyn ProxyController> = Arc::new(FakeController);
        let serve_path = socket_path.clone();
        tokio::spawn(async move {
            let _ = serve(serve_path, controller).await;
        });
        // Leak the tempdir so the socket file outlives this function.
        std::mem::forget(dir);
        // Give the listener a moment to bind.
        for _ in 0..100 {
            if socket_path.exists() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        socket_path
    }

    #[tokio::test]
    async fn proxy_start_returns_fingerprint() {
        let socket_path = start_server().await;
        let mut client = ControlClient::connect(&socket_path).await.unwrap();
        let fingerprint = client
            .proxy_start("0.0.0.0:18787", TransportKind::Quic)
            .await
            .unwrap();
        assert_eq!(fingerprint, vec![0xde, 0xad, 0xbe, 0xef]);
    }

    #[tokio::test]
    async fn agent_list_round_trips() {
        let socket_path = start_server().await;
        let mut client = ControlClient::connect(&socket_path).await.unwrap();
        let agents = client.agent_list().await.unwrap();
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0].id, "abc123");
    }

    #[tokio::test]
    async fn tunnel_list_round_trips() {
        let socket_path = start_server().await;
        let mut client = ControlClient::connect(&socket_path).await.unwrap();
        let tunnels = client.tunnel_list().await.unwrap();
        assert_eq!(tunnels[0].loopback_standin, "240.1.0.0/32");
    }

    #[tokio::test]
    async fn controller_error_surfaces_as_rejected() {
        let socket_path = start_server().await;
        let mut client = ControlClient::connect(&socket_path).await.unwrap();
        let err = client.tunnel_resume("missing").await.unwrap_err();
        assert!(matches!(err, ControlError::Rejected(_)));
    }

    #[tokio::test]
    async fn each_connection_serves_exactly_one_request() {
        let socket_path = start_server().await;
        let mut client = ControlClient::connect(&socket_path).await.unwrap();
        client.proxy_stop().await.unwrap();

        // A fresh connection for a second call, since the server closes
        // the stream after one response.
        let mut client = ControlClient::connect(&socket_path).await.unwrap();
        client.agent_remove("abc123").await.unwrap();
    }
}
