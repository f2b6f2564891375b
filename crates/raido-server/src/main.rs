//! Proxy-server CLI (spec §6): serves the operator control channel; the
//! actual agent-facing listener only starts once the operator issues
//! `ProxyStart` over that channel.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use raido_control::ProxyController;
use raido_server::ServerController;
use tracing::info;

/// Reverse-tunnel proxy server: accepts agent connections, runs the
/// handshake, and answers the operator control channel.
#[derive(Parser, Debug)]
#[command(name = "raido-server", version, about)]
struct Args {
    /// Operator control-socket endpoint (UNIX path on POSIX, host:port on
    /// Windows). Defaults to [`raido_control::DEFAULT_ENDPOINT`].
    #[arg(long = "control-endpoint")]
    control_endpoint: Option<String>,

    /// Directory holding (or to generate) the server's TLS certificate
    /// and private key.
    #[arg(long = "cert-dir", default_value = "/etc/raido")]
    cert_dir: PathBuf,

    /// Host identifier to embed in the generated certificate's SAN.
    #[arg(long = "host", default_value = "localhost")]
    host: String,

    /// Log level.
    #[arg(long = "log-level", env = "RUST_LOG", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(&args.log_level)
        .with_target(true)
        .init();

    let controller: Arc<dyn ProxyController> = Arc::new(ServerController::new(args.cert_dir, args.host));

    let endpoint = args
        .control_endpoint
        .unwrap_or_else(|| raido_control::DEFAULT_ENDPOINT.to_string());
    info!(%endpoint, "starting control channel");

    tokio::select! {
        result = raido_control::serve(&endpoint, controller) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received interrupt, shutting down");
        }
    }

    info!("server stopped");
    Ok(())
}
