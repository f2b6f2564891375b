//! Agent CLI (spec §6): dials a proxy server and services its tunnel
//! requests until interrupted.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use raido_agent::{Agent, AgentConfig};
use raido_transport::ClientTrust;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum TransportKind {
    Quic,
    Tcp,
}

/// Reverse-tunnel agent: dials a Raido proxy server and forwards its
/// EstablishConnection requests to local targets.
#[derive(Parser, Debug)]
#[command(name = "raido-agent", version, about)]
struct Args {
    /// Proxy server address to dial (host:port).
    #[arg(short = 'p', long = "proxy-addr", value_name = "host:port")]
    proxy_addr: String,

    /// SHA-256 fingerprint of the proxy's certificate to pin, as hex.
    #[arg(short = 'c', long = "cert-hex", value_name = "hex")]
    cert_hex: Option<String>,

    /// Disable certificate verification entirely.
    #[arg(short = 'k', long = "insecure")]
    insecure: bool,

    /// Transport to dial the proxy with.
    #[arg(short = 't', long = "transport", value_enum, default_value_t = TransportKind::Quic)]
    transport: TransportKind,

    /// Directory to read/write the client's TLS material (unused when
    /// verification is disabled or pinned; reserved for a future mutual-TLS
    /// mode).
    #[arg(long = "cert-dir", default_value = "/var/lib/raido")]
    cert_dir: PathBuf,

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

    let trust = build_trust(&args)?;
    let server_host = host_of(&args.proxy_addr)?;

    let transport: Arc<dyn raido_transport::Transport> = match args.transport {
        TransportKind::Quic => Arc::new(raido_transport_quic::QuicTransport::new(
            trust,
            args.cert_dir.clone(),
            server_host,
        )),
        TransportKind::Tcp => Arc::new(raido_transport_tcp::TcpMuxTransport::new(
            trust,
            args.cert_dir.clone(),
            server_host,
        )),
    };

    let agent = Arc::new(Agent::new(
        transport,
        AgentConfig {
            proxy_addr: args.proxy_addr.clone(),
        },
    ));

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();

    info!(proxy = %args.proxy_addr, transport = ?args.transport, "starting agent");

    tokio::select! {
        result = agent.run(cancel.clone()) => {
            if let Err(e) = result {
                error!(error = %e, "agent exited with error");
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received interrupt, shutting down");
            shutdown.cancel();
        }
    }

    info!("agent stopped");
    Ok(())
}

fn build_trust(args: &Args) -> Result<ClientTrust> {
    if args.insecure {
        return Ok(ClientTrust::Insecure);
    }
    match &args.cert_hex {
        Some(hex) => {
            let fingerprint = raido_transport::parse_fingerprint_hex(hex)
                .context("invalid certificate fingerprint")?;
            Ok(ClientTrust::Pinned(fingerprint))
        }
        None => Ok(ClientTrust::SystemRoots),
    }
}

fn host_of(proxy_addr: &str) -> Result<String> {
    match proxy_addr.rsplit_once(':') {
        Some((host, _port)) => Ok(host.to_string()),
        None => bail!("proxy address must be host:port, got {proxy_addr}"),
    }
}
