//! Operator CLI (spec §4.11, §6): a thin `raido-control` client exposing
//! one subcommand per RPC operation.
//!
//! Grounded on `original_source/cmd/raido/{agent,tunnel,proxy}.go`'s
//! `agent`/`tunnel`/`proxy` cobra command groups, rendered with clap's
//! derive `Subcommand` the way `tunnel-cli` uses clap for its own flags.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use raido_control::{ControlClient, TransportKind};
use tracing::error;

#[derive(Parser, Debug)]
#[command(name = "raido-cli", version, about)]
struct Args {
    /// Control-socket endpoint (UNIX path on POSIX, host:port on Windows).
    /// Defaults to [`raido_control::DEFAULT_ENDPOINT`].
    #[arg(long = "control-endpoint")]
    control_endpoint: Option<String>,

    #[arg(long = "log-level", env = "RUST_LOG", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Proxy listener commands.
    #[command(subcommand)]
    Proxy(ProxyCommand),
    /// Registered-agent commands.
    #[command(subcommand)]
    Agent(AgentCommand),
    /// Tunnel lifecycle commands.
    #[command(subcommand)]
    Tunnel(TunnelCommand),
}

#[derive(Subcommand, Debug)]
enum ProxyCommand {
    /// Start the agent-facing listener.
    Start {
        /// Address to listen on, e.g. "0.0.0.0:18787".
        listen_addr: String,
        /// Transport to listen with.
        #[arg(long = "transport", value_enum, default_value_t = CliTransport::Quic)]
        transport: CliTransport,
    },
    /// Stop the agent-facing listener and disconnect every agent.
    Stop,
}

#[derive(Subcommand, Debug)]
enum AgentCommand {
    /// List registered agents.
    List,
    /// Remove an agent's registration and close its connection.
    Remove {
        id: String,
    },
}

#[derive(Subcommand, Debug)]
enum TunnelCommand {
    /// List active tunnels.
    List,
    /// Start a tunnel for an agent; omit routes to use its advertised ones.
    Start {
        id: String,
        routes: Vec<String>,
    },
    /// Tear a tunnel down.
    Stop {
        id: String,
    },
    AddRoute {
        id: String,
        routes: Vec<String>,
    },
    RemoveRoute {
        id: String,
        routes: Vec<String>,
    },
    Pause {
        id: String,
    },
    Resume {
        id: String,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, clap::ValueEnum)]
enum CliTransport {
    Quic,
    Tcp,
}

impl From<CliTransport> for TransportKind {
    fn from(t: CliTransport) -> Self {
        match t {
            CliTransport::Quic => TransportKind::Quic,
            CliTransport::Tcp => TransportKind::Tcp,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(&args.log_level)
        .with_target(false)
        .init();

    let endpoint = args
        .control_endpoint
        .unwrap_or_else(|| raido_control::DEFAULT_ENDPOINT.to_string());

    let mut client = connect(&endpoint)
        .await
        .with_context(|| format!("connecting to control channel at {endpoint}"))?;

    if let Err(e) = run(&mut client, args.command).await {
        error!(error = %e, "command failed");
        return Err(e);
    }

    Ok(())
}

#[cfg(unix)]
async fn connect(endpoint: &str) -> Result<ControlClient, raido_control::ControlError> {
    ControlClient::connect(endpoint).await
}

#[cfg(windows)]
async fn connect(endpoint: &str) -> Result<ControlClient, raido_control::ControlError> {
    ControlClient::connect(endpoint).await
}

async fn run(client: &mut ControlClient, command: Command) -> Result<()> {
    match command {
        Command::Proxy(cmd) => run_proxy(client, cmd).await,
        Command::Agent(cmd) => run_agent(client, cmd).await,
        Command::Tunnel(cmd) => run_tunnel(client, cmd).await,
    }
}

async fn run_proxy(client: &mut ControlClient, cmd: ProxyCommand) -> Result<()> {
    match cmd {
        ProxyCommand::Start { listen_addr, transport } => {
            let fingerprint = client.proxy_start(listen_addr, transport.into()).await?;
            println!("proxy started, certificate fingerprint: {}", hex_encode(&fingerprint));
        }
        ProxyCommand::Stop => {
            client.proxy_stop().await?;
            println!("proxy stopped");
        }
    }
    Ok(())
}

async fn run_agent(client: &mut ControlClient, cmd: AgentCommand) -> Result<()> {
    match cmd {
        AgentCommand::List => {
            let agents = client.agent_list().await?;
            if agents.is_empty() {
                println!("no agents registered");
                return Ok(());
            }
            println!("{:<38} {:<24} ROUTES", "ID", "HOSTNAME");
            for agent in agents {
                println!("{:<38} {:<24} {}", agent.id, agent.hostname, agent.advertised_routes.join(", "));
            }
        }
        AgentCommand::Remove { id } => {
            client.agent_remove(id.clone()).await?;
            println!("agent {id} removed");
        }
    }
    Ok(())
}

async fn run_tunnel(client: &mut ControlClient, cmd: TunnelCommand) -> Result<()> {
    match cmd {
        TunnelCommand::List => {
            let tunnels = client.tunnel_list().await?;
            if tunnels.is_empty() {
                println!("no active tunnels");
                return Ok(());
            }
            println!("{:<38} {:<10} {:<10} {:<18} ROUTES", "AGENT ID", "INTERFACE", "STATUS", "LOOPBACK STAND-IN");
            for tunnel in tunnels {
                println!(
                    "{:<38} {:<10} {:<10} {:<18} {}",
                    tunnel.id,
                    tunnel.interface,
                    tunnel.status,
                    tunnel.loopback_standin,
                    tunnel.routes.join(", ")
                );
            }
        }
        TunnelCommand::Start { id, routes } => {
            client.tunnel_start(id.clone(), routes).await?;
            println!("tunnel started for agent {id}");
        }
        TunnelCommand::Stop { id } => {
            client.tunnel_stop(id.clone()).await?;
            println!("tunnel stopped for agent {id}");
        }
        TunnelCommand::AddRoute { id, routes } => {
            client.tunnel_add_route(id.clone(), routes).await?;
            println!("route(s) added to agent {id}'s tunnel");
        }
        TunnelCommand::RemoveRoute { id, routes } => {
            client.tunnel_remove_route(id.clone(), routes).await?;
            println!("route(s) removed from agent {id}'s tunnel");
        }
        TunnelCommand::Pause { id } => {
            client.tunnel_pause(id.clone()).await?;
            println!("tunnel paused for agent {id}");
        }
        TunnelCommand::Resume { id } => {
            client.tunnel_resume(id.clone()).await?;
            println!("tunnel resumed for agent {id}");
        }
    }
    Ok(())
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn parses_tunnel_start_with_routes() {
        let args = Args::parse_from(["raido-cli", "tunnel", "start", "abc123", "10.0.0.0/24", "10.1.0.0/16"]);
        match args.command {
            Command::Tunnel(TunnelCommand::Start { id, routes }) => {
                assert_eq!(id, "abc123");
                assert_eq!(routes, vec!["10.0.0.0/24", "10.1.0.0/16"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_proxy_start_with_default_transport() {
        let args = Args::parse_from(["raido-cli", "proxy", "start", "0.0.0.0:18787"]);
        match args.command {
            Command::Proxy(ProxyCommand::Start { listen_addr, transport }) => {
                assert_eq!(listen_addr, "0.0.0.0:18787");
                assert_eq!(transport, CliTransport::Quic);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
