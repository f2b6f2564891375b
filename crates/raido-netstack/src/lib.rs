//! TUN device handle (C7) and user-space TCP/UDP/ICMP network stack (C8)
//! bound to one tunnel (spec §4.7, §4.8).

mod device;
mod endpoint;
mod error;
mod forwarder;
mod stack;
pub mod tun;

pub use endpoint::EndpointStream;
pub use error::NetStackError;
pub use forwarder::handle_flow;
pub use stack::{NetStack, NetStackConfig, NewFlow};

use std::sync::Arc;

use raido_relay::BufferPool;
use raido_transport::StreamConnection;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::warn;

/// Bytes read off the TUN fd per `recv`/`send` call; generous enough for
/// any single IP packet plus headroom.
const TUN_IO_BUFFER: usize = 65536;
const TUN_CHANNEL_DEPTH: usize = 1024;

/// Wires a freshly opened TUN device to a [`NetStack`], spawning the
/// reader/writer tasks that bridge the kernel fd to the stack's channels,
/// and the stack's own poll-loop task. Returns the interface name and a
/// channel of synthesized flows for the caller to dispatch to
/// [`handle_flow`].
pub async fn start_tunnel_stack(
    config: NetStackConfig,
) -> Result<(String, mpsc::UnboundedReceiver<NewFlow>), NetStackError> {
    let (name, device) = tun::open().await?;
    let (mut tun_read, mut tun_write) = tokio::io::split(device);

    let (inbound_tx, inbound_rx) = mpsc::channel(TUN_CHANNEL_DEPTH);
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Vec<u8>>(TUN_CHANNEL_DEPTH);

    tokio::spawn(async move {
        let mut buf = vec![0u8; TUN_IO_BUFFER];
        loop {
            match tun_read.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    if inbound_tx.send(buf[..n].to_vec()).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "tun read error, stopping reader task");
                    break;
                }
            }
        }
    });

    tokio::spawn(async move {
        while let Some(packet) = outbound_rx.recv().await {
            if let Err(e) = tun_write.write_all(&packet).await {
                warn!(error = %e, "tun write error, stopping writer task");
                break;
            }
        }
    });

    let (net_stack, new_flow_rx) = NetStack::new(config, inbound_rx, outbound_tx);
    tokio::spawn(net_stack.run());

    Ok((name, new_flow_rx))
}

/// Drains `new_flows`, spawning [`handle_flow`] for each one against
/// `connection`. Runs until the channel closes (the stack task exited).
pub async fn run_forwarders(
    mut new_flows: mpsc::UnboundedReceiver<NewFlow>,
    connection: Arc<dyn StreamConnection>,
    pool: BufferPool,
) {
    while let Some(flow) = new_flows.recv().await {
        let connection = connection.clone();
        let pool = pool.clone();
        tokio::spawn(handle_flow(flow, connection, pool));
    }
}
