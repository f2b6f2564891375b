//! The per-tunnel user-space network stack (spec §4.8, C8): one smoltcp
//! [`Interface`] bound to one [`TunChannelDevice`], synthesizing TCP/UDP
//! endpoints from packets that kernel routing delivered onto the TUN.
//!
//! Grounded on the smoltcp `Interface`/`SocketSet` wiring used to bind
//! smoltcp to a software device (catch-all IPs, default routes for both
//! families, `set_any_ip(true)` so the interface accepts traffic for
//! every destination the kernel forwards to it).

use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use smoltcp::iface::{Config, Interface, SocketHandle, SocketSet};
use smoltcp::socket::{raw, tcp, udp};
use smoltcp::time::Instant as SmolInstant;
use smoltcp::wire::{
    HardwareAddress, IpAddress, IpCidr, IpEndpoint, IpListenEndpoint, IpProtocol, IpVersion,
    Ipv4Packet, Ipv6Packet, TcpPacket,
};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::device::TunChannelDevice;
use crate::endpoint::EndpointStream;

/// Configuration floor from spec §4.8.
pub struct NetStackConfig {
    pub default_ttl: u8,
    pub tcp_backlog: usize,
    pub tcp_buffer_default: usize,
    pub tcp_buffer_max: usize,
}

impl Default for NetStackConfig {
    fn default() -> Self {
        Self {
            default_ttl: 64,
            tcp_backlog: 1024,
            tcp_buffer_default: 4 * 1024 * 1024,
            tcp_buffer_max: 4 * 1024 * 1024,
        }
    }
}

/// A freshly synthesized flow, handed to the forwarder layer to dial out
/// through the transport (spec §4.8's TCP/UDP forwarder contract).
pub enum NewFlow {
    Tcp {
        local: SocketAddr,
        peer: SocketAddr,
        stream: EndpointStream,
    },
    Udp {
        local: SocketAddr,
        peer: SocketAddr,
        stream: EndpointStream,
    },
}

struct ActiveTcp {
    outbound_rx: Option<mpsc::UnboundedReceiver<Bytes>>,
    inbound_tx: Option<mpsc::UnboundedSender<Bytes>>,
    closed: Arc<AtomicBool>,
}

struct ActiveUdp {
    handle: SocketHandle,
    local: SocketAddr,
    peer: SocketAddr,
    outbound_rx: mpsc::UnboundedReceiver<Bytes>,
    inbound_tx: mpsc::UnboundedSender<Bytes>,
}

/// Owns the interface, the socket set, and every in-flight flow. Runs on
/// its own task; `raido-sysnet` owns the link this stack's NIC is bound
/// to, not this type.
pub struct NetStack {
    device: TunChannelDevice,
    interface: Interface,
    sockets: SocketSet<'static>,
    config: NetStackConfig,
    tcp_flows: HashMap<SocketHandle, ActiveTcp>,
    udp_flows: Vec<ActiveUdp>,
    bound_tcp_endpoints: HashSet<SocketAddr>,
    bound_udp_endpoints: HashMap<SocketAddr, SocketHandle>,
    new_flow_tx: mpsc::UnboundedSender<NewFlow>,
    tun_rx: mpsc::Receiver<Vec<u8>>,
    tun_tx: mpsc::Sender<Vec<u8>>,
    icmp_handle: SocketHandle,
}

const IP4_ANY: Ipv4Addr = Ipv4Addr::UNSPECIFIED;
const IP6_ANY: Ipv6Addr = Ipv6Addr::UNSPECIFIED;

impl NetStack {
    pub fn new(
        config: NetStackConfig,
        tun_rx: mpsc::Receiver<Vec<u8>>,
        tun_tx: mpsc::Sender<Vec<u8>>,
    ) -> (Self, mpsc::UnboundedReceiver<NewFlow>) {
        let mut device = TunChannelDevice::default();
        let mut interface = Interface::new(
            Config::new(HardwareAddress::Ip),
            &mut device,
            SmolInstant::ZERO,
        );
        interface.set_any_ip(true);
        interface.update_ip_addrs(|ips| {
            let _ = ips.push(IpCidr::new(IpAddress::Ipv4(IP4_ANY.into()), 0));
            let _ = ips.push(IpCidr::new(IpAddress::Ipv6(IP6_ANY.into()), 0));
        });
        interface
            .routes_mut()
            .add_default_ipv4_route(IP4_ANY.into())
            .expect("default ipv4 route fits");
        interface
            .routes_mut()
            .add_default_ipv6_route(IP6_ANY.into())
            .expect("default ipv6 route fits");

        let mut sockets = SocketSet::new(vec![]);

        // Drain-only ICMPv4 responder (spec §4.8, §9): accepts and
        // discards so ICMP traffic never backpressures the stack. Reply
        // generation is explicitly future work.
        let icmp_rx = raw::PacketBuffer::new(vec![raw::PacketMetadata::EMPTY; 32], vec![0u8; 8192]);
        let icmp_tx = raw::PacketBuffer::new(vec![raw::PacketMetadata::EMPTY; 32], vec![0u8; 8192]);
        let icmp_socket = raw::Socket::new(
            IpVersion::Ipv4,
            IpProtocol::Icmp,
            icmp_rx,
            icmp_tx,
        );
        let icmp_handle = sockets.add(icmp_socket);

        let (new_flow_tx, new_flow_rx) = mpsc::unbounded_channel();

        let stack = Self {
            device,
            interface,
            sockets,
            config,
            tcp_flows: HashMap::new(),
            udp_flows: Vec::new(),
            bound_tcp_endpoints: HashSet::new(),
            bound_udp_endpoints: HashMap::new(),
            new_flow_tx,
            tun_rx,
            tun_tx,
            icmp_handle,
        };
        (stack, new_flow_rx)
    }

    /// Drive the stack until the TUN channel closes.
    pub async fn run(mut self) {
        loop {
            let poll_delay = self
                .interface
                .poll_delay(now(), &self.sockets)
                .map(|d| Duration::from_micros(d.total_micros()))
                .unwrap_or(Duration::from_millis(50));

            tokio::select! {
                packet = self.tun_rx.recv() => match packet {
                    Some(packet) => self.on_tun_packet(packet),
                    None => break,
                },
                _ = tokio::time::sleep(poll_delay) => {}
            }

            self.drain_flow_writes();
            self.poll_interface().await;
            self.harvest_flow_reads();
        }
    }

    fn on_tun_packet(&mut self, packet: Vec<u8>) {
        if let Some((local, is_syn)) = inspect_tcp_syn(&packet) {
            if is_syn && !self.bound_tcp_endpoints.contains(&local) {
                self.bind_tcp_listener(local);
            }
        } else if let Some((local, peer)) = inspect_udp(&packet) {
            if !self.bound_udp_endpoints.contains_key(&local) {
                self.bind_udp_listener(local, peer);
            }
        }
        self.device.push_inbound(packet);
    }

    fn bind_tcp_listener(&mut self, local: SocketAddr) {
        if self.bound_tcp_endpoints.len() >= self.config.tcp_backlog {
            warn!(%local, "tcp backlog full, dropping new listener request");
            return;
        }

        let rx_buf = tcp::SocketBuffer::new(vec![0u8; self.config.tcp_buffer_default]);
        let tx_buf = tcp::SocketBuffer::new(vec![0u8; self.config.tcp_buffer_default]);
        let mut socket = tcp::Socket::new(rx_buf, tx_buf);
        socket.set_nagle_enabled(false);
        socket.set_hop_limit(Some(self.config.default_ttl));

        let endpoint = IpListenEndpoint {
            addr: Some(to_smol_addr(local.ip())),
            port: local.port(),
        };
        if socket.listen(endpoint).is_err() {
            warn!(%local, "failed to bind listening socket for new flow");
            return;
        }

        let handle = self.sockets.add(socket);
        self.bound_tcp_endpoints.insert(local);

        // The peer address, and the real channel pair the forwarder will
        // use, are only known once the handshake completes (see
        // `promote_established_tcp`); track the handle as pending until then.
        self.tcp_flows.insert(
            handle,
            ActiveTcp {
                outbound_rx: None,
                inbound_tx: None,
                closed: Arc::new(AtomicBool::new(false)),
            },
        );
    }

    fn drain_flow_writes(&mut self) {
        let handles: Vec<SocketHandle> = self.tcp_flows.keys().copied().collect();
        for handle in handles {
            let flow = self.tcp_flows.get_mut(&handle).expect("just collected");
            let socket = self.sockets.get_mut::<tcp::Socket>(handle);
            if let Some(outbound_rx) = flow.outbound_rx.as_mut() {
                while let Ok(chunk) = outbound_rx.try_recv() {
                    if socket.can_send() {
                        let _ = socket.send_slice(&chunk);
                    } else {
                        break;
                    }
                }
            }
            if flow.closed.load(Ordering::SeqCst) {
                socket.close();
            }
        }

        let mut disconnected = Vec::new();
        for flow in &mut self.udp_flows {
            let socket = self.sockets.get_mut::<udp::Socket>(flow.handle);
            loop {
                match flow.outbound_rx.try_recv() {
                    Ok(chunk) => {
                        let remote = IpEndpoint::new(to_smol_addr(flow.peer.ip()), flow.peer.port());
                        let _ = socket.send_slice(&chunk, remote);
                    }
                    Err(mpsc::error::TryRecvError::Empty) => break,
                    Err(mpsc::error::TryRecvError::Disconnected) => {
                        disconnected.push(flow.handle);
                        break;
                    }
                }
            }
        }
        for handle in disconnected {
            self.teardown_udp(handle);
        }
    }

    async fn poll_interface(&mut self) {
        self.interface
            .poll(now(), &mut self.device, &mut self.sockets);

        while let Some(packet) = self.device.pop_outbound() {
            if self.tun_tx.try_send(packet).is_err() {
                trace!("tun write channel full, dropping outbound packet");
            }
        }

        // ICMP: receive-and-discard.
        let icmp_socket = self.sockets.get_mut::<raw::Socket>(self.icmp_handle);
        while icmp_socket.can_recv() {
            if icmp_socket.recv().is_err() {
                break;
            }
        }

        let mut newly_established = Vec::new();
        let mut closed = Vec::new();
        for handle in self.tcp_flows.keys().copied().collect::<Vec<_>>() {
            let socket = self.sockets.get_mut::<tcp::Socket>(handle);
            match socket.state() {
                tcp::State::Established if socket.remote_endpoint().is_some() => {
                    newly_established.push(handle);
                }
                tcp::State::Closed => closed.push(handle),
                _ => {}
            }
        }

        for handle in newly_established {
            self.promote_established_tcp(handle);
        }
        for handle in closed {
            self.teardown_tcp(handle);
        }
    }

    fn promote_established_tcp(&mut self, handle: SocketHandle) {
        let already_promoted = match self.tcp_flows.get(&handle) {
            Some(flow) => flow.inbound_tx.is_some(),
            None => true,
        };
        if already_promoted {
            return;
        }

        let socket = self.sockets.get_mut::<tcp::Socket>(handle);
        let Some(remote) = socket.remote_endpoint() else {
            return;
        };
        let Some(local) = socket.local_endpoint() else {
            return;
        };

        let local_addr = from_smol_endpoint(local);
        let peer_addr = from_smol_endpoint(remote);

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));

        if let Some(flow) = self.tcp_flows.get_mut(&handle) {
            flow.outbound_rx = Some(outbound_rx);
            flow.inbound_tx = Some(inbound_tx);
            flow.closed = closed.clone();
        }

        let stream = EndpointStream::new(outbound_tx, inbound_rx, closed);
        let _ = self.new_flow_tx.send(NewFlow::Tcp {
            local: local_addr,
            peer: peer_addr,
            stream,
        });
    }

    fn teardown_tcp(&mut self, handle: SocketHandle) {
        if let Some(flow) = self.tcp_flows.remove(&handle) {
            let socket = self.sockets.get_mut::<tcp::Socket>(handle);
            if let Some(local) = socket.local_endpoint() {
                self.bound_tcp_endpoints.remove(&from_smol_endpoint(local));
            }
            drop(flow);
        }
        self.sockets.remove(handle);
    }

    fn harvest_flow_reads(&mut self) {
        for (&handle, flow) in self.tcp_flows.iter() {
            let Some(inbound_tx) = flow.inbound_tx.as_ref() else {
                continue;
            };
            let socket = self.sockets.get_mut::<tcp::Socket>(handle);
            while socket.can_recv() {
                let mut buf = vec![0u8; 16 * 1024];
                match socket.recv_slice(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        buf.truncate(n);
                        if inbound_tx.send(Bytes::from(buf)).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        }

        let mut disconnected = Vec::new();
        for flow in &self.udp_flows {
            let socket = self.sockets.get_mut::<udp::Socket>(flow.handle);
            while socket.can_recv() {
                match socket.recv() {
                    Ok((payload, _meta)) => {
                        if flow.inbound_tx.send(Bytes::copy_from_slice(payload)).is_err() {
                            disconnected.push(flow.handle);
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        }
        for handle in disconnected {
            self.teardown_udp(handle);
        }
    }

    /// Drops a UDP flow once its consumer has gone away, on either side:
    /// the forwarder stopped reading (`inbound_tx` send failed) or stopped
    /// writing and dropped its sender (`outbound_rx` disconnected). UDP has
    /// no close handshake to wait for, so consumer silence is the only
    /// teardown signal (mirrors `teardown_tcp`, which keys off socket state
    /// instead).
    fn teardown_udp(&mut self, handle: SocketHandle) {
        let Some(index) = self.udp_flows.iter().position(|flow| flow.handle == handle) else {
            return;
        };
        let flow = self.udp_flows.remove(index);
        self.bound_udp_endpoints.remove(&flow.local);
        self.sockets.remove(handle);
    }

    /// Bind a new catch-all UDP listener at `local` and synthesize the
    /// corresponding flow, mirroring the TCP path but without a handshake
    /// (the first observed datagram defines the flow).
    pub fn bind_udp_listener(&mut self, local: SocketAddr, peer: SocketAddr) {
        if self.bound_udp_endpoints.contains_key(&local) {
            return;
        }

        let rx_meta = vec![udp::PacketMetadata::EMPTY; 64];
        let tx_meta = vec![udp::PacketMetadata::EMPTY; 64];
        let rx_buf = udp::PacketBuffer::new(rx_meta, vec![0u8; self.config.tcp_buffer_default]);
        let tx_buf = udp::PacketBuffer::new(tx_meta, vec![0u8; self.config.tcp_buffer_default]);
        let mut socket = udp::Socket::new(rx_buf, tx_buf);
        socket.set_hop_limit(Some(self.config.default_ttl));
        let endpoint = IpListenEndpoint {
            addr: Some(to_smol_addr(local.ip())),
            port: local.port(),
        };
        if socket.bind(endpoint).is_err() {
            return;
        }

        let handle = self.sockets.add(socket);
        self.bound_udp_endpoints.insert(local, handle);

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        self.udp_flows.push(ActiveUdp {
            handle,
            local,
            peer,
            outbound_rx,
            inbound_tx,
        });

        let stream = EndpointStream::new(outbound_tx, inbound_rx, Arc::new(AtomicBool::new(false)));
        let _ = self.new_flow_tx.send(NewFlow::Udp {
            local,
            peer,
            stream,
        });
    }
}

fn now() -> SmolInstant {
    SmolInstant::from_millis(
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0),
    )
}

fn to_smol_addr(addr: IpAddr) -> IpAddress {
    match addr {
        IpAddr::V4(v4) => IpAddress::Ipv4(v4.into()),
        IpAddr::V6(v6) => IpAddress::Ipv6(v6.into()),
    }
}

fn from_smol_endpoint(endpoint: IpEndpoint) -> SocketAddr {
    let ip: IpAddr = match endpoint.addr {
        IpAddress::Ipv4(v4) => v4.into(),
        IpAddress::Ipv6(v6) => v6.into(),
    };
    SocketAddr::new(ip, endpoint.port)
}

/// Peek at an IP packet for a TCP SYN and return `(local_endpoint, is_syn)`
/// without touching smoltcp state, so a listening socket can be bound
/// before the packet is fed to `interface.poll` (spec §4.8's "per
/// incoming SYN, create an endpoint").
fn inspect_tcp_syn(packet: &[u8]) -> Option<(SocketAddr, bool)> {
    let version = packet.first()? >> 4;
    let (dst, protocol, payload) = match version {
        4 => {
            let ip = Ipv4Packet::new_checked(packet).ok()?;
            if ip.next_header() != IpProtocol::Tcp {
                return None;
            }
            let dst = IpAddr::V4(ip.dst_addr().into());
            let header_len = ip.header_len() as usize;
            (dst, IpProtocol::Tcp, packet.get(header_len..)?)
        }
        6 => {
            let ip = Ipv6Packet::new_checked(packet).ok()?;
            if ip.next_header() != IpProtocol::Tcp {
                return None;
            }
            let dst = IpAddr::V6(ip.dst_addr().into());
            (dst, IpProtocol::Tcp, ip.payload())
        }
        _ => return None,
    };
    let _ = protocol;

    let tcp = TcpPacket::new_checked(payload).ok()?;
    let addr = SocketAddr::new(dst, tcp.dst_port());
    Some((addr, tcp.syn() && !tcp.ack()))
}

/// Mirror of [`inspect_tcp_syn`] for UDP: since UDP has no handshake, the
/// first observed datagram to an unbound local endpoint defines the flow.
fn inspect_udp(packet: &[u8]) -> Option<(SocketAddr, SocketAddr)> {
    use smoltcp::wire::UdpPacket;

    let version = packet.first()? >> 4;
    let (dst, src, payload): (IpAddr, IpAddr, &[u8]) = match version {
        4 => {
            let ip = Ipv4Packet::new_checked(packet).ok()?;
            if ip.next_header() != IpProtocol::Udp {
                return None;
            }
            let header_len = ip.header_len() as usize;
            (
                IpAddr::V4(ip.dst_addr().into()),
                IpAddr::V4(ip.src_addr().into()),
                packet.get(header_len..)?,
            )
        }
        6 => {
            let ip = Ipv6Packet::new_checked(packet).ok()?;
            if ip.next_header() != IpProtocol::Udp {
                return None;
            }
            (
                IpAddr::V6(ip.dst_addr().into()),
                IpAddr::V6(ip.src_addr().into()),
                ip.payload(),
            )
        }
        _ => return None,
    };

    let udp = UdpPacket::new_checked(payload).ok()?;
    Some((
        SocketAddr::new(dst, udp.dst_port()),
        SocketAddr::new(src, udp.src_port()),
    ))
}
