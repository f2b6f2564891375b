//! Per-tunnel link and route management over an already-created TUN
//! netdev (spec §4.9). The TUN file descriptor itself is opened by
//! `raido-netstack`'s device handle (C7); this module only ever touches
//! the kernel's view of the link that the ioctl implicitly registered.
//!
//! Grounded on `original_source/viface/sysnetops/netlink_linux.go`.

use std::net::IpAddr;

use futures::TryStreamExt;
use ipnet::{IpNet, Ipv4Net};
use netlink_packet_route::link::LinkAttribute;
use netlink_packet_route::route::{RouteAddress, RouteAttribute};
use rtnetlink::{Handle, LinkUnspec, RouteMessageBuilder};
use tracing::debug;

use crate::allocator::next_standin;
use crate::error::SysNetError;

const EEXIST: i32 = 17;
const EAFNOSUPPORT: i32 = 97;
const ESRCH: i32 = 3;

/// Handle to one tunnel's link, identified by kernel ifindex.
pub struct Link {
    handle: Handle,
    index: u32,
    name: String,
}

impl Link {
    /// Open a fresh netlink connection and resolve `name` to its kernel
    /// ifindex. The connection's driver task is spawned onto the current
    /// runtime and lives as long as the returned handle is in use.
    pub async fn open(name: &str) -> Result<Self, SysNetError> {
        let (connection, handle, _) = rtnetlink::new_connection()?;
        tokio::spawn(connection);
        Self::by_name(handle, name).await
    }

    /// Resolve `name` (e.g. `raido0`) to its kernel ifindex.
    pub async fn by_name(handle: Handle, name: &str) -> Result<Self, SysNetError> {
        let link = handle
            .link()
            .get()
            .match_name(name.to_string())
            .execute()
            .try_next()
            .await?
            .ok_or_else(|| SysNetError::LinkNotFound(name.to_string()))?;

        Ok(Self {
            handle,
            index: link.header.index,
            name: name.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn up(&self) -> Result<(), SysNetError> {
        self.handle
            .link()
            .set(LinkUnspec::new_with_index(self.index).up().build())
            .execute()
            .await?;
        Ok(())
    }

    pub async fn down(&self) -> Result<(), SysNetError> {
        self.handle
            .link()
            .set(LinkUnspec::new_with_index(self.index).down().build())
            .execute()
            .await?;
        Ok(())
    }

    /// Delete the link. Destroys the TUN netdev entirely (spec §4.7 — C9
    /// owns link destruction, C7 only closes the fd).
    pub async fn destroy(self) -> Result<(), SysNetError> {
        self.handle
            .link()
            .del(self.index)
            .execute()
            .await?;
        Ok(())
    }

    /// Install `cidr` as a destination route on this link. `EEXIST` and
    /// `EAFNOSUPPORT` are swallowed (spec §4.9).
    pub async fn add_route(&self, cidr: IpNet) -> Result<(), SysNetError> {
        let message = route_message(self.index, cidr);
        match self.handle.route().add(message).execute().await {
            Ok(()) => Ok(()),
            Err(rtnetlink::Error::NetlinkError(e)) if matches!(e.raw_code(), c if c == -EEXIST || c == -EAFNOSUPPORT) => {
                debug!(%cidr, "route already present or unsupported family, ignoring");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Remove `cidr`. `ESRCH` is swallowed (spec §4.9).
    pub async fn remove_route(&self, cidr: IpNet) -> Result<(), SysNetError> {
        let message = route_message(self.index, cidr);
        match self.handle.route().del(message).execute().await {
            Ok(()) => Ok(()),
            Err(rtnetlink::Error::NetlinkError(e)) if e.raw_code() == -ESRCH => {
                debug!(%cidr, "route already absent, ignoring");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Non-stand-in destinations currently installed on this link (spec
    /// §4.9 `Routes()`).
    pub async fn routes(&self) -> Result<Vec<IpNet>, SysNetError> {
        let routes = self.all_route_destinations().await?;
        Ok(routes
            .into_iter()
            .filter(|net| !is_standin(net))
            .collect())
    }

    /// Current oper-state string (`"up"`, `"down"`, ...), per spec §4.9
    /// `Status()`.
    pub async fn status(&self) -> Result<String, SysNetError> {
        let link = self
            .handle
            .link()
            .get()
            .match_index(self.index)
            .execute()
            .try_next()
            .await?
            .ok_or_else(|| SysNetError::LinkNotFound(self.name.clone()))?;

        let state = link.attributes.iter().find_map(|attr| match attr {
            LinkAttribute::OperState(state) => Some(format!("{state:?}").to_lowercase()),
            _ => None,
        });

        Ok(state.unwrap_or_else(|| "unknown".to_string()))
    }

    /// Scan the host route table and allocate the next free
    /// `240.x.0.0/32` stand-in (spec §4.9 allocation algorithm), then
    /// install it on this link.
    pub async fn allocate_and_install_standin(&self) -> Result<Ipv4Net, SysNetError> {
        let all = self.all_ipv4_route_destinations().await?;
        let standin = next_standin(&all);
        self.add_route(IpNet::V4(standin)).await?;
        Ok(standin)
    }

    /// Bring the link down. The kernel drops the routes bound to it; the
    /// caller's active-route set and stand-in address are unaffected and
    /// are replayed by `resume`.
    pub async fn pause(&self) -> Result<(), SysNetError> {
        self.down().await
    }

    /// Bring the link back up and re-install `active_routes` plus the
    /// stand-in `/32` (spec §4.9, and the `Resume`-only re-install
    /// decision recorded for the open question in §9).
    pub async fn resume(
        &self,
        active_routes: &[IpNet],
        standin: Ipv4Net,
    ) -> Result<(), SysNetError> {
        self.up().await?;
        for route in active_routes {
            self.add_route(*route).await?;
        }
        self.add_route(IpNet::V4(standin)).await
    }

    async fn all_route_destinations(&self) -> Result<Vec<IpNet>, SysNetError> {
        let messages = self
            .handle
            .route()
            .get(RouteMessageBuilder::<IpAddr>::new().build())
            .execute()
            .try_collect::<Vec<_>>()
            .await?;

        Ok(messages.iter().filter_map(destination_of).collect())
    }

    async fn all_ipv4_route_destinations(&self) -> Result<Vec<Ipv4Net>, SysNetError> {
        Ok(self
            .all_route_destinations()
            .await?
            .into_iter()
            .filter_map(|net| match net {
                IpNet::V4(v4) => Some(v4),
                IpNet::V6(_) => None,
            })
            .collect())
    }
}

fn is_standin(net: &IpNet) -> bool {
    matches!(net, IpNet::V4(v4) if v4.prefix_len() == 32 && v4.addr().octets()[0] == 240)
}

fn destination_of(message: &netlink_packet_route::route::RouteMessage) -> Option<IpNet> {
    let prefix_len = message.header.destination_prefix_length;
    message.attributes.iter().find_map(|attr| match attr {
        RouteAttribute::Destination(RouteAddress::Inet(v4)) => {
            Ipv4Net::new(*v4, prefix_len).ok().map(IpNet::V4)
        }
        RouteAttribute::Destination(RouteAddress::Inet6(v6)) => {
            ipnet::Ipv6Net::new(*v6, prefix_len).ok().map(IpNet::V6)
        }
        _ => None,
    })
}

fn route_message(index: u32, cidr: IpNet) -> netlink_packet_route::route::RouteMessage {
    match cidr {
        IpNet::V4(net) => RouteMessageBuilder::<std::net::Ipv4Addr>::new()
            .output_interface(index)
            .destination_prefix(net.addr(), net.prefix_len())
            .build(),
        IpNet::V6(net) => RouteMessageBuilder::<std::net::Ipv6Addr>::new()
            .output_interface(index)
            .destination_prefix(net.addr(), net.prefix_len())
            .build(),
    }
}
