//! Netlink-backed link and route management for per-tunnel TUN devices
//! (spec §4.9, component C9).
//!
//! A [`Link`] wraps the kernel's view of one tunnel's netdev: bring it
//! up/down, install and remove destination routes, and track the
//! per-tunnel loopback-stand-in `/32` out of `240.0.0.0/4`. The stand-in
//! allocation itself is a pure function in [`allocator`] so it can be
//! tested without a netlink socket.

mod addrs;
mod allocator;
mod error;
mod link;

pub use addrs::local_addresses;
pub use allocator::next_standin;
pub use error::SysNetError;
pub use link::Link;

pub use rtnetlink::new_connection;
