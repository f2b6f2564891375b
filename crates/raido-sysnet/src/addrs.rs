//! Host-wide address enumeration, independent of any particular `Link`.
//!
//! Used by the agent-side dispatcher to answer `GetRoutesReq` (spec §4.5)
//! with every address configured on the host, across all interfaces and
//! families — not just the ones on a Raido-owned TUN link.

use futures::TryStreamExt;
use ipnet::IpNet;
use netlink_packet_route::address::AddressAttribute;

use crate::error::SysNetError;

/// Every address currently configured on the host, across all interfaces
/// and address families (spec §4.5 step 2: "collect local interface
/// addresses (all address families)").
pub async fn local_addresses() -> Result<Vec<IpNet>, SysNetError> {
    let (connection, handle, _) = rtnetlink::new_connection()?;
    tokio::spawn(connection);

    let mut stream = handle.address().get().execute();
    let mut out = Vec::new();
    while let Some(message) = stream.try_next().await? {
        let prefix_len = message.header.prefix_len;
        let address = message.attributes.iter().find_map(|attr| match attr {
            AddressAttribute::Address(ip) => IpNet::new(*ip, prefix_len).ok(),
            _ => None,
        });
        if let Some(net) = address {
            out.push(net);
        }
    }
    Ok(out)
}
