//! Advertised-route filtering (spec §3, §4.6, §8): loopback and
//! link-local entries never make it into a stored `AgentRecord`, whether
//! they arrive in the handshake's advertised list or in a later
//! `AddRoutes` call.

use ipnet::IpNet;
use tracing::warn;

/// Parses each entry as a CIDR and drops it if parsing fails, or if it is
/// loopback or link-local (spec §8: `L ∉ stored(R)` for any loopback or
/// link-local `L`).
pub fn filter_advertised_routes(routes: &[String]) -> Vec<IpNet> {
    routes
        .iter()
        .filter_map(|raw| match raw.parse::<IpNet>() {
            Ok(net) => Some(net),
            Err(e) => {
                warn!(route = %raw, error = %e, "dropping unparseable advertised route");
                None
            }
        })
        .filter(|net| !is_loopback_or_link_local(net))
        .collect()
}

/// Rejects the same classes at `AddRoutes` time (spec §3 invariant).
pub fn reject_loopback_or_link_local(routes: &[IpNet]) -> Result<(), IpNet> {
    match routes.iter().find(|net| is_loopback_or_link_local(net)) {
        Some(offender) => Err(*offender),
        None => Ok(()),
    }
}

fn is_loopback_or_link_local(net: &IpNet) -> bool {
    match net {
        IpNet::V4(v4) => v4.addr().is_loopback() || v4.addr().is_link_local(),
        IpNet::V6(v6) => v6.addr().is_loopback() || (v6.addr().segments()[0] & 0xffc0) == 0xfe80,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_loopback_and_link_local() {
        let input = vec![
            "10.0.0.0/24".to_string(),
            "127.0.0.0/8".to_string(),
            "169.254.0.0/16".to_string(),
            "192.168.1.0/24".to_string(),
        ];
        let filtered = filter_advertised_routes(&input);
        assert_eq!(filtered.len(), 2);
        assert!(filtered.iter().any(|n| n.to_string() == "10.0.0.0/24"));
        assert!(filtered.iter().any(|n| n.to_string() == "192.168.1.0/24"));
    }

    #[test]
    fn drops_unparseable_entries() {
        let input = vec!["not-a-cidr".to_string(), "10.0.0.0/8".to_string()];
        let filtered = filter_advertised_routes(&input);
        assert_eq!(filtered.len(), 1);
    }

    #[test]
    fn reject_flags_loopback_addition() {
        let routes: Vec<IpNet> = vec!["127.0.0.1/32".parse().unwrap()];
        assert!(reject_loopback_or_link_local(&routes).is_err());
    }

    #[test]
    fn reject_allows_ordinary_routes() {
        let routes: Vec<IpNet> = vec!["10.1.0.0/16".parse().unwrap()];
        assert!(reject_loopback_or_link_local(&routes).is_ok());
    }
}
