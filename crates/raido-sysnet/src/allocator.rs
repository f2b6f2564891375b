//! Allocates the per-tunnel loopback-stand-in address (spec §3, §4.9):
//! one `/32` out of `240.0.0.0/4`, picked by scanning the host route
//! table for the largest second octet already in use among `240.x.0.0`
//! destinations and incrementing.

use std::net::Ipv4Addr;

use ipnet::Ipv4Net;

/// Pure function over an already-collected route list so it's testable
/// without a netlink socket (spec §8: "with existing routes
/// `240.{1,2,4}.0.0/32`, next allocation = `240.5.0.0/32`; with an empty
/// table = `240.1.0.0/32`").
pub fn next_standin(existing: &[Ipv4Net]) -> Ipv4Net {
    let max_octet = existing
        .iter()
        .filter_map(|net| {
            let octets = net.addr().octets();
            (octets[0] == 240).then_some(octets[1])
        })
        .max();

    let next = match max_octet {
        None => 1,
        Some(255) => 1, // wrap past the top of the block rather than overflow
        Some(x) => x + 1,
    };

    Ipv4Net::new(Ipv4Addr::new(240, next, 0, 0), 32).expect("240.x.0.0/32 is always valid")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn net(a: u8, b: u8) -> Ipv4Net {
        Ipv4Net::new(Ipv4Addr::new(a, b, 0, 0), 32).unwrap()
    }

    #[test]
    fn empty_table_allocates_240_1() {
        assert_eq!(next_standin(&[]), net(240, 1));
    }

    #[test]
    fn scans_existing_240_routes_for_max_octet() {
        let existing = vec![net(240, 1), net(240, 2), net(240, 4)];
        assert_eq!(next_standin(&existing), net(240, 5));
    }

    #[test]
    fn ignores_routes_outside_240_block() {
        let existing = vec![net(10, 0), net(240, 3)];
        assert_eq!(next_standin(&existing), net(240, 4));
    }

    #[test]
    fn wraps_past_255() {
        let existing = vec![net(240, 255)];
        assert_eq!(next_standin(&existing), net(240, 1));
    }
}
