use std::net::IpAddr;

use crate::error::ProtoError;

/// Transport protocol requested for a connection (2 bits on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportProtocol {
    Tcp = 0,
    Udp = 1,
    Icmp = 2,
}

impl TransportProtocol {
    fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(Self::Tcp),
            1 => Some(Self::Udp),
            2 => Some(Self::Icmp),
            _ => None,
        }
    }
}

/// IP address family requested for a connection (2 bits on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkFamily {
    V4 = 0,
    V6 = 1,
}

impl NetworkFamily {
    fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(Self::V4),
            1 => Some(Self::V6),
            _ => None,
        }
    }
}

/// A compact, hand-packed connection request carried in
/// `Envelope::body` when `command == ESTABLISH_CONNECTION` (spec §3).
///
/// Layout: `[header: u8][port: u16 BE][ip: 4 or 16 bytes]`, where
/// `header = (network << 6) | (protocol << 4)`. Minimum length is 7 bytes
/// for IPv4, 19 for IPv6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionRequest {
    pub ip: IpAddr,
    pub port: u16,
    pub protocol: TransportProtocol,
    pub network: NetworkFamily,
}

const MIN_LEN_V4: usize = 7;
const MIN_LEN_V6: usize = 19;

impl ConnectionRequest {
    pub fn new(ip: IpAddr, port: u16, protocol: TransportProtocol) -> Self {
        let network = match ip {
            IpAddr::V4(_) => NetworkFamily::V4,
            IpAddr::V6(_) => NetworkFamily::V6,
        };
        Self {
            ip,
            port,
            protocol,
            network,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let header = ((self.network as u8) << 6) | ((self.protocol as u8) << 4);
        let mut out = Vec::with_capacity(MIN_LEN_V6);
        out.push(header);
        out.extend_from_slice(&self.port.to_be_bytes());
        match self.ip {
            IpAddr::V4(v4) => out.extend_from_slice(&v4.octets()),
            IpAddr::V6(v6) => out.extend_from_slice(&v6.octets()),
        }
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ProtoError> {
        if buf.len() < 3 {
            return Err(ProtoError::Malformed(
                "connection request shorter than header+port".to_string(),
            ));
        }

        let header = buf[0];
        let network_bits = (header >> 6) & 0x03;
        let protocol_bits = (header >> 4) & 0x03;

        let network = NetworkFamily::from_bits(network_bits)
            .ok_or_else(|| ProtoError::Malformed(format!("unknown network byte {network_bits}")))?;
        let protocol = TransportProtocol::from_bits(protocol_bits)
            .ok_or_else(|| ProtoError::Malformed(format!("unknown protocol byte {protocol_bits}")))?;

        let port = u16::from_be_bytes([buf[1], buf[2]]);

        let ip = match network {
            NetworkFamily::V4 => {
                if buf.len() < MIN_LEN_V4 {
                    return Err(ProtoError::Malformed(format!(
                        "ipv4 connection request too short: {} bytes",
                        buf.len()
                    )));
                }
                IpAddr::from([buf[3], buf[4], buf[5], buf[6]])
            }
            NetworkFamily::V6 => {
                if buf.len() < MIN_LEN_V6 {
                    return Err(ProtoError::Malformed(format!(
                        "ipv6 connection request too short: {} bytes",
                        buf.len()
                    )));
                }
                let mut octets = [0u8; 16];
                octets.copy_from_slice(&buf[3..19]);
                IpAddr::from(octets)
            }
        };

        Ok(Self {
            ip,
            port,
            protocol,
            network,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn roundtrip_v4_tcp() {
        let req = ConnectionRequest::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 42)), 80, TransportProtocol::Tcp);
        let encoded = req.encode();
        assert_eq!(encoded.len(), MIN_LEN_V4);
        let decoded = ConnectionRequest::decode(&encoded).unwrap();
        assert_eq!(decoded, req);
    }

    #[test]
    fn roundtrip_v6_udp() {
        let req = ConnectionRequest::new(
            IpAddr::V6(Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1)),
            53,
            TransportProtocol::Udp,
        );
        let encoded = req.encode();
        assert_eq!(encoded.len(), MIN_LEN_V6);
        let decoded = ConnectionRequest::decode(&encoded).unwrap();
        assert_eq!(decoded, req);
    }

    #[test]
    fn roundtrip_icmp() {
        let req = ConnectionRequest::new(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1)), 0, TransportProtocol::Icmp);
        let decoded = ConnectionRequest::decode(&req.encode()).unwrap();
        assert_eq!(decoded, req);
    }

    #[test]
    fn rejects_short_v4() {
        let req = ConnectionRequest::new(IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4)), 1, TransportProtocol::Tcp);
        let encoded = req.encode();
        let err = ConnectionRequest::decode(&encoded[..6]).unwrap_err();
        assert!(matches!(err, ProtoError::Malformed(_)));
    }

    #[test]
    fn rejects_short_v6() {
        let req = ConnectionRequest::new(IpAddr::V6(Ipv6Addr::LOCALHOST), 1, TransportProtocol::Tcp);
        let encoded = req.encode();
        let err = ConnectionRequest::decode(&encoded[..18]).unwrap_err();
        assert!(matches!(err, ProtoError::Malformed(_)));
    }

    #[test]
    fn rejects_unknown_network_byte() {
        // network bits = 0b11 is not a valid family.
        let bogus = [0b1100_0000u8, 0, 80, 10, 0, 0, 1];
        let err = ConnectionRequest::decode(&bogus).unwrap_err();
        assert!(matches!(err, ProtoError::Malformed(_)));
    }
}
