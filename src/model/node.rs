use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};

/// Identity of one emulator instance: the (IPv4, UDP port) pair it binds.
///
/// Equality, ordering, and hashing are structural, so `NodeId` can key the
/// topology maps and the forwarding table directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId {
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl NodeId {
    pub fn new(ip: Ipv4Addr, port: u16) -> Self {
        Self { ip, port }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.ip, self.port))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.ip, self.port)
    }
}

impl FromStr for NodeId {
    type Err = anyhow::Error;

    /// Parses the topology-file form `IP,PORT`.
    fn from_str(raw: &str) -> Result<Self> {
        let (ip_raw, port_raw) = raw
            .split_once(',')
            .ok_or_else(|| anyhow!("expected IP,PORT, got {raw:?}"))?;
        let ip = ip_raw
            .trim()
            .parse::<Ipv4Addr>()
            .with_context(|| format!("invalid IPv4 address {ip_raw:?}"))?;
        let port = port_raw
            .trim()
            .parse::<u16>()
            .with_context(|| format!("invalid port {port_raw:?}"))?;
        Ok(Self { ip, port })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display_roundtrip() {
        let node: NodeId = "127.0.0.1,5000".parse().expect("parse should succeed");
        assert_eq!(node.ip, Ipv4Addr::LOCALHOST);
        assert_eq!(node.port, 5000);
        assert_eq!(node.to_string(), "127.0.0.1,5000");
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("127.0.0.1".parse::<NodeId>().is_err());
        assert!("hostname,5000".parse::<NodeId>().is_err());
        assert!("127.0.0.1,notaport".parse::<NodeId>().is_err());
    }

    #[test]
    fn ordering_is_ip_then_port() {
        let a: NodeId = "10.0.0.1,6000".parse().unwrap();
        let b: NodeId = "10.0.0.1,6001".parse().unwrap();
        let c: NodeId = "10.0.0.2,5000".parse().unwrap();
        assert!(a < b);
        assert!(b < c);
    }
}
