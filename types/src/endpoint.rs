//! Network endpoints.
//!
//! Every endpoint the node tracks is IPv6; IPv4 senders are normalized to
//! their v4-mapped IPv6 form (`::ffff:a.b.c.d`) at the edge, so the peer
//! table and cookie table never have to handle two address families.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv6Addr, SocketAddr, SocketAddrV6};

/// An IPv6 socket address (IPv4 is carried v4-mapped).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    ip: Ipv6Addr,
    port: u16,
}

impl Endpoint {
    pub fn new(ip: Ipv6Addr, port: u16) -> Self {
        Self { ip, port }
    }

    /// Normalize any socket address to an IPv6 endpoint.
    pub fn from_socket_addr(addr: SocketAddr) -> Self {
        match addr {
            SocketAddr::V6(v6) => Self::new(*v6.ip(), v6.port()),
            SocketAddr::V4(v4) => Self::new(v4.ip().to_ipv6_mapped(), v4.port()),
        }
    }

    pub fn ip(&self) -> Ipv6Addr {
        self.ip
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn to_socket_addr(&self) -> SocketAddr {
        SocketAddr::V6(SocketAddrV6::new(self.ip, self.port, 0, 0))
    }

    /// The unspecified endpoint (`[::]:0`), used to pad keepalive payloads.
    pub fn unspecified() -> Self {
        Self::new(Ipv6Addr::UNSPECIFIED, 0)
    }

    pub fn is_unspecified(&self) -> bool {
        self.ip.is_unspecified()
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self::from_socket_addr(addr)
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]:{}", self.ip, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]:{}", self.ip, self.port)
    }
}
