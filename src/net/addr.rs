//! Address families and endpoint metadata
//!
//! [`Family`] is the address-family preference used when resolving a host.
//! [`EndpointInfo`] is the endpoint metadata captured once a connection is
//! established.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use tokio::net::TcpStream;

use super::Error;

/// Which address families a lookup may return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Family {
    /// IPv4 addresses only
    V4,
    /// IPv6 addresses only
    V6,
    /// Either family, no filtering
    #[default]
    Any,
}

impl Family {
    /// Check whether `addr` is acceptable under this preference
    pub fn admits(&self, addr: &SocketAddr) -> bool {
        match self {
            Family::V4 => addr.is_ipv4(),
            Family::V6 => addr.is_ipv6(),
            Family::Any => true,
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Family::V4 => f.write_str("v4"),
            Family::V6 => f.write_str("v6"),
            Family::Any => f.write_str("any"),
        }
    }
}

impl FromStr for Family {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "v4" | "ipv4" | "inet" => Ok(Family::V4),
            "v6" | "ipv6" | "inet6" => Ok(Family::V6),
            "any" | "" => Ok(Family::Any),
            other => Err(Error::UnsupportedFamily(other.to_string())),
        }
    }
}

/// Stable partition of `addrs`: every IPv4 address first, then every IPv6
/// address, keeping the relative order inside each family.
pub fn v4_first(addrs: impl IntoIterator<Item = SocketAddr>) -> Vec<SocketAddr> {
    let (mut v4, v6): (Vec<_>, Vec<_>) = addrs.into_iter().partition(SocketAddr::is_ipv4);
    v4.extend(v6);
    v4
}

/// Format an IP for display, unwrapping IPv4-mapped IPv6 addresses
/// (`::ffff:a.b.c.d`) to plain dotted IPv4.
pub fn ip_string(ip: IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => v4.to_string(),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => v4.to_string(),
            None => v6.to_string(),
        },
    }
}

/// Endpoint metadata of an established connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointInfo {
    pub remote: SocketAddr,
    pub local: SocketAddr,
}

impl EndpointInfo {
    /// Query both ends of a connected stream.
    pub fn from_stream(stream: &TcpStream) -> std::io::Result<Self> {
        Ok(EndpointInfo {
            remote: stream.peer_addr()?,
            local: stream.local_addr()?,
        })
    }

    /// Remote address as text
    pub fn remote_ip(&self) -> String {
        ip_string(self.remote.ip())
    }

    pub fn remote_port(&self) -> u16 {
        self.remote.port()
    }

    pub fn local_port(&self) -> u16 {
        self.local.port()
    }
}
