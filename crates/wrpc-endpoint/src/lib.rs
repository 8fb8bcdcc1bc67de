//! The `Endpoint` value type: an IPv4 or IPv6 address plus a port, immutable once
//! constructed, stably hashable and totally ordered so it can key a `HashMap` or
//! `BTreeMap`.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// Address+port pair identifying one remote socket. Construction is the only way
/// to set the fields; there are no setters, since an endpoint cannot change
/// once created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Endpoint {
    addr: IpAddr,
    port: u16,
}

impl Endpoint {
    pub fn new(addr: IpAddr, port: u16) -> Self {
        Self { addr, port }
    }

    pub fn addr(&self) -> IpAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn to_socket_addr(&self) -> std::net::SocketAddr {
        std::net::SocketAddr::new(self.addr, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.addr {
            IpAddr::V4(_) => write!(f, "{}:{}", self.addr, self.port),
            IpAddr::V6(_) => write!(f, "[{}]:{}", self.addr, self.port),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ParseEndpointError {
    #[error("endpoint '{0}' is missing a ':port' suffix")]
    MissingPort(String),
    #[error("endpoint '{0}' has an invalid port")]
    InvalidPort(String),
    #[error("endpoint '{0}' has an invalid host")]
    InvalidHost(String),
}

impl FromStr for Endpoint {
    type Err = ParseEndpointError;

    /// Parses `host:port` (IPv4) or `[host]:port` (IPv6 literal).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port_str) = if let Some(rest) = s.strip_prefix('[') {
            let mut parts = rest.splitn(2, "]:");
            let host = parts
                .next()
                .ok_or_else(|| ParseEndpointError::MissingPort(s.to_string()))?;
            let port = parts
                .next()
                .ok_or_else(|| ParseEndpointError::MissingPort(s.to_string()))?;
            (host, port)
        } else {
            let idx = s
                .rfind(':')
                .ok_or_else(|| ParseEndpointError::MissingPort(s.to_string()))?;
            (&s[..idx], &s[idx + 1..])
        };

        let port: u16 = port_str
            .parse()
            .map_err(|_| ParseEndpointError::InvalidPort(s.to_string()))?;
        let addr: IpAddr = host
            .parse()
            .map_err(|_| ParseEndpointError::InvalidHost(s.to_string()))?;
        Ok(Endpoint::new(addr, port))
    }
}

/// A set of endpoints, as produced by a naming-service refresh or a channel's
/// direct `init(endpoints, ...)` call.
pub type EndpointSet = std::collections::HashSet<Endpoint>;
