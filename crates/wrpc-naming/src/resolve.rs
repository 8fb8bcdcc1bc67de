//! Shared `host[:port]` parsing used by every strategy that reads `host:port`
//! pairs out of a flat text source (`list`, `file`). Hostnames are resolved
//! with the blocking std resolver; IP literals parse straight through.

use std::net::{IpAddr, ToSocketAddrs};

/// Splits `"host:port"`, resolves `host` (as a literal IP or via DNS), and
/// validates the port. Returns `None` rather than propagating an error: a
/// malformed line in a list/file source is skipped, not fatal to the rest of
/// the refresh.
pub(crate) fn resolve_host_port(entry: &str) -> Option<(IpAddr, u16)> {
    let (host, port_str) = entry.rsplit_once(':')?;
    let port: u16 = port_str.parse().ok().filter(|p| *p != 0)?;
    if host.is_empty() {
        return None;
    }
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Some((ip, port));
    }
    let addr = (host, 0u16).to_socket_addrs().ok()?.next()?;
    Some((addr.ip(), port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ip_literal() {
        let (ip, port) = resolve_host_port("10.0.0.1:1234").unwrap();
        assert_eq!(ip.to_string(), "10.0.0.1");
        assert_eq!(port, 1234);
    }

    #[test]
    fn rejects_missing_port_and_zero_port() {
        assert!(resolve_host_port("10.0.0.1").is_none());
        assert!(resolve_host_port("10.0.0.1:0").is_none());
    }

    #[test]
    fn rejects_non_numeric_port() {
        assert!(resolve_host_port("10.0.0.1:abc").is_none());
    }
}
