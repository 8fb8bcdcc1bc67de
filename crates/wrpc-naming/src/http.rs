//! `http://domain[:port]` — resolves `domain` to every IPv4 address it owns,
//! pairing each with `port` (default `80`). Despite the name this has
//! nothing to do with the HTTP protocol strategy in `wrpc-message`; "http" is
//! just the scheme name this DNS-backed naming service uses.

use std::net::{IpAddr, ToSocketAddrs};
use std::sync::Weak;

use wrpc_core::{Code, Result, WrpcError};
use wrpc_endpoint::EndpointSet;

use crate::observer::{EndPointUpdateObserver, ObserverToken, Observable};
use crate::service::NamingService;

const DEFAULT_PORT: u16 = 80;

pub struct HttpNamingService {
    protocol: String,
    observable: Observable,
}

impl HttpNamingService {
    pub fn new(protocol: &str) -> Self {
        Self {
            protocol: protocol.to_string(),
            observable: Observable::new(),
        }
    }
}

fn resolve_ipv4(domain: &str) -> Result<Vec<IpAddr>> {
    #[cfg(feature = "dns-resolver")]
    {
        resolve_ipv4_via_hickory(domain)
    }
    #[cfg(not(feature = "dns-resolver"))]
    {
        resolve_ipv4_via_std(domain)
    }
}

#[allow(dead_code)]
fn resolve_ipv4_via_std(domain: &str) -> Result<Vec<IpAddr>> {
    let addrs = (domain, 0u16)
        .to_socket_addrs()
        .map_err(|e| WrpcError::with_detail(Code::ConnectFail, e.to_string()))?;
    Ok(addrs
        .map(|a| a.ip())
        .filter(|ip| ip.is_ipv4())
        .collect())
}

#[cfg(feature = "dns-resolver")]
fn resolve_ipv4_via_hickory(domain: &str) -> Result<Vec<IpAddr>> {
    use hickory_resolver::config::{ResolverConfig, ResolverOpts};
    use hickory_resolver::TokioAsyncResolver;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| WrpcError::with_detail(Code::InternalError, e.to_string()))?;

    runtime.block_on(async {
        let resolver =
            TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default());
        let response = resolver
            .ipv4_lookup(domain)
            .await
            .map_err(|e| WrpcError::with_detail(Code::ConnectFail, e.to_string()))?;
        Ok(response.iter().map(|ip| IpAddr::V4(ip.0)).collect())
    })
}

impl NamingService for HttpNamingService {
    fn protocol(&self) -> &str {
        &self.protocol
    }

    fn refresh(&self, address: &str) -> Result<()> {
        let (domain, port) = match address.rsplit_once(':') {
            Some((domain, port_str)) => {
                let port: u16 = port_str
                    .parse()
                    .map_err(|_| WrpcError::new(Code::InvalidArgument))?;
                (domain, port)
            }
            None => (address, DEFAULT_PORT),
        };

        let resolved = resolve_ipv4(domain)?;
        if resolved.is_empty() {
            return Err(WrpcError::with_detail(
                Code::ConnectFail,
                format!("resolved empty endpoint list for {domain}"),
            ));
        }

        let endpoints: EndpointSet = resolved
            .into_iter()
            .map(|ip| wrpc_endpoint::Endpoint::new(ip, port))
            .collect();
        self.observable.notify_update(&endpoints);
        Ok(())
    }

    fn add_observer(&self, observer: Weak<dyn EndPointUpdateObserver>) -> ObserverToken {
        self.observable.add_observer(observer)
    }

    fn remove_observer(&self, token: ObserverToken) -> bool {
        self.observable.remove_observer(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_numeric_port_suffix() {
        let svc = HttpNamingService::new("http");
        let err = svc.refresh("localhost:not-a-port").unwrap_err();
        assert_eq!(err.code, Code::InvalidArgument);
    }

    #[test]
    fn resolves_localhost_to_loopback() {
        let svc = HttpNamingService::new("http");
        // localhost always resolves without a real network, on any sane host.
        assert!(svc.refresh("localhost:9000").is_ok());
    }
}
