//! `list://ip:port,ip:port,...` — a fixed, comma-separated endpoint list
//! passed directly in the address string. Caches the last address seen so a
//! refresh with unchanged input is a no-op.

use std::sync::{Mutex, Weak};

use wrpc_core::Result;
use wrpc_endpoint::EndpointSet;

use crate::observer::{EndPointUpdateObserver, ObserverToken, Observable};
use crate::resolve::resolve_host_port;
use crate::service::NamingService;

pub struct ListNamingService {
    protocol: String,
    observable: Observable,
    last_address: Mutex<String>,
}

impl ListNamingService {
    pub fn new(protocol: &str) -> Self {
        Self {
            protocol: protocol.to_string(),
            observable: Observable::new(),
            last_address: Mutex::new(String::new()),
        }
    }
}

impl NamingService for ListNamingService {
    fn protocol(&self) -> &str {
        &self.protocol
    }

    fn refresh(&self, address: &str) -> Result<()> {
        {
            let mut last = self.last_address.lock().unwrap();
            if *last == address {
                return Ok(());
            }
            *last = address.to_string();
        }

        let mut endpoints = EndpointSet::new();
        for entry in address.split(',') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            if let Some((ip, port)) = resolve_host_port(entry) {
                endpoints.insert(wrpc_endpoint::Endpoint::new(ip, port));
            } else {
                #[cfg(feature = "tracing")]
                tracing::warn!(entry, "list naming service: invalid host:port, skipping");
            }
        }
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
