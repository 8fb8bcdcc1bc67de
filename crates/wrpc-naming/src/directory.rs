//! `directory://service-name` — resolves a logical service name against an
//! external service-directory daemon (an internal equivalent to Baidu's BNS)
//! under a configured timeout. The wire protocol such a daemon speaks is
//! deployment-specific and out of scope here; this strategy is a thin shell
//! around a pluggable [`DirectoryResolver`] that the caller wires in, rather
//! than a hardcoded client for one specific directory service.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use wrpc_core::{Code, Result, WrpcError};
use wrpc_endpoint::EndpointSet;

use crate::observer::{EndPointUpdateObserver, ObserverToken, Observable};
use crate::service::NamingService;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Queries an external service directory for the endpoint set backing a
/// logical service name.
pub trait DirectoryResolver: Send + Sync {
    fn resolve(&self, service_name: &str, timeout: Duration) -> Result<EndpointSet>;
}

pub struct DirectoryNamingService {
    protocol: String,
    observable: Observable,
    resolver: Mutex<Option<Arc<dyn DirectoryResolver>>>,
    timeout: Mutex<Duration>,
}

impl DirectoryNamingService {
    pub fn new(protocol: &str) -> Self {
        Self {
            protocol: protocol.to_string(),
            observable: Observable::new(),
            resolver: Mutex::new(None),
            timeout: Mutex::new(DEFAULT_TIMEOUT),
        }
    }

    /// Plugs in the client for whatever directory service this deployment
    /// actually talks to. Until this is called, `refresh` fails with
    /// [`Code::NotSupported`].
    pub fn set_resolver(&self, resolver: Arc<dyn DirectoryResolver>) {
        *self.resolver.lock().unwrap() = Some(resolver);
    }

    pub fn set_timeout(&self, timeout: Duration) {
        *self.timeout.lock().unwrap() = timeout;
    }
}

impl NamingService for DirectoryNamingService {
    fn protocol(&self) -> &str {
        &self.protocol
    }

    fn refresh(&self, address: &str) -> Result<()> {
        let resolver = self
            .resolver
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| WrpcError::new(Code::NotSupported))?;
        let timeout = *self.timeout.lock().unwrap();
        let endpoints = resolver.resolve(address, timeout)?;
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
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Recorder(AtomicUsize);

    impl EndPointUpdateObserver for Recorder {
        fn on_update(&self, endpoints: &EndpointSet) {
            self.0.store(endpoints.len(), Ordering::SeqCst);
        }
    }

    struct StaticResolver;

    impl DirectoryResolver for StaticResolver {
        fn resolve(&self, _service_name: &str, _timeout: Duration) -> Result<EndpointSet> {
            let mut set = EndpointSet::new();
            set.insert("10.0.0.1:9000".parse().unwrap());
            set.insert("10.0.0.2:9000".parse().unwrap());
            Ok(set)
        }
    }

    #[test]
    fn refresh_without_a_resolver_is_not_supported() {
        let svc = DirectoryNamingService::new("directory");
        let err = svc.refresh("my-service").unwrap_err();
        assert_eq!(err.code, Code::NotSupported);
    }

    #[test]
    fn refresh_delegates_to_the_configured_resolver() {
        let svc = DirectoryNamingService::new("directory");
        svc.set_resolver(Arc::new(StaticResolver));
        let recorder = Arc::new(Recorder(AtomicUsize::new(0)));
        svc.add_observer(Arc::downgrade(&recorder) as Weak<dyn EndPointUpdateObserver>);

        svc.refresh("my-service").unwrap();
        assert_eq!(recorder.0.load(Ordering::SeqCst), 2);
    }
}
