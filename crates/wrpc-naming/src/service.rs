//! The naming service contract and a name-indexed registry of strategies:
//! construction takes the protocol name the service was created for, and the
//! registry maps a scheme string (`list`, `file`, `http`, `directory`) to a
//! constructor.

use std::collections::HashMap;
use std::sync::{OnceLock, RwLock, Weak};

use wrpc_core::Result;

use crate::observer::{EndPointUpdateObserver, ObserverToken};

/// Periodically (or on demand) resolves an address string into an endpoint
/// set and notifies observers of the result.
pub trait NamingService: Send + Sync {
    fn protocol(&self) -> &str;

    /// Resolves `address` and notifies observers with the result. Naming
    /// services that cache the last successfully resolved address (e.g.
    /// [`crate::list::ListNamingService`]) may skip the notification when
    /// nothing changed.
    fn refresh(&self, address: &str) -> Result<()>;

    fn add_observer(&self, observer: Weak<dyn EndPointUpdateObserver>) -> ObserverToken;

    fn remove_observer(&self, token: ObserverToken) -> bool;
}

pub type NamingServiceFactory = fn(protocol: &str) -> Box<dyn NamingService>;

fn registry() -> &'static RwLock<HashMap<&'static str, NamingServiceFactory>> {
    static REGISTRY: OnceLock<RwLock<HashMap<&'static str, NamingServiceFactory>>> =
        OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut map: HashMap<&'static str, NamingServiceFactory> = HashMap::new();
        map.insert("list", |p| Box::new(crate::list::ListNamingService::new(p)));
        map.insert("file", |p| Box::new(crate::file::FileNamingService::new(p)));
        map.insert("http", |p| Box::new(crate::http::HttpNamingService::new(p)));
        map.insert("directory", |p| {
            Box::new(crate::directory::DirectoryNamingService::new(p))
        });
        RwLock::new(map)
    })
}

/// Registers a naming service strategy under `scheme`, returning `false` if
/// the scheme was already taken.
pub fn register(scheme: &'static str, factory: NamingServiceFactory) -> bool {
    registry().write().unwrap().insert(scheme, factory).is_none()
}

pub fn is_registered(scheme: &str) -> bool {
    registry().read().unwrap().contains_key(scheme)
}

/// Builds a naming service for `scheme`, or `None` if nothing is registered
/// under it.
pub fn new_instance(scheme: &str, protocol: &str) -> Option<Box<dyn NamingService>> {
    let factory = *registry().read().unwrap().get(scheme)?;
    Some(factory(protocol))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_schemes_are_preregistered() {
        for scheme in ["list", "file", "http", "directory"] {
            assert!(is_registered(scheme));
            assert!(new_instance(scheme, "echo").is_some());
        }
    }

    #[test]
    fn unknown_scheme_yields_none() {
        assert!(new_instance("zookeeper", "echo").is_none());
    }
}
