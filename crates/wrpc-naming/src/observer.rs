//! Fan-out of endpoint-set updates from a naming service to whoever is
//! watching (normally an endpoint manager). Observers are held weakly and
//! keyed by an opaque token returned from `add_observer`, rather than by
//! pointer identity — tokens survive a weak reference going dead, so
//! `remove_observer` still works even after the observer itself has been
//! dropped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, Weak};

use wrpc_endpoint::EndpointSet;

/// Receives the full, deduplicated endpoint set every time a naming service
/// refreshes.
pub trait EndPointUpdateObserver: Send + Sync {
    fn on_update(&self, endpoints: &EndpointSet);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverToken(usize);

#[derive(Default)]
pub struct Observable {
    next_token: AtomicUsize,
    observers: Mutex<HashMap<usize, Weak<dyn EndPointUpdateObserver>>>,
}

impl Observable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_observer(&self, observer: Weak<dyn EndPointUpdateObserver>) -> ObserverToken {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        self.observers.lock().unwrap().insert(token, observer);
        ObserverToken(token)
    }

    pub fn remove_observer(&self, token: ObserverToken) -> bool {
        self.observers.lock().unwrap().remove(&token.0).is_some()
    }

    /// Notifies every live observer, pruning any whose `Weak` has since died.
    pub fn notify_update(&self, endpoints: &EndpointSet) {
        let mut dead = Vec::new();
        {
            let observers = self.observers.lock().unwrap();
            for (token, weak) in observers.iter() {
                match weak.upgrade() {
                    Some(observer) => observer.on_update(endpoints),
                    None => dead.push(*token),
                }
            }
        }
        if !dead.is_empty() {
            let mut observers = self.observers.lock().unwrap();
            for token in dead {
                observers.remove(&token);
            }
        }
    }
}
