use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, Weak};

use wrpc_connection::{Connection, ConnectionPool};
use wrpc_core::{ConnectionType, Result};
use wrpc_endpoint::{Endpoint, EndpointSet};

use crate::config::EndpointManagerConfig;
use crate::observer::EndpointStatusObserver;
use crate::wrapper::{EndpointStatus, EndpointWrapper};

/// Keeps the candidate set for one channel: which endpoints exist, whether
/// each is NORMAL or DEAD, and — for POOLED channels — each NORMAL
/// endpoint's idle-connection pool.
///
/// Status is mutated under one internal lock, but every network operation
/// (connect, health-check probe) and every observer notification happens
/// outside that lock: only the bookkeeping update itself is synchronized.
pub struct EndpointManager {
    config: EndpointManagerConfig,
    endpoints: Mutex<HashMap<Endpoint, EndpointWrapper>>,
    observers: Mutex<Vec<Weak<dyn EndpointStatusObserver>>>,
}

impl EndpointManager {
    pub fn new(config: EndpointManagerConfig) -> Self {
        Self {
            config,
            endpoints: Mutex::new(HashMap::new()),
            observers: Mutex::new(Vec::new()),
        }
    }

    pub fn add_observer(&self, observer: Weak<dyn EndpointStatusObserver>) {
        self.observers.lock().unwrap().push(observer);
    }

    fn with_observers(&self, f: impl Fn(&dyn EndpointStatusObserver)) {
        let mut dead = Vec::new();
        {
            let observers = self.observers.lock().unwrap();
            for (index, weak) in observers.iter().enumerate() {
                match weak.upgrade() {
                    Some(observer) => f(observer.as_ref()),
                    None => dead.push(index),
                }
            }
        }
        if !dead.is_empty() {
            let mut observers = self.observers.lock().unwrap();
            for index in dead.into_iter().rev() {
                observers.remove(index);
            }
        }
    }

    pub fn endpoint_count(&self) -> usize {
        self.endpoints.lock().unwrap().len()
    }

    pub fn status_of(&self, endpoint: &Endpoint) -> Option<EndpointStatus> {
        self.endpoints.lock().unwrap().get(endpoint).map(|w| w.status)
    }

    /// Diffs `set` against the current candidate set, applies additions and
    /// removals, then notifies observers outside the lock. A combined churn
    /// of at most two endpoints is reported per-endpoint (`on_add_one`/
    /// `on_remove_one`); a bigger change is reported as one `on_update_all`.
    pub fn on_update(&self, set: &EndpointSet) {
        let pooled = self.config.connection_type == ConnectionType::Pooled;
        let (added, removed, full_set) = {
            let mut endpoints = self.endpoints.lock().unwrap();
            let current: HashSet<Endpoint> = endpoints.keys().copied().collect();
            let added: Vec<Endpoint> = set.difference(&current).copied().collect();
            let removed: Vec<Endpoint> = current.difference(set).copied().collect();
            for endpoint in &added {
                endpoints.insert(
                    *endpoint,
                    EndpointWrapper::new(*endpoint, pooled, self.config.max_connection_per_endpoint),
                );
            }
            for endpoint in &removed {
                endpoints.remove(endpoint);
            }
            let full_set: Vec<Endpoint> = endpoints.keys().copied().collect();
            (added, removed, full_set)
        };

        if added.is_empty() && removed.is_empty() {
            return;
        }
        if added.len() + removed.len() <= 2 {
            for endpoint in added {
                self.with_observers(|o| o.on_add_one(endpoint));
            }
            for endpoint in removed {
                self.with_observers(|o| o.on_remove_one(endpoint));
            }
        } else {
            self.with_observers(|o| o.on_update_all(&full_set));
        }
    }

    /// Attempts a bare connect to every currently-DEAD endpoint. Connects
    /// happen outside the lock; only a successful probe's status flip is
    /// synchronized.
    pub fn health_check(&self, connect_timeout_ms: i32) {
        let dead_endpoints: Vec<Endpoint> = {
            let endpoints = self.endpoints.lock().unwrap();
            endpoints
                .iter()
                .filter(|(_, wrapper)| wrapper.status == EndpointStatus::Dead)
                .map(|(endpoint, _)| *endpoint)
                .collect()
        };

        for endpoint in dead_endpoints {
            if Connection::connect(endpoint, connect_timeout_ms).is_err() {
                continue;
            }
            // the probe connection is only used to prove reachability; the
            // pool (if any) is recreated fresh rather than seeded from it.
            let revived = {
                let mut endpoints = self.endpoints.lock().unwrap();
                match endpoints.get_mut(&endpoint) {
                    Some(wrapper) if wrapper.status == EndpointStatus::Dead => {
                        wrapper.status = EndpointStatus::Normal;
                        wrapper.consecutive_errors = 0;
                        if self.config.connection_type == ConnectionType::Pooled {
                            wrapper.pool = Some(Arc::new(ConnectionPool::new(
                                endpoint,
                                self.config.max_connection_per_endpoint,
                            )));
                        }
                        true
                    }
                    _ => false,
                }
            };
            if revived {
                self.with_observers(|o| o.on_set_alive(endpoint));
            }
        }
    }

    /// Fetches a connection for `endpoint`. An endpoint not in the candidate
    /// set is connected to directly with no pooling or error bookkeeping.
    pub fn fetch_connection(&self, endpoint: Endpoint, connect_timeout_ms: i32) -> Result<Connection> {
        let pool = {
            let endpoints = self.endpoints.lock().unwrap();
            match endpoints.get(&endpoint) {
                None => return Connection::connect(endpoint, connect_timeout_ms),
                Some(wrapper) => wrapper.pool.clone(),
            }
        };

        let outcome = match &pool {
            Some(pool) => pool.fetch(connect_timeout_ms),
            None => Connection::connect(endpoint, connect_timeout_ms),
        };

        match outcome {
            Ok(conn) => {
                let became_alive = {
                    let mut endpoints = self.endpoints.lock().unwrap();
                    match endpoints.get_mut(&endpoint) {
                        Some(wrapper) => {
                            wrapper.consecutive_errors = 0;
                            if wrapper.status == EndpointStatus::Dead {
                                wrapper.status = EndpointStatus::Normal;
                                if self.config.connection_type == ConnectionType::Pooled {
                                    wrapper.pool = Some(Arc::new(ConnectionPool::new(
                                        endpoint,
                                        self.config.max_connection_per_endpoint,
                                    )));
                                }
                                true
                            } else {
                                false
                            }
                        }
                        None => false,
                    }
                };
                if became_alive {
                    self.with_observers(|o| o.on_set_alive(endpoint));
                }
                Ok(conn)
            }
            Err(err) => {
                let became_dead = {
                    let mut endpoints = self.endpoints.lock().unwrap();
                    match endpoints.get_mut(&endpoint) {
                        Some(wrapper) => {
                            wrapper.consecutive_errors += 1;
                            if self.config.max_error_count_per_endpoint > 0
                                && wrapper.consecutive_errors >= self.config.max_error_count_per_endpoint
                                && wrapper.status == EndpointStatus::Normal
                            {
                                wrapper.status = EndpointStatus::Dead;
                                wrapper.pool = None;
                                true
                            } else {
                                false
                            }
                        }
                        None => false,
                    }
                };
                if became_dead {
                    self.with_observers(|o| o.on_set_death(endpoint));
                }
                Err(err)
            }
        }
    }

    /// Closes `conn` directly if `close` is set, the endpoint is unknown, or
    /// the endpoint is DEAD; otherwise returns it to the endpoint's pool (a
    /// SHORT-type endpoint has no pool, so it is always closed).
    pub fn giveback_connection(&self, endpoint: Endpoint, mut conn: Connection, close: bool) {
        if close {
            conn.close();
            return;
        }
        let target = {
            let endpoints = self.endpoints.lock().unwrap();
            endpoints
                .get(&endpoint)
                .map(|wrapper| (wrapper.status, wrapper.pool.clone()))
        };
        match target {
            None => conn.close(),
            Some((EndpointStatus::Dead, _)) => conn.close(),
            Some((EndpointStatus::Normal, Some(pool))) => pool.give_back(conn, false),
            Some((EndpointStatus::Normal, None)) => conn.close(),
        }
    }
}

/// Lets the manager sit directly behind a naming service: each refresh's
/// full endpoint set becomes the new candidate set via [`on_update`].
impl wrpc_naming::EndPointUpdateObserver for EndpointManager {
    fn on_update(&self, endpoints: &EndpointSet) {
        EndpointManager::on_update(self, endpoints)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct Recorder {
        added: Mutex<Vec<Endpoint>>,
        removed: Mutex<Vec<Endpoint>>,
        full_updates: AtomicU32,
        alive: Mutex<Vec<Endpoint>>,
        dead: Mutex<Vec<Endpoint>>,
    }

    impl EndpointStatusObserver for Recorder {
        fn on_add_one(&self, endpoint: Endpoint) {
            self.added.lock().unwrap().push(endpoint);
        }
        fn on_remove_one(&self, endpoint: Endpoint) {
            self.removed.lock().unwrap().push(endpoint);
        }
        fn on_update_all(&self, _endpoints: &[Endpoint]) {
            self.full_updates.fetch_add(1, Ordering::SeqCst);
        }
        fn on_set_alive(&self, endpoint: Endpoint) {
            self.alive.lock().unwrap().push(endpoint);
        }
        fn on_set_death(&self, endpoint: Endpoint) {
            self.dead.lock().unwrap().push(endpoint);
        }
    }

    fn listening_endpoint() -> (TcpListener, Endpoint) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        (listener, Endpoint::new(addr.ip(), addr.port()))
    }

    #[test]
    fn small_churn_notifies_per_endpoint() {
        let mgr = EndpointManager::new(EndpointManagerConfig::default());
        let recorder = Arc::new(Recorder::default());
        mgr.add_observer(Arc::downgrade(&recorder) as Weak<dyn EndpointStatusObserver>);

        let (_l1, e1) = listening_endpoint();
        let mut set = EndpointSet::new();
        set.insert(e1);
        mgr.on_update(&set);

        assert_eq!(*recorder.added.lock().unwrap(), vec![e1]);
        assert_eq!(recorder.full_updates.load(Ordering::SeqCst), 0);
        assert_eq!(mgr.endpoint_count(), 1);
    }

    #[test]
    fn large_churn_notifies_a_full_update() {
        let mgr = EndpointManager::new(EndpointManagerConfig::default());
        let recorder = Arc::new(Recorder::default());
        mgr.add_observer(Arc::downgrade(&recorder) as Weak<dyn EndpointStatusObserver>);

        let mut set = EndpointSet::new();
        for port in 1..=3 {
            set.insert(Endpoint::new(std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST), port));
        }
        mgr.on_update(&set);
        assert_eq!(recorder.full_updates.load(Ordering::SeqCst), 1);
        assert!(recorder.added.lock().unwrap().is_empty());
    }

    #[test]
    fn fetch_connection_for_an_unregistered_endpoint_bypasses_bookkeeping() {
        let mgr = EndpointManager::new(EndpointManagerConfig::default());
        let (_listener, endpoint) = listening_endpoint();
        let conn = mgr.fetch_connection(endpoint, 500).unwrap();
        assert!(conn.is_connected());
        assert_eq!(mgr.endpoint_count(), 0);
    }

    #[test]
    fn repeated_failures_flip_an_endpoint_to_dead() {
        let mgr = EndpointManager::new(EndpointManagerConfig {
            max_error_count_per_endpoint: 2,
            ..EndpointManagerConfig::default()
        });
        let recorder = Arc::new(Recorder::default());
        mgr.add_observer(Arc::downgrade(&recorder) as Weak<dyn EndpointStatusObserver>);

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener); // port now refuses connections
        let endpoint = Endpoint::new(addr.ip(), addr.port());

        let mut set = EndpointSet::new();
        set.insert(endpoint);
        mgr.on_update(&set);

        assert!(mgr.fetch_connection(endpoint, 200).is_err());
        assert_eq!(mgr.status_of(&endpoint), Some(EndpointStatus::Normal));
        assert!(mgr.fetch_connection(endpoint, 200).is_err());
        assert_eq!(mgr.status_of(&endpoint), Some(EndpointStatus::Dead));
        assert_eq!(*recorder.dead.lock().unwrap(), vec![endpoint]);
    }

    #[test]
    fn health_check_revives_a_dead_endpoint() {
        let mgr = EndpointManager::new(EndpointManagerConfig {
            max_error_count_per_endpoint: 1,
            connection_type: ConnectionType::Pooled,
            ..EndpointManagerConfig::default()
        });
        let recorder = Arc::new(Recorder::default());
        mgr.add_observer(Arc::downgrade(&recorder) as Weak<dyn EndpointStatusObserver>);

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let endpoint = Endpoint::new(addr.ip(), addr.port());
        drop(listener);

        let mut set = EndpointSet::new();
        set.insert(endpoint);
        mgr.on_update(&set);
        assert!(mgr.fetch_connection(endpoint, 200).is_err());
        assert_eq!(mgr.status_of(&endpoint), Some(EndpointStatus::Dead));

        // now start a server on that exact port before health-checking
        let listener = TcpListener::bind(addr).unwrap();
        let accept = std::thread::spawn(move || listener.accept());
        mgr.health_check(500);
        assert_eq!(mgr.status_of(&endpoint), Some(EndpointStatus::Normal));
        assert_eq!(*recorder.alive.lock().unwrap(), vec![endpoint]);
        let _ = accept.join();
    }

    #[test]
    fn giveback_closes_when_endpoint_is_dead_or_unregistered() {
        let mgr = EndpointManager::new(EndpointManagerConfig {
            connection_type: ConnectionType::Pooled,
            max_connection_per_endpoint: 2,
            ..EndpointManagerConfig::default()
        });
        let (_listener, endpoint) = listening_endpoint();
        let conn = Connection::connect(endpoint, 500).unwrap();
        // endpoint not registered: giveback just closes, no panic, no pool created
        mgr.giveback_connection(endpoint, conn, false);
        assert_eq!(mgr.endpoint_count(), 0);
    }

    #[test]
    fn giveback_returns_to_pool_for_a_normal_pooled_endpoint() {
        let mgr = EndpointManager::new(EndpointManagerConfig {
            connection_type: ConnectionType::Pooled,
            max_connection_per_endpoint: 2,
            ..EndpointManagerConfig::default()
        });
        let (_listener, endpoint) = listening_endpoint();
        let mut set = EndpointSet::new();
        set.insert(endpoint);
        mgr.on_update(&set);

        let conn = mgr.fetch_connection(endpoint, 500).unwrap();
        mgr.giveback_connection(endpoint, conn, false);
        let conn2 = mgr.fetch_connection(endpoint, 500).unwrap();
        mgr.giveback_connection(endpoint, conn2, false);
    }
}
