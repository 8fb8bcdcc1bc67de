use std::sync::Arc;

use wrpc_connection::ConnectionPool;
use wrpc_endpoint::Endpoint;

/// An endpoint's alive/dead status, as tracked by the manager (not the
/// endpoint value itself, which is immutable).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointStatus {
    Normal,
    Dead,
}

/// What the manager keeps per candidate endpoint. A DEAD endpoint never has
/// a pool; POOLED endpoints have one whenever they are NORMAL.
pub(crate) struct EndpointWrapper {
    pub status: EndpointStatus,
    pub consecutive_errors: i32,
    pub pool: Option<Arc<ConnectionPool>>,
}

impl EndpointWrapper {
    pub fn new(endpoint: Endpoint, pooled: bool, max_connection_per_endpoint: usize) -> Self {
        Self {
            status: EndpointStatus::Normal,
            consecutive_errors: 0,
            pool: pooled.then(|| Arc::new(ConnectionPool::new(endpoint, max_connection_per_endpoint))),
        }
    }
}
