//! Per-channel candidate-endpoint bookkeeping: alive/dead transitions,
//! periodic health checks against dead endpoints, and per-endpoint
//! connection pooling for [`wrpc_core::ConnectionType::Pooled`] channels.
//!
//! An [`EndpointManager`] owns exactly the network-facing half of what a
//! channel needs per request: given an [`wrpc_endpoint::Endpoint`] chosen by
//! a load balancer, hand back a connection to it, and feed that same load
//! balancer alive/dead and add/remove notifications as the candidate set or
//! its health changes. It has no opinion on which endpoint to pick — that is
//! [`EndpointStatusObserver`]'s other side, `wrpc-balancer`.

mod config;
mod manager;
mod observer;
mod wrapper;

pub use config::EndpointManagerConfig;
pub use manager::EndpointManager;
pub use observer::EndpointStatusObserver;
pub use wrapper::EndpointStatus;
