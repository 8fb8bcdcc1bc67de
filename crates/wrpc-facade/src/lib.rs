//! The public surface of the RPC framework: a single dependency that
//! re-exports `Channel`, `Session`, and the configuration/error/message types
//! needed to issue a call, without requiring callers to depend on each
//! `wrpc-*` crate individually.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::collections::HashSet;
//! use wrpc::{Channel, ChannelOptions, RpcOptions, Session};
//!
//! let mut endpoints = HashSet::new();
//! endpoints.insert("127.0.0.1:6379".parse().unwrap());
//!
//! let options = ChannelOptions::builder()
//!     .protocol("redis")
//!     .load_balancer("rr")
//!     .total_timeout(Some(std::time::Duration::from_millis(200)))
//!     .build();
//! let channel = Channel::with_endpoints(endpoints, options).unwrap();
//!
//! let mut request = wrpc::redis::RedisRequest::new();
//! request.set_command("PING", Vec::<String>::new());
//! let session = Session::new(channel, Box::new(request), RpcOptions::default());
//! let code = session.join();
//! assert!(code.is_success() || !code.is_success());
//! ```
//!
//! # Layout
//!
//! - [`Channel`] owns one logical downstream service: naming resolution,
//!   endpoint health, load balancing, and connection pooling.
//! - [`Session`] owns one request/response round trip against a `Channel`,
//!   including retries and a racing backup attempt.
//! - [`ChannelOptions`]/[`ChannelOptionsBuilder`] configure a channel;
//!   [`RpcOptions`] configures one call.
//! - [`Code`]/[`WrpcError`] are the return-code taxonomy shared by every
//!   layer.
//! - [`redis`], [`http`], and [`nshead`] are the bundled wire-protocol
//!   strategies; a caller only needs the module matching the protocol string
//!   passed to [`ChannelOptionsBuilder::protocol`].
//!
//! Enable the `tracing` feature for structured logging and `metrics` for
//! Prometheus-style counters/histograms, both propagated into every
//! constituent crate. `dns-resolver` switches the `http://` naming scheme
//! from blocking `std` resolution to `hickory-resolver`.

pub use wrpc_channel::Channel;
pub use wrpc_core::{
    ChannelOptions, ChannelOptionsBuilder, Code, ConnectionType, EventListener, FeedbackInfo,
    RpcOptions, WrpcError,
};
pub use wrpc_endpoint::{Endpoint, EndpointSet, ParseEndpointError};
pub use wrpc_session::{lookup_session, Session, SessionStatus};

pub use wrpc_message::{
    is_request_registered, is_response_registered, new_request, new_response, IMessage, IRequest,
    IResponse,
};

/// Redis RESP request/response types, registered under the `"redis"` protocol name.
pub use wrpc_message::redis;
/// HTTP/1.x request/response types, registered under the `"http"` protocol name.
pub use wrpc_message::http;
/// `nshead`-framed request/response types, registered under the `"nshead"` protocol name.
pub use wrpc_message::nshead;

/// Naming-service strategies (`list://`, `file://`, `http://`, `directory://`)
/// and the registry used to look one up by scheme.
pub mod naming {
    pub use wrpc_naming::{is_registered, new_instance, register, NamingService, NamingServiceFactory};
}

/// Load-balancer/retry-policy strategies and the registry used to look one up
/// by name, for callers registering a custom strategy before building a
/// [`Channel`](crate::Channel).
pub mod balancer {
    pub use wrpc_balancer::{
        is_registered, new_instance, register, LoadBalancer, LoadBalancerContext,
        LoadBalancerFactory,
    };
}
