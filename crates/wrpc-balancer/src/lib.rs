//! Load-balancer strategies: pick an endpoint out of a candidate set that is
//! mutated only through a small set of watcher callbacks (add/remove/update-
//! all/set-alive/set-death), one mutex per strategy instance. The same
//! [`LoadBalancer`] trait is used both as the channel's primary selector and,
//! when configured, as a distinct retry policy (`ChannelOptions::retry_policy`).
//!
//! - [`roundrobin::RoundRobinBalancer`] — atomic index, alive-list-then-dead-
//!   list-else-`NO_CHOOSABLE`.
//! - [`hashmod::HashModBalancer`] — `hash_code + retry_count` modulo a combined
//!   candidate vector, dead-probing only on retry.
//! - [`consistenthash::ConsistentHashBalancer`] — sorted hash ring, wraparound
//!   lookup, dead-probing only on retry.

mod balancer;
mod consistenthash;
mod context;
mod hashmod;
mod roundrobin;

pub use balancer::{is_registered, new_instance, register, LoadBalancer, LoadBalancerFactory};
pub use consistenthash::ConsistentHashBalancer;
pub use context::LoadBalancerContext;
pub use hashmod::HashModBalancer;
pub use roundrobin::RoundRobinBalancer;
