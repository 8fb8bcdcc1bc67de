//! `Channel`: the long-lived object representing one logical downstream
//! service. On construction it wires a naming service's refresh output into
//! an endpoint manager, the endpoint manager's alive/dead notifications into
//! one or two load balancers (the primary selector, and — if configured — a
//! distinct retry policy), and starts the two periodic background tasks
//! (`update_end_points_interval_ms`, `health_check_interval_ms`) that keep
//! all of it current. `wrpc-session` borrows a channel for endpoint
//! selection, connection fetch, and feedback delivery; it never talks to the
//! naming service, balancer, or endpoint manager directly.

mod balancer_bridge;
mod channel;

pub use channel::Channel;
