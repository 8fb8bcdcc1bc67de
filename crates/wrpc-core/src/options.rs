//! `RpcOptions` / `ChannelOptions`: the per-call and per-channel configuration
//! surface described in `wrpc/common/options.h`.

use std::time::Duration;

/// Whether a connection is closed after one RPC or returned to the endpoint's pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionType {
    /// Close the connection after every call.
    #[default]
    Short,
    /// Return the connection to its endpoint's pool for reuse.
    Pooled,
}

/// Per-call options. A negative timeout means unbounded; `max_retry_num = 0` means
/// the first attempt is not retried on failure (the attempt itself is still made).
#[derive(Debug, Clone, Copy)]
pub struct RpcOptions {
    pub total_timeout_ms: i32,
    pub connect_timeout_ms: i32,
    pub backup_request_timeout_ms: i32,
    pub max_retry_num: u32,
}

impl Default for RpcOptions {
    fn default() -> Self {
        Self {
            total_timeout_ms: -1,
            connect_timeout_ms: -1,
            backup_request_timeout_ms: -1,
            max_retry_num: 0,
        }
    }
}

/// Channel-wide configuration. Embeds [`RpcOptions`] as the per-call defaults
/// via composition rather than inheritance.
#[derive(Debug, Clone)]
pub struct ChannelOptions {
    pub default_rpc_options: RpcOptions,

    /// Names the registered request-writer/response-reader pair.
    pub protocol: String,
    /// Names the registered primary load-balancer strategy.
    pub load_balancer: String,
    /// Names a distinct retry-policy strategy. Empty or equal to `load_balancer`
    /// means the same strategy instance is reused for retry attempts.
    pub retry_policy: String,
    pub connection_type: ConnectionType,
    /// Upper bound of idle pooled connections kept per endpoint.
    pub max_connection_per_endpoint: usize,
    /// After this many consecutive failures a normal endpoint transitions to DEAD.
    /// `<= 0` disables the transition.
    pub max_error_count_per_endpoint: i32,
    pub update_end_points_interval_ms: u32,
    pub health_check_interval_ms: u32,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            default_rpc_options: RpcOptions::default(),
            protocol: String::new(),
            load_balancer: "rr".to_string(),
            retry_policy: String::new(),
            connection_type: ConnectionType::Short,
            max_connection_per_endpoint: 1,
            max_error_count_per_endpoint: -1,
            update_end_points_interval_ms: 5_000,
            health_check_interval_ms: 1_000,
        }
    }
}

impl ChannelOptions {
    /// The effective retry-policy name: `retry_policy` if set and distinct from
    /// `load_balancer`, else `load_balancer` itself (same-instance reuse).
    pub fn effective_retry_policy(&self) -> &str {
        if self.retry_policy.is_empty() || self.retry_policy == self.load_balancer {
            &self.load_balancer
        } else {
            &self.retry_policy
        }
    }

    pub fn uses_distinct_retry_policy(&self) -> bool {
        !self.retry_policy.is_empty() && self.retry_policy != self.load_balancer
    }

    /// Starts a fluent builder seeded with the same defaults as [`ChannelOptions::default`].
    pub fn builder() -> ChannelOptionsBuilder {
        ChannelOptionsBuilder::new()
    }
}

fn duration_to_ms(d: Option<Duration>) -> i32 {
    match d {
        None => -1,
        Some(d) => d.as_millis().min(i32::MAX as u128) as i32,
    }
}

/// Builds a [`ChannelOptions`] one field at a time, mirroring the fluent
/// `*ConfigBuilder` shape used across the rest of this workspace: every
/// setter consumes and returns `self`, and `None` on a timeout setter means
/// unbounded rather than zero.
#[derive(Clone)]
pub struct ChannelOptionsBuilder {
    options: ChannelOptions,
}

impl ChannelOptionsBuilder {
    pub fn new() -> Self {
        Self {
            options: ChannelOptions::default(),
        }
    }

    /// The registered request/response protocol strategy (e.g. `"http"`, `"redis"`, `"nshead"`).
    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.options.protocol = protocol.into();
        self
    }

    /// The registered primary load-balancer strategy. Default: `"rr"`.
    pub fn load_balancer(mut self, name: impl Into<String>) -> Self {
        self.options.load_balancer = name.into();
        self
    }

    /// A distinct strategy to use once a session starts retrying. Leave unset
    /// (or equal to `load_balancer`) to reuse the primary balancer's instance.
    pub fn retry_policy(mut self, name: impl Into<String>) -> Self {
        self.options.retry_policy = name.into();
        self
    }

    pub fn connection_type(mut self, connection_type: ConnectionType) -> Self {
        self.options.connection_type = connection_type;
        self
    }

    /// Upper bound of idle pooled connections kept per endpoint. Default: 1.
    pub fn max_connection_per_endpoint(mut self, max: usize) -> Self {
        self.options.max_connection_per_endpoint = max;
        self
    }

    /// Consecutive failures before a normal endpoint transitions to DEAD.
    /// `<= 0` disables the transition. Default: -1 (disabled).
    pub fn max_error_count_per_endpoint(mut self, max: i32) -> Self {
        self.options.max_error_count_per_endpoint = max;
        self
    }

    /// How often the naming service is asked to refresh. Default: 5s.
    pub fn update_end_points_interval(mut self, interval: Duration) -> Self {
        self.options.update_end_points_interval_ms = interval.as_millis().min(u32::MAX as u128) as u32;
        self
    }

    /// How often dead endpoints are health-checked. Default: 1s.
    pub fn health_check_interval(mut self, interval: Duration) -> Self {
        self.options.health_check_interval_ms = interval.as_millis().min(u32::MAX as u128) as u32;
        self
    }

    /// The default per-call total deadline. `None` means unbounded.
    pub fn total_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.options.default_rpc_options.total_timeout_ms = duration_to_ms(timeout);
        self
    }

    /// The default per-call connect deadline. `None` means unbounded.
    pub fn connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.options.default_rpc_options.connect_timeout_ms = duration_to_ms(timeout);
        self
    }

    /// The default delay before a backup request fires. `None` disables backup requests.
    pub fn backup_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.options.default_rpc_options.backup_request_timeout_ms = duration_to_ms(timeout);
        self
    }

    /// The default retry budget. `0` means an attempt is made but never retried.
    pub fn max_retry_num(mut self, max_retry_num: u32) -> Self {
        self.options.default_rpc_options.max_retry_num = max_retry_num;
        self
    }

    pub fn build(self) -> ChannelOptions {
        self.options
    }
}

impl Default for ChannelOptionsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_timeouts_and_protocol() {
        let options = ChannelOptions::builder()
            .protocol("redis")
            .load_balancer("consistent_hash")
            .total_timeout(Some(Duration::from_millis(500)))
            .connect_timeout(None)
            .max_retry_num(2)
            .build();
        assert_eq!(options.protocol, "redis");
        assert_eq!(options.load_balancer, "consistent_hash");
        assert_eq!(options.default_rpc_options.total_timeout_ms, 500);
        assert_eq!(options.default_rpc_options.connect_timeout_ms, -1);
        assert_eq!(options.default_rpc_options.max_retry_num, 2);
    }

    #[test]
    fn builder_leaves_unset_fields_at_their_default() {
        let options = ChannelOptions::builder().protocol("http").build();
        let defaults = ChannelOptions::default();
        assert_eq!(options.connection_type, defaults.connection_type);
        assert_eq!(options.max_connection_per_endpoint, defaults.max_connection_per_endpoint);
    }

    #[test]
    fn empty_retry_policy_falls_back_to_load_balancer() {
        let opts = ChannelOptions {
            load_balancer: "rr".into(),
            retry_policy: "".into(),
            ..Default::default()
        };
        assert_eq!(opts.effective_retry_policy(), "rr");
        assert!(!opts.uses_distinct_retry_policy());
    }

    #[test]
    fn distinct_retry_policy_is_used_when_configured() {
        let opts = ChannelOptions {
            load_balancer: "rr".into(),
            retry_policy: "hash_mod".into(),
            ..Default::default()
        };
        assert_eq!(opts.effective_retry_policy(), "hash_mod");
        assert!(opts.uses_distinct_retry_policy());
    }
}
