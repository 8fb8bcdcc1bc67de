use wrpc_core::ConnectionType;

/// The subset of `ChannelOptions` the endpoint manager needs to size and
/// police its per-endpoint connection pools.
#[derive(Debug, Clone, Copy)]
pub struct EndpointManagerConfig {
    pub connection_type: ConnectionType,
    pub max_connection_per_endpoint: usize,
    /// After this many consecutive `fetch_connection` failures a NORMAL
    /// endpoint transitions to DEAD. `<= 0` disables the transition.
    pub max_error_count_per_endpoint: i32,
}

impl Default for EndpointManagerConfig {
    fn default() -> Self {
        Self {
            connection_type: ConnectionType::Short,
            max_connection_per_endpoint: 1,
            max_error_count_per_endpoint: -1,
        }
    }
}
