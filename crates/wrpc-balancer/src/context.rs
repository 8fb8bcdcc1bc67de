use wrpc_endpoint::Endpoint;

/// Per-attempt state threaded through every retry of one session, so a
/// strategy can make a consistent choice across an attempt and its retries
/// without keeping its own per-session map.
#[derive(Debug, Clone, Default)]
pub struct LoadBalancerContext {
    /// The request's fingerprint, used by hash-based strategies. `0` if the
    /// protocol strategy does not provide one (round-robin ignores it).
    pub hash_code: u64,
    /// How many retries have happened so far for this session (0 on the
    /// first attempt, including the first attempt of a backup).
    pub retry_count: u32,
    /// Opaque scratch a strategy records on the first attempt and reads back
    /// on retries (round-robin's starting index, consistent-hash's ring
    /// position). Strategies that don't need one leave it at `0`.
    pub data: i64,
    /// Endpoints already tried this session, oldest first. Strategies may
    /// consult this to avoid repeating a failed choice, though none of the
    /// three built-in strategies currently do (they rely on `retry_count`
    /// advancing the offset instead).
    pub tried_endpoints: Vec<Endpoint>,
    /// Correlation id carried for logging/tracing across retries.
    pub correlation_id: String,
}

impl LoadBalancerContext {
    pub fn new(hash_code: u64, correlation_id: impl Into<String>) -> Self {
        Self {
            hash_code,
            retry_count: 0,
            data: 0,
            tried_endpoints: Vec::new(),
            correlation_id: correlation_id.into(),
        }
    }

    pub fn is_first_attempt(&self) -> bool {
        self.retry_count == 0
    }

    pub fn record_tried(&mut self, endpoint: Endpoint) {
        self.tried_endpoints.push(endpoint);
    }
}
