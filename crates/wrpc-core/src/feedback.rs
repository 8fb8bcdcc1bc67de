//! `FeedbackInfo`: what every attempt reports back to its load balancer, whether it
//! won, lost to a sibling, or failed outright.

use crate::code::Code;
use std::time::Duration;
use wrpc_endpoint::Endpoint;

/// The result of one attempt, handed to [`LoadBalancer::feedback`] so that
/// adaptive strategies (consistent-hash weighting, outlier ejection, etc.) can
/// react to real latency and error data.
///
/// [`LoadBalancer::feedback`]: https://docs.rs/wrpc-balancer
#[derive(Debug, Clone)]
pub struct FeedbackInfo {
    pub endpoint: Endpoint,
    pub code: Code,
    pub connect_cost: Duration,
    pub write_cost: Duration,
    pub read_cost: Duration,
    pub total_cost: Duration,
    /// How many times `issue_rpc`/retry ran on the attempt this feedback came
    /// from. Distinct from a session's own retry count (which counts new
    /// attempts spawned, not reissues of one attempt) — carried for parity
    /// with the per-attempt bookkeeping strategies may want in debug output.
    pub try_count: u32,
}

impl FeedbackInfo {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            code: Code::Unknown,
            connect_cost: Duration::ZERO,
            write_cost: Duration::ZERO,
            read_cost: Duration::ZERO,
            total_cost: Duration::ZERO,
            try_count: 0,
        }
    }

    pub fn reset(&mut self, endpoint: Endpoint) {
        *self = FeedbackInfo::new(endpoint);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn reset_clears_costs() {
        let ep = Endpoint::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 80);
        let mut fb = FeedbackInfo::new(ep);
        fb.code = Code::Success;
        fb.total_cost = Duration::from_millis(5);
        fb.reset(ep);
        assert_eq!(fb.code, Code::Unknown);
        assert_eq!(fb.total_cost, Duration::ZERO);
    }
}
