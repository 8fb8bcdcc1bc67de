use std::sync::Mutex;

use wrpc_core::{Code, FeedbackInfo, Result, WrpcError};
use wrpc_endpoint::Endpoint;

use crate::balancer::LoadBalancer;
use crate::context::LoadBalancerContext;

struct Candidate {
    endpoint: Endpoint,
    alive: bool,
}

/// Maps `ctx.hash_code + ctx.retry_count` onto one combined candidate vector
/// (alive and dead endpoints together, in insertion order), so the same
/// request fingerprint always lands on the same index for a given candidate
/// set — sharding consistency over strictly avoiding dead nodes on the first
/// try. Retries (and only retries) linearly probe forward for a live
/// endpoint if the modulo pick is dead.
pub struct HashModBalancer {
    candidates: Mutex<Vec<Candidate>>,
}

impl HashModBalancer {
    pub fn new() -> Self {
        Self {
            candidates: Mutex::new(Vec::new()),
        }
    }
}

impl Default for HashModBalancer {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadBalancer for HashModBalancer {
    fn select(&self, ctx: &mut LoadBalancerContext) -> Result<Endpoint> {
        let candidates = self.candidates.lock().unwrap();
        if candidates.is_empty() {
            return Err(WrpcError::new(Code::NoChoosableEndPoint));
        }
        let len = candidates.len();
        let offset = ctx.hash_code.wrapping_add(ctx.retry_count as u64);
        let start = (offset % len as u64) as usize;

        if candidates[start].alive || ctx.is_first_attempt() {
            return Ok(candidates[start].endpoint);
        }

        let all_dead = candidates.iter().all(|c| !c.alive);
        if all_dead {
            return Ok(candidates[start].endpoint);
        }
        for step in 1..len {
            let idx = (start + step) % len;
            if candidates[idx].alive {
                return Ok(candidates[idx].endpoint);
            }
        }
        Ok(candidates[start].endpoint)
    }

    fn feedback(&self, _info: &FeedbackInfo) {}

    fn on_add_one(&self, endpoint: Endpoint) {
        let mut candidates = self.candidates.lock().unwrap();
        if !candidates.iter().any(|c| c.endpoint == endpoint) {
            candidates.push(Candidate {
                endpoint,
                alive: true,
            });
        }
    }

    fn on_remove_one(&self, endpoint: Endpoint) {
        self.candidates
            .lock()
            .unwrap()
            .retain(|c| c.endpoint != endpoint);
    }

    fn on_update_all(&self, endpoints: &[Endpoint]) {
        let mut candidates = self.candidates.lock().unwrap();
        candidates.retain(|c| endpoints.contains(&c.endpoint));
        for endpoint in endpoints {
            if !candidates.iter().any(|c| c.endpoint == *endpoint) {
                candidates.push(Candidate {
                    endpoint: *endpoint,
                    alive: true,
                });
            }
        }
    }

    fn on_set_death(&self, endpoint: Endpoint) {
        if let Some(c) = self
            .candidates
            .lock()
            .unwrap()
            .iter_mut()
            .find(|c| c.endpoint == endpoint)
        {
            c.alive = false;
        }
    }

    fn on_set_alive(&self, endpoint: Endpoint) {
        if let Some(c) = self
            .candidates
            .lock()
            .unwrap()
            .iter_mut()
            .find(|c| c.endpoint == endpoint)
        {
            c.alive = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn ep(port: u16) -> Endpoint {
        Endpoint::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
    }

    #[test]
    fn same_hash_code_always_selects_the_same_endpoint() {
        let lb = HashModBalancer::new();
        lb.on_add_one(ep(1));
        lb.on_add_one(ep(2));
        lb.on_add_one(ep(3));

        let mut ctx1 = LoadBalancerContext::new(42, "a");
        let mut ctx2 = LoadBalancerContext::new(42, "b");
        assert_eq!(lb.select(&mut ctx1).unwrap(), lb.select(&mut ctx2).unwrap());
    }

    #[test]
    fn retry_probes_past_a_dead_pick() {
        let lb = HashModBalancer::new();
        lb.on_add_one(ep(1));
        lb.on_add_one(ep(2));
        let mut ctx = LoadBalancerContext::new(0, "c");
        let first = lb.select(&mut ctx).unwrap();
        lb.on_set_death(first);
        ctx.retry_count += 1;
        let retry = lb.select(&mut ctx).unwrap();
        assert_ne!(first, retry);
    }

    #[test]
    fn first_attempt_accepts_a_dead_pick() {
        let lb = HashModBalancer::new();
        lb.on_add_one(ep(1));
        let mut ctx = LoadBalancerContext::new(0, "c");
        lb.on_set_death(ep(1));
        assert_eq!(lb.select(&mut ctx).unwrap(), ep(1));
    }

    #[test]
    fn empty_candidate_set_is_not_choosable() {
        let lb = HashModBalancer::new();
        let mut ctx = LoadBalancerContext::new(1, "c");
        assert_eq!(
            lb.select(&mut ctx).unwrap_err().code,
            Code::NoChoosableEndPoint
        );
    }
}
