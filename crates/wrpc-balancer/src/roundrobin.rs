use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use wrpc_core::{Code, FeedbackInfo, Result, WrpcError};
use wrpc_endpoint::Endpoint;

use crate::balancer::LoadBalancer;
use crate::context::LoadBalancerContext;

#[derive(Default)]
struct Sets {
    alive: Vec<Endpoint>,
    dead: Vec<Endpoint>,
}

impl Sets {
    fn remove_everywhere(&mut self, endpoint: Endpoint) {
        self.alive.retain(|e| *e != endpoint);
        self.dead.retain(|e| *e != endpoint);
    }
}

/// Picks endpoints by a monotonically increasing index, modulo the alive list
/// (falling back to the dead list if nothing is alive). The starting offset
/// is recorded on the first attempt and advanced by `ctx.retry_count` on
/// retries, so a session's retries fan out across the candidate set instead
/// of all landing on the same index.
pub struct RoundRobinBalancer {
    next: AtomicU64,
    sets: Mutex<Sets>,
}

impl RoundRobinBalancer {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(0),
            sets: Mutex::new(Sets::default()),
        }
    }
}

impl Default for RoundRobinBalancer {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadBalancer for RoundRobinBalancer {
    fn select(&self, ctx: &mut LoadBalancerContext) -> Result<Endpoint> {
        if ctx.is_first_attempt() {
            ctx.data = self.next.fetch_add(1, Ordering::Relaxed) as i64;
        }
        let offset = ctx.data.wrapping_add(ctx.retry_count as i64);

        let sets = self.sets.lock().unwrap();
        let candidates = if !sets.alive.is_empty() {
            &sets.alive
        } else if !sets.dead.is_empty() {
            &sets.dead
        } else {
            return Err(WrpcError::new(Code::NoChoosableEndPoint));
        };
        let idx = (offset.rem_euclid(candidates.len() as i64)) as usize;
        Ok(candidates[idx])
    }

    fn feedback(&self, _info: &FeedbackInfo) {}

    fn on_add_one(&self, endpoint: Endpoint) {
        let mut sets = self.sets.lock().unwrap();
        if !sets.alive.contains(&endpoint) && !sets.dead.contains(&endpoint) {
            sets.alive.push(endpoint);
        }
    }

    fn on_remove_one(&self, endpoint: Endpoint) {
        self.sets.lock().unwrap().remove_everywhere(endpoint);
    }

    fn on_update_all(&self, endpoints: &[Endpoint]) {
        let mut sets = self.sets.lock().unwrap();
        sets.alive.retain(|e| endpoints.contains(e));
        sets.dead.retain(|e| endpoints.contains(e));
        for endpoint in endpoints {
            if !sets.alive.contains(endpoint) && !sets.dead.contains(endpoint) {
                sets.alive.push(*endpoint);
            }
        }
    }

    fn on_set_death(&self, endpoint: Endpoint) {
        let mut sets = self.sets.lock().unwrap();
        if let Some(pos) = sets.alive.iter().position(|e| *e == endpoint) {
            sets.alive.remove(pos);
            sets.dead.push(endpoint);
        }
    }

    fn on_set_alive(&self, endpoint: Endpoint) {
        let mut sets = self.sets.lock().unwrap();
        if let Some(pos) = sets.dead.iter().position(|e| *e == endpoint) {
            sets.dead.remove(pos);
            sets.alive.push(endpoint);
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
    fn cycles_through_alive_endpoints() {
        let lb = RoundRobinBalancer::new();
        lb.on_add_one(ep(1));
        lb.on_add_one(ep(2));
        lb.on_add_one(ep(3));

        let mut seen = Vec::new();
        for _ in 0..6 {
            let mut ctx = LoadBalancerContext::new(0, "c");
            seen.push(lb.select(&mut ctx).unwrap());
        }
        // every endpoint shows up, and the cycle repeats with period 3
        assert_eq!(seen[0..3].iter().collect::<std::collections::HashSet<_>>().len(), 3);
        assert_eq!(seen[0..3], seen[3..6]);
    }

    #[test]
    fn retry_advances_past_the_first_pick() {
        let lb = RoundRobinBalancer::new();
        lb.on_add_one(ep(1));
        lb.on_add_one(ep(2));

        let mut ctx = LoadBalancerContext::new(0, "c");
        let first = lb.select(&mut ctx).unwrap();
        ctx.retry_count += 1;
        let retry = lb.select(&mut ctx).unwrap();
        assert_ne!(first, retry);
    }

    #[test]
    fn falls_back_to_dead_list_when_nothing_alive() {
        let lb = RoundRobinBalancer::new();
        lb.on_add_one(ep(1));
        lb.on_set_death(ep(1));

        let mut ctx = LoadBalancerContext::new(0, "c");
        assert_eq!(lb.select(&mut ctx).unwrap(), ep(1));
    }

    #[test]
    fn no_choosable_endpoint_when_empty() {
        let lb = RoundRobinBalancer::new();
        let mut ctx = LoadBalancerContext::new(0, "c");
        let err = lb.select(&mut ctx).unwrap_err();
        assert_eq!(err.code, Code::NoChoosableEndPoint);
    }

    #[test]
    fn remove_one_clears_it_from_both_lists() {
        let lb = RoundRobinBalancer::new();
        lb.on_add_one(ep(1));
        lb.on_set_death(ep(1));
        lb.on_remove_one(ep(1));
        let mut ctx = LoadBalancerContext::new(0, "c");
        assert_eq!(
            lb.select(&mut ctx).unwrap_err().code,
            Code::NoChoosableEndPoint
        );
    }
}
