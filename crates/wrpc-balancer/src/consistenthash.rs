use std::hash::{Hash, Hasher};
use std::sync::Mutex;

use wrpc_core::{Code, FeedbackInfo, Result, WrpcError};
use wrpc_endpoint::Endpoint;

use crate::balancer::LoadBalancer;
use crate::context::LoadBalancerContext;

fn ring_key(endpoint: &Endpoint) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    endpoint.hash(&mut hasher);
    hasher.finish()
}

struct RingEntry {
    key: u64,
    endpoint: Endpoint,
    alive: bool,
}

/// A sorted hash ring, one entry per endpoint (no virtual-node replication).
/// `select` walks clockwise from the first ring position whose key exceeds
/// `ctx.hash_code`, wrapping to the smallest key if none does; that starting
/// position is recorded in `ctx.data` so retries advance from it by
/// `ctx.retry_count` instead of recomputing the hash lookup.
pub struct ConsistentHashBalancer {
    ring: Mutex<Vec<RingEntry>>,
}

impl ConsistentHashBalancer {
    pub fn new() -> Self {
        Self {
            ring: Mutex::new(Vec::new()),
        }
    }

    fn insert_locked(ring: &mut Vec<RingEntry>, endpoint: Endpoint, alive: bool) {
        if ring.iter().any(|e| e.endpoint == endpoint) {
            return;
        }
        let key = ring_key(&endpoint);
        let pos = ring.partition_point(|e| e.key < key);
        ring.insert(
            pos,
            RingEntry {
                key,
                endpoint,
                alive,
            },
        );
    }
}

impl Default for ConsistentHashBalancer {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadBalancer for ConsistentHashBalancer {
    fn select(&self, ctx: &mut LoadBalancerContext) -> Result<Endpoint> {
        let ring = self.ring.lock().unwrap();
        if ring.is_empty() {
            return Err(WrpcError::new(Code::NoChoosableEndPoint));
        }
        let len = ring.len();

        if ctx.is_first_attempt() {
            // First index whose key exceeds `hash_code`; wraps to the smallest
            // key (index 0) if `hash_code` is at or past every entry.
            let pp = ring.partition_point(|e| e.key <= ctx.hash_code);
            ctx.data = if pp == len { 0 } else { pp as i64 };
        }
        let idx = ((ctx.data + ctx.retry_count as i64).rem_euclid(len as i64)) as usize;

        if ring[idx].alive || ctx.is_first_attempt() {
            return Ok(ring[idx].endpoint);
        }
        if ring.iter().all(|e| !e.alive) {
            return Ok(ring[idx].endpoint);
        }
        for step in 1..len {
            let probe = (idx + step) % len;
            if ring[probe].alive {
                return Ok(ring[probe].endpoint);
            }
        }
        Ok(ring[idx].endpoint)
    }

    fn feedback(&self, _info: &FeedbackInfo) {}

    fn on_add_one(&self, endpoint: Endpoint) {
        let mut ring = self.ring.lock().unwrap();
        Self::insert_locked(&mut ring, endpoint, true);
    }

    fn on_remove_one(&self, endpoint: Endpoint) {
        self.ring.lock().unwrap().retain(|e| e.endpoint != endpoint);
    }

    fn on_update_all(&self, endpoints: &[Endpoint]) {
        let mut ring = self.ring.lock().unwrap();
        ring.retain(|e| endpoints.contains(&e.endpoint));
        for endpoint in endpoints {
            Self::insert_locked(&mut ring, *endpoint, true);
        }
    }

    fn on_set_death(&self, endpoint: Endpoint) {
        if let Some(e) = self
            .ring
            .lock()
            .unwrap()
            .iter_mut()
            .find(|e| e.endpoint == endpoint)
        {
            e.alive = false;
        }
    }

    fn on_set_alive(&self, endpoint: Endpoint) {
        if let Some(e) = self
            .ring
            .lock()
            .unwrap()
            .iter_mut()
            .find(|e| e.endpoint == endpoint)
        {
            e.alive = true;
        }
    }
}
