use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

use wrpc_core::{FeedbackInfo, Result};
use wrpc_endpoint::Endpoint;

use crate::context::LoadBalancerContext;

/// A strategy that picks one endpoint out of the ones it currently knows
/// about, and hears back how that pick fared. The same trait serves both the
/// "which endpoint for a fresh session" role and the "which endpoint for a
/// retry" role (`ChannelOptions::retry_policy`): callers distinguish the two
/// only by which instance they invoke `select` on.
pub trait LoadBalancer: Send + Sync {
    /// Picks an endpoint for this attempt. `ctx.retry_count` is `0` on the
    /// session's first attempt (including the first attempt of a backup) and
    /// increments on every subsequent retry.
    fn select(&self, ctx: &mut LoadBalancerContext) -> Result<Endpoint>;

    /// Reports how a completed attempt went. Strategies that don't adapt to
    /// feedback (round-robin, hash-mod, consistent-hash) ignore it; it exists
    /// so strategies that do (outlier ejection, latency-weighted picks) can
    /// be dropped in without changing the trait.
    fn feedback(&self, _info: &FeedbackInfo) {}

    /// A brand-new endpoint has joined the candidate set. New endpoints are
    /// assumed alive (a naming-service refresh doesn't carry health status).
    fn on_add_one(&self, endpoint: Endpoint);

    /// An endpoint has left the candidate set entirely (it is no longer
    /// returned by the naming service at all, not merely marked dead).
    fn on_remove_one(&self, endpoint: Endpoint);

    /// A full resync: `endpoints` is the complete current candidate set.
    /// Endpoints absent from it are removed; endpoints newly present are
    /// added as alive; endpoints present in both keep their current status.
    fn on_update_all(&self, endpoints: &[Endpoint]);

    /// A previously NORMAL endpoint has transitioned to DEAD.
    fn on_set_death(&self, endpoint: Endpoint);

    /// A previously DEAD endpoint has transitioned back to NORMAL.
    fn on_set_alive(&self, endpoint: Endpoint);
}

pub type LoadBalancerFactory = fn() -> Box<dyn LoadBalancer>;

fn registry() -> &'static RwLock<HashMap<&'static str, LoadBalancerFactory>> {
    static REGISTRY: OnceLock<RwLock<HashMap<&'static str, LoadBalancerFactory>>> =
        OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut map: HashMap<&'static str, LoadBalancerFactory> = HashMap::new();
        map.insert("rr", || Box::new(crate::roundrobin::RoundRobinBalancer::new()));
        map.insert("hash_mod", || Box::new(crate::hashmod::HashModBalancer::new()));
        map.insert("consistent_hash", || {
            Box::new(crate::consistenthash::ConsistentHashBalancer::new())
        });
        RwLock::new(map)
    })
}

/// Registers a strategy under `name`, returning `false` if the name was
/// already taken.
pub fn register(name: &'static str, factory: LoadBalancerFactory) -> bool {
    registry().write().unwrap().insert(name, factory).is_none()
}

pub fn is_registered(name: &str) -> bool {
    registry().read().unwrap().contains_key(name)
}

/// Builds a fresh strategy instance for a registered name, or `None`.
pub fn new_instance(name: &str) -> Option<Box<dyn LoadBalancer>> {
    let factory = *registry().read().unwrap().get(name)?;
    Some(factory())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_strategies_are_preregistered() {
        for name in ["rr", "hash_mod", "consistent_hash"] {
            assert!(is_registered(name));
            assert!(new_instance(name).is_some());
        }
    }

    #[test]
    fn unknown_strategy_yields_none() {
        assert!(new_instance("least_connections").is_none());
    }
}
