use std::sync::Arc;

use wrpc_balancer::LoadBalancer;
use wrpc_endpoint::Endpoint;
use wrpc_endpointmgr::EndpointStatusObserver;

/// Adapts a [`LoadBalancer`] to the endpoint manager's narrower
/// [`EndpointStatusObserver`] contract, so `wrpc-endpointmgr` never needs to
/// depend on `wrpc-balancer` to notify one.
pub(crate) struct BalancerBridge(pub Arc<dyn LoadBalancer>);

impl EndpointStatusObserver for BalancerBridge {
    fn on_add_one(&self, endpoint: Endpoint) {
        self.0.on_add_one(endpoint);
    }

    fn on_remove_one(&self, endpoint: Endpoint) {
        self.0.on_remove_one(endpoint);
    }

    fn on_update_all(&self, endpoints: &[Endpoint]) {
        self.0.on_update_all(endpoints);
    }

    fn on_set_alive(&self, endpoint: Endpoint) {
        self.0.on_set_alive(endpoint);
    }

    fn on_set_death(&self, endpoint: Endpoint) {
        self.0.on_set_death(endpoint);
    }
}
