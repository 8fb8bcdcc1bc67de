use wrpc_endpoint::Endpoint;

/// What a load balancer (acting as an endpoint-set watcher) hears from the
/// endpoint manager. Defined locally rather than depending on `wrpc-balancer`
/// directly — `wrpc-channel` bridges a `wrpc_balancer::LoadBalancer` to this
/// trait, keeping the manager usable with any candidate-set consumer.
pub trait EndpointStatusObserver: Send + Sync {
    fn on_add_one(&self, endpoint: Endpoint);
    fn on_remove_one(&self, endpoint: Endpoint);
    fn on_update_all(&self, endpoints: &[Endpoint]);
    fn on_set_alive(&self, endpoint: Endpoint);
    fn on_set_death(&self, endpoint: Endpoint);
}
