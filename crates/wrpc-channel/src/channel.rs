use std::sync::{Arc, Mutex, Weak};

use wrpc_balancer::{LoadBalancer, LoadBalancerContext};
use wrpc_connection::Connection;
use wrpc_core::{ChannelOptions, Code, FeedbackInfo, Result, WrpcError};
use wrpc_endpoint::{Endpoint, EndpointSet};
use wrpc_endpointmgr::{EndpointManager, EndpointManagerConfig, EndpointStatusObserver};
use wrpc_message::{IRequest, IResponse};
use wrpc_naming::{EndPointUpdateObserver, NamingService};
use wrpc_worker::{BackgroundRuntime, PeriodicTask};

use crate::balancer_bridge::BalancerBridge;

/// Holds the pieces `wrpc-session` needs per RPC: an endpoint, a connection
/// for it, and somewhere to report back how the attempt went. Everything
/// else (naming refresh, health checks, balancer wiring) runs in the
/// background without a session ever seeing it.
pub struct Channel {
    address: String,
    options: ChannelOptions,
    naming: Option<Box<dyn NamingService>>,
    balancer: Arc<dyn LoadBalancer>,
    retry_balancer: Option<Arc<dyn LoadBalancer>>,
    // Kept alive so the `Weak` handles registered with the endpoint manager
    // stay upgradeable for the channel's lifetime.
    _balancer_observer: Arc<dyn EndpointStatusObserver>,
    _retry_observer: Option<Arc<dyn EndpointStatusObserver>>,
    endpoint_manager: Arc<EndpointManager>,
    background: Arc<BackgroundRuntime>,
    refresh_task: Mutex<Option<PeriodicTask>>,
    health_task: Mutex<Option<PeriodicTask>>,
}

impl Channel {
    /// `init(address, options)`: splits `scheme://value`, builds the named
    /// naming service, load balancer(s), and endpoint manager, wires
    /// observers, runs an initial `refresh`, and starts the two periodic
    /// background tasks.
    pub fn new(address: &str, options: ChannelOptions) -> std::result::Result<Arc<Self>, Code> {
        let (scheme, real_address) = address
            .split_once("://")
            .ok_or(Code::InvalidArgument)?;
        let naming = wrpc_naming::new_instance(scheme, &options.protocol).ok_or(Code::InvalidArgument)?;
        let channel = Self::build(Some(naming), &options, BackgroundRuntime::global(), address.to_string())?;
        channel.refresh_now(real_address);
        channel.start_background_tasks(Some(real_address.to_string()));
        Ok(channel)
    }

    /// `init(endpoints, options)`: installs a fixed endpoint set directly, no
    /// naming service. The health-check task still runs so a transiently
    /// unreachable endpoint can come back without a second call to `new`.
    pub fn with_endpoints(
        endpoints: EndpointSet,
        options: ChannelOptions,
    ) -> std::result::Result<Arc<Self>, Code> {
        let channel = Self::build(None, &options, BackgroundRuntime::global(), String::new())?;
        channel.endpoint_manager.on_update(&endpoints);
        channel.start_background_tasks(None);
        Ok(channel)
    }

    /// Test-oriented constructor that takes an explicit background runtime
    /// instead of the process-wide singleton, so tests don't share state
    /// (and don't have to wait out the default's periodic schedule).
    pub fn with_runtime(
        address: &str,
        options: ChannelOptions,
        background: Arc<BackgroundRuntime>,
    ) -> std::result::Result<Arc<Self>, Code> {
        let (scheme, real_address) = address
            .split_once("://")
            .ok_or(Code::InvalidArgument)?;
        let naming = wrpc_naming::new_instance(scheme, &options.protocol).ok_or(Code::InvalidArgument)?;
        let channel = Self::build(Some(naming), &options, background, address.to_string())?;
        channel.refresh_now(real_address);
        channel.start_background_tasks(Some(real_address.to_string()));
        Ok(channel)
    }

    fn build(
        naming: Option<Box<dyn NamingService>>,
        options: &ChannelOptions,
        background: Arc<BackgroundRuntime>,
        address: String,
    ) -> std::result::Result<Arc<Self>, Code> {
        if !wrpc_message::is_request_registered(&options.protocol)
            || !wrpc_message::is_response_registered(&options.protocol)
        {
            return Err(Code::NotSupported);
        }
        let balancer: Arc<dyn LoadBalancer> =
            Arc::from(wrpc_balancer::new_instance(&options.load_balancer).ok_or(Code::InvalidArgument)?);
        let retry_balancer: Option<Arc<dyn LoadBalancer>> = if options.uses_distinct_retry_policy() {
            Some(Arc::from(
                wrpc_balancer::new_instance(options.effective_retry_policy()).ok_or(Code::InvalidArgument)?,
            ))
        } else {
            None
        };

        let em_config = EndpointManagerConfig {
            connection_type: options.connection_type,
            max_connection_per_endpoint: options.max_connection_per_endpoint,
            max_error_count_per_endpoint: options.max_error_count_per_endpoint,
        };
        let endpoint_manager = Arc::new(EndpointManager::new(em_config));

        let balancer_observer: Arc<dyn EndpointStatusObserver> =
            Arc::new(BalancerBridge(Arc::clone(&balancer)));
        endpoint_manager.add_observer(Arc::downgrade(&balancer_observer));

        let retry_observer: Option<Arc<dyn EndpointStatusObserver>> = retry_balancer.as_ref().map(|rb| {
            let observer: Arc<dyn EndpointStatusObserver> = Arc::new(BalancerBridge(Arc::clone(rb)));
            endpoint_manager.add_observer(Arc::downgrade(&observer));
            observer
        });

        if let Some(naming) = &naming {
            let weak_em: Weak<dyn EndPointUpdateObserver> = Arc::downgrade(&endpoint_manager);
            naming.add_observer(weak_em);
        }

        Ok(Arc::new(Self {
            address,
            options: options.clone(),
            naming,
            balancer,
            retry_balancer,
            _balancer_observer: balancer_observer,
            _retry_observer: retry_observer,
            endpoint_manager,
            background,
            refresh_task: Mutex::new(None),
            health_task: Mutex::new(None),
        }))
    }

    fn refresh_now(&self, real_address: &str) {
        if let Some(naming) = &self.naming {
            let _ = naming.refresh(real_address);
        }
    }

    fn start_background_tasks(self: &Arc<Self>, real_address: Option<String>) {
        if let (Some(naming_address), true) = (real_address, self.naming.is_some()) {
            let this = Arc::clone(self);
            let period_us = (self.options.update_end_points_interval_ms as i64) * 1_000;
            let task = PeriodicTask::start(Arc::clone(&self.background), period_us, move || {
                if let Some(naming) = &this.naming {
                    let _ = naming.refresh(&naming_address);
                }
            });
            *self.refresh_task.lock().unwrap() = Some(task);
        }

        let this = Arc::clone(self);
        let period_us = (self.options.health_check_interval_ms as i64) * 1_000;
        let connect_timeout_ms = self.options.default_rpc_options.connect_timeout_ms;
        let task = PeriodicTask::start(Arc::clone(&self.background), period_us, move || {
            this.endpoint_manager.health_check(connect_timeout_ms);
        });
        *self.health_task.lock().unwrap() = Some(task);
    }

    pub fn options(&self) -> &ChannelOptions {
        &self.options
    }

    pub fn background(&self) -> &Arc<BackgroundRuntime> {
        &self.background
    }

    pub fn endpoint_manager(&self) -> &Arc<EndpointManager> {
        &self.endpoint_manager
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Picks the primary balancer on a fresh attempt, the retry policy (if
    /// distinct) once `ctx.retry_count > 0`.
    fn balancer_for(&self, retry_count: u32) -> &Arc<dyn LoadBalancer> {
        if retry_count > 0 {
            self.retry_balancer.as_ref().unwrap_or(&self.balancer)
        } else {
            &self.balancer
        }
    }

    pub fn select_endpoint(&self, ctx: &mut LoadBalancerContext) -> Result<Endpoint> {
        self.balancer_for(ctx.retry_count).select(ctx)
    }

    pub fn fetch_connection(&self, endpoint: Endpoint, connect_timeout_ms: i32) -> Result<Connection> {
        self.endpoint_manager.fetch_connection(endpoint, connect_timeout_ms)
    }

    pub fn giveback_connection(&self, endpoint: Endpoint, conn: Connection, close: bool) {
        self.endpoint_manager.giveback_connection(endpoint, conn, close);
    }

    /// Delivers `info` to the balancer that picked the endpoint, on a
    /// background worker so strategy code never runs with a session lock
    /// held.
    pub fn submit_feedback(&self, retry_count: u32, info: FeedbackInfo) {
        let balancer = Arc::clone(self.balancer_for(retry_count));
        #[cfg(feature = "metrics")]
        metrics::counter!("wrpc_channel_feedback_submitted_total").increment(1);
        self.background.spawn(Box::new(move || balancer.feedback(&info)));
    }

    pub fn new_response(&self) -> Box<dyn IResponse> {
        wrpc_message::new_response(&self.options.protocol)
            .expect("protocol was validated as registered at channel construction")
    }
}

/// A request used to construct a session is always boxed behind the
/// registered protocol's factory; channels never construct one themselves
/// since the caller fills it in before submitting.
pub fn new_request(channel: &Channel) -> Box<dyn IRequest> {
    wrpc_message::new_request(&channel.options().protocol)
        .expect("protocol was validated as registered at channel construction")
}
