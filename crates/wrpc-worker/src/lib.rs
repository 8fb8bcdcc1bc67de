//! A fixed-size worker pool draining a task queue ([`WorkerPool`]), and the
//! process-wide background runtime built on top of it ([`BackgroundRuntime`],
//! [`PeriodicTask`]) that drives every periodic or deferred job: endpoint
//! refresh, health checks, backup-request firing, total-timeout firing, and
//! feedback delivery.

mod background;
mod pool;

pub use background::{BackgroundRuntime, PeriodicTask};
pub use pool::{PoolProfile, WorkerPool};
