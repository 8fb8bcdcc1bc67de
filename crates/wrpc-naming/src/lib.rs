//! Naming services: periodically resolve an address string into an endpoint
//! set and fan the result out to observers (normally an endpoint manager).
//! Four strategies are registered by scheme name: `list` (inline
//! comma-separated endpoints), `file` (one endpoint per line, re-read every
//! refresh), `http` (DNS resolution, confusingly named after its scheme
//! string rather than the HTTP protocol), and `directory` (an external
//! service-directory daemon reached through a pluggable resolver).

pub mod directory;
pub mod file;
pub mod http;
pub mod list;
pub mod observer;
mod resolve;
pub mod service;

pub use observer::{EndPointUpdateObserver, ObserverToken, Observable};
pub use service::{is_registered, new_instance, register, NamingService, NamingServiceFactory};
