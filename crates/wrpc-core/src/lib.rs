//! Core infrastructure shared by every `wrpc-*` crate.
//!
//! This crate provides the pieces that do not belong to any single subsystem:
//! - [`code`] — the return-code taxonomy and retry eligibility rule
//! - [`timer`] — monotonic clock, elapsed timer, countdown timer
//! - [`options`] — `RpcOptions` / `ChannelOptions` / `ConnectionType`
//! - [`feedback`] — `FeedbackInfo`, delivered to load balancers after every attempt
//! - [`events`] — the observability event system all other crates emit into

pub mod code;
pub mod events;
pub mod feedback;
pub mod options;
pub mod timer;

pub use code::{Code, Result, WrpcError};
pub use events::{EventListener, WrpcEvent};
pub use feedback::FeedbackInfo;
pub use options::{ChannelOptions, ChannelOptionsBuilder, ConnectionType, RpcOptions};
pub use timer::{CountdownTimer, ElapsedTimer, Microseconds};
