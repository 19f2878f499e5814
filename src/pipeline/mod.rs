//! Authenticated request pipeline: decorate, send, inspect, refresh, replay.

pub mod client;
pub mod coordinator;
pub mod decorator;

pub use client::{join_url, ApiClient};
pub use coordinator::{RefreshCoordinator, RefreshError};
pub use decorator::{BearerDecorator, DefaultHeaders, RequestChain, RequestHook};
