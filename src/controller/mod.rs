//! Shared runtime pieces of the lifecycle engine.
//!
//! Holds the dependency context, the error type, the cluster status state
//! machine and the TTL controller with its work queue.

pub mod context;
pub mod error;
pub mod events;
pub mod state_machine;
pub mod ttl;
pub(crate) mod workqueue;
