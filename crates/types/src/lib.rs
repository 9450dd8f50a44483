//! Shared interfaces used across the Loadtide daemon.
//!
//! - [`Pool`]: the data interface describing one site providing interchangeable resources.
//! - [`Service`]: a long-running unit of background work that can be handed to a runner.

mod pool;
mod service;

pub use pool::Pool;
pub use service::Service;
