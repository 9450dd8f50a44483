use std::sync::Arc;

use async_trait::async_trait;

/// A background unit of work that runs for the lifetime of the daemon.
///
/// Services are usually constructed from the configuration document and
/// registered with a runner as fire-and-forget payloads, so `run` must only
/// return on failure or when it has nothing left to do.
#[async_trait]
pub trait Service: Send + Sync {
    /// Drive the service until it finishes or fails.
    async fn run(self: Arc<Self>) -> anyhow::Result<()>;
}
