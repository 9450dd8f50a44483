use std::{fmt, sync::Arc, time::Duration};

use anyhow::ensure;
use async_trait::async_trait;
use loadtide_config::{Arguments, Node};
use loadtide_types::{Pool, Service};
use tracing::info;

/// Service periodically reporting the figures of a pool.
pub struct Monitor {
    pool: Arc<dyn Pool>,
    interval: Duration,
}

impl Monitor {
    pub fn new(pool: Arc<dyn Pool>, interval: Duration) -> Self {
        Self { pool, interval }
    }

    /// Factory binding `(pool, interval=1.0)` with the interval in seconds.
    pub fn construct(mut arguments: Arguments) -> anyhow::Result<Node> {
        let pool = arguments.object::<Arc<dyn Pool>>(0, "pool")?;
        let interval: f64 = arguments.optional(1, "interval")?.unwrap_or(1.0);
        arguments.finish()?;
        ensure!(interval.is_finite() && interval > 0.0, "interval must be positive, got {interval}");

        let service: Arc<dyn Service> = Arc::new(Self::new(Arc::clone(&*pool), Duration::from_secs_f64(interval)));
        Ok(Node::object(service))
    }

    fn report(&self) {
        info!(
            supply = self.pool.supply(),
            demand = self.pool.demand(),
            utilisation = self.pool.utilisation(),
            consumption = self.pool.consumption(),
            "pool status"
        );
    }
}

#[async_trait]
impl Service for Monitor {
    async fn run(self: Arc<Self>) -> anyhow::Result<()> {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            ticker.tick().await;
            self.report();
        }
    }
}

impl fmt::Debug for Monitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Monitor").field("interval", &self.interval).finish_non_exhaustive()
    }
}
