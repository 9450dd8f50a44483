//! Scheduling loops for the supported runner flavours.
//!
//! Both loops follow the same tick: drain the pending queue into tasks, yield
//! so new tasks can start, reap finished tasks (a failure aborts the loop),
//! then sleep until the next tick or until shutdown is requested.

pub(crate) mod event_loop;
pub(crate) mod scope;

use anyhow::anyhow;
use tokio::{
    task::JoinError,
    time::{self, Interval, MissedTickBehavior},
};
use tracing::debug;

use crate::{error::RunnerError, payload::panic_message};

fn ticker(period: std::time::Duration) -> Interval {
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// Describe a task outcome observed while shutting down, if it is worth reporting.
///
/// Failures and panics are no longer fatal at that point; cancellations are expected.
fn shutdown_failure(result: Result<anyhow::Result<()>, JoinError>) -> Option<String> {
    match result {
        Ok(Ok(())) => None,
        Ok(Err(error)) => Some(format!("payload failed during shutdown: {error:#}")),
        Err(error) if error.is_panic() => Some(format!(
            "payload panicked during shutdown: {}",
            panic_message(error.into_panic().as_ref())
        )),
        Err(_) => None,
    }
}

fn report_shutdown_outcome(result: Result<anyhow::Result<()>, JoinError>) {
    if let Some(failure) = shutdown_failure(result) {
        debug!(failure = %failure, "ignoring payload outcome after shutdown");
    }
}

fn join_failure(error: JoinError) -> RunnerError {
    if error.is_panic() {
        RunnerError::Panicked {
            message: panic_message(error.into_panic().as_ref()),
        }
    } else {
        RunnerError::aborted(anyhow!("payload task was cancelled outside of shutdown"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn shutdown_failures_report_errors_and_panics_only() {
        assert_eq!(shutdown_failure(Ok(Ok(()))), None);

        let failed = shutdown_failure(Ok(Err(anyhow!("lost connection")))).expect("failure reported");
        assert_eq!(failed, "payload failed during shutdown: lost connection");

        let panicked = tokio::spawn(async {
            if true {
                panic!("torn down badly");
            }
            Ok(())
        })
        .await;
        let reported = shutdown_failure(panicked).expect("panic reported");
        assert_eq!(reported, "payload panicked during shutdown: torn down badly");

        let cancelled = tokio::spawn(std::future::pending::<anyhow::Result<()>>());
        cancelled.abort();
        assert_eq!(shutdown_failure(cancelled.await), None);
    }
}
