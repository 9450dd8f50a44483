//! Structured-scope backend: every payload is a child of one scope.
//!
//! The scope lives for the whole loop. Closing it cancels all children at
//! once; each child observes the cancellation at its next suspension point.

use tokio::task::{self, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{join_failure, report_shutdown_outcome, ticker};
use crate::{error::RunnerError, runner::Shared};

type Nursery = JoinSet<anyhow::Result<()>>;

pub(crate) async fn await_all(shared: &Shared) -> Result<(), RunnerError> {
    let scope = shared.shutdown().child_token();
    let mut nursery = Nursery::new();
    let mut ticker = ticker(shared.tick());
    let outcome = loop {
        tokio::select! {
            biased;
            _ = scope.cancelled() => break Ok(()),
            _ = ticker.tick() => {}
        }
        start_outstanding(shared, &mut nursery, &scope).await;
        if let Err(error) = reap_finished(&mut nursery).await {
            break Err(error);
        }
    };
    close_scope(&scope, &mut nursery).await;
    outcome
}

async fn start_outstanding(shared: &Shared, nursery: &mut Nursery, scope: &CancellationToken) {
    for payload in shared.drain() {
        let future = payload();
        let scope = scope.clone();
        nursery.spawn(async move {
            tokio::select! {
                biased;
                _ = scope.cancelled() => Ok(()),
                result = future => result,
            }
        });
    }
    task::yield_now().await;
}

async fn reap_finished(nursery: &mut Nursery) -> Result<(), RunnerError> {
    while let Some(result) = nursery.try_join_next() {
        match result {
            Ok(Ok(())) => {}
            Ok(Err(error)) => return Err(RunnerError::aborted(error)),
            Err(error) => return Err(join_failure(error)),
        }
    }
    task::yield_now().await;
    Ok(())
}

async fn close_scope(scope: &CancellationToken, nursery: &mut Nursery) {
    scope.cancel();
    if !nursery.is_empty() {
        debug!(count = nursery.len(), "closing payload scope");
    }
    while let Some(result) = nursery.join_next().await {
        report_shutdown_outcome(result);
    }
}
