//! Event-loop backend: one task handle per payload, cancelled individually.

use std::time::Duration;

use tokio::{
    task::{self, JoinHandle},
    time,
};
use tracing::debug;

use super::{join_failure, report_shutdown_outcome, ticker};
use crate::{error::RunnerError, runner::Shared};

const CANCEL_POLL: Duration = Duration::from_millis(100);

type Task = JoinHandle<anyhow::Result<()>>;

pub(crate) async fn await_all(shared: &Shared) -> Result<(), RunnerError> {
    let mut tasks: Vec<Task> = Vec::new();
    let mut ticker = ticker(shared.tick());
    let outcome = loop {
        tokio::select! {
            biased;
            _ = shared.shutdown().cancelled() => break Ok(()),
            _ = ticker.tick() => {}
        }
        start_outstanding(shared, &mut tasks).await;
        if let Err(error) = manage_running(&mut tasks).await {
            break Err(error);
        }
    };
    cancel_running(tasks).await;
    outcome
}

async fn start_outstanding(shared: &Shared, tasks: &mut Vec<Task>) {
    for payload in shared.drain() {
        tasks.push(tokio::spawn(payload()));
    }
    task::yield_now().await;
}

async fn manage_running(tasks: &mut Vec<Task>) -> Result<(), RunnerError> {
    let mut index = 0;
    while index < tasks.len() {
        if !tasks[index].is_finished() {
            index += 1;
            continue;
        }
        let handle = tasks.swap_remove(index);
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => return Err(RunnerError::aborted(error)),
            Err(error) => return Err(join_failure(error)),
        }
    }
    task::yield_now().await;
    Ok(())
}

async fn cancel_running(tasks: Vec<Task>) {
    if tasks.is_empty() {
        return;
    }
    debug!(count = tasks.len(), "cancelling running payloads");
    for handle in &tasks {
        handle.abort();
    }
    task::yield_now().await;
    for handle in tasks {
        while !handle.is_finished() {
            time::sleep(CANCEL_POLL).await;
        }
        report_shutdown_outcome(handle.await);
    }
}
