//! Error types for payload execution.

use thiserror::Error;

use crate::lifecycle::State;

/// Errors reported by a [`Runner`](crate::Runner).
#[derive(Debug, Error)]
pub enum RunnerError {
    /// `run` was called on a runner that is already running or has finished.
    #[error("cannot re-run a runner that is {state}")]
    Rerun { state: State },

    /// The runner has stopped and no longer accepts payloads.
    #[error("runner has shut down and no longer accepts payloads")]
    Shutdown,

    /// A fire-and-forget payload failed; this aborts the whole runner.
    #[error("runner aborted by failed payload: {source:#}")]
    Aborted {
        #[source]
        source: anyhow::Error,
    },

    /// A fire-and-forget payload panicked; this aborts the whole runner.
    #[error("runner aborted by panicked payload: {message}")]
    Panicked { message: String },

    /// A payload submitted through `run_payload` failed.
    #[error(transparent)]
    Payload(anyhow::Error),

    /// A payload submitted through `run_payload` was dropped before it completed.
    #[error("payload was cancelled before it completed")]
    Cancelled,

    /// The executor backing the runner could not be created.
    #[error("failed to build runner executor: {0}")]
    Runtime(#[from] std::io::Error),
}

impl RunnerError {
    /// Create an abort error from a payload failure.
    pub fn aborted(source: impl Into<anyhow::Error>) -> Self {
        Self::Aborted { source: source.into() }
    }

    /// Whether this error signals misuse of the runner lifecycle.
    pub fn is_rerun(&self) -> bool {
        matches!(self, Self::Rerun { .. })
    }
}

/// A fire-and-forget payload returned a value without anyone to receive it.
#[derive(Debug, Clone, Error)]
#[error("no caller to receive {value} from {who}")]
pub struct OrphanedReturn {
    /// Name of the payload that produced the value.
    pub who: String,
    /// Debug rendering of the value that was produced.
    pub value: String,
}

impl OrphanedReturn {
    pub fn new(who: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            who: who.into(),
            value: value.into(),
        }
    }
}
