//! Three-state runner lifecycle guarded by a mutex and condition variable.

use std::{
    fmt,
    sync::{Condvar, Mutex, MutexGuard, PoisonError},
};

use crate::error::RunnerError;

/// Lifecycle state of a runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Created but not yet running; payloads are queued.
    Idle,
    /// `run` is driving the scheduling loop.
    Running,
    /// The loop has exited; the runner cannot be started again.
    Stopped,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            State::Idle => "idle",
            State::Running => "running",
            State::Stopped => "stopped",
        };
        f.write_str(label)
    }
}

#[derive(Debug)]
pub(crate) struct Lifecycle {
    phase: Mutex<Phase>,
    changed: Condvar,
}

#[derive(Debug)]
struct Phase {
    state: State,
    started: bool,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            phase: Mutex::new(Phase {
                state: State::Idle,
                started: false,
            }),
            changed: Condvar::new(),
        }
    }

    pub(crate) fn current(&self) -> State {
        self.lock().state
    }

    /// Transition Idle -> Running.
    ///
    /// Returns `Ok(false)` for a runner stopped before it was ever started,
    /// which has nothing to run. Any other starting state is rejected.
    pub(crate) fn begin(&self) -> Result<bool, RunnerError> {
        let mut phase = self.lock();
        match phase.state {
            State::Idle => {
                phase.state = State::Running;
                phase.started = true;
                self.changed.notify_all();
                Ok(true)
            }
            State::Stopped if !phase.started => Ok(false),
            other => Err(RunnerError::Rerun { state: other }),
        }
    }

    /// Mark the runner as stopped and wake everyone waiting for it.
    pub(crate) fn finish(&self) {
        self.lock().state = State::Stopped;
        self.changed.notify_all();
    }

    /// Move an idle runner straight to Stopped; returns the state observed before.
    ///
    /// `on_stop` runs under the lifecycle lock and must not call back into it.
    pub(crate) fn stop_if_idle(&self, on_stop: impl FnOnce()) -> State {
        let mut phase = self.lock();
        let previous = phase.state;
        if previous == State::Idle {
            on_stop();
            phase.state = State::Stopped;
            self.changed.notify_all();
        }
        previous
    }

    /// Block the calling thread until the runner reached Stopped.
    pub(crate) fn wait_stopped(&self) {
        let mut phase = self.lock();
        while phase.state != State::Stopped {
            phase = self.changed.wait(phase).unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Phase> {
        self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
