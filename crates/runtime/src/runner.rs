//! The payload runner: queueing, lifecycle, and backend selection.

use std::{
    fmt,
    future::Future,
    sync::{Mutex, MutexGuard, PoisonError},
    thread::{self, ThreadId},
    time::Duration,
};

use once_cell::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{
    backend,
    error::RunnerError,
    lifecycle::{Lifecycle, State},
    payload::{self, Payload},
};

/// Interval between two scheduling ticks unless configured otherwise.
pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

const MIN_TICK: Duration = Duration::from_millis(1);

/// Concurrency backend driving a runner's scheduling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Flavour {
    /// Payloads are individual tasks on the runner's event loop and are
    /// cancelled one by one through their task handles.
    #[default]
    EventLoop,
    /// Payloads are children of a single scope that is cancelled as a whole.
    Scope,
}

impl fmt::Display for Flavour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Flavour::EventLoop => f.write_str("event-loop"),
            Flavour::Scope => f.write_str("scope"),
        }
    }
}

/// Builder for a [`Runner`] with non-default settings.
#[derive(Debug, Clone)]
pub struct RunnerBuilder {
    flavour: Flavour,
    tick: Duration,
}

impl RunnerBuilder {
    /// Select the backend flavour.
    pub fn flavour(mut self, flavour: Flavour) -> Self {
        self.flavour = flavour;
        self
    }

    /// Set the scheduling tick interval; values below one millisecond are raised to it.
    pub fn tick(mut self, tick: Duration) -> Self {
        self.tick = tick.max(MIN_TICK);
        self
    }

    pub fn build(self) -> Runner {
        Runner {
            flavour: self.flavour,
            shared: Shared::new(self.tick),
        }
    }
}

impl Default for RunnerBuilder {
    fn default() -> Self {
        Self {
            flavour: Flavour::default(),
            tick: DEFAULT_TICK,
        }
    }
}

/// Executes background payloads on a single cooperative scheduling loop.
///
/// Payloads can be submitted from any thread at any time before the runner
/// stops. [`Runner::run`] blocks its caller for the lifetime of the loop, which
/// ends when [`Runner::stop`] is called or a fire-and-forget payload fails.
///
/// ```no_run
/// use std::{sync::Arc, thread};
/// use loadtide_runtime::{Flavour, Runner};
///
/// let runner = Arc::new(Runner::new(Flavour::EventLoop));
/// runner.register_payload(|| async { Ok(()) })?;
///
/// let driver = {
///     let runner = Arc::clone(&runner);
///     thread::spawn(move || runner.run())
/// };
/// let answer = runner.run_payload(|| async { Ok(6 * 7) })?;
/// assert_eq!(answer, 42);
///
/// runner.stop();
/// driver.join().expect("driver thread")?;
/// # Ok::<(), loadtide_runtime::RunnerError>(())
/// ```
pub struct Runner {
    flavour: Flavour,
    shared: Shared,
}

impl Runner {
    /// Create a runner with the default tick interval.
    pub fn new(flavour: Flavour) -> Self {
        Self::builder().flavour(flavour).build()
    }

    pub fn builder() -> RunnerBuilder {
        RunnerBuilder::default()
    }

    pub fn flavour(&self) -> Flavour {
        self.flavour
    }

    pub fn tick(&self) -> Duration {
        self.shared.tick
    }

    pub fn state(&self) -> State {
        self.shared.lifecycle.current()
    }

    /// Register `payload` for asynchronous execution as soon as possible.
    ///
    /// The payload runs as an orphaned background task. It is an error for it to
    /// resolve to anything but `()`: a value is reported as an
    /// [`OrphanedReturn`](crate::OrphanedReturn) and, like any failure, aborts
    /// the runner.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Shutdown`] once the runner has stopped.
    pub fn register_payload<F, Fut, T>(&self, payload: F) -> Result<(), RunnerError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
        T: fmt::Debug + Send + 'static,
    {
        self.shared.submit(payload::orphaned(payload))
    }

    /// Run `payload` on the loop and block the calling thread until it completes.
    ///
    /// The payload's value or failure is delivered to this caller only; a
    /// failure here never affects the runner itself.
    ///
    /// This must not be called from inside the runner's own loop, or from any
    /// other asynchronous context, since it blocks the current thread.
    ///
    /// # Errors
    ///
    /// - [`RunnerError::Payload`] if the payload failed or panicked.
    /// - [`RunnerError::Cancelled`] if the runner stopped before the payload completed.
    /// - [`RunnerError::Shutdown`] if the runner had already stopped.
    pub fn run_payload<F, Fut, T>(&self, payload: F) -> Result<T, RunnerError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let (wrapped, outcome) = payload::tracked(payload);
        self.shared.submit(wrapped)?;
        match outcome.blocking_recv() {
            Ok(result) => result.map_err(RunnerError::Payload),
            Err(_) => Err(RunnerError::Cancelled),
        }
    }

    /// Execute all current and future payloads until stopped.
    ///
    /// Blocks the calling thread. Returns `Ok(())` after [`Runner::stop`], or the
    /// failure of the first fire-and-forget payload that failed, after all other
    /// payloads have been cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Rerun`] if the runner is already running or has
    /// run before; a runner can only be run once. A runner stopped before it
    /// was ever started returns `Ok(())` right away.
    pub fn run(&self) -> Result<(), RunnerError> {
        if !self.shared.lifecycle.begin()? {
            debug!(flavour = %self.flavour, "runner was stopped before it started");
            return Ok(());
        }
        let _ = self.shared.loop_thread.set(thread::current().id());
        info!(flavour = %self.flavour, tick_ms = self.shared.tick.as_millis() as u64, "runner started");

        let outcome = self.drive();

        let discarded = self.shared.close();
        self.shared.lifecycle.finish();
        if !discarded.is_empty() {
            debug!(discarded = discarded.len(), "discarded payloads queued at shutdown");
        }
        drop(discarded);

        match &outcome {
            Ok(()) => info!(flavour = %self.flavour, "runner stopped"),
            Err(error) => error!(flavour = %self.flavour, error = %error, "runner aborted"),
        }
        outcome
    }

    /// Request the loop to end without waiting for it.
    ///
    /// A runner that was never started moves straight to [`State::Stopped`].
    pub fn request_stop(&self) -> State {
        let mut discarded = Vec::new();
        let previous = self.shared.lifecycle.stop_if_idle(|| discarded = self.shared.close());
        // queued payloads may hold values touching this runner when dropped
        drop(discarded);
        if previous == State::Running {
            self.shared.shutdown.cancel();
        }
        previous
    }

    /// Stop execution of all current and future payloads.
    ///
    /// Cancels every running payload and blocks until the loop has drained and
    /// exited. Calling it repeatedly, or on a runner that never ran, is safe.
    /// When called from a payload on the runner's own loop, shutdown is only
    /// requested, since waiting there could never finish.
    pub fn stop(&self) {
        match self.request_stop() {
            State::Idle => debug!(flavour = %self.flavour, "runner stopped before it was started"),
            State::Stopped => {}
            State::Running => {
                if self.shared.loop_thread.get() == Some(&thread::current().id()) {
                    debug!(flavour = %self.flavour, "stop requested from the runner loop");
                    return;
                }
                self.shared.lifecycle.wait_stopped();
            }
        }
    }

    fn drive(&self) -> Result<(), RunnerError> {
        let executor = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
        let shared = &self.shared;
        let outcome = executor.block_on(async move {
            match self.flavour {
                Flavour::EventLoop => backend::event_loop::await_all(shared).await,
                Flavour::Scope => backend::scope::await_all(shared).await,
            }
        });
        // blocking threads may still be waiting in `stop` for this loop to finish
        executor.shutdown_background();
        outcome
    }
}

impl Default for Runner {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl fmt::Debug for Runner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runner")
            .field("flavour", &self.flavour)
            .field("state", &self.state())
            .field("pending", &self.shared.queue().payloads.len())
            .finish()
    }
}

/// State shared between submitters and the scheduling loop.
pub(crate) struct Shared {
    queue: Mutex<Queue>,
    lifecycle: Lifecycle,
    shutdown: CancellationToken,
    loop_thread: OnceCell<ThreadId>,
    tick: Duration,
}

#[derive(Default)]
struct Queue {
    payloads: Vec<Payload>,
    closed: bool,
}

impl Shared {
    fn new(tick: Duration) -> Self {
        Self {
            queue: Mutex::new(Queue::default()),
            lifecycle: Lifecycle::new(),
            shutdown: CancellationToken::new(),
            loop_thread: OnceCell::new(),
            tick,
        }
    }

    pub(crate) fn tick(&self) -> Duration {
        self.tick
    }

    pub(crate) fn shutdown(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Take every pending payload, leaving the queue empty.
    pub(crate) fn drain(&self) -> Vec<Payload> {
        std::mem::take(&mut self.queue().payloads)
    }

    fn submit(&self, payload: Payload) -> Result<(), RunnerError> {
        let mut queue = self.queue();
        if queue.closed {
            return Err(RunnerError::Shutdown);
        }
        queue.payloads.push(payload);
        Ok(())
    }

    /// Refuse further submissions and hand back whatever is still queued.
    ///
    /// The caller drops the returned payloads outside of any lock.
    fn close(&self) -> Vec<Payload> {
        let mut queue = self.queue();
        queue.closed = true;
        std::mem::take(&mut queue.payloads)
    }

    fn queue(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
