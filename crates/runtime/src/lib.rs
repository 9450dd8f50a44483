//! # Loadtide Runtime
//!
//! A cancellable runner for background payloads. A [`Runner`] owns a queue of
//! submitted payloads and a cooperative scheduling loop that turns them into
//! tasks on a single-threaded tokio executor.
//!
//! ## Submission modes
//!
//! - [`Runner::register_payload`]: fire-and-forget. The payload must resolve to
//!   `()`. Any failure, including an [`OrphanedReturn`], is fatal: the runner
//!   cancels every other payload and [`Runner::run`] returns the failure.
//! - [`Runner::run_payload`]: tracked. The calling thread blocks until the
//!   payload completes and receives its value or failure; the runner is unaffected.
//!
//! ## Flavours
//!
//! - [`Flavour::EventLoop`]: payloads are individual task handles, aborted one by one.
//! - [`Flavour::Scope`]: payloads are children of a single cancellation scope.

mod backend;
mod error;
mod lifecycle;
mod payload;
mod runner;

pub use error::{OrphanedReturn, RunnerError};
pub use lifecycle::State;
pub use runner::{DEFAULT_TICK, Flavour, Runner, RunnerBuilder};
