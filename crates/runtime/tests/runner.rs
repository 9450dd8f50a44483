use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
        mpsc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use anyhow::anyhow;
use loadtide_runtime::{Flavour, OrphanedReturn, Runner, RunnerError, State};

const FLAVOURS: [Flavour; 2] = [Flavour::EventLoop, Flavour::Scope];

fn fast_runner(flavour: Flavour) -> Arc<Runner> {
    Arc::new(Runner::builder().flavour(flavour).tick(Duration::from_millis(5)).build())
}

fn spawn_driver(runner: &Arc<Runner>) -> JoinHandle<Result<(), RunnerError>> {
    let runner = Arc::clone(runner);
    thread::spawn(move || runner.run())
}

fn wait_until(description: &str, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {description}");
        thread::sleep(Duration::from_millis(2));
    }
}

/// Counts how many payloads started and how many were torn down.
#[derive(Default)]
struct Tally {
    started: AtomicUsize,
    dropped: AtomicUsize,
}

struct DropGuard(Arc<Tally>);

impl Drop for DropGuard {
    fn drop(&mut self) {
        self.0.dropped.fetch_add(1, Ordering::SeqCst);
    }
}

fn register_forever(runner: &Runner, tally: &Arc<Tally>) {
    let tally = Arc::clone(tally);
    runner
        .register_payload(move || async move {
            let _guard = DropGuard(Arc::clone(&tally));
            tally.started.fetch_add(1, Ordering::SeqCst);
            std::future::pending::<()>().await;
            Ok(())
        })
        .expect("register long-running payload");
}

#[test]
fn orphaned_return_aborts_run_and_cancels_siblings() {
    for flavour in FLAVOURS {
        let runner = fast_runner(flavour);
        let tally = Arc::new(Tally::default());
        register_forever(&runner, &tally);
        register_forever(&runner, &tally);
        runner
            .register_payload(|| async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(42_u32)
            })
            .expect("register orphaning payload");

        let error = runner.run().expect_err("orphaned return is fatal");

        let RunnerError::Aborted { source } = &error else {
            panic!("[{flavour}] expected abort, got {error:?}");
        };
        let orphan = source.downcast_ref::<OrphanedReturn>().expect("orphaned return cause");
        assert_eq!(orphan.value, "42");
        assert_eq!(tally.started.load(Ordering::SeqCst), 2, "[{flavour}] siblings should have started");
        assert_eq!(tally.dropped.load(Ordering::SeqCst), 2, "[{flavour}] siblings should be cancelled");
        assert_eq!(runner.state(), State::Stopped);
    }
}

#[test]
fn failed_payload_aborts_run_with_underlying_cause() {
    for flavour in FLAVOURS {
        let runner = fast_runner(flavour);
        runner
            .register_payload(|| async { Err::<(), _>(anyhow!("disk on fire")) })
            .expect("register failing payload");

        let error = runner.run().expect_err("failure is fatal");

        let RunnerError::Aborted { source } = &error else {
            panic!("[{flavour}] expected abort, got {error:?}");
        };
        assert_eq!(source.to_string(), "disk on fire");
    }
}

#[test]
fn panicking_payload_aborts_run() {
    for flavour in FLAVOURS {
        let runner = fast_runner(flavour);
        runner
            .register_payload(|| async {
                if true {
                    panic!("payload exploded");
                }
                Ok(())
            })
            .expect("register panicking payload");

        let error = runner.run().expect_err("panic is fatal");

        assert!(
            matches!(&error, RunnerError::Panicked { message } if message.contains("payload exploded")),
            "[{flavour}] unexpected error: {error:?}"
        );
    }
}

#[test]
fn run_payload_failure_is_isolated_from_the_loop() {
    for flavour in FLAVOURS {
        let runner = fast_runner(flavour);
        let driver = spawn_driver(&runner);

        let error = runner
            .run_payload(|| async { Err::<u32, _>(anyhow!("only for the caller")) })
            .expect_err("failure reaches the caller");
        assert!(matches!(&error, RunnerError::Payload(cause) if cause.to_string() == "only for the caller"));

        let error = runner
            .run_payload(|| async {
                if true {
                    panic!("caller-only panic");
                }
                Ok(())
            })
            .expect_err("panic reaches the caller");
        assert!(error.to_string().contains("caller-only panic"), "[{flavour}] unexpected: {error}");

        let value = runner
            .run_payload(|| async { Ok(String::from("still running")) })
            .expect("loop keeps serving payloads");
        assert_eq!(value, "still running");
        assert_eq!(runner.state(), State::Running);

        runner.stop();
        driver.join().expect("driver thread").expect("clean stop");
    }
}

#[test]
fn run_payload_from_many_threads() {
    for flavour in FLAVOURS {
        let runner = fast_runner(flavour);
        let driver = spawn_driver(&runner);

        let callers: Vec<_> = (0..8_u64)
            .map(|index| {
                let runner = Arc::clone(&runner);
                thread::spawn(move || {
                    runner.run_payload(move || async move {
                        tokio::time::sleep(Duration::from_millis(index)).await;
                        Ok(index * 2)
                    })
                })
            })
            .collect();

        let mut results: Vec<u64> = callers
            .into_iter()
            .map(|caller| caller.join().expect("caller thread").expect("payload value"))
            .collect();
        results.sort_unstable();
        assert_eq!(results, vec![0, 2, 4, 6, 8, 10, 12, 14], "[{flavour}]");

        runner.stop();
        driver.join().expect("driver thread").expect("clean stop");
    }
}

#[test]
fn stop_waits_for_all_outstanding_payloads() {
    for flavour in FLAVOURS {
        let runner = fast_runner(flavour);
        let tally = Arc::new(Tally::default());
        let driver = spawn_driver(&runner);
        for _ in 0..5 {
            register_forever(&runner, &tally);
        }
        wait_until("payloads to start", || tally.started.load(Ordering::SeqCst) == 5);

        runner.stop();

        assert_eq!(tally.dropped.load(Ordering::SeqCst), 5, "[{flavour}] every payload is torn down before stop returns");
        assert_eq!(runner.state(), State::Stopped);
        driver.join().expect("driver thread").expect("stop is not an error");
    }
}

#[test]
fn stop_is_safe_to_repeat() {
    for flavour in FLAVOURS {
        let runner = fast_runner(flavour);
        let driver = spawn_driver(&runner);
        wait_until("runner to start", || runner.state() == State::Running);

        runner.stop();
        runner.stop();

        driver.join().expect("driver thread").expect("clean stop");
        assert_eq!(runner.state(), State::Stopped);
    }
}

#[test]
fn stop_from_inside_a_payload_ends_the_loop() {
    for flavour in FLAVOURS {
        let runner = fast_runner(flavour);
        let handle = Arc::clone(&runner);
        runner
            .register_payload(move || async move {
                handle.stop();
                Ok(())
            })
            .expect("register stopping payload");

        runner.run().expect("self-stopped runner ends cleanly");
        assert_eq!(runner.state(), State::Stopped);
    }
}

#[test]
fn runner_cannot_be_run_twice() {
    for flavour in FLAVOURS {
        let runner = fast_runner(flavour);
        let driver = spawn_driver(&runner);
        wait_until("runner to start", || runner.state() == State::Running);

        let error = runner.run().expect_err("concurrent run is rejected");
        assert!(matches!(error, RunnerError::Rerun { state: State::Running }), "[{flavour}] {error:?}");

        runner.stop();
        driver.join().expect("driver thread").expect("clean stop");

        let error = runner.run().expect_err("re-run is rejected");
        assert!(matches!(error, RunnerError::Rerun { state: State::Stopped }), "[{flavour}] {error:?}");
    }
}

#[test]
fn submissions_after_shutdown_are_rejected() {
    for flavour in FLAVOURS {
        let runner = fast_runner(flavour);
        let driver = spawn_driver(&runner);
        wait_until("runner to start", || runner.state() == State::Running);
        runner.stop();
        driver.join().expect("driver thread").expect("clean stop");

        let error = runner.register_payload(|| async { Ok(()) }).expect_err("closed runner");
        assert!(matches!(error, RunnerError::Shutdown));
        let error = runner.run_payload(|| async { Ok(1) }).expect_err("closed runner");
        assert!(matches!(error, RunnerError::Shutdown));
    }
}

#[test]
fn pending_tracked_payload_is_cancelled_by_stop() {
    for flavour in FLAVOURS {
        let runner = fast_runner(flavour);
        let driver = spawn_driver(&runner);

        let waiter = {
            let runner = Arc::clone(&runner);
            thread::spawn(move || {
                runner.run_payload(|| async {
                    std::future::pending::<()>().await;
                    Ok(())
                })
            })
        };
        thread::sleep(Duration::from_millis(50));
        runner.stop();

        let error = waiter.join().expect("waiter thread").expect_err("payload never finished");
        assert!(matches!(error, RunnerError::Cancelled), "[{flavour}] {error:?}");
        driver.join().expect("driver thread").expect("clean stop");
    }
}

#[test]
fn stop_from_a_blocking_thread_lets_run_return() {
    for flavour in FLAVOURS {
        let runner = fast_runner(flavour);
        let handle = Arc::clone(&runner);
        runner
            .register_payload(move || async move {
                tokio::task::spawn_blocking(move || handle.stop());
                std::future::pending::<()>().await;
                Ok(())
            })
            .expect("register payload stopping from the blocking pool");

        let driver = spawn_driver(&runner);
        wait_until("runner to stop", || runner.state() == State::Stopped);
        driver.join().expect("driver thread").expect("clean stop");
    }
}

/// Reads the runner's state when dropped.
struct Peek {
    runner: Arc<Runner>,
    seen: Arc<AtomicUsize>,
}

impl Drop for Peek {
    fn drop(&mut self) {
        let _ = self.runner.state();
        self.seen.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn queued_payloads_may_touch_the_runner_when_discarded() {
    for flavour in FLAVOURS {
        let runner = fast_runner(flavour);
        let seen = Arc::new(AtomicUsize::new(0));
        let peek = Peek {
            runner: Arc::clone(&runner),
            seen: Arc::clone(&seen),
        };
        runner
            .register_payload(move || async move {
                drop(peek);
                Ok(())
            })
            .expect("queue while idle");

        let (done, stopped) = mpsc::channel();
        let stopper = {
            let runner = Arc::clone(&runner);
            thread::spawn(move || {
                runner.stop();
                let _ = done.send(());
            })
        };

        stopped
            .recv_timeout(Duration::from_secs(5))
            .unwrap_or_else(|_| panic!("[{flavour}] stop did not return"));
        stopper.join().expect("stopper thread");
        assert_eq!(seen.load(Ordering::SeqCst), 1, "[{flavour}] queued payload was discarded");
        assert_eq!(runner.state(), State::Stopped);
    }
}

#[test]
fn run_after_stop_on_a_fresh_runner_returns_immediately() {
    for flavour in FLAVOURS {
        let runner = fast_runner(flavour);
        runner.stop();

        runner.run().expect("a runner stopped before starting has nothing to run");
        assert_eq!(runner.state(), State::Stopped);
    }
}

struct PanicOnDrop;

impl Drop for PanicOnDrop {
    fn drop(&mut self) {
        panic!("payload torn down badly");
    }
}

#[test]
fn panics_while_cancelling_do_not_disturb_stop() {
    for flavour in FLAVOURS {
        let runner = fast_runner(flavour);
        let started = Arc::new(AtomicUsize::new(0));
        let marker = Arc::clone(&started);
        runner
            .register_payload(move || async move {
                let _guard = PanicOnDrop;
                marker.fetch_add(1, Ordering::SeqCst);
                std::future::pending::<()>().await;
                Ok(())
            })
            .expect("register payload");
        let driver = spawn_driver(&runner);
        wait_until("payload to start", || started.load(Ordering::SeqCst) == 1);

        runner.stop();

        driver.join().expect("driver thread").expect("shutdown panics are not fatal");
        assert_eq!(runner.state(), State::Stopped);
    }
}
