use std::{env, path::PathBuf, sync::Arc, thread, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use loadtide_config::{LogFormat, Translator, load_configuration, load_document, logging};
use loadtide_runtime::{Flavour, Runner};
use tracing::{error, info, warn};

mod builtins;

/// Balance the demand of resource pools.
#[derive(Debug, Parser)]
#[command(name = "loadtide", version, about)]
struct Args {
    /// Path to the configuration document (YAML, or JSON with a `.json` extension).
    #[arg(value_name = "CONFIGURATION")]
    configuration: PathBuf,

    /// Default log level, used unless RUST_LOG is set.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Format of log lines.
    #[arg(long, value_enum, default_value_t = LogStyle::Full)]
    log_format: LogStyle,

    /// Backend driving the runner.
    #[arg(long, value_enum, default_value_t = RunnerKind::EventLoop)]
    runner: RunnerKind,

    /// Interval in milliseconds at which the runner picks up new payloads.
    #[arg(long, default_value_t = 1000)]
    tick_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogStyle {
    Full,
    Compact,
}

impl From<LogStyle> for LogFormat {
    fn from(style: LogStyle) -> Self {
        match style {
            LogStyle::Full => LogFormat::Full,
            LogStyle::Compact => LogFormat::Compact,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum RunnerKind {
    EventLoop,
    Scope,
}

impl From<RunnerKind> for Flavour {
    fn from(kind: RunnerKind) -> Self {
        match kind {
            RunnerKind::EventLoop => Flavour::EventLoop,
            RunnerKind::Scope => Flavour::Scope,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(&args.log_level, args.log_format.into()).context("cannot initialise logging")?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        os = env::consts::OS,
        arch = env::consts::ARCH,
        "starting loadtide"
    );

    let runner = Arc::new(
        Runner::builder()
            .flavour(args.runner.into())
            .tick(Duration::from_millis(args.tick_ms))
            .build(),
    );
    let translator = Translator::new(builtins::registry()?);
    let plugins = builtins::plugins(translator, Arc::clone(&runner));

    info!(path = %args.configuration.display(), "loading configuration");
    let document = load_document(&args.configuration)?;
    load_configuration(document, &plugins)?;

    stop_on_interrupt(Arc::clone(&runner));
    if let Err(failure) = runner.run() {
        error!(error = %format!("{failure:#}"), "daemon aborted");
        return Err(failure.into());
    }
    info!("daemon stopped");
    Ok(())
}

/// Stop `runner` on the first interrupt signal.
fn stop_on_interrupt(runner: Arc<Runner>) {
    let spawned = thread::Builder::new().name("loadtide-signals".into()).spawn(move || {
        let signals = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
            Ok(signals) => signals,
            Err(failure) => {
                warn!(error = %failure, "cannot listen for interrupts");
                return;
            }
        };
        match signals.block_on(tokio::signal::ctrl_c()) {
            Ok(()) => {
                info!("interrupt received, stopping");
                runner.stop();
            }
            Err(failure) => warn!(error = %failure, "cannot listen for interrupts"),
        }
    });
    if let Err(failure) = spawned {
        warn!(error = %failure, "cannot spawn the interrupt handler");
    }
}
