//! The `logging` section and the process-wide tracing subscriber.
//!
//! The subscriber's [`EnvFilter`] sits behind a reload layer so that a
//! configuration document can adjust levels after startup. Directives from a
//! `logging` section are merged over the active ones unless the section sets
//! `disable_existing_loggers: true`.

use std::{
    env,
    sync::{Mutex, PoisonError},
};

use anyhow::{Context, anyhow, bail};
use indexmap::IndexMap;
use once_cell::sync::OnceCell;
use serde::Deserialize;
use tracing::info;
use tracing_subscriber::{EnvFilter, Registry, fmt, layer::SubscriberExt, reload, util::SubscriberInitExt};

use crate::node::Node;

const DEFAULT_LEVEL: &str = "info";

static CONTROL: OnceCell<LogControl> = OnceCell::new();

/// Output format of log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Full,
    Compact,
}

/// Contents of a `logging` section.
///
/// Keys other than those below (handlers, formatters, ...) are accepted and
/// ignored.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub version: Option<u32>,
    pub disable_existing_loggers: bool,
    pub root: Option<LoggerConfig>,
    pub loggers: IndexMap<String, LoggerConfig>,
}

/// Configuration of a single logger: either a bare level or a mapping.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LoggerConfig {
    Level(String),
    Detailed {
        #[serde(default)]
        level: Option<String>,
    },
}

impl LoggerConfig {
    pub fn level(&self) -> Option<&str> {
        match self {
            LoggerConfig::Level(level) => Some(level),
            LoggerConfig::Detailed { level } => level.as_deref(),
        }
    }
}

/// Filter directives, split into the default level and per-target levels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Directives {
    root: Option<String>,
    targets: IndexMap<String, String>,
}

impl Directives {
    /// Parse a `RUST_LOG` style directive list.
    pub fn parse(spec: &str) -> Self {
        let mut directives = Self::default();
        for directive in spec.split(',').map(str::trim).filter(|d| !d.is_empty()) {
            match directive.rsplit_once('=') {
                Some((target, level)) => {
                    directives.targets.insert(target.trim().to_string(), level.trim().to_string());
                }
                None => directives.root = Some(directive.to_string()),
            }
        }
        directives
    }

    pub fn root(&self) -> Option<&str> {
        self.root.as_deref()
    }

    pub fn target(&self, target: &str) -> Option<&str> {
        self.targets.get(target).map(String::as_str)
    }

    /// Merge a `logging` section into these directives.
    ///
    /// Dotted logger names become `::` separated targets. `NOTSET` on a
    /// logger removes its directive so it inherits the default level.
    pub fn apply(&mut self, config: &LoggingConfig) -> anyhow::Result<()> {
        if config.disable_existing_loggers {
            self.targets.clear();
        }
        if let Some(level) = config.root.as_ref().and_then(LoggerConfig::level) {
            self.root = Some(level_directive(level)?.to_string());
        }
        for (name, logger) in &config.loggers {
            let Some(level) = logger.level() else {
                continue;
            };
            let target = name.replace('.', "::");
            if level.eq_ignore_ascii_case("notset") {
                self.targets.shift_remove(&target);
                continue;
            }
            let level = level_directive(level).with_context(|| format!("logger '{name}'"))?;
            self.targets.insert(target, level.to_string());
        }
        Ok(())
    }

    /// Render as an [`EnvFilter`] directive string.
    pub fn render(&self) -> String {
        self.root
            .iter()
            .cloned()
            .chain(self.targets.iter().map(|(target, level)| format!("{target}={level}")))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Translate a level name into a filter directive level.
///
/// Accepts the `logging` vocabulary (`WARNING`, `CRITICAL`, `NOTSET`, ...) as
/// well as tracing's own names, case-insensitively.
pub fn level_directive(level: &str) -> anyhow::Result<&'static str> {
    Ok(match level.trim().to_ascii_lowercase().as_str() {
        "notset" | "trace" => "trace",
        "debug" => "debug",
        "info" => "info",
        "warning" | "warn" => "warn",
        "error" | "critical" | "fatal" => "error",
        "off" => "off",
        other => bail!("unknown log level '{other}'"),
    })
}

struct LogControl {
    handle: reload::Handle<EnvFilter, Registry>,
    directives: Mutex<Directives>,
}

impl LogControl {
    fn apply(&self, config: &LoggingConfig) -> anyhow::Result<()> {
        let mut directives = self.directives.lock().unwrap_or_else(PoisonError::into_inner);
        let mut updated = directives.clone();
        updated.apply(config)?;
        let rendered = updated.render();
        let filter = EnvFilter::try_new(&rendered).with_context(|| format!("invalid log filter '{rendered}'"))?;
        self.handle.reload(filter).context("cannot reload log filter")?;
        *directives = updated;
        info!(filter = %rendered, "applied logging configuration");
        Ok(())
    }
}

/// Install the process-wide subscriber.
///
/// `RUST_LOG` takes precedence over `default_level`. Fails if a global
/// subscriber is already installed.
pub fn init(default_level: &str, format: LogFormat) -> anyhow::Result<()> {
    install(initial_directives(default_level)?, format)
}

/// Apply a `logging` section to the process-wide subscriber.
///
/// When no subscriber was installed through [`init`], one is installed with
/// the section merged over the environment's directives. Fails if a foreign
/// global subscriber leaves no way to apply the section.
pub fn configure_logging(section: Node) -> anyhow::Result<()> {
    let config: LoggingConfig = if section.is_null() {
        LoggingConfig::default()
    } else {
        section.deserialize_into().context("malformed logging section")?
    };
    match config.version {
        None | Some(1) => {}
        Some(other) => bail!("unsupported logging configuration version {other}"),
    }

    if let Some(control) = CONTROL.get() {
        return control.apply(&config);
    }
    let mut directives = initial_directives(DEFAULT_LEVEL)?;
    directives.apply(&config)?;
    match install(directives, LogFormat::default()) {
        Ok(()) => Ok(()),
        // another thread installed the reloadable subscriber first
        Err(_) if CONTROL.get().is_some() => configure_logging_with(&config),
        Err(error) => Err(error.context("logging section not applied: no reloadable subscriber")),
    }
}

fn configure_logging_with(config: &LoggingConfig) -> anyhow::Result<()> {
    CONTROL
        .get()
        .ok_or_else(|| anyhow!("logging is not initialised"))?
        .apply(config)
}

/// The filter currently applied by the reloadable subscriber.
pub fn active_filter() -> Option<String> {
    CONTROL
        .get()
        .map(|control| control.directives.lock().unwrap_or_else(PoisonError::into_inner).render())
}

fn initial_directives(default_level: &str) -> anyhow::Result<Directives> {
    let mut directives = env::var("RUST_LOG").map(|spec| Directives::parse(&spec)).unwrap_or_default();
    if directives.root.is_none() {
        directives.root = Some(level_directive(default_level)?.to_string());
    }
    Ok(directives)
}

fn install(directives: Directives, format: LogFormat) -> anyhow::Result<()> {
    let rendered = directives.render();
    let filter = EnvFilter::try_new(&rendered).with_context(|| format!("invalid log filter '{rendered}'"))?;
    let (filter, handle) = reload::Layer::new(filter);
    let (full, compact) = match format {
        LogFormat::Full => (Some(fmt::layer()), None),
        LogFormat::Compact => (None, Some(fmt::layer().compact())),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(full)
        .with(compact)
        .try_init()
        .context("a global tracing subscriber is already installed")?;
    CONTROL
        .set(LogControl {
            handle,
            directives: Mutex::new(directives),
        })
        .map_err(|_| anyhow!("logging is already initialised"))
}
