//! Tracing and logging setup.
//!
//! Logs always go to stderr; stdout carries the JSON notification stream.

use tracing_subscriber::{
    layer::SubscriberExt, util::SubscriberInitExt, util::TryInitError, EnvFilter,
};

/// Tracing output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum TracingFormat {
    /// Human-readable, multi-line.
    #[default]
    Pretty,

    /// One line per event.
    Compact,

    /// Newline-delimited JSON.
    Json,
}

/// Tracing configuration.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Log level filter.
    ///
    /// If None, uses RUST_LOG or defaults to "info".
    pub level: Option<tracing::Level>,

    pub format: TracingFormat,

    /// Include timestamps in output.
    pub timestamps: bool,

    /// Include target module names in output.
    pub target: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: None,
            format: TracingFormat::Pretty,
            timestamps: true,
            target: true,
        }
    }
}

impl TracingConfig {
    /// Config for `-v` repeated `verbosity` times
    ///
    /// No flag defers to RUST_LOG; one raises to debug, two or more to
    /// trace.
    pub fn from_verbosity(verbosity: u8, format: TracingFormat) -> Self {
        let level = match verbosity {
            0 => None,
            1 => Some(tracing::Level::DEBUG),
            _ => Some(tracing::Level::TRACE),
        };
        Self {
            level,
            format,
            ..Self::default()
        }
    }

    fn filter(&self) -> EnvFilter {
        match self.level {
            Some(level) => EnvFilter::new(level.to_string()),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        }
    }
}

/// Install the global subscriber.
///
/// Fails if a subscriber is already installed.
pub fn init_subscriber(config: &TracingConfig) -> Result<(), TryInitError> {
    let registry = tracing_subscriber::registry().with(config.filter());
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(config.target);

    match (config.format, config.timestamps) {
        (TracingFormat::Pretty, true) => registry.with(layer.pretty()).try_init(),
        (TracingFormat::Pretty, false) => registry.with(layer.pretty().without_time()).try_init(),
        (TracingFormat::Compact, true) => registry.with(layer.compact()).try_init(),
        (TracingFormat::Compact, false) => {
            registry.with(layer.compact().without_time()).try_init()
        }
        (TracingFormat::Json, true) => registry.with(layer.json()).try_init(),
        (TracingFormat::Json, false) => registry.with(layer.json().without_time()).try_init(),
    }
}
