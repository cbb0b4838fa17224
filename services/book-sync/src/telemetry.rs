//! Tracing subscriber setup for binaries.
//!
//! Library code only emits events; a binary calls `init_tracing` once.
//!
//! - `RUST_LOG`: filter directives (falls back to the given default level)
//! - `LOG_FORMAT`: `pretty` (default), `compact` or `json`

use std::env;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{fmt, EnvFilter};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

impl LogFormat {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "json" => LogFormat::Json,
            "compact" => LogFormat::Compact,
            _ => LogFormat::Pretty,
        }
    }

    /// Format named by `LOG_FORMAT`, or the default.
    pub fn from_env() -> Self {
        env::var("LOG_FORMAT")
            .map(|s| Self::parse(&s))
            .unwrap_or_default()
    }
}

/// Install the global subscriber.
///
/// Fails if a subscriber is already installed.
pub fn init_tracing(default_level: &str) -> Result<(), TryInitError> {
    init_with_format(default_level, LogFormat::from_env())
}

pub fn init_with_format(default_level: &str, format: LogFormat) -> Result<(), TryInitError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let registry = tracing_subscriber::registry().with(env_filter);

    match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(false))
            .try_init(),
        LogFormat::Compact => registry
            .with(fmt::layer().compact().with_target(false))
            .try_init(),
        LogFormat::Pretty => registry.with(fmt::layer()).try_init(),
    }
}
