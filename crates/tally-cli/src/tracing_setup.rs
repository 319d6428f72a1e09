//! Logging setup for the `tally` binary
//!
//! Library crates only emit `tracing` events. This module installs the one
//! subscriber, writing to stderr so stdout stays clean JSON.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when neither `--log-level` nor `RUST_LOG` is given
pub const DEFAULT_FILTER: &str = "tally_core=info,tally_cli=info";

#[derive(Debug, Clone, Default)]
pub struct TracingConfig {
    /// Explicit filter directive; overrides `RUST_LOG`
    pub level: Option<String>,
    /// Emit one JSON object per event instead of human-readable lines
    pub json: bool,
}

/// Resolve the filter: explicit level, then `RUST_LOG`, then the default
pub fn env_filter(level: Option<&str>) -> anyhow::Result<EnvFilter> {
    match level {
        Some(level) => Ok(EnvFilter::try_new(level)?),
        None => Ok(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into())),
    }
}

/// Install the global subscriber
pub fn init_tracing(config: &TracingConfig) -> anyhow::Result<()> {
    let filter = env_filter(config.level.as_deref())?;
    let registry = tracing_subscriber::registry().with(filter);

    if config.json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()?;
    }
    Ok(())
}
