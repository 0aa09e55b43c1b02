//! Structured Logging Setup
//!
//! Builds the `tracing` subscriber from the `[logging]` config section.
//! `RUST_LOG` takes precedence over the configured level; `--verbose` raises
//! the default to DEBUG. Output goes to stderr so command output on stdout
//! stays clean.

use anyhow::{Context, Result};
use tracing::{Level, Subscriber};
use tracing_subscriber::{fmt, fmt::MakeWriter, EnvFilter};

use crate::config::LoggingConfig;

/// Filter with the configured level as default directive
pub fn env_filter(config: &LoggingConfig, verbose: bool) -> EnvFilter {
    let default = if verbose {
        Level::DEBUG
    } else {
        config.tracing_level().unwrap_or(Level::INFO)
    };
    EnvFilter::builder()
        .with_default_directive(default.into())
        .from_env_lossy()
}

/// Build a subscriber writing to `writer` in the configured format
pub fn build_subscriber<W>(
    config: &LoggingConfig,
    verbose: bool,
    writer: W,
) -> Box<dyn Subscriber + Send + Sync>
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let builder = fmt()
        .with_env_filter(env_filter(config, verbose))
        .with_writer(writer);

    match config.format.to_lowercase().as_str() {
        "json" => Box::new(builder.json().finish()),
        "pretty" => Box::new(builder.pretty().finish()),
        _ => Box::new(builder.compact().finish()),
    }
}

/// Install the global subscriber
pub fn init(config: &LoggingConfig, verbose: bool) -> Result<()> {
    let subscriber = build_subscriber(config, verbose, std::io::stderr);
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to initialize logging")?;
    Ok(())
}
