//! Tracing subscriber setup shared by the binaries.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use crate::config::LoggingConfig;

/// Filter directives for `config`. `verbose` raises the base level to debug.
pub fn filter_directives(config: &LoggingConfig, verbose: bool) -> String {
    let base = if verbose {
        "debug"
    } else {
        config.level.as_deref().unwrap_or("info")
    };
    std::iter::once(base.to_string())
        .chain(config.filters.iter().cloned())
        .collect::<Vec<_>>()
        .join(",")
}

/// Install the global subscriber. `RUST_LOG` overrides the configured filter.
pub fn init(config: &LoggingConfig, verbose: bool) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(filter_directives(config, verbose))?,
    };

    let writer = if config.output == "stdout" {
        BoxMakeWriter::new(std::io::stdout)
    } else {
        BoxMakeWriter::new(std::io::stderr)
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer);

    if config.format == "json" {
        builder
            .json()
            .try_init()
            .map_err(|e| anyhow::anyhow!("failed to install subscriber: {e}"))
    } else {
        builder
            .try_init()
            .map_err(|e| anyhow::anyhow!("failed to install subscriber: {e}"))
    }
}
