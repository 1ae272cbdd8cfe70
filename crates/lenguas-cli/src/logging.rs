//! Tracing subscriber setup from the `logging` config section.

use anyhow::Context;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use lenguas_core::config::LoggingConfig;

/// Build the filter: `RUST_LOG` wins, then the configured level and
/// per-target filters.
pub fn env_filter(config: &LoggingConfig, verbose: bool) -> anyhow::Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let level = if verbose {
        "debug"
    } else {
        config.level.as_deref().unwrap_or("info")
    };
    let mut filter = EnvFilter::try_new(level).with_context(|| format!("invalid log level '{level}'"))?;
    for directive in &config.filters {
        filter = filter.add_directive(
            directive
                .parse()
                .with_context(|| format!("invalid log filter '{directive}'"))?,
        );
    }
    Ok(filter)
}

pub fn init(config: &LoggingConfig, verbose: bool) -> anyhow::Result<()> {
    let filter = env_filter(config, verbose)?;
    let writer = match config.output.as_str() {
        "stdout" => BoxMakeWriter::new(std::io::stdout),
        _ => BoxMakeWriter::new(std::io::stderr),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer);

    let result = if config.format == "json" {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))
}
