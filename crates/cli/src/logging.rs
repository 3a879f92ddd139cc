//! Logging setup (tracing-subscriber)
//!
//! `RUST_LOG` wins when set; otherwise the level comes from the `-v` count.

use anyhow::Result;
use clap::ValueEnum;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable, colored
    Pretty,
    /// One JSON object per line
    Json,
}

/// Level for a `-v` count: 0 info, 1 debug, 2+ trace
pub fn level_for(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Filter directives covering the library crates and this binary
pub fn default_directives(verbosity: u8) -> String {
    let level = level_for(verbosity);
    format!("stackcompose={level},stack_compose={level}")
}

pub fn init(verbosity: u8, format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directives(verbosity)))?;

    // Logs go to stderr so generated files on stdout stay clean
    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()?,
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()?,
    }

    Ok(())
}
