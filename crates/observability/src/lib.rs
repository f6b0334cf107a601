// crates/observability/src/lib.rs
//! Tracing setup shared by the opwatch binaries.
//!
//! Logs go to stderr so stdout stays free for command output (`--json`).

use std::str::FromStr;

use anyhow::anyhow;
use tracing_subscriber::EnvFilter;

/// Env var selecting the log line format.
pub const LOG_FORMAT_ENV: &str = "OPWATCH_LOG_FORMAT";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "compact" | "text" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(anyhow!("unknown log format {other:?}, expected compact or json")),
        }
    }
}

impl LogFormat {
    /// Format from `OPWATCH_LOG_FORMAT`, compact when unset or invalid.
    pub fn from_env() -> Self {
        std::env::var(LOG_FORMAT_ENV)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_default()
    }
}

/// `RUST_LOG` when set and valid, otherwise `default_directive`.
pub fn env_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .unwrap_or_else(|_| EnvFilter::new("warn"))
}

/// Install the global subscriber. A second call returns an error instead of
/// replacing the first subscriber.
pub fn init_tracing(default_directive: &str, format: LogFormat) -> anyhow::Result<()> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_directive))
        .with_writer(std::io::stderr)
        .with_target(false);

    let result = match format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().flatten_event(true).try_init(),
    };
    result.map_err(|e| anyhow!("failed to install tracing subscriber: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!(" JSON ".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("compact".parse::<LogFormat>().unwrap(), LogFormat::Compact);
        assert_eq!("".parse::<LogFormat>().unwrap(), LogFormat::Compact);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_second_init_is_an_error_not_a_panic() {
        // The first call may already have happened in another test thread.
        let _ = init_tracing("warn", LogFormat::Compact);
        assert!(init_tracing("debug", LogFormat::Json).is_err());
    }
}
