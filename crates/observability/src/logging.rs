//! Logging initialization and configuration
//!
//! This module provides utilities for initializing the tracing-based
//! logging system with various output formats.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format with colors (default)
    #[default]
    Pretty,
    /// JSON format, one object per line for log shippers
    Json,
    /// Compact format (less verbose than pretty)
    Compact,
}

impl LogFormat {
    /// Parse from string (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pretty" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            "compact" => Some(Self::Compact),
            _ => None,
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown log format: {}", s))
    }
}

/// Initialize the logging system
///
/// The log level is controlled via the `RUST_LOG` environment variable and
/// defaults to `info`. Upstream call records are emitted by the
/// `market_data::gateway` target, so `RUST_LOG=market_data::gateway=debug,info`
/// shows per-batch detail without the rest of the service.
///
/// # Example
///
/// ```ignore
/// use observability::{init_logging, LogFormat};
///
/// init_logging("volgate", LogFormat::Json)?;
/// tracing::info!("Service started");
/// ```
pub fn init_logging(service_name: &str, format: LogFormat) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    match format {
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(true)
                    .with_line_number(true)
                    .with_ansi(true),
            )
            .try_init()?,
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(true))
            .try_init()?,
        LogFormat::Compact => registry.with(fmt::layer().compact()).try_init()?,
    }

    tracing::info!(
        service = service_name,
        format = ?format,
        "Logging initialized"
    );

    Ok(())
}

/// Initialize logging with default settings (pretty format, info level)
pub fn init_default_logging(service_name: &str) -> anyhow::Result<()> {
    init_logging(service_name, LogFormat::Pretty)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_from_str() {
        assert_eq!(LogFormat::parse("pretty"), Some(LogFormat::Pretty));
        assert_eq!(LogFormat::parse("PRETTY"), Some(LogFormat::Pretty));
        assert_eq!(LogFormat::parse("json"), Some(LogFormat::Json));
        assert_eq!(LogFormat::parse("compact"), Some(LogFormat::Compact));
        assert_eq!(LogFormat::parse("invalid"), None);

        assert_eq!("json".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert!("invalid".parse::<LogFormat>().is_err());
    }
}
