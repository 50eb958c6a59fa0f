//! Logging setup shared by the AutoApply binaries
//!
//! Both daemons log to stderr so stdout stays clean for command output.
//! `AUTOAPPLY_LOG_FORMAT` picks the output format and
//! `AUTOAPPLY_LOG_LEVEL` (or `RUST_LOG`) the filter; `--verbose` forces
//! debug.

use std::str::FromStr;

use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Plain text, one line per event
    Text,
    /// One JSON object per line, for log shippers
    Json,
    /// Multi-line colored output for development
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            _ => Err(format!(
                "Invalid log format: '{}'. Valid options: text, json, pretty",
                s
            )),
        }
    }
}

/// Install the global subscriber for a binary.
///
/// `default_level` is the binary's quiet default, used when neither
/// `--verbose` nor the environment says otherwise. Call once at process
/// start; panics if a subscriber is already installed.
pub fn init(verbose: bool, default_level: &str) {
    let format = std::env::var("AUTOAPPLY_LOG_FORMAT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(LogFormat::Text);

    let level = if verbose {
        "debug".to_string()
    } else {
        std::env::var("AUTOAPPLY_LOG_LEVEL").unwrap_or_else(|_| default_level.to_string())
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Json => builder.json().flatten_event(true).init(),
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Text => builder.with_target(false).init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("PRETTY".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
    }

    #[test]
    fn test_log_format_from_str_invalid() {
        let result = "syslog".parse::<LogFormat>();
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("Invalid log format"));
    }
}
