//! Shared tracing bootstrap for datastore hosts.

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use crate::{Error, Result};

/// Initialize the process-wide tracing subscriber.
///
/// Safe to call once per process; a second call reports a configuration
/// error because a global subscriber is already installed.
pub fn init(log_level: &str) -> Result<()> {
    let level = parse_log_level(log_level)?;

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .try_init()
        .map_err(|e| Error::Config(format!("failed to initialize tracing subscriber: {e}")))
}

fn parse_log_level(raw: &str) -> Result<Level> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        other => Err(Error::Config(format!(
            "invalid log level '{other}', expected one of [trace, debug, info, warn, error]"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("INFO").unwrap(), Level::INFO);
        assert_eq!(parse_log_level(" debug ").unwrap(), Level::DEBUG);
        assert!(parse_log_level("loud").is_err());
    }
}
