//! @acp:module "Logging"
//! @acp:summary "tracing subscriber setup: stderr or log file, level from flags"
//! @acp:domain cli
//! @acp:layer infrastructure
//!
//! Logs never go to stdout: in structured mode stdout carries exactly one
//! document.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Context;
use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::EnvFilter;

use crate::config;

/// Environment variable holding a filter directive that overrides the flags
pub const LOG_ENV: &str = "PIG_LOG";

/// Logging settings from the global flags
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    /// `--log-level`
    pub level: String,
    /// `--log-path`; stderr when unset
    pub path: Option<PathBuf>,
    /// `--debug`, forces the debug level
    pub debug: bool,
}

/// Parse a level name; `fatal` and `panic` map to error
pub fn parse_level(raw: &str) -> Option<Level> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" | "" => Some(Level::INFO),
        "warn" | "warning" => Some(Level::WARN),
        "error" | "fatal" | "panic" => Some(Level::ERROR),
        _ => None,
    }
}

/// Timestamp layout for stderr log lines, local wall clock
pub const TIME_FORMAT: &str = "%H:%M:%S";

/// @acp:summary "Install the global subscriber"
///
/// An invalid level falls back to info with a warning. Calling this again
/// after a subscriber is installed only updates the recorded level.
pub fn init(options: &LogOptions) -> anyhow::Result<()> {
    let parsed = parse_level(&options.level);
    let level = if options.debug {
        Level::DEBUG
    } else {
        parsed.unwrap_or(Level::INFO)
    };
    config::set_log_level(level);

    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::default().add_directive(LevelFilter::from_level(level).into()));

    let installed = match &options.path {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_target(false)
                .try_init()
                .is_ok()
        }
        None => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_timer(ChronoLocal::new(TIME_FORMAT.to_string()))
            .with_target(false)
            .try_init()
            .is_ok(),
    };

    if parsed.is_none() && !options.debug {
        tracing::warn!("invalid log level {:?}, using INFO", options.level);
    }
    if installed {
        match &options.path {
            Some(path) => tracing::debug!("file logger initialized at {} ({})", level, path.display()),
            None => tracing::debug!("stderr logger initialized at {}", level),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("DEBUG"), Some(Level::DEBUG));
        assert_eq!(parse_level("fatal"), Some(Level::ERROR));
        assert_eq!(parse_level(""), Some(Level::INFO));
        assert_eq!(parse_level("loud"), None);
    }

    #[test]
    fn test_timestamp_uses_local_clock() {
        let ten = chrono::Local.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap();
        assert_eq!(ten.format(TIME_FORMAT).to_string(), "10:00:00");
    }

    #[test]
    fn test_debug_flag_wins() {
        let options = LogOptions {
            level: "error".into(),
            path: None,
            debug: true,
        };
        init(&options).unwrap();
        assert_eq!(config::log_level(), Level::DEBUG);
    }

    #[test]
    fn test_unwritable_log_path() {
        let dir = tempfile::tempdir().unwrap();
        let options = LogOptions {
            level: "info".into(),
            path: Some(dir.path().join("missing").join("pig.log")),
            debug: false,
        };
        let err = init(&options).unwrap_err();
        assert!(err.to_string().contains("failed to open log file"));
    }
}
