//! @acp:module "Errors"
//! @acp:summary "Library error type and the carried exit-code error"
//! @acp:domain cli
//! @acp:layer model

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::output::code;

/// Library-level error
#[derive(Debug, Error)]
pub enum PigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, PigError>;

/// @acp:summary "An error that already carries its status code and exit status"
///
/// Produced by whoever rendered the failure (or by a subprocess exiting
/// non-zero). The top-level runner passes it through untouched.
#[derive(Debug, Clone, Error)]
#[error("command exited with code {exit}: {message}")]
pub struct ExitCodeError {
    /// Six-digit status code, 0 when the origin only knows an exit status
    pub code: i32,
    /// Process exit status
    pub exit: i32,
    pub message: String,
}

impl ExitCodeError {
    /// Error for an already rendered failure with a known status code
    pub fn from_code(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            exit: code::exit_code(code),
            message: message.into(),
        }
    }

    /// Error for a child process that exited with `exit`
    ///
    /// Carries code 0, which the runner reads as "already rendered": in
    /// structured mode it must only escape through the legacy bridge, which
    /// prints the failure document. Returned from anywhere else, stdout stays
    /// empty.
    pub fn from_status(exit: i32, message: impl Into<String>) -> Self {
        Self {
            code: 0,
            exit,
            message: message.into(),
        }
    }
}

/// Status code carried by `err`, if it carries one
pub fn carried_code(err: &anyhow::Error) -> Option<&ExitCodeError> {
    err.downcast_ref::<ExitCodeError>()
}

/// Phrases that mark an uncategorized error as a usage mistake
const USAGE_PHRASES: [&str; 11] = [
    "unknown command",
    "unknown flag",
    "unknown shorthand flag",
    "invalid argument",
    "requires at least",
    "requires at most",
    "requires exactly",
    "unrecognized subcommand",
    "unexpected argument",
    "required arguments were not provided",
    "invalid value",
];

/// @acp:summary "True when an uncategorized error is a usage mistake"
///
/// Parser errors are classified by kind; anything else by its message
/// (unknown command or flag, wrong argument count, invalid argument).
pub fn is_usage_error(err: &anyhow::Error) -> bool {
    if let Some(e) = err.downcast_ref::<clap::Error>() {
        use clap::error::ErrorKind;
        return !matches!(
            e.kind(),
            ErrorKind::DisplayHelp
                | ErrorKind::DisplayVersion
                | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                | ErrorKind::Io
                | ErrorKind::Format
        );
    }
    let text = format!("{:#}", err).to_lowercase();
    if USAGE_PHRASES.iter().any(|p| text.contains(p)) {
        return true;
    }
    ARG_COUNT_PATTERN.is_match(&text)
}

/// "accepts 1 arg(s), received 2"
static ARG_COUNT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"accepts (at most |between )?\d+( and \d+)? arg\(s\)").unwrap());

/// Generic status code for an error without a carried code
pub fn classify(err: &anyhow::Error) -> i32 {
    if is_usage_error(err) {
        code::CODE_SYSTEM_INVALID_ARGS
    } else {
        code::CODE_SYSTEM_COMMAND_FAILED
    }
}

/// @acp:summary "Process exit status for an error reaching the boundary"
///
/// A carried status is used as is; anything else is classified.
pub fn exit_status(err: &anyhow::Error) -> i32 {
    match carried_code(err) {
        Some(e) => e.exit,
        None => code::exit_code(classify(err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_code_derives_exit() {
        let err = ExitCodeError::from_code(code::CODE_PT_SWITCHOVER_NEED_FORCE, "need --force");
        assert_eq!(err.code, 150101);
        assert_eq!(err.exit, 2);
    }

    #[test]
    fn test_carried_code_survives_context() {
        let err = anyhow::Error::new(ExitCodeError::from_status(3, "exit 3"))
            .context("while running pgbackrest");
        assert_eq!(exit_status(&err), 3);
        assert!(carried_code(&err).is_some());
    }

    #[test]
    fn test_plain_error_exits_one() {
        let err = anyhow::anyhow!("boom");
        assert!(carried_code(&err).is_none());
        assert_eq!(exit_status(&err), 1);
    }

    #[test]
    fn test_usage_classification() {
        let usage = [
            r#"unknown command "x" for "pig""#,
            "unknown flag: --bad",
            "accepts 1 arg(s), received 2",
            "requires at least 1 arg(s), only received 0",
            "invalid argument \"abc\" for \"--port\"",
        ];
        for msg in usage {
            let err = anyhow::anyhow!(msg.to_string());
            assert!(is_usage_error(&err), "{}", msg);
            assert_eq!(classify(&err), code::CODE_SYSTEM_INVALID_ARGS);
            assert_eq!(exit_status(&err), 2);
        }

        let runtime = anyhow::anyhow!("dial tcp timeout");
        assert!(!is_usage_error(&runtime));
        assert_eq!(classify(&runtime), code::CODE_SYSTEM_COMMAND_FAILED);
    }

    #[test]
    fn test_parser_errors_are_usage() {
        let err = clap::Command::new("pig")
            .try_get_matches_from(["pig", "bogus"])
            .unwrap_err();
        assert!(is_usage_error(&anyhow::Error::new(err)));
    }
}
