//! @acp:module "Command Runner"
//! @acp:summary "Process boundary: parse, dispatch, classify errors, pick the exit status"
//! @acp:domain cli
//! @acp:layer api
//!
//! In structured mode stdout carries exactly one document: a capability map,
//! a command schema, a plan or a result. Parser usage text and error text
//! are never printed there.

use std::path::PathBuf;

use clap::error::ErrorKind;
use serde_json::json;

use super::preprocess::{detect_output_format, has_help_flag, reorder_output_before_help};
use super::tree::{chain_path, CommandSpec, Invocation};
use crate::capability::{build_capability_map, CommandSchema};
use crate::commands;
use crate::config::{self, Config};
use crate::error;
use crate::logging::{self, LogOptions};
use crate::output::code::CODE_CONFIG_LOAD_FAILED;
use crate::output::{self, exit_code, CommandResult};

/// @acp:summary "Run pig with `args` (program name excluded), return the exit status"
pub fn run(args: &[String]) -> i32 {
    let args = reorder_output_before_help(args);
    config::set_output_format(detect_output_format(&args));

    let root = commands::root();
    if config::is_structured_output() && has_help_flag(&args) {
        return structured_help(&root, &args);
    }

    let argv = std::iter::once("pig".to_string()).chain(args.iter().cloned());
    let matches = match root.to_clap().version(crate::VERSION).try_get_matches_from(argv) {
        Ok(matches) => matches,
        Err(err) => return parse_failure(err, &args),
    };

    let options = LogOptions {
        level: matches.get_one::<String>("log-level").cloned().unwrap_or_default(),
        path: matches.get_one::<String>("log-path").map(PathBuf::from),
        debug: matches.get_flag("debug"),
    };
    if let Err(err) = logging::init(&options) {
        eprintln!("warning: {:#}", err);
    }
    config::init_output_format(matches.get_one::<String>("output").map(String::as_str).unwrap_or_default());

    let config = match load_config(&matches) {
        Ok(config) => config,
        Err(err) => {
            let result = output::handle_result(
                CommandResult::fail(CODE_CONFIG_LOAD_FAILED, "failed to load config").with_detail(format!("{:#}", err)),
            );
            return result.err().map(|e| error::exit_status(&e)).unwrap_or(1);
        }
    };

    let (chain, leaf) = root.resolve(&matches);
    let node = chain[chain.len() - 1];
    let Some(handler) = node.handler else {
        return group_help(&chain);
    };

    let path = chain_path(&chain);
    tracing::debug!("running {}", path);
    let invocation = Invocation::new(path, &args, leaf, &config);
    match handler(&invocation) {
        Ok(()) => 0,
        Err(err) => {
            if should_log_execution_error(Some(&err)) {
                tracing::error!("command execution failed: {:#}", err);
            }
            match emit_structured_execution_error(Some(&err), &args) {
                (exit, true) => exit,
                _ => error::exit_status(&err),
            }
        }
    }
}

/// Config file plus `-i/--inventory` and `-H/--home` overrides
fn load_config(matches: &clap::ArgMatches) -> crate::Result<Config> {
    let path = matches.get_one::<String>("config").map(PathBuf::from);
    let mut config = Config::resolve(path.as_deref())?;
    if let Some(inventory) = matches.get_one::<String>("inventory").filter(|v| !v.is_empty()) {
        config.inventory = Some(PathBuf::from(inventory));
    }
    if let Some(home) = matches.get_one::<String>("home").filter(|v| !v.is_empty()) {
        config.home = Some(PathBuf::from(home));
    }
    Ok(config)
}

/// Capability map for the root, a command schema for anything deeper
fn structured_help(root: &CommandSpec, args: &[String]) -> i32 {
    let chain = root.locate(args);
    match CommandSchema::from_chain(&chain) {
        Some(schema) if chain.len() > 1 => output::print(&schema),
        _ => output::print(&build_capability_map(root, crate::VERSION)),
    }
    0
}

/// Help for a command group invoked without a subcommand
fn group_help(chain: &[&CommandSpec]) -> i32 {
    if config::is_structured_output() {
        if let Some(schema) = CommandSchema::from_chain(chain) {
            output::print(&schema);
        }
        return 0;
    }
    let node = chain[chain.len() - 1];
    let mut cmd = node.to_clap().bin_name(chain_path(chain));
    match cmd.print_help() {
        Ok(()) => 0,
        Err(err) => {
            tracing::error!("failed to print help: {}", err);
            1
        }
    }
}

fn parse_failure(err: clap::Error, args: &[String]) -> i32 {
    if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) {
        if config::is_structured_output() {
            let version = json!({ "version": crate::VERSION });
            return match output::print_data(version, &format!("pig version {}", crate::VERSION)) {
                Ok(()) => 0,
                Err(e) => error::exit_status(&e),
            };
        }
        let _ = err.print();
        return 0;
    }
    let err = anyhow::Error::new(err);
    if config::is_structured_output() {
        let (exit, _) = emit_structured_execution_error(Some(&err), args);
        return exit;
    }
    if let Some(clap_err) = err.downcast_ref::<clap::Error>() {
        let _ = clap_err.print();
    }
    error::exit_status(&err)
}

/// One-line message for `err`; parser errors lose their usage block
fn error_message(err: &anyhow::Error) -> String {
    if let Some(clap_err) = err.downcast_ref::<clap::Error>() {
        let rendered = clap_err.to_string();
        let first = rendered.lines().next().unwrap_or_default();
        return first.trim_start_matches("error:").trim().to_string();
    }
    format!("{:#}", err)
}

/// @acp:summary "Whether the boundary should log `err`"
///
/// Text mode logs every error. Structured mode logs only uncategorized
/// errors; a carried code is already fully described by the rendered result.
pub fn should_log_execution_error(err: Option<&anyhow::Error>) -> bool {
    match err {
        None => false,
        Some(_) if !config::is_structured_output() => true,
        Some(err) => error::carried_code(err).is_none(),
    }
}

/// @acp:summary "Render an uncategorized error as a structured failure"
///
/// Returns `(exit status, handled)`. Carried-code errors are skipped with
/// `(0, false)`: whoever attached the code already rendered the result.
pub fn emit_structured_execution_error(err: Option<&anyhow::Error>, args: &[String]) -> (i32, bool) {
    let Some(err) = err else {
        return (0, false);
    };
    if error::carried_code(err).is_some() || !config::is_structured_output() {
        return (0, false);
    }
    let code = error::classify(err);
    let message = error_message(err);
    let result = CommandResult::fail(code, message.clone())
        .with_detail(message)
        .with_data(json!({ "args": args }));
    output::print(&result);
    (exit_code(code), true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OutputFormat, OutputFormatGuard};
    use crate::error::ExitCodeError;
    use crate::output::code::{CODE_SYSTEM_COMMAND_FAILED, CODE_SYSTEM_INVALID_ARGS};
    use crate::output::sink;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_should_log_execution_error() {
        let plain = anyhow::anyhow!("boom");
        let carried: anyhow::Error = ExitCodeError::from_code(CODE_SYSTEM_COMMAND_FAILED, "boom").into();

        let _guard = OutputFormatGuard::set(OutputFormat::Text);
        assert!(should_log_execution_error(Some(&plain)));
        assert!(should_log_execution_error(Some(&carried)));
        assert!(!should_log_execution_error(None));

        config::set_output_format(OutputFormat::Json);
        assert!(should_log_execution_error(Some(&plain)));
        assert!(!should_log_execution_error(Some(&carried)));
        assert!(!should_log_execution_error(None));
    }

    #[test]
    fn test_emit_structured_usage_error() {
        let _guard = OutputFormatGuard::set(OutputFormat::Json);
        let args = strings(&["unknown", "-o", "json"]);
        let err = anyhow::anyhow!("unknown command \"unknown\" for \"pig\"");
        let ((exit, handled), captured) =
            sink::capture(sink::DEFAULT_CAPTURE_LIMIT, || emit_structured_execution_error(Some(&err), &args));
        assert!(handled);
        assert_eq!(exit, exit_code(CODE_SYSTEM_INVALID_ARGS));
        let text = &captured.text;
        assert!(text.contains("\"success\":false"), "{}", text);
        assert!(text.contains("\"code\":990101"), "{}", text);
        assert!(text.contains("\"args\":[\"unknown\",\"-o\",\"json\"]"), "{}", text);
    }

    #[test]
    fn test_emit_structured_runtime_error() {
        let _guard = OutputFormatGuard::set(OutputFormat::Json);
        let args = strings(&["status", "--output=json"]);
        let err = anyhow::anyhow!("runtime failure");
        let ((exit, handled), captured) =
            sink::capture(sink::DEFAULT_CAPTURE_LIMIT, || emit_structured_execution_error(Some(&err), &args));
        assert!(handled);
        assert_eq!(exit, exit_code(CODE_SYSTEM_COMMAND_FAILED));
        assert!(captured.text.contains("\"code\":990801"));
    }

    #[test]
    fn test_emit_skips_carried_code() {
        let _guard = OutputFormatGuard::set(OutputFormat::Json);
        let err: anyhow::Error = ExitCodeError::from_status(2, "boom").into();
        assert_eq!(emit_structured_execution_error(Some(&err), &[]), (0, false));
        assert_eq!(emit_structured_execution_error(None, &[]), (0, false));
    }

    #[test]
    fn test_clap_error_message_is_one_line() {
        let err = commands::root()
            .to_clap()
            .try_get_matches_from(["pig", "no-such-command"])
            .unwrap_err();
        let err = anyhow::Error::new(err);
        let message = error_message(&err);
        assert!(!message.contains('\n'), "{}", message);
        assert!(!message.starts_with("error:"), "{}", message);
        assert!(error::is_usage_error(&err));
    }

    #[test]
    fn test_structured_unknown_command_exit() {
        let _guard = OutputFormatGuard::set(OutputFormat::Text);
        let (exit, captured) = sink::capture(sink::DEFAULT_CAPTURE_LIMIT, || {
            run(&strings(&["no-such-command", "-o", "json"]))
        });
        assert_eq!(exit, 2);
        let value: serde_json::Value = serde_json::from_str(captured.text.trim()).unwrap();
        assert_eq!(value["code"], CODE_SYSTEM_INVALID_ARGS);
    }
}
