//! @acp:module "Legacy Bridge"
//! @acp:summary "Turns print-to-stdout command implementations into result envelopes"
//! @acp:domain cli
//! @acp:layer service
//!
//! # Legacy Bridge
//!
//! Most subcommands do their work by printing human text and returning an
//! error. In structured mode the bridge runs such a function with standard
//! output captured and wraps the outcome in a [`CommandResult`]:
//!
//! - success: `data` carries the command name, its arguments, parameters and
//!   the captured text as `captured_output`
//! - failure: same `data`, the error text as `detail`, and the carried code
//!   when the error has one
//!
//! In text mode the function simply runs.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::config::{self, OutputFormat, OutputFormatGuard};
use crate::error::{carried_code, is_usage_error, ExitCodeError};
use crate::output::code::{Category, Module};
use crate::output::sink::{self, DEFAULT_CAPTURE_LIMIT};
use crate::output::{self, CommandResult};

/// Free-form parameters recorded alongside a bridged command
pub type Params = BTreeMap<String, Value>;

/// Build [`Params`]; `null` values are dropped
pub fn params<'a, I>(pairs: I) -> Params
where
    I: IntoIterator<Item = (&'a str, Value)>,
{
    pairs
        .into_iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

/// Payload of a bridged command's result
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LegacyCommandData {
    pub command: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Params>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub captured_output: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub output_truncated: bool,
}

impl LegacyCommandData {
    fn new(command: &str, args: &[String], params: Params) -> Self {
        let params: Params = params.into_iter().filter(|(_, v)| !v.is_null()).collect();
        Self {
            command: command.to_string(),
            args: args.to_vec(),
            params: (!params.is_empty()).then_some(params),
            ..Default::default()
        }
    }
}

/// Drop one trailing line break
fn trim_trailing_newline(text: &str) -> &str {
    text.strip_suffix('\n')
        .map(|t| t.strip_suffix('\r').unwrap_or(t))
        .unwrap_or(text)
}

/// Status code for a bridged failure
///
/// A carried status code is reused. Otherwise a usage mistake maps to the
/// module's first param code and anything else to its first operation code.
pub fn failure_code(module: Module, err: &anyhow::Error) -> i32 {
    if let Some(code) = carried_code(err).map(|e| e.code).filter(|c| *c != 0) {
        return code;
    }
    let category = if is_usage_error(err) {
        Category::Param
    } else {
        Category::Operation
    };
    module.base() + category as i32 + 1
}

/// @acp:summary "Run a text-printing command function, structured when requested"
///
/// Output is captured up to 64 KiB (`output_truncated` marks the overflow)
/// and the active format is forced to text while `f` runs, so nested
/// renderers print human text into the capture. Both are restored on every
/// exit path, unwinding included.
pub fn run_legacy_structured<F>(
    module: Module,
    command: &str,
    args: &[String],
    params: Params,
    f: F,
) -> anyhow::Result<()>
where
    F: FnOnce() -> anyhow::Result<()>,
{
    if !config::is_structured_output() {
        return f();
    }

    let mut data = LegacyCommandData::new(command, args, params);
    let (outcome, captured) = {
        let _text = OutputFormatGuard::set(OutputFormat::Text);
        sink::capture(DEFAULT_CAPTURE_LIMIT, f)
    };
    data.captured_output = trim_trailing_newline(&captured.text).to_string();
    data.output_truncated = captured.truncated;

    match outcome {
        Ok(()) => output::handle_result(
            CommandResult::ok(format!("{} completed", command)).with_data(&data),
        ),
        Err(err) => {
            tracing::debug!("{} failed: {:#}", command, err);
            output::handle_result(
                CommandResult::fail(failure_code(module, &err), format!("{} failed", command))
                    .with_detail(format!("{:#}", err))
                    .with_data(&data),
            )
        }
    }
}

/// @acp:summary "Reject invalid parameters of a bridged command"
///
/// Structured mode renders a param-category failure and returns its carried
/// code; text mode returns `detail` as a plain error.
pub fn structured_param_error(
    module: Module,
    command: &str,
    message: &str,
    detail: &str,
    args: &[String],
    params: Params,
) -> anyhow::Error {
    let code = module.base() + Category::Param as i32 + 1;
    structured_error(code, command, message, detail, args, params)
}

/// Reject a bridged command with a specific status code
///
/// Same contract as [`structured_param_error`] for codes outside the first
/// param slot, e.g. a missing `--force`.
pub fn structured_error(
    code: i32,
    command: &str,
    message: &str,
    detail: &str,
    args: &[String],
    params: Params,
) -> anyhow::Error {
    if !config::is_structured_output() {
        return anyhow::anyhow!("{}", detail);
    }
    let result = CommandResult::fail(code, message)
        .with_detail(detail)
        .with_data(LegacyCommandData::new(command, args, params));
    output::print(&result);
    ExitCodeError::from_code(code, message).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::code;
    use serde_json::json;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    fn run_json<F>(f: F) -> (anyhow::Result<()>, serde_json::Value)
    where
        F: FnOnce() -> anyhow::Result<()>,
    {
        let _json = OutputFormatGuard::set(OutputFormat::Json);
        let (res, out) = sink::capture(usize::MAX, || {
            run_legacy_structured(
                Module::Pt,
                "pig patroni list",
                &argv(&["patroni", "list", "-o", "json"]),
                params([("cluster", json!("pg-meta")), ("watch", Value::Null)]),
                f,
            )
        });
        (res, serde_json::from_str(out.text.trim()).unwrap())
    }

    #[test]
    fn test_success_envelope() {
        let (res, doc) = run_json(|| {
            crate::outln!("legacy text output");
            Ok(())
        });
        assert!(res.is_ok());
        assert_eq!(doc["success"], true);
        assert_eq!(doc["message"], "pig patroni list completed");
        assert_eq!(doc["data"]["captured_output"], "legacy text output");
        assert_eq!(doc["data"]["params"], json!({"cluster": "pg-meta"}));
        assert_eq!(doc["data"]["args"][0], "patroni");
        assert!(doc["data"].get("output_truncated").is_none());
    }

    #[test]
    fn test_failure_uses_operation_code() {
        let (res, doc) = run_json(|| {
            crate::outln!("partial");
            anyhow::bail!("patronictl exited 1")
        });
        let err = res.unwrap_err();
        assert_eq!(carried_code(&err).unwrap().code, 150801);
        assert_eq!(doc["success"], false);
        assert_eq!(doc["code"], 150801);
        assert_eq!(doc["detail"], "patronictl exited 1");
        assert_eq!(doc["data"]["captured_output"], "partial");
    }

    #[test]
    fn test_failure_reuses_carried_code() {
        let (res, doc) = run_json(|| Err(ExitCodeError::from_code(code::CODE_PT_NOT_RUNNING, "down").into()));
        assert_eq!(carried_code(&res.unwrap_err()).unwrap().code, code::CODE_PT_NOT_RUNNING);
        assert_eq!(doc["code"], code::CODE_PT_NOT_RUNNING);
    }

    #[test]
    fn test_child_exit_status_is_rendered_with_module_code() {
        let (res, doc) = run_json(|| Err(ExitCodeError::from_status(3, "patronictl exited 3").into()));
        let err = res.unwrap_err();
        assert_eq!(carried_code(&err).unwrap().code, 150801);
        assert_eq!(doc["success"], false);
        assert_eq!(doc["code"], 150801);
    }

    #[test]
    fn test_nested_render_is_text_and_format_restored() {
        let (res, doc) = run_json(|| {
            assert_eq!(config::output_format(), OutputFormat::Text);
            output::print(&CommandResult::ok("inner"));
            Ok(())
        });
        assert!(res.is_ok());
        assert_eq!(doc["data"]["captured_output"], "✓ inner");
        assert_eq!(config::output_format(), OutputFormat::Text);
    }

    #[test]
    fn test_text_mode_runs_directly() {
        let _text = OutputFormatGuard::set(OutputFormat::Text);
        let (res, out) = sink::capture(usize::MAX, || {
            run_legacy_structured(Module::Pg, "pig pg ps", &[], Params::new(), || {
                crate::outln!("plain");
                Ok(())
            })
        });
        assert!(res.is_ok());
        assert_eq!(out.text, "plain\n");
    }

    #[test]
    fn test_truncation_is_reported() {
        let (res, doc) = run_json(|| {
            crate::out!("{}", "x".repeat(DEFAULT_CAPTURE_LIMIT + 10));
            Ok(())
        });
        assert!(res.is_ok());
        assert_eq!(doc["data"]["output_truncated"], true);
        assert_eq!(doc["data"]["captured_output"].as_str().unwrap().len(), DEFAULT_CAPTURE_LIMIT);
    }

    #[test]
    fn test_structured_param_error() {
        let _json = OutputFormatGuard::set(OutputFormat::Json);
        let (err, out) = sink::capture(usize::MAX, || {
            structured_param_error(Module::Sty, "pig sty conf", "invalid args", "bad -c value", &[], Params::new())
        });
        assert_eq!(carried_code(&err).unwrap().code, code::CODE_STY_CONFIGURE_INVALID_ARGS);
        let doc: serde_json::Value = serde_json::from_str(out.text.trim()).unwrap();
        assert_eq!(doc["detail"], "bad -c value");
        assert!(doc["data"].get("params").is_none());

        let _text = OutputFormatGuard::set(OutputFormat::Text);
        let err = structured_param_error(Module::Sty, "pig sty conf", "invalid args", "bad -c value", &[], Params::new());
        assert!(carried_code(&err).is_none());
        assert_eq!(err.to_string(), "bad -c value");
    }
}
