//! @acp:module "Output"
//! @acp:summary "Structured result/plan envelopes, status codes, and stdout routing"
//! @acp:domain cli
//! @acp:layer presentation
//!
//! # Output
//!
//! Every command ends by rendering exactly one [`CommandResult`] or [`Plan`]
//! in the active format:
//!
//! - `text`: human-oriented, colored on a terminal
//! - `yaml`, `json`, `json-pretty`: machine-parseable, round-trippable
//!
//! Rendering is total. Unknown formats render as text, and a payload that
//! fails to serialize falls back to text instead of erroring.

pub mod code;
pub mod plan;
pub mod result;
pub mod sink;
pub mod table;

pub use code::{exit_code, Category, Module};
pub use plan::{Action, Plan, Resource};
pub use result::{embed_json, CommandResult};

use serde::Serialize;

use crate::config::{self, OutputFormat};
use crate::error::ExitCodeError;

/// @acp:summary "Anything renderable in the four output formats"
pub trait Render: Serialize {
    /// Plain human-readable text
    fn text(&self) -> String;

    /// Text for a terminal; plain text unless overridden
    fn color_text(&self) -> String {
        self.text()
    }

    /// Render in `format`; unrecognized format names render as text
    fn render<F: Into<OutputFormat>>(&self, format: F) -> String {
        let format = format.into();
        let rendered = match format {
            OutputFormat::Text => return self.text(),
            OutputFormat::Yaml => serde_yaml::to_string(self)
                .map(|s| s.trim_end().to_string())
                .map_err(|e| e.to_string()),
            OutputFormat::Json => serde_json::to_string(self).map_err(|e| e.to_string()),
            OutputFormat::JsonPretty => {
                serde_json::to_string_pretty(self).map_err(|e| e.to_string())
            }
        };
        rendered.unwrap_or_else(|e| {
            tracing::warn!("failed to render {} output, falling back to text: {}", format, e);
            self.text()
        })
    }
}

/// True when terminal colors should be used on stdout
pub fn color_enabled() -> bool {
    if std::env::var_os("NO_COLOR").is_some_and(|v| !v.is_empty()) {
        return false;
    }
    if std::env::var("TERM").is_ok_and(|t| t == "dumb") {
        return false;
    }
    console::Term::stdout().is_term() && !sink::is_capturing()
}

/// Render `value` in the active format for printing
pub fn render_active<R: Render>(value: &R) -> String {
    match config::output_format() {
        OutputFormat::Text if color_enabled() => value.color_text(),
        format => value.render(format),
    }
}

/// Print `value` in the active format to the output sink
pub fn print<R: Render>(value: &R) {
    sink::write_line(&render_active(value));
}

/// @acp:summary "Print a result; failures become a carried-code error"
///
/// The returned error is already rendered, so callers only propagate it.
pub fn handle_result(result: CommandResult) -> anyhow::Result<()> {
    print(&result);
    if result.success {
        Ok(())
    } else {
        Err(ExitCodeError::from_code(result.code, result.message).into())
    }
}

/// Print a plan in the active format
pub fn handle_plan(plan: &Plan) -> anyhow::Result<()> {
    print(plan);
    Ok(())
}

/// Print a successful result carrying `data`
pub fn print_data<T: Serialize>(data: T, message: &str) -> anyhow::Result<()> {
    handle_result(CommandResult::ok(message).with_data(data))
}

/// Print a failed result with `code`
pub fn print_error(code: i32, message: &str) -> anyhow::Result<()> {
    handle_result(CommandResult::fail(code, message))
}
