//! @acp:module "Command Result"
//! @acp:summary "Uniform success/failure envelope returned by every command"
//! @acp:domain cli
//! @acp:layer model

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::code;
use super::Render;

const SYMBOL_SUCCESS: &str = "✓";
const SYMBOL_FAILURE: &str = "✗";

/// @acp:summary "Structured outcome of one command invocation"
///
/// Built once, never mutated after the builder chain, rendered once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResult {
    pub success: bool,
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl CommandResult {
    pub fn new(success: bool, code: i32, message: impl Into<String>) -> Self {
        Self {
            success,
            code,
            message: message.into(),
            detail: None,
            data: None,
        }
    }

    /// Successful result with code 0
    pub fn ok(message: impl Into<String>) -> Self {
        Self::new(true, 0, message)
    }

    /// Failed result carrying `code`
    pub fn fail(code: i32, message: impl Into<String>) -> Self {
        Self::new(false, code, message)
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        self.detail = (!detail.is_empty()).then_some(detail);
        self
    }

    /// Attach a serializable payload
    ///
    /// A payload that cannot be represented as JSON is dropped with a warning;
    /// the envelope itself must stay renderable.
    pub fn with_data<T: Serialize>(mut self, data: T) -> Self {
        match serde_json::to_value(data) {
            Ok(Value::Null) => self.data = None,
            Ok(value) => self.data = Some(value),
            Err(e) => {
                tracing::warn!("dropping unserializable result data: {}", e);
                self.data = None;
            }
        }
        self
    }

    /// Process exit status for this result
    pub fn exit_code(&self) -> i32 {
        code::exit_code(self.code)
    }

    fn format_text(&self, glyph: String) -> String {
        let mut out = format!("{} {}", glyph, self.message);
        if let Some(detail) = &self.detail {
            out.push_str("\n  ");
            out.push_str(detail);
        }
        if !self.success && self.code != 0 {
            out.push_str(&format!("\n  Code: {}", self.code));
        }
        out
    }

    fn glyph(&self) -> &'static str {
        if self.success {
            SYMBOL_SUCCESS
        } else {
            SYMBOL_FAILURE
        }
    }
}

impl Render for CommandResult {
    fn text(&self) -> String {
        self.format_text(self.glyph().to_string())
    }

    fn color_text(&self) -> String {
        let glyph = console::style(self.glyph());
        let glyph = if self.success {
            glyph.green()
        } else {
            match code::Category::of(self.code) {
                Some(code::Category::State) | Some(code::Category::Config) => glyph.yellow(),
                _ => glyph.red(),
            }
        };
        self.format_text(glyph.to_string())
    }
}

/// Parse raw JSON produced by an external tool into a payload value
///
/// Surrounding whitespace is ignored and empty input is `null`, so the value
/// embeds as structure in JSON output and as native YAML in YAML output.
pub fn embed_json(raw: &[u8]) -> serde_json::Result<Value> {
    let text = String::from_utf8_lossy(raw);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_constructors() {
        let ok = CommandResult::ok("done");
        assert!(ok.success);
        assert_eq!(ok.code, 0);
        assert_eq!(ok.exit_code(), 0);

        let fail = CommandResult::fail(code::CODE_EXT_NOT_FOUND, "no such extension");
        assert!(!fail.success);
        assert_eq!(fail.exit_code(), 6);
    }

    #[test]
    fn test_text_rendering() {
        let r = CommandResult::fail(code::CODE_PG_NOT_FOUND, "postgres not found")
            .with_detail("pg_ctl missing from PATH");
        assert_eq!(
            r.text(),
            "✗ postgres not found\n  pg_ctl missing from PATH\n  Code: 130301"
        );
        assert_eq!(CommandResult::ok("all good").text(), "✓ all good");
    }

    #[test]
    fn test_empty_fields_omitted() {
        let r = CommandResult::ok("done").with_detail("");
        assert_eq!(r.render("json"), r#"{"success":true,"code":0,"message":"done"}"#);
    }

    #[test]
    fn test_unknown_format_is_text() {
        let r = CommandResult::ok("done").with_data(json!({"k": "v"}));
        assert_eq!(r.render("xml"), r.render("text"));
        assert_eq!(r.render(""), r.text());
    }

    #[test]
    fn test_round_trip_structured() {
        let r = CommandResult::fail(code::CODE_PB_BACKUP_FAILED, "backup failed")
            .with_detail("exit status 1")
            .with_data(json!({"stanza": "pg-meta", "type": "full"}));

        for format in ["json", "json-pretty"] {
            let back: CommandResult = serde_json::from_str(&r.render(format)).unwrap();
            assert_eq!(back, r);
        }
        let back: CommandResult = serde_yaml::from_str(&r.render("yaml")).unwrap();
        assert_eq!(back, r);
    }

    #[test]
    fn test_embed_json() {
        assert_eq!(embed_json(b"  ").unwrap(), Value::Null);
        assert_eq!(embed_json(b" [1, 2]\n").unwrap(), json!([1, 2]));
        assert!(embed_json(b"{not json").is_err());

        let r = CommandResult::ok("info").with_data(json!({"info": embed_json(br#"{"a":1}"#).unwrap()}));
        let yaml = r.render("yaml");
        assert!(yaml.contains("info:\n    a: 1"), "{}", yaml);
    }
}
