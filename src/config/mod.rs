//! @acp:module "Configuration"
//! @acp:summary "Active output format, log level, and the user config file"
//! @acp:domain cli
//! @acp:layer config
//!
//! The active output format and log level are process-wide settings with an
//! explicit lifecycle: initialized once from parsed flags, read-only for the
//! rest of the invocation. The CLI runs on a single thread, so they live in
//! thread-local cells; tests mutate them only through [`OutputFormatGuard`].

use std::cell::Cell;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PigError, Result};

/// Output format names accepted by `-o/--output`
pub const VALID_OUTPUT_FORMATS: [&str; 4] = ["text", "yaml", "json", "json-pretty"];

/// @acp:summary "Rendering format for results, plans, and help"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    #[default]
    Text,
    Yaml,
    Json,
    JsonPretty,
}

impl OutputFormat {
    /// Strict parse: case-insensitive, surrounding whitespace ignored
    pub fn validate(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "text" => Some(Self::Text),
            "yaml" => Some(Self::Yaml),
            "json" => Some(Self::Json),
            "json-pretty" => Some(Self::JsonPretty),
            _ => None,
        }
    }

    /// Lenient parse: anything unrecognized is `Text`
    pub fn parse_lenient(raw: &str) -> Self {
        Self::validate(raw).unwrap_or_default()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Yaml => "yaml",
            Self::Json => "json",
            Self::JsonPretty => "json-pretty",
        }
    }

    /// True for yaml, json and json-pretty
    pub fn is_structured(&self) -> bool {
        !matches!(self, Self::Text)
    }
}

impl From<&str> for OutputFormat {
    fn from(raw: &str) -> Self {
        Self::parse_lenient(raw)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

thread_local! {
    static OUTPUT_FORMAT: Cell<OutputFormat> = const { Cell::new(OutputFormat::Text) };
    static LOG_LEVEL: Cell<tracing::Level> = const { Cell::new(tracing::Level::INFO) };
}

/// Currently active output format
pub fn output_format() -> OutputFormat {
    OUTPUT_FORMAT.with(|f| f.get())
}

/// Set the active output format, returning the previous one
pub fn set_output_format(format: OutputFormat) -> OutputFormat {
    OUTPUT_FORMAT.with(|f| f.replace(format))
}

/// True when the active format is yaml/json/json-pretty
pub fn is_structured_output() -> bool {
    output_format().is_structured()
}

/// Validate the raw `--output` value and make it the active format
///
/// Invalid values fall back to text; the fallback is logged in text mode.
pub fn init_output_format(raw: &str) -> OutputFormat {
    let validated = OutputFormat::parse_lenient(raw);
    if !raw.trim().is_empty() && OutputFormat::validate(raw).is_none() {
        tracing::warn!("invalid output format {:?}, using {:?}", raw, validated.as_str());
    }
    set_output_format(validated);
    validated
}

/// Restore both settings to their defaults
pub fn reset() {
    set_output_format(OutputFormat::Text);
    set_log_level(tracing::Level::INFO);
}

pub fn log_level() -> tracing::Level {
    LOG_LEVEL.with(|l| l.get())
}

pub fn set_log_level(level: tracing::Level) -> tracing::Level {
    LOG_LEVEL.with(|l| l.replace(level))
}

/// @acp:summary "Scoped override of the active output format"
///
/// Restores the previous format when dropped, including during unwinding.
#[must_use = "the previous format is restored when the guard is dropped"]
pub struct OutputFormatGuard {
    previous: OutputFormat,
}

impl OutputFormatGuard {
    pub fn set(format: OutputFormat) -> Self {
        Self {
            previous: set_output_format(format),
        }
    }
}

impl Drop for OutputFormatGuard {
    fn drop(&mut self) {
        set_output_format(self.previous);
    }
}

fn default_dbsu() -> String {
    "postgres".to_string()
}

fn default_pg_data() -> PathBuf {
    PathBuf::from("/pg/data")
}

/// @acp:summary "User configuration (~/.pig/config.yml)"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Pigsty inventory path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inventory: Option<PathBuf>,

    /// Pigsty home directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home: Option<PathBuf>,

    /// Database superuser
    #[serde(default = "default_dbsu")]
    pub dbsu: String,

    /// PostgreSQL data directory
    #[serde(default = "default_pg_data")]
    pub pg_data: PathBuf,

    /// Directory holding pg_ctl/psql; PATH lookup when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pg_bin: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            inventory: None,
            home: None,
            dbsu: default_dbsu(),
            pg_data: default_pg_data(),
            pg_bin: None,
        }
    }
}

impl Config {
    /// @acp:summary "Load config from a YAML file"
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(&content)?)
    }

    /// @acp:summary "Save config to a YAML file"
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Default location: `~/.pig/config.yml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".pig").join("config.yml"))
    }

    /// Load `path` (or the default location), apply env overrides
    ///
    /// A missing file yields defaults; a malformed one is an error.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).or_else(Self::default_path);
        let mut config = match path {
            Some(p) if p.exists() => Self::load(&p)
                .map_err(|e| PigError::Config(format!("{}: {}", p.display(), e)))?,
            Some(p) => {
                tracing::debug!("config file {} not found, using defaults", p.display());
                Self::default()
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply `PIG_DBSU` / `PIGSTY_HOME` overrides from `lookup`
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dbsu) = lookup("PIG_DBSU").filter(|v| !v.trim().is_empty()) {
            self.dbsu = dbsu.trim().to_string();
        }
        if let Some(home) = lookup("PIGSTY_HOME").filter(|v| !v.trim().is_empty()) {
            self.home = Some(PathBuf::from(home.trim()));
        }
    }

    /// Inventory path: explicit setting, else `<home>/pigsty.yml` when present
    pub fn inventory_path(&self) -> Option<PathBuf> {
        if let Some(inv) = &self.inventory {
            return Some(inv.clone());
        }
        let candidate = self.home.as_ref()?.join("pigsty.yml");
        candidate.exists().then_some(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_output_format() {
        assert_eq!(OutputFormat::validate("JSON"), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::validate(" yaml "), Some(OutputFormat::Yaml));
        assert_eq!(OutputFormat::validate("Json-Pretty"), Some(OutputFormat::JsonPretty));
        assert_eq!(OutputFormat::validate("xml"), None);
        assert_eq!(OutputFormat::parse_lenient("xml"), OutputFormat::Text);
        assert_eq!(OutputFormat::parse_lenient(""), OutputFormat::Text);
    }

    #[test]
    fn test_init_output_format_falls_back() {
        let _guard = OutputFormatGuard::set(OutputFormat::Yaml);
        assert_eq!(init_output_format("bogus"), OutputFormat::Text);
        assert!(!is_structured_output());
        assert_eq!(init_output_format("JSON"), OutputFormat::Json);
        assert!(is_structured_output());
    }

    #[test]
    fn test_guard_restores_previous_format() {
        set_output_format(OutputFormat::Text);
        {
            let _guard = OutputFormatGuard::set(OutputFormat::Json);
            assert_eq!(output_format(), OutputFormat::Json);
        }
        assert_eq!(output_format(), OutputFormat::Text);
    }

    #[test]
    fn test_config_defaults_and_env() {
        let mut config: Config = serde_yaml::from_str("inventory: /etc/pigsty.yml\n").unwrap();
        assert_eq!(config.dbsu, "postgres");
        assert_eq!(config.pg_data, PathBuf::from("/pg/data"));
        assert_eq!(config.inventory_path(), Some(PathBuf::from("/etc/pigsty.yml")));

        config.apply_env(|k| match k {
            "PIG_DBSU" => Some("dba".to_string()),
            _ => None,
        });
        assert_eq!(config.dbsu, "dba");
    }

    #[test]
    fn test_config_resolve_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        std::fs::write(&path, "dbsu: pgadmin\npg_data: /data/pg\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.dbsu, "pgadmin");
        assert_eq!(config.pg_data, PathBuf::from("/data/pg"));

        std::fs::write(&path, "").unwrap();
        assert_eq!(Config::load(&path).unwrap(), Config::default());

        std::fs::write(&path, "dbsu: [unclosed").unwrap();
        assert!(Config::resolve(Some(&path)).is_err());
    }
}
