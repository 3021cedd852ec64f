//! @acp:module "Status Command"
//! @acp:summary "Show pig configuration and the local environment"
//! @acp:domain cli
//! @acp:layer handler

use std::path::PathBuf;

use serde::Serialize;

use super::context::{collect_host, collect_postgres, HostInfo, PostgresContext};
use crate::capability::ann;
use crate::cli::tree::{CommandSpec, Invocation};
use crate::config::{self, Config};
use crate::output::{self, CommandResult};
use crate::output::code::CODE_CTX_COLLECTION_FAILED;
use crate::outln;

pub fn command() -> CommandSpec {
    CommandSpec::new("status", "Show current pig and pigsty status")
        .alias("st")
        .long(
            "Display current status: pig configuration, log settings, OS environment,
the local PostgreSQL instance and the Pigsty home/inventory in use.",
        )
        .ann(ann("pig status", "query", "volatile", "safe", true, "safe", "none", "current", 200))
        .run(run)
}

/// @acp:summary "The `pig status` payload"
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusData {
    pub version: String,
    pub log_level: String,
    pub log_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
    pub config: Config,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inventory: Option<PathBuf>,
    pub host: HostInfo,
    pub postgres: PostgresContext,
}

impl StatusData {
    fn text(&self) -> String {
        let opt = |p: &Option<PathBuf>| {
            p.as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "-".to_string())
        };
        let mut out = String::from("===== Configuration =====\n");
        out.push_str(&format!("Version         = {}\n", self.version));
        out.push_str(&format!("Log Level       = {}\n", self.log_level));
        out.push_str(&format!("Log Path        = {}\n", self.log_path));
        out.push_str(&format!("Config File     = {}\n", opt(&self.config_file)));
        out.push_str(&format!("DBSU            = {}\n", self.config.dbsu));

        out.push_str("\n===== OS Environment =====\n");
        out.push_str(&format!("Hostname        = {}\n", self.host.hostname));
        out.push_str(&format!("OS              = {}\n", self.host.os));
        out.push_str(&format!("OS Architecture = {}\n", self.host.arch));
        out.push_str(&format!("OS Code         = {}\n", self.host.distro.as_deref().unwrap_or("-")));
        out.push_str(&format!("Kernel          = {}\n", self.host.kernel.as_deref().unwrap_or("-")));

        out.push_str("\n===== PG Environment =====\n");
        out.push_str(&format!("Data Dir        = {}\n", self.postgres.data_dir));
        out.push_str(&format!("Version         = {}\n", self.postgres.version.as_deref().unwrap_or("-")));
        let state = match (self.postgres.running, self.postgres.pid) {
            (true, Some(pid)) => format!("running (PID {})", pid),
            (true, None) => "running".to_string(),
            _ => "stopped".to_string(),
        };
        out.push_str(&format!("State           = {}\n", state));

        out.push_str("\n===== Pigsty Config =====\n");
        out.push_str(&format!("Pigsty Home     = {}\n", opt(&self.config.home)));
        out.push_str(&format!("Inventory       = {}", opt(&self.inventory)));
        out
    }
}

fn run(inv: &Invocation<'_>) -> anyhow::Result<()> {
    let host = match collect_host() {
        Ok(host) => host,
        Err(err) => {
            return output::handle_result(
                CommandResult::fail(CODE_CTX_COLLECTION_FAILED, "failed to collect host info")
                    .with_detail(format!("{:#}", err)),
            )
        }
    };
    let status = StatusData {
        version: crate::VERSION.to_string(),
        log_level: config::log_level().to_string().to_lowercase(),
        log_path: inv.value("log-path").unwrap_or_else(|| "stderr".to_string()),
        config_file: inv.value("config").map(PathBuf::from).or_else(Config::default_path),
        config: inv.config.clone(),
        inventory: inv.config.inventory_path(),
        host,
        postgres: collect_postgres(inv.config),
    };
    if config::is_structured_output() {
        return output::print_data(&status, "pig status");
    }
    outln!("{}", status.text());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_text_sections() {
        let status = StatusData {
            version: "1.0.0".to_string(),
            log_level: "info".to_string(),
            log_path: "stderr".to_string(),
            config_file: None,
            config: Config::default(),
            inventory: None,
            host: HostInfo {
                hostname: "pg-test-1".to_string(),
                os: "linux".to_string(),
                distro: Some("el9".to_string()),
                arch: "x86_64".to_string(),
                kernel: None,
            },
            postgres: PostgresContext {
                available: true,
                running: true,
                version: Some("17".to_string()),
                data_dir: "/pg/data".to_string(),
                pid: Some(4242),
            },
        };
        let text = status.text();
        assert!(text.contains("Log Path        = stderr"));
        assert!(text.contains("OS Code         = el9"));
        assert!(text.contains("State           = running (PID 4242)"));
        assert!(text.contains("Inventory       = -"));

        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["config"]["dbsu"], "postgres");
        assert!(value.get("config_file").is_none());
    }
}
