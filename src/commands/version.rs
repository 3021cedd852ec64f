//! @acp:module "Version Command"
//! @acp:summary "Print the pig version"
//! @acp:domain cli
//! @acp:layer handler

use serde::Serialize;

use crate::capability::ann;
use crate::cli::tree::{CommandSpec, Invocation};
use crate::config;
use crate::output;
use crate::outln;

pub fn command() -> CommandSpec {
    CommandSpec::new("version", "Show pig version info")
        .alias("v")
        .ann(ann("pig version", "query", "immutable", "safe", true, "safe", "none", "current", 10))
        .run(run)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionInfo {
    pub version: String,
    pub os: String,
    pub arch: String,
}

impl VersionInfo {
    pub fn current() -> Self {
        Self {
            version: crate::VERSION.to_string(),
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
        }
    }
}

fn run(_inv: &Invocation<'_>) -> anyhow::Result<()> {
    let info = VersionInfo::current();
    if config::is_structured_output() {
        return output::print_data(&info, &format!("pig version {}", info.version));
    }
    outln!("pig version {} ({}/{})", info.version, info.os, info.arch);
    Ok(())
}
