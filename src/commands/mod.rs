//! @acp:module "Commands"
//! @acp:summary "The pig command tree and shared helpers for its handlers"
//! @acp:domain cli
//! @acp:layer handler
//!
//! Each functional area lives in its own submodule and contributes one
//! [`CommandSpec`] subtree. Leaves carry their capability descriptor; most
//! delegate to an external tool through the legacy bridge.

pub mod context;
pub mod do_;
pub mod ext;
pub mod patroni;
pub mod pg;
pub mod pgbackrest;
pub mod pitr;
pub mod repo;
pub mod status;
pub mod sty;
pub mod update;
pub mod version;

use crate::bridge::{self, Params};
use crate::capability::{ann, Annotations};
use crate::cli::tree::{CommandSpec, FlagSpec, Invocation};
use crate::config::{self, VALID_OUTPUT_FORMATS};
use crate::error::ExitCodeError;
use crate::exec;
use crate::output::Module;

pub const ABOUT: &str = "Postgres package manager and Pigsty operations";

const LONG_ABOUT: &str = "pig - the Linux Postgres package manager and Pigsty operations tool

Manage extensions and repositories, operate local PostgreSQL, Patroni and
pgBackRest, and run Pigsty playbooks. Every command reports a capability
descriptor and can answer in yaml or json.";

/// @acp:summary "Build the full command tree"
pub fn root() -> CommandSpec {
    CommandSpec::new("pig", ABOUT)
        .long(LONG_ABOUT)
        .example(
            "  pig ext add pg_duckdb        # install an extension
  pig pg stop --plan -o json   # preview a shutdown
  pig --help -o yaml           # capability map",
        )
        .ann(group("pig"))
        .flag(
            FlagSpec::string("output", "output format: text, yaml, json, json-pretty")
                .short('o')
                .default("text")
                .choices(&VALID_OUTPUT_FORMATS)
                .global(),
        )
        .flag(FlagSpec::bool("debug", "enable debug logging").global())
        .flag(
            FlagSpec::string("log-level", "log level: debug, info, warn, error")
                .default("info")
                .global(),
        )
        .flag(FlagSpec::string("log-path", "write logs to this file instead of stderr").global())
        .flag(FlagSpec::string("inventory", "pigsty inventory path").short('i').global())
        .flag(FlagSpec::string("home", "pigsty home directory").short('H').global())
        .flag(FlagSpec::string("config", "pig config file (default ~/.pig/config.yml)").global())
        .children(vec![
            ext::command(),
            repo::command(),
            pg::command(),
            patroni::command(),
            pgbackrest::command(),
            pitr::command(),
            sty::command(),
            do_::command(),
            context::command(),
            status::command(),
            version::command(),
            update::command(),
        ])
}

/// Descriptor for a command group: a cheap, safe query
pub(crate) fn group(name: &str) -> Annotations {
    ann(name, "query", "stable", "safe", true, "safe", "none", "current", 100)
}

/// `-f/--force` flag confirming a dangerous command
pub(crate) fn force_flag() -> FlagSpec {
    FlagSpec::bool("force", "confirm the operation without prompting").short('f')
}

/// Run a delegating handler through the legacy bridge
pub(crate) fn bridged<F>(inv: &Invocation<'_>, module: Module, params: Params, f: F) -> anyhow::Result<()>
where
    F: FnOnce() -> anyhow::Result<()>,
{
    bridge::run_legacy_structured(module, &inv.path, inv.args, params, f)
}

/// @acp:summary "Refuse a confirm=required command in structured mode without --force"
///
/// Text mode leaves confirmation to the delegated tool's own prompt.
pub(crate) fn require_force(inv: &Invocation<'_>, code: i32) -> anyhow::Result<()> {
    if !config::is_structured_output() || inv.flag("force") {
        return Ok(());
    }
    Err(bridge::structured_error(
        code,
        &inv.path,
        &format!("{} requires --force", inv.path),
        "this command needs explicit confirmation; re-run with --force",
        inv.args,
        Params::new(),
    ))
}

/// Reject invalid input with `code`, rendered in structured mode
pub(crate) fn reject(inv: &Invocation<'_>, code: i32, message: &str, detail: &str) -> anyhow::Error {
    bridge::structured_error(code, &inv.path, message, detail, inv.args, Params::new())
}

/// Fail with `code` unless `program` is on PATH
pub(crate) fn require_tool(program: &str, code: i32) -> anyhow::Result<()> {
    if exec::available(program) {
        return Ok(());
    }
    Err(ExitCodeError::from_code(code, format!("{} not found in PATH", program)).into())
}
