//! @acp:module "Extension Commands"
//! @acp:summary "List, install and remove PostgreSQL extensions"
//! @acp:domain cli
//! @acp:layer handler

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::json;

use super::pg::pg_binary;
use super::{bridged, group, reject};
use crate::bridge::params;
use crate::capability::ann;
use crate::cli::tree::{CommandSpec, FlagSpec, Invocation};
use crate::config;
use crate::error::ExitCodeError;
use crate::exec::{self, Cmd};
use crate::output::code::{
    CODE_EXT_INSTALL_FAILED, CODE_EXT_INVALID_ARGS, CODE_EXT_NO_PG, CODE_EXT_REMOVE_FAILED,
};
use crate::output::table::render_table;
use crate::output::{self, CommandResult, Module};
use crate::outln;

const AVAILABLE_QUERY: &str = "SELECT name, default_version, coalesce(installed_version, ''), coalesce(comment, '') \
     FROM pg_available_extensions ORDER BY name";

/// Package names as accepted by dnf and apt
static PACKAGE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.+*-]*$").unwrap());

pub fn command() -> CommandSpec {
    CommandSpec::new("ext", "Manage PostgreSQL extensions")
        .alias("e")
        .alias("ex")
        .alias("pgext")
        .alias("extension")
        .example(
            "  pig ext list vector          # available extensions matching 'vector'
  pig ext add pgvector_17 -y   # install a package
  pig ext rm pgvector_17 -y    # remove it",
        )
        .ann(group("pig ext"))
        .children(vec![
            CommandSpec::new("list [query]", "List extensions available to the local server")
                .alias("l")
                .alias("ls")
                .alias("find")
                .ann(ann("pig ext list", "query", "volatile", "safe", true, "safe", "none", "current", 100))
                .arg_help("query", "substring of the extension name")
                .run(list),
            CommandSpec::new("add <package...>", "Install extension packages")
                .alias("a")
                .alias("install")
                .alias("ins")
                .ann(ann("pig ext add", "action", "volatile", "unsafe", true, "low", "none", "root", 10000))
                .flag(FlagSpec::bool("yes", "auto-confirm the package manager").short('y'))
                .run(add),
            CommandSpec::new("rm <package...>", "Remove extension packages")
                .alias("r")
                .alias("remove")
                .ann(ann("pig ext rm", "action", "volatile", "unsafe", false, "medium", "recommended", "root", 10000))
                .flag(FlagSpec::bool("yes", "auto-confirm the package manager").short('y'))
                .run(remove),
        ])
}

/// One row of `pg_available_extensions`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Extension {
    pub name: String,
    pub default_version: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub installed_version: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub comment: String,
}

/// Parse `psql -AXt -F '|'` output; short lines are skipped
pub fn parse_extensions(raw: &str) -> Vec<Extension> {
    raw.lines()
        .filter_map(|line| {
            let mut cols = line.splitn(4, '|');
            let name = cols.next()?.trim();
            let default_version = cols.next()?.trim();
            if name.is_empty() {
                return None;
            }
            Some(Extension {
                name: name.to_string(),
                default_version: default_version.to_string(),
                installed_version: cols.next().unwrap_or_default().trim().to_string(),
                comment: cols.next().unwrap_or_default().trim().to_string(),
            })
        })
        .collect()
}

fn fetch_extensions(inv: &Invocation<'_>) -> anyhow::Result<Vec<Extension>> {
    let raw = Cmd::new(pg_binary(inv.config, "psql"))
        .args(["-AXt", "-F", "|", "-c", AVAILABLE_QUERY])
        .as_user(&inv.config.dbsu)
        .read()
        .map_err(|e| ExitCodeError::from_code(CODE_EXT_NO_PG, format!("cannot query PostgreSQL: {:#}", e)))?;
    Ok(parse_extensions(&raw))
}

fn list(inv: &Invocation<'_>) -> anyhow::Result<()> {
    let query = inv.value("query").unwrap_or_default().to_lowercase();
    let result = fetch_extensions(inv).map(|all| {
        all.into_iter()
            .filter(|e| e.name.to_lowercase().contains(&query))
            .collect::<Vec<_>>()
    });
    if config::is_structured_output() {
        return match result {
            Ok(exts) => output::print_data(&exts, &format!("{} extensions found", exts.len())),
            Err(err) => output::handle_result(
                CommandResult::fail(CODE_EXT_NO_PG, "failed to list extensions").with_detail(format!("{:#}", err)),
            ),
        };
    }
    let rows: Vec<Vec<String>> = result?
        .into_iter()
        .map(|e| vec![e.name, e.default_version, e.installed_version, e.comment])
        .collect();
    outln!("{}", render_table(&["Name", "Version", "Installed", "Description"], &rows).trim_end());
    Ok(())
}

/// Package manager available on this host
pub fn package_manager() -> Option<&'static str> {
    ["dnf", "yum", "apt-get"].into_iter().find(|pm| exec::available(pm))
}

fn validate_packages(inv: &Invocation<'_>) -> anyhow::Result<Vec<String>> {
    let packages = inv.values("package");
    if let Some(bad) = packages.iter().find(|p| !PACKAGE_NAME.is_match(p)) {
        return Err(reject(
            inv,
            CODE_EXT_INVALID_ARGS,
            "invalid package name",
            &format!("invalid package name: {:?}", bad),
        ));
    }
    Ok(packages)
}

/// `<pm> install|remove [-y] <packages>`
fn package_command(action: &str, packages: &[String], yes: bool) -> anyhow::Result<Cmd> {
    let pm = package_manager().ok_or_else(|| anyhow::anyhow!("no supported package manager found (dnf, yum, apt-get)"))?;
    let mut cmd = Cmd::new(pm).arg(action);
    if yes {
        cmd = cmd.arg("-y");
    }
    Ok(cmd.args(packages.iter().cloned()))
}

fn add(inv: &Invocation<'_>) -> anyhow::Result<()> {
    let packages = validate_packages(inv)?;
    let yes = inv.flag("yes");
    // structured callers cannot answer a prompt
    let unattended = yes || config::is_structured_output();
    bridged(inv, Module::Ext, params([("packages", json!(packages)), ("yes", json!(yes))]), || {
        package_command("install", &packages, unattended)?
            .run()
            .map_err(|e| ExitCodeError::from_code(CODE_EXT_INSTALL_FAILED, format!("install failed: {:#}", e)).into())
    })
}

fn remove(inv: &Invocation<'_>) -> anyhow::Result<()> {
    let packages = validate_packages(inv)?;
    let yes = inv.flag("yes");
    // structured callers cannot answer a prompt
    let unattended = yes || config::is_structured_output();
    bridged(inv, Module::Ext, params([("packages", json!(packages)), ("yes", json!(yes))]), || {
        package_command("remove", &packages, unattended)?
            .run()
            .map_err(|e| ExitCodeError::from_code(CODE_EXT_REMOVE_FAILED, format!("remove failed: {:#}", e)).into())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_extensions() {
        let raw = "plpgsql|1.0|1.0|PL/pgSQL procedural language\nvector|0.8.0||vector data type and ivfflat and hnsw access methods\n\n";
        let exts = parse_extensions(raw);
        assert_eq!(exts.len(), 2);
        assert_eq!(exts[0].installed_version, "1.0");
        assert_eq!(exts[1].name, "vector");
        assert_eq!(exts[1].installed_version, "");
    }

    #[test]
    fn test_package_name_pattern() {
        assert!(PACKAGE_NAME.is_match("pgvector_17"));
        assert!(PACKAGE_NAME.is_match("postgresql-17-pgvector"));
        assert!(PACKAGE_NAME.is_match("pg_duckdb_17*"));
        assert!(!PACKAGE_NAME.is_match("--downloadonly"));
        assert!(!PACKAGE_NAME.is_match("a b"));
    }
}
