//! @acp:module "Context Command"
//! @acp:summary "Environment snapshot for agents: host, PostgreSQL, Patroni, pgBackRest"
//! @acp:domain cli
//! @acp:layer handler
//!
//! Every component is collected independently and degrades to
//! `available: false` when its tool or service is missing. Only the host
//! section is mandatory.

use std::collections::BTreeSet;
use std::path::Path;

use serde::Serialize;

use super::pg::{pg_binary, ServerState};
use super::{patroni, pgbackrest};
use crate::capability::ann;
use crate::cli::tree::{CommandSpec, FlagSpec, Invocation};
use crate::config::{self, Config};
use crate::exec::{self, Cmd};
use crate::output::code::{CODE_CTX_COLLECTION_FAILED, CODE_CTX_INVALID_MODULE};
use crate::output::{self, CommandResult, Render};

pub const MODULE_HOST: &str = "host";
pub const MODULE_POSTGRES: &str = "postgres";
pub const MODULE_PATRONI: &str = "patroni";
pub const MODULE_PGBACKREST: &str = "pgbackrest";
pub const MODULE_EXTENSIONS: &str = "extensions";

pub const VALID_MODULES: [&str; 5] = [
    MODULE_HOST,
    MODULE_POSTGRES,
    MODULE_PATRONI,
    MODULE_PGBACKREST,
    MODULE_EXTENSIONS,
];

const INSTALLED_QUERY: &str = "SELECT extname FROM pg_extension ORDER BY extname";

pub fn command() -> CommandSpec {
    CommandSpec::new("context", "Show an environment snapshot")
        .alias("ctx")
        .long(
            "Collect a snapshot of the local environment: host, PostgreSQL,
Patroni, pgBackRest and installed extensions. Components that are not
present are reported as unavailable instead of failing the command.",
        )
        .example(
            "  pig context -o json              # full snapshot
  pig ctx -m postgres,patroni      # selected components (host always included)
  pig ctx -m '!extensions'         # everything except extensions",
        )
        .ann(ann("pig context", "query", "volatile", "safe", true, "safe", "none", "current", 500))
        .flag(FlagSpec::string(
            "module",
            "comma-separated components: host, postgres, patroni, pgbackrest, extensions (prefix ! to exclude)",
        )
        .short('m'))
        .run(run)
}

/// @acp:summary "Which snapshot components to collect"
///
/// With no include list every component is collected. The host component is
/// implied by any include list and only dropped by an explicit exclusion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleFilter {
    include: BTreeSet<String>,
    exclude: BTreeSet<String>,
}

impl ModuleFilter {
    /// Parse `"postgres, !extensions"`; unknown names are an error
    pub fn parse(raw: &str) -> Result<Self, String> {
        let mut filter = Self::default();
        for part in raw.split(',') {
            let part = part.trim().to_lowercase();
            let (negated, name) = match part.strip_prefix('!') {
                Some(rest) => (true, rest.trim().to_string()),
                None => (false, part),
            };
            if name.is_empty() {
                continue;
            }
            if !VALID_MODULES.contains(&name.as_str()) {
                return Err(format!(
                    "invalid module '{}', valid modules: {}",
                    name,
                    VALID_MODULES.join(", ")
                ));
            }
            if negated {
                filter.exclude.insert(name);
            } else {
                filter.include.insert(name);
            }
        }
        Ok(filter)
    }

    pub fn includes(&self, module: &str) -> bool {
        if self.exclude.contains(module) {
            return false;
        }
        self.include.is_empty() || module == MODULE_HOST || self.include.contains(module)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostInfo {
    pub hostname: String,
    pub os: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distro: Option<String>,
    pub arch: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kernel: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PostgresContext {
    pub available: bool,
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub data_dir: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PatroniContext {
    pub available: bool,
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PgBackRestContext {
    pub available: bool,
    pub configured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stanza: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtensionsContext {
    pub available: bool,
    pub installed_count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extensions: Vec<String>,
}

/// @acp:summary "The `pig context` payload"
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<HostInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postgres: Option<PostgresContext>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patroni: Option<PatroniContext>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pgbackrest: Option<PgBackRestContext>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<ExtensionsContext>,
}

impl Snapshot {
    fn format(&self, dot: &dyn Fn(bool) -> String) -> String {
        let mut out = String::from("=== PIG CONTEXT ===\n");
        if let Some(host) = &self.host {
            match &host.distro {
                Some(distro) => out.push_str(&format!("Host: {} ({}/{})\n", host.hostname, distro, host.arch)),
                None => out.push_str(&format!("Host: {} ({})\n", host.hostname, host.arch)),
            }
            if let Some(kernel) = &host.kernel {
                out.push_str(&format!("  OS: {}  Kernel: {}\n", host.os, kernel));
            }
        }
        if let Some(pg) = &self.postgres {
            out.push('\n');
            if !pg.available {
                out.push_str(&format!("PostgreSQL: {} Not Available\n", dot(false)));
            } else {
                let status = if pg.running { "Running" } else { "Stopped" };
                out.push_str(&format!("PostgreSQL: {} {}\n", dot(pg.running), status));
                if let Some(version) = &pg.version {
                    out.push_str(&format!("  Version: {}", version));
                    if let Some(pid) = pg.pid {
                        out.push_str(&format!("  PID: {}", pid));
                    }
                    out.push('\n');
                }
                out.push_str(&format!("  Data Dir: {}\n", pg.data_dir));
            }
        }
        if let Some(pt) = &self.patroni {
            out.push('\n');
            if !pt.available {
                out.push_str(&format!("Patroni: {} Not Available\n", dot(false)));
            } else {
                let status = if pt.running { "Running" } else { "Stopped" };
                out.push_str(&format!("Patroni: {} {}\n", dot(pt.running), status));
                if let Some(cluster) = &pt.cluster {
                    out.push_str(&format!("  Cluster: {}\n", cluster));
                }
            }
        }
        if let Some(pb) = &self.pgbackrest {
            out.push('\n');
            if !pb.available {
                out.push_str(&format!("pgBackRest: {} Not Available\n", dot(false)));
            } else if !pb.configured {
                out.push_str(&format!("pgBackRest: {} Not Configured\n", dot(false)));
            } else {
                out.push_str(&format!("pgBackRest: {} Configured\n", dot(true)));
                if let Some(stanza) = &pb.stanza {
                    out.push_str(&format!("  Stanza: {}\n", stanza));
                }
            }
        }
        if let Some(ext) = &self.extensions {
            out.push('\n');
            if !ext.available {
                out.push_str(&format!("Extensions: {} Not Available\n", dot(false)));
            } else {
                out.push_str(&format!("Extensions: {} installed\n", ext.installed_count));
                if !ext.extensions.is_empty() {
                    out.push_str(&format!("  {}\n", ext.extensions.join(", ")));
                }
            }
        }
        out.trim_end().to_string()
    }
}

impl Render for Snapshot {
    fn text(&self) -> String {
        self.format(&|up| (if up { "●" } else { "○" }).to_string())
    }

    fn color_text(&self) -> String {
        self.format(&|up| {
            if up {
                console::style("●").green().to_string()
            } else {
                console::style("○").red().to_string()
            }
        })
    }
}

/// Short distro code from `/etc/os-release` content: `el9`, `d12`, `u24`
pub fn distro_code(os_release: &str) -> Option<String> {
    let field = |key: &str| {
        os_release.lines().find_map(|line| {
            let value = line.strip_prefix(key)?.strip_prefix('=')?;
            Some(value.trim().trim_matches('"').to_string())
        })
    };
    let id = field("ID")?.to_lowercase();
    let major = field("VERSION_ID")?.split('.').next()?.to_string();
    let like = field("ID_LIKE").unwrap_or_default().to_lowercase();
    let prefix = match id.as_str() {
        "ubuntu" => "u",
        "debian" => "d",
        "rhel" | "centos" | "rocky" | "almalinux" | "ol" | "fedora" => "el",
        _ if like.contains("rhel") || like.contains("fedora") => "el",
        _ if like.contains("ubuntu") => "u",
        _ if like.contains("debian") => "d",
        _ => return None,
    };
    Some(format!("{}{}", prefix, major))
}

fn read_trimmed(path: &str) -> Option<String> {
    std::fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub(crate) fn collect_host() -> anyhow::Result<HostInfo> {
    let hostname = read_trimmed("/proc/sys/kernel/hostname")
        .or_else(|| read_trimmed("/etc/hostname"))
        .or_else(|| Cmd::new("hostname").read().ok().map(|s| s.trim().to_string()))
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow::anyhow!("cannot determine hostname"))?;
    Ok(HostInfo {
        hostname,
        os: std::env::consts::OS.to_string(),
        distro: std::fs::read_to_string("/etc/os-release")
            .ok()
            .and_then(|c| distro_code(&c)),
        arch: std::env::consts::ARCH.to_string(),
        kernel: read_trimmed("/proc/sys/kernel/osrelease"),
    })
}

pub(crate) fn collect_postgres(config: &Config) -> PostgresContext {
    let data = &config.pg_data;
    let available = data.is_dir() || exec::find_binary("pg_ctl", config.pg_bin.as_deref()).is_some();
    if !available {
        return PostgresContext {
            data_dir: data.display().to_string(),
            ..Default::default()
        };
    }
    let state = ServerState::observe(data);
    PostgresContext {
        available,
        running: state.running,
        version: read_trimmed(&data.join("PG_VERSION").display().to_string()),
        data_dir: data.display().to_string(),
        pid: state.pid.filter(|_| state.running),
    }
}

fn collect_patroni() -> PatroniContext {
    if !exec::available("patronictl") && !Path::new(patroni::CONFIG_PATH).exists() {
        return PatroniContext::default();
    }
    PatroniContext {
        available: true,
        running: patroni::service_active(),
        cluster: std::fs::read_to_string(patroni::CONFIG_PATH)
            .ok()
            .and_then(|c| patroni::cluster_name_from_yaml(&c)),
    }
}

fn collect_pgbackrest() -> PgBackRestContext {
    if !exec::available("pgbackrest") {
        return PgBackRestContext::default();
    }
    let conf = std::fs::read_to_string(pgbackrest::CONFIG_PATH).ok();
    PgBackRestContext {
        available: true,
        configured: conf.is_some(),
        stanza: conf.as_deref().and_then(pgbackrest::stanza_from_conf),
    }
}

fn collect_extensions(config: &Config, running: bool) -> ExtensionsContext {
    if !running {
        return ExtensionsContext::default();
    }
    let raw = Cmd::new(pg_binary(config, "psql"))
        .args(["-AXtq", "-c", INSTALLED_QUERY])
        .as_user(&config.dbsu)
        .read();
    match raw {
        Ok(raw) => {
            let extensions: Vec<String> = raw
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect();
            ExtensionsContext {
                available: true,
                installed_count: extensions.len(),
                extensions,
            }
        }
        Err(err) => {
            tracing::debug!("cannot list installed extensions: {:#}", err);
            ExtensionsContext::default()
        }
    }
}

/// @acp:summary "Collect the components selected by `filter`"
pub fn collect(config: &Config, filter: &ModuleFilter) -> anyhow::Result<Snapshot> {
    let mut snapshot = Snapshot::default();
    if filter.includes(MODULE_HOST) {
        snapshot.host = Some(collect_host()?);
    }
    let wants_extensions = filter.includes(MODULE_EXTENSIONS);
    if filter.includes(MODULE_POSTGRES) || wants_extensions {
        let pg = collect_postgres(config);
        if wants_extensions {
            snapshot.extensions = Some(collect_extensions(config, pg.running));
        }
        if filter.includes(MODULE_POSTGRES) {
            snapshot.postgres = Some(pg);
        }
    }
    if filter.includes(MODULE_PATRONI) {
        snapshot.patroni = Some(collect_patroni());
    }
    if filter.includes(MODULE_PGBACKREST) {
        snapshot.pgbackrest = Some(collect_pgbackrest());
    }
    Ok(snapshot)
}

fn run(inv: &Invocation<'_>) -> anyhow::Result<()> {
    let filter = match ModuleFilter::parse(&inv.value("module").unwrap_or_default()) {
        Ok(filter) => filter,
        Err(message) => return output::print_error(CODE_CTX_INVALID_MODULE, &message),
    };
    match collect(inv.config, &filter) {
        Ok(snapshot) if config::is_structured_output() => {
            output::print_data(&snapshot, "Environment context collected")
        }
        Ok(snapshot) => {
            output::print(&snapshot);
            Ok(())
        }
        Err(err) => output::handle_result(
            CommandResult::fail(CODE_CTX_COLLECTION_FAILED, "failed to collect context")
                .with_detail(format!("{:#}", err)),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_module_filter_include() {
        let filter = ModuleFilter::parse("Postgres, patroni").unwrap();
        assert!(filter.includes(MODULE_HOST));
        assert!(filter.includes(MODULE_POSTGRES));
        assert!(filter.includes(MODULE_PATRONI));
        assert!(!filter.includes(MODULE_PGBACKREST));
        assert!(!filter.includes(MODULE_EXTENSIONS));
    }

    #[test]
    fn test_module_filter_exclude() {
        let filter = ModuleFilter::parse("!extensions,!host").unwrap();
        assert!(!filter.includes(MODULE_HOST));
        assert!(!filter.includes(MODULE_EXTENSIONS));
        assert!(filter.includes(MODULE_PGBACKREST));

        let empty = ModuleFilter::parse(" , ").unwrap();
        assert!(VALID_MODULES.iter().all(|m| empty.includes(m)));
    }

    #[test]
    fn test_module_filter_rejects_unknown() {
        let err = ModuleFilter::parse("postgres,redis").unwrap_err();
        assert!(err.contains("invalid module 'redis'"), "{}", err);
    }

    #[test]
    fn test_distro_code() {
        let rocky = "NAME=\"Rocky Linux\"\nID=\"rocky\"\nID_LIKE=\"rhel centos fedora\"\nVERSION_ID=\"9.4\"\n";
        assert_eq!(distro_code(rocky).as_deref(), Some("el9"));
        let ubuntu = "ID=ubuntu\nID_LIKE=debian\nVERSION_ID=\"24.04\"\n";
        assert_eq!(distro_code(ubuntu).as_deref(), Some("u24"));
        let debian = "ID=debian\nVERSION_ID=\"12\"\n";
        assert_eq!(distro_code(debian).as_deref(), Some("d12"));
        assert_eq!(distro_code("ID=arch\n"), None);
    }

    #[test]
    fn test_snapshot_omits_unselected_components() {
        let snapshot = Snapshot {
            postgres: Some(PostgresContext {
                available: true,
                running: false,
                version: Some("17".to_string()),
                data_dir: "/pg/data".to_string(),
                pid: None,
            }),
            ..Default::default()
        };
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["postgres"]["version"], "17");
        assert!(value.get("host").is_none());
        assert!(value["postgres"].get("pid").is_none());

        let text = snapshot.text();
        assert!(text.contains("PostgreSQL: ○ Stopped"), "{}", text);
        assert!(text.contains("Data Dir: /pg/data"), "{}", text);
    }
}
