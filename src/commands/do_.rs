//! @acp:module "Admin Task Commands"
//! @acp:summary "pig do: Pigsty admin playbooks behind short task names"
//! @acp:domain cli
//! @acp:layer handler
//!
//! Every task is a row of [`TASKS`]: its usage line, aliases, descriptor and
//! a builder turning positionals into an ansible command line. One handler
//! serves them all.

use std::path::{Path, PathBuf};

use serde_json::json;

use super::{bridged, group};
use crate::bridge::params;
use crate::capability::ann;
use crate::cli::tree::{parse_usage_args, CommandSpec, FlagSpec, Invocation};
use crate::error::ExitCodeError;
use crate::exec::{self, Cmd};
use crate::output::code::{
    CODE_DO_ANSIBLE_NOT_FOUND, CODE_DO_INVALID_ARGS, CODE_DO_INVENTORY_NOT_FOUND,
    CODE_DO_PIGSTY_NOT_FOUND,
};
use crate::output::Module;

/// Prometheus file-discovery directory for remote PostgreSQL targets
const PGRDS_TARGETS: &str = "/etc/prometheus/targets/pgrds";

/// Builds tool arguments from positionals and `--uninstall`
type Builder = fn(&[String], bool) -> Vec<Invocable>;

/// One ansible run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocable {
    /// `ansible-playbook` or `ansible`
    pub tool: &'static str,
    pub args: Vec<String>,
}

impl Invocable {
    fn playbook<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tool: "ansible-playbook",
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

/// @acp:summary "Static description of one admin task"
pub struct Task {
    pub usage: &'static str,
    pub about: &'static str,
    pub aliases: &'static [&'static str],
    pub risk: &'static str,
    pub cost: i64,
    /// Accepts `-u/--uninstall`
    pub uninstall: bool,
    pub build: Builder,
}

impl Task {
    pub fn name(&self) -> &'static str {
        self.usage.split_whitespace().next().unwrap_or(self.usage)
    }

    fn spec(&self) -> CommandSpec {
        let mut spec = CommandSpec::new(self.usage, self.about)
            .ann(ann(
                &format!("pig do {}", self.name()),
                "action",
                "volatile",
                "unsafe",
                false,
                self.risk,
                "recommended",
                "root",
                self.cost,
            ))
            .run(run);
        for alias in self.aliases {
            spec = spec.alias(*alias);
        }
        if self.uninstall {
            spec = spec.flag(FlagSpec::bool("uninstall", "uninstall packages during removal").short('u'));
        }
        spec
    }
}

fn rest(args: &[String], from: usize) -> &[String] {
    args.get(from..).unwrap_or_default()
}

/// `-e` payload carrying a list variable
fn list_var(name: &str, values: &[String]) -> String {
    let mut vars = serde_json::Map::new();
    vars.insert(name.to_string(), json!(values));
    serde_json::Value::Object(vars).to_string()
}

fn pgsql_add(args: &[String], _: bool) -> Vec<Invocable> {
    let mut cmd = vec!["pgsql.yml".to_string(), "-l".to_string(), args[0].clone()];
    cmd.extend_from_slice(rest(args, 1));
    vec![Invocable::playbook(cmd)]
}

fn pgsql_rm(args: &[String], uninstall: bool) -> Vec<Invocable> {
    let mut cmd = vec!["pgsql-rm.yml".to_string(), "-l".to_string(), args[0].clone()];
    cmd.extend_from_slice(rest(args, 1));
    if uninstall {
        cmd.extend(["-e".to_string(), "pg_uninstall=true".to_string()]);
    }
    vec![Invocable::playbook(cmd)]
}

fn pgsql_user(args: &[String], _: bool) -> Vec<Invocable> {
    vec![Invocable::playbook([
        "pgsql-user.yml".to_string(),
        "-l".to_string(),
        args[0].clone(),
        "-e".to_string(),
        format!("username={}", args[1]),
    ])]
}

fn pgsql_db(args: &[String], _: bool) -> Vec<Invocable> {
    vec![Invocable::playbook([
        "pgsql-db.yml".to_string(),
        "-l".to_string(),
        args[0].clone(),
        "-e".to_string(),
        format!("dbname={}", args[1]),
    ])]
}

fn pgsql_ext(args: &[String], _: bool) -> Vec<Invocable> {
    let mut cmd: Vec<String> = vec!["pgsql.yml".into(), "-l".into(), args[0].clone(), "-t".into(), "pg_extension".into()];
    if args.len() > 1 {
        cmd.extend(["-e".to_string(), list_var("pg_extensions", rest(args, 1))]);
    }
    vec![Invocable::playbook(cmd)]
}

fn pgsql_hba(args: &[String], _: bool) -> Vec<Invocable> {
    vec![Invocable::playbook([
        "pgsql.yml",
        "-l",
        args[0].as_str(),
        "-t",
        "pg_hba,pg_reload,pgbouncer_hba,pgbouncer_reload",
    ])]
}

fn pgsql_svc(args: &[String], _: bool) -> Vec<Invocable> {
    vec![Invocable::playbook(["pgsql.yml", "-l", args[0].as_str(), "-t", "pg_service"])]
}

fn pgmon_add(args: &[String], _: bool) -> Vec<Invocable> {
    vec![Invocable::playbook([
        "pgsql-monitor.yml".to_string(),
        "-e".to_string(),
        format!("clsname={}", args[0]),
    ])]
}

fn pgmon_rm(args: &[String], _: bool) -> Vec<Invocable> {
    let target = format!("{}/{}.yml", PGRDS_TARGETS, args[0]);
    vec![Invocable {
        tool: "ansible",
        args: vec![
            "infra".into(),
            "-m".into(),
            "file".into(),
            "-b".into(),
            "-a".into(),
            format!("path={} state=absent", target),
        ],
    }]
}

fn node_add(args: &[String], _: bool) -> Vec<Invocable> {
    vec![Invocable::playbook(["node.yml", "-l", args[0].as_str()])]
}

fn node_rm(args: &[String], _: bool) -> Vec<Invocable> {
    vec![Invocable::playbook(["node-rm.yml", "-l", args[0].as_str()])]
}

fn node_repo(args: &[String], _: bool) -> Vec<Invocable> {
    let mut cmd: Vec<String> = vec!["node.yml".into(), "-t".into(), "node_repo".into()];
    if let Some(selector) = args.first() {
        cmd.extend(["-l".to_string(), selector.clone()]);
    }
    if let Some(modules) = args.get(1) {
        cmd.extend(["-e".to_string(), format!("node_repo_modules={}", modules)]);
    }
    vec![Invocable::playbook(cmd)]
}

fn node_pkg(args: &[String], _: bool) -> Vec<Invocable> {
    let mut cmd: Vec<String> = vec!["node.yml".into(), "-l".into(), args[0].clone(), "-t".into(), "node_pkg_extra".into()];
    if args.len() > 1 {
        cmd.extend(["-e".to_string(), list_var("node_packages", rest(args, 1))]);
    }
    vec![Invocable::playbook(cmd)]
}

fn repo_build(_: &[String], _: bool) -> Vec<Invocable> {
    vec![Invocable::playbook(["infra.yml", "-l", "infra", "-t", "repo_build"])]
}

/// One run per port, or one for the whole selector
fn redis(playbook: &'static str, args: &[String], uninstall: bool) -> Vec<Invocable> {
    let base = |extra: Vec<String>| {
        let mut cmd = vec![playbook.to_string(), "-l".to_string(), args[0].clone()];
        cmd.extend(extra);
        if uninstall {
            cmd.extend(["-e".to_string(), "redis_uninstall=true".to_string()]);
        }
        Invocable::playbook(cmd)
    };
    let ports = rest(args, 1);
    if ports.is_empty() {
        return vec![base(Vec::new())];
    }
    ports
        .iter()
        .map(|port| base(vec!["-e".to_string(), format!("redis_port={}", port)]))
        .collect()
}

fn redis_add(args: &[String], _: bool) -> Vec<Invocable> {
    redis("redis.yml", args, false)
}

fn redis_rm(args: &[String], uninstall: bool) -> Vec<Invocable> {
    redis("redis-rm.yml", args, uninstall)
}

/// All admin tasks, in help order
pub const TASKS: &[Task] = &[
    Task { usage: "pgsql-add <selector> [ins...]", about: "Add instances to a pgsql cluster", aliases: &["pg-add", "pa", "pgsql"], risk: "medium", cost: 300000, uninstall: false, build: pgsql_add },
    Task { usage: "pgsql-rm <selector> [ins...]", about: "Remove a pgsql cluster or instances", aliases: &["pg-rm", "pr"], risk: "high", cost: 300000, uninstall: true, build: pgsql_rm },
    Task { usage: "pgsql-user <cls> <username>", about: "Create or update a pgsql user", aliases: &["pg-user", "pu"], risk: "low", cost: 60000, uninstall: false, build: pgsql_user },
    Task { usage: "pgsql-db <cls> <dbname>", about: "Create or update a pgsql database", aliases: &["pg-db", "pd"], risk: "low", cost: 60000, uninstall: false, build: pgsql_db },
    Task { usage: "pgsql-ext <selector> [ext...]", about: "Install pgsql extensions", aliases: &["pg-ext", "pe"], risk: "low", cost: 60000, uninstall: false, build: pgsql_ext },
    Task { usage: "pgsql-hba <selector>", about: "Refresh pgsql and pgbouncer hba rules", aliases: &["pg-hba", "ph"], risk: "medium", cost: 60000, uninstall: false, build: pgsql_hba },
    Task { usage: "pgsql-svc <selector>", about: "Refresh pgsql services", aliases: &["pg-svc", "ps"], risk: "medium", cost: 60000, uninstall: false, build: pgsql_svc },
    Task { usage: "pgmon-add <cls>", about: "Add a remote pgsql monitor target", aliases: &["mon-add", "ma"], risk: "low", cost: 60000, uninstall: false, build: pgmon_add },
    Task { usage: "pgmon-rm <cls>", about: "Remove a remote pgsql monitor target", aliases: &["mon-rm", "mr"], risk: "medium", cost: 60000, uninstall: false, build: pgmon_rm },
    Task { usage: "node-add <selector>", about: "Add nodes to Pigsty", aliases: &["node", "node-a", "nadd", "na"], risk: "medium", cost: 300000, uninstall: false, build: node_add },
    Task { usage: "node-rm <selector>", about: "Remove nodes from Pigsty", aliases: &["node-r", "nrm"], risk: "high", cost: 300000, uninstall: false, build: node_rm },
    Task { usage: "node-repo [selector] [modules]", about: "Refresh node repositories", aliases: &["node-rp", "nrp"], risk: "low", cost: 60000, uninstall: false, build: node_repo },
    Task { usage: "node-pkg <selector> [pkg...]", about: "Install extra node packages", aliases: &["node-p", "np"], risk: "low", cost: 60000, uninstall: false, build: node_pkg },
    Task { usage: "repo-build", about: "Rebuild the local infra repository", aliases: &["repo-b", "rb"], risk: "low", cost: 60000, uninstall: false, build: repo_build },
    Task { usage: "redis-add <selector> [port...]", about: "Add a redis cluster, node or instance", aliases: &["redis", "re-add", "ra"], risk: "medium", cost: 300000, uninstall: false, build: redis_add },
    Task { usage: "redis-rm <selector> [port...]", about: "Remove a redis cluster, node or instance", aliases: &["re-rm", "rr"], risk: "high", cost: 300000, uninstall: true, build: redis_rm },
];

pub fn command() -> CommandSpec {
    CommandSpec::new("do", "Run admin tasks")
        .alias("d")
        .long("pig do - perform admin tasks with ansible playbooks from the Pigsty home")
        .example(
            "  pig do pgsql-add  <sel> [ins...]      # add instances to cluster
  pig do pgsql-rm   <sel> [ins...]      # remove instances from cluster
  pig do pgsql-db   <cls> <dbname>      # create/update pgsql database
  pig do pgsql-user <cls> <username>    # create/update pgsql user
  pig do node-add   <sel>               # add node to pigsty
  pig do redis-add  <sel> [port...]     # add redis cluster/node/instance",
        )
        .ann(group("pig do"))
        .children(TASKS.iter().map(Task::spec).collect())
}

pub fn find_task(name: &str) -> Option<&'static Task> {
    TASKS.iter().find(|t| t.name() == name)
}

/// Positionals in usage order, variadics flattened
fn positionals(inv: &Invocation<'_>, task: &Task) -> Vec<String> {
    parse_usage_args(task.usage)
        .into_iter()
        .flat_map(|arg| {
            if arg.variadic {
                inv.values(&arg.name)
            } else {
                inv.value(&arg.name).into_iter().collect()
            }
        })
        .collect()
}

/// Pigsty home and inventory a playbook runs with
fn precheck(inv: &Invocation<'_>) -> anyhow::Result<(PathBuf, Option<PathBuf>)> {
    let home = inv
        .config
        .home
        .clone()
        .filter(|h| h.is_dir())
        .ok_or_else(|| ExitCodeError::from_code(CODE_DO_PIGSTY_NOT_FOUND, "pigsty home not found, did you install pigsty?"))?;
    if !exec::available("ansible-playbook") {
        return Err(ExitCodeError::from_code(CODE_DO_ANSIBLE_NOT_FOUND, "ansible-playbook command not found").into());
    }
    let inventory = match &inv.config.inventory {
        Some(path) if !resolve(&home, path).exists() => {
            return Err(ExitCodeError::from_code(
                CODE_DO_INVENTORY_NOT_FOUND,
                format!("the given inventory {} not found", path.display()),
            )
            .into());
        }
        Some(path) => Some(path.clone()),
        None if home.join("pigsty.yml").exists() => None,
        None => {
            return Err(ExitCodeError::from_code(
                CODE_DO_INVENTORY_NOT_FOUND,
                "pigsty config inventory not found, use -i to specify the inventory",
            )
            .into());
        }
    };
    Ok((home, inventory))
}

/// Relative inventories are looked up from the Pigsty home
fn resolve(home: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        home.join(path)
    }
}

fn run(inv: &Invocation<'_>) -> anyhow::Result<()> {
    let name = inv.path.rsplit(' ').next().unwrap_or_default();
    let Some(task) = find_task(name) else {
        return Err(super::reject(inv, CODE_DO_INVALID_ARGS, "unknown task", &format!("unknown task {}", name)));
    };
    let args = positionals(inv, task);
    let uninstall = inv.flag("uninstall");
    let p = params([("args", json!(args)), ("uninstall", json!(task.uninstall.then_some(uninstall)))]);
    bridged(inv, Module::Do, p, || {
        let (home, inventory) = precheck(inv)?;
        for call in (task.build)(&args, uninstall) {
            let mut cmd = Cmd::new(call.tool).current_dir(&home);
            if let Some(path) = &inventory {
                cmd = cmd.arg("-i").arg(path.display().to_string());
            }
            let cmd = cmd.args(call.args);
            tracing::info!("run: {}", cmd.display());
            cmd.run()?;
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_task_names_and_aliases_are_unique() {
        let mut seen = HashSet::new();
        for task in TASKS {
            assert!(seen.insert(task.name()), "duplicate {}", task.name());
            for alias in task.aliases {
                assert!(seen.insert(*alias), "duplicate alias {}", alias);
            }
        }
    }

    #[test]
    fn test_pgsql_rm_with_uninstall() {
        let calls = pgsql_rm(&argv(&["pg-test", "10.10.10.13"]), true);
        assert_eq!(
            calls[0].args,
            argv(&["pgsql-rm.yml", "-l", "pg-test", "10.10.10.13", "-e", "pg_uninstall=true"])
        );
    }

    #[test]
    fn test_list_variables() {
        let calls = pgsql_ext(&argv(&["pg-meta", "postgis", "pgvector"]), false);
        assert_eq!(calls[0].args[5], "-e");
        assert_eq!(calls[0].args[6], r#"{"pg_extensions":["postgis","pgvector"]}"#);
        assert_eq!(node_pkg(&argv(&["infra"]), false)[0].args.len(), 5);
    }

    #[test]
    fn test_redis_runs_once_per_port() {
        let calls = redis_add(&argv(&["redis-ms", "6379", "6380"]), false);
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].args, argv(&["redis.yml", "-l", "redis-ms", "-e", "redis_port=6380"]));
    }

    #[test]
    fn test_pgmon_rm_uses_ansible() {
        let calls = pgmon_rm(&argv(&["pg-foo"]), false);
        assert_eq!(calls[0].tool, "ansible");
        assert_eq!(calls[0].args[5], "path=/etc/prometheus/targets/pgrds/pg-foo.yml state=absent");
    }

    #[test]
    fn test_node_repo_optional_args() {
        assert_eq!(node_repo(&[], false)[0].args, argv(&["node.yml", "-t", "node_repo"]));
        assert_eq!(
            node_repo(&argv(&["all", "infra,node"]), false)[0].args,
            argv(&["node.yml", "-t", "node_repo", "-l", "all", "-e", "node_repo_modules=infra,node"])
        );
    }
}
