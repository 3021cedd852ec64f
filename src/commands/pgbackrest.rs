//! @acp:module "pgBackRest Commands"
//! @acp:summary "Backup, restore and stanza management through pgbackrest"
//! @acp:domain cli
//! @acp:layer handler

use std::path::{Path, PathBuf};

use serde_json::json;

use super::pg::{self, ServerState};
use super::{bridged, force_flag, group, reject, require_force, require_tool};
use crate::bridge::params;
use crate::capability::ann;
use crate::cli::tree::{CommandSpec, FlagSpec, Invocation};
use crate::config;
use crate::error::ExitCodeError;
use crate::exec::Cmd;
use crate::output::code::{
    CODE_PB_BACKUP_FAILED, CODE_PB_CONFIG_NOT_FOUND, CODE_PB_INFO_FAILED, CODE_PB_INVALID_ARGS,
    CODE_PB_INVALID_RESTORE_PARAMS, CODE_PB_NOT_FOUND, CODE_PB_PG_RUNNING,
    CODE_PB_RESTORE_FAILED, CODE_PB_RESTORE_NEED_FORCE, CODE_PB_STANZA_DELETE_REQUIRES_FORCE,
    CODE_PB_STANZA_NOT_FOUND,
};
use crate::output::{self, embed_json, CommandResult, Module, Plan, Resource};

/// pgBackRest configuration file
pub const CONFIG_PATH: &str = "/etc/pgbackrest/pgbackrest.conf";

const LOG_DIR: &str = "/pg/log/pgbackrest";
const BACKUP_TYPES: [&str; 3] = ["full", "diff", "incr"];

pub fn command() -> CommandSpec {
    CommandSpec::new("pgbackrest", "Manage pgBackRest backups and restores")
        .alias("pb")
        .long(
            "pig pgbackrest - backup and restore with pgBackRest

Commands run pgbackrest as the database superuser. The stanza defaults to
the first stanza declared in /etc/pgbackrest/pgbackrest.conf.",
        )
        .example(
            "  pig pb info                  # backup sets
  pig pb backup -t full        # full backup
  pig pb restore -d --plan     # preview a restore to latest
  pig pb restore -t \"2025-01-01 12:00:00+08\" -f",
        )
        .ann(group("pig pgbackrest"))
        .flag(FlagSpec::string("stanza", "stanza name (default from pgbackrest.conf)").short('s').global())
        .flag(FlagSpec::string("repo", "repository number").short('r').global())
        .children(vec![
            CommandSpec::new("info", "Show backup sets")
                .alias("i")
                .ann(ann("pig pgbackrest info", "query", "stable", "safe", true, "safe", "none", "dbsu", 2000))
                .flag(FlagSpec::string("set", "only show this backup set").short('b'))
                .run(info),
            CommandSpec::new("ls", "List repository contents")
                .alias("list")
                .ann(ann("pig pgbackrest ls", "query", "stable", "safe", true, "safe", "none", "dbsu", 1000))
                .run(ls),
            CommandSpec::new("backup", "Take a backup")
                .alias("bk")
                .ann(ann("pig pgbackrest backup", "action", "volatile", "unsafe", true, "low", "none", "dbsu", 300000))
                .flag(FlagSpec::string("type", "backup type: full, diff, incr").short('t').choices(&BACKUP_TYPES))
                .run(backup),
            CommandSpec::new("expire", "Expire backups past retention")
                .ann(ann("pig pgbackrest expire", "action", "volatile", "unsafe", true, "medium", "recommended", "dbsu", 60000))
                .flag(FlagSpec::string("set", "expire this backup set").short('b'))
                .run(expire),
            restore_command(),
            CommandSpec::new("check", "Verify archiving and backup configuration")
                .alias("ck")
                .ann(ann("pig pgbackrest check", "query", "volatile", "safe", true, "safe", "none", "dbsu", 10000))
                .run(check),
            CommandSpec::new("create", "Create the stanza")
                .ann(ann("pig pgbackrest create", "action", "volatile", "unsafe", true, "low", "none", "dbsu", 10000))
                .run(stanza),
            CommandSpec::new("upgrade", "Upgrade the stanza after a major version upgrade")
                .ann(ann("pig pgbackrest upgrade", "action", "volatile", "unsafe", true, "low", "none", "dbsu", 10000))
                .run(stanza),
            CommandSpec::new("delete", "Delete the stanza and all its backups")
                .ann(ann("pig pgbackrest delete", "action", "volatile", "unsafe", false, "critical", "required", "dbsu", 60000))
                .flag(force_flag())
                .run(stanza),
            CommandSpec::new("log [file]", "Show the last lines of a pgBackRest log")
                .ann(ann("pig pgbackrest log", "query", "volatile", "safe", true, "safe", "none", "dbsu", 200))
                .arg_help("file", "log file name (default: newest)")
                .flag(FlagSpec::int("lines", "number of lines").short('n').default("50"))
                .run(log),
        ])
}

fn restore_command() -> CommandSpec {
    CommandSpec::new("restore", "Restore the cluster from backup")
        .alias("rt")
        .long(
            "Restore the data directory with pgbackrest restore.

Exactly one recovery target is required. PostgreSQL must be stopped.",
        )
        .ann(ann("pig pgbackrest restore", "action", "volatile", "unsafe", false, "critical", "required", "dbsu", 600000))
        .flag(force_flag())
        .flag(FlagSpec::bool("plan", "show the execution plan without running it").alias("dry-run"))
        .flags(recovery_flags())
        .run(restore)
}

/// Flags selecting a recovery target, shared with `pig pitr`
pub(crate) fn recovery_flags() -> Vec<FlagSpec> {
    vec![
        FlagSpec::bool("default", "recover to end of WAL stream (latest)").short('d'),
        FlagSpec::bool("immediate", "recover to backup consistency point").short('I'),
        FlagSpec::string("time", "recover to a timestamp").short('t'),
        FlagSpec::string("name", "recover to a named restore point").short('n'),
        FlagSpec::string("lsn", "recover to an LSN").short('l'),
        FlagSpec::string("xid", "recover to a transaction ID").short('x'),
        FlagSpec::string("set", "recover from this backup set").short('b'),
        FlagSpec::string("data", "target data directory (default from config)").short('D'),
        FlagSpec::bool("exclusive", "stop just before the target").short('X'),
        FlagSpec::bool("promote", "promote once the target is reached").short('P'),
    ]
}

/// @acp:summary "Where recovery should stop"
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryTarget {
    /// End of the WAL stream
    Latest,
    /// Backup consistency point
    Immediate,
    Time(String),
    Name(String),
    Lsn(String),
    Xid(String),
}

impl RecoveryTarget {
    /// The one target selected by the flags
    ///
    /// No target, or more than one, is an error message for the user.
    pub fn from_invocation(inv: &Invocation<'_>) -> Result<Self, String> {
        let mut targets = Vec::new();
        if inv.flag("default") {
            targets.push(Self::Latest);
        }
        if inv.flag("immediate") {
            targets.push(Self::Immediate);
        }
        if let Some(t) = inv.value("time") {
            targets.push(Self::Time(normalize_time(&t)));
        }
        if let Some(n) = inv.value("name") {
            targets.push(Self::Name(n));
        }
        if let Some(l) = inv.value("lsn") {
            targets.push(Self::Lsn(l));
        }
        if let Some(x) = inv.value("xid") {
            targets.push(Self::Xid(x));
        }
        match targets.len() {
            0 => Err("no recovery target: use one of --default, --immediate, --time, --name, --lsn, --xid".to_string()),
            1 => Ok(targets.remove(0)),
            n => Err(format!("{} recovery targets given, only one is allowed", n)),
        }
    }

    /// pgbackrest `--type`/`--target` arguments
    pub fn restore_args(&self) -> Vec<String> {
        match self {
            Self::Latest => vec!["--type=default".to_string()],
            Self::Immediate => vec!["--type=immediate".to_string()],
            Self::Time(t) => vec!["--type=time".to_string(), format!("--target={}", t)],
            Self::Name(n) => vec!["--type=name".to_string(), format!("--target={}", n)],
            Self::Lsn(l) => vec!["--type=lsn".to_string(), format!("--target={}", l)],
            Self::Xid(x) => vec!["--type=xid".to_string(), format!("--target={}", x)],
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Latest => "end of WAL stream (latest)".to_string(),
            Self::Immediate => "backup consistency point".to_string(),
            Self::Time(t) => format!("time {}", t),
            Self::Name(n) => format!("restore point {}", n),
            Self::Lsn(l) => format!("LSN {}", l),
            Self::Xid(x) => format!("transaction {}", x),
        }
    }
}

/// A bare date means midnight of that day
pub fn normalize_time(raw: &str) -> String {
    let raw = raw.trim();
    let is_date = raw.len() == 10
        && raw
            .chars()
            .enumerate()
            .all(|(i, c)| if i == 4 || i == 7 { c == '-' } else { c.is_ascii_digit() });
    if is_date {
        format!("{} 00:00:00", raw)
    } else {
        raw.to_string()
    }
}

/// @acp:summary "Restore options resolved from flags"
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreOptions {
    pub stanza: String,
    pub target: RecoveryTarget,
    pub data_dir: PathBuf,
    pub set: Option<String>,
    pub repo: Option<String>,
    pub exclusive: bool,
    pub promote: bool,
}

impl RestoreOptions {
    /// Full `pgbackrest ... restore` argument list
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![format!("--stanza={}", self.stanza)];
        if let Some(repo) = &self.repo {
            args.push(format!("--repo={}", repo));
        }
        args.push(format!("--pg1-path={}", self.data_dir.display()));
        args.push("--delta".to_string());
        args.extend(self.target.restore_args());
        if let Some(set) = &self.set {
            args.push(format!("--set={}", set));
        }
        if self.exclusive {
            args.push("--target-exclusive".to_string());
        }
        if self.promote {
            args.push("--target-action=promote".to_string());
        }
        args.push("restore".to_string());
        args
    }
}

/// First stanza section of a pgbackrest.conf
pub fn stanza_from_conf(content: &str) -> Option<String> {
    content
        .lines()
        .map(str::trim)
        .filter_map(|line| line.strip_prefix('[')?.strip_suffix(']'))
        .map(str::trim)
        .find(|name| !name.is_empty() && *name != "global" && !name.contains(':'))
        .map(str::to_string)
}

fn dbsu<'a>(inv: &Invocation<'a>) -> &'a str {
    &inv.config.dbsu
}

pub(crate) fn precheck() -> anyhow::Result<()> {
    require_tool("pgbackrest", CODE_PB_NOT_FOUND)?;
    if !Path::new(CONFIG_PATH).exists() {
        return Err(ExitCodeError::from_code(
            CODE_PB_CONFIG_NOT_FOUND,
            format!("pgBackRest config not found: {}", CONFIG_PATH),
        )
        .into());
    }
    Ok(())
}

/// Stanza from `--stanza`, else from the config file
pub(crate) fn resolve_stanza(inv: &Invocation<'_>) -> anyhow::Result<String> {
    if let Some(stanza) = inv.value("stanza").filter(|s| !s.trim().is_empty()) {
        return Ok(stanza);
    }
    let content = std::fs::read_to_string(CONFIG_PATH)
        .ok()
        .or_else(|| Cmd::new("cat").arg(CONFIG_PATH).as_user(dbsu(inv)).read().ok())
        .unwrap_or_default();
    stanza_from_conf(&content).ok_or_else(|| {
        ExitCodeError::from_code(
            CODE_PB_STANZA_NOT_FOUND,
            format!("no stanza found in {}, use --stanza", CONFIG_PATH),
        )
        .into()
    })
}

/// `pgbackrest --stanza=<s> [--repo=<n>]` as the dbsu
fn pgbackrest(inv: &Invocation<'_>, stanza: &str) -> Cmd {
    let mut cmd = Cmd::new("pgbackrest")
        .arg(format!("--stanza={}", stanza))
        .as_user(dbsu(inv));
    if let Some(repo) = inv.value("repo") {
        cmd = cmd.arg(format!("--repo={}", repo));
    }
    cmd
}

/// Replace an uncategorized failure with `code`, keeping the message
fn recode(code: i32) -> impl Fn(anyhow::Error) -> anyhow::Error {
    move |err| {
        if crate::error::carried_code(&err).is_some_and(|e| e.code != 0) {
            return err;
        }
        ExitCodeError::from_code(code, format!("{:#}", err)).into()
    }
}

fn info(inv: &Invocation<'_>) -> anyhow::Result<()> {
    let set = inv.value("set");
    if config::is_structured_output() {
        let fetched = precheck()
            .and_then(|_| resolve_stanza(inv))
            .and_then(|stanza| {
                let mut cmd = pgbackrest(inv, &stanza).arg("--output=json");
                if let Some(s) = &set {
                    cmd = cmd.arg(format!("--set={}", s));
                }
                cmd.arg("info").read()
            });
        return match fetched {
            Ok(raw) => match embed_json(raw.as_bytes()) {
                Ok(doc) => output::print_data(doc, "pgBackRest backup info retrieved"),
                Err(e) => output::handle_result(
                    CommandResult::fail(CODE_PB_INFO_FAILED, "failed to parse pgbackrest info output")
                        .with_detail(e.to_string()),
                ),
            },
            Err(err) => {
                let code = crate::error::carried_code(&err)
                    .map(|e| e.code)
                    .filter(|c| *c != 0)
                    .unwrap_or(CODE_PB_INFO_FAILED);
                output::handle_result(
                    CommandResult::fail(code, "failed to get pgBackRest info").with_detail(format!("{:#}", err)),
                )
            }
        };
    }
    bridged(inv, Module::Pb, params([("set", json!(set))]), || {
        precheck()?;
        let mut cmd = pgbackrest(inv, &resolve_stanza(inv)?);
        if let Some(s) = &set {
            cmd = cmd.arg(format!("--set={}", s));
        }
        cmd.arg("info").run()
    })
}

fn ls(inv: &Invocation<'_>) -> anyhow::Result<()> {
    bridged(inv, Module::Pb, Default::default(), || {
        precheck()?;
        pgbackrest(inv, &resolve_stanza(inv)?)
            .args(["repo-ls", "--recurse"])
            .run()
    })
}

fn backup(inv: &Invocation<'_>) -> anyhow::Result<()> {
    let kind = inv.value("type");
    if let Some(k) = kind.as_deref().filter(|k| !BACKUP_TYPES.contains(k)) {
        return Err(reject(
            inv,
            CODE_PB_INVALID_ARGS,
            "invalid backup type",
            &format!("type must be one of full, diff, incr; got {:?}", k),
        ));
    }
    bridged(inv, Module::Pb, params([("type", json!(kind))]), || {
        precheck()?;
        let mut cmd = pgbackrest(inv, &resolve_stanza(inv)?);
        if let Some(k) = &kind {
            cmd = cmd.arg(format!("--type={}", k));
        }
        cmd.arg("backup").run().map_err(recode(CODE_PB_BACKUP_FAILED))
    })
}

fn expire(inv: &Invocation<'_>) -> anyhow::Result<()> {
    let set = inv.value("set");
    bridged(inv, Module::Pb, params([("set", json!(set))]), || {
        precheck()?;
        let mut cmd = pgbackrest(inv, &resolve_stanza(inv)?);
        if let Some(s) = &set {
            cmd = cmd.arg(format!("--set={}", s));
        }
        cmd.arg("expire").run()
    })
}

/// @acp:summary "Plan for a restore into a stopped data directory"
pub fn build_restore_plan(options: &RestoreOptions, state: &ServerState) -> Plan {
    let data = options.data_dir.display().to_string();
    let mut plan = Plan::new(format!("pgbackrest {}", options.args().join(" ")));
    if state.running {
        plan = plan.risk("PostgreSQL is running and must be stopped first");
    }
    plan.action(format!(
        "Restore stanza {} to {}",
        options.stanza,
        options.target.describe()
    ))
    .affects(Resource::new("directory", &data, "overwrite", "data directory is rewritten in delta mode"))
    .affects(Resource::new("stanza", &options.stanza, "read", "backup repository"))
    .expected(format!(
        "Data directory {} restored to {}",
        data,
        options.target.describe()
    ))
    .risk("Changes made after the recovery target are discarded")
}

pub(crate) fn restore_options(inv: &Invocation<'_>, stanza: String) -> Result<RestoreOptions, String> {
    Ok(RestoreOptions {
        stanza,
        target: RecoveryTarget::from_invocation(inv)?,
        data_dir: inv
            .value("data")
            .map(PathBuf::from)
            .unwrap_or_else(|| inv.config.pg_data.clone()),
        set: inv.value("set"),
        repo: inv.value("repo"),
        exclusive: inv.flag("exclusive"),
        promote: inv.flag("promote"),
    })
}

fn restore(inv: &Invocation<'_>) -> anyhow::Result<()> {
    let stanza = inv.value("stanza").unwrap_or_default();
    let stanza = if stanza.is_empty() && inv.flag("plan") {
        resolve_stanza(inv).unwrap_or_else(|_| "(unknown)".to_string())
    } else {
        stanza
    };
    let options = restore_options(inv, stanza)
        .map_err(|detail| reject(inv, CODE_PB_INVALID_RESTORE_PARAMS, "invalid restore parameters", &detail))?;
    if inv.flag("plan") {
        return output::handle_plan(&build_restore_plan(&options, &ServerState::observe(&options.data_dir)));
    }
    require_force(inv, CODE_PB_RESTORE_NEED_FORCE)?;

    let p = params([
        ("target", json!(options.target.describe())),
        ("data_dir", json!(options.data_dir)),
        ("set", json!(options.set)),
    ]);
    bridged(inv, Module::Pb, p, || {
        precheck()?;
        let mut options = options.clone();
        if options.stanza.is_empty() {
            options.stanza = resolve_stanza(inv)?;
        }
        if ServerState::observe(&options.data_dir).running {
            return Err(ExitCodeError::from_code(
                CODE_PB_PG_RUNNING,
                format!("PostgreSQL is running on {}, stop it first", options.data_dir.display()),
            )
            .into());
        }
        Cmd::new("pgbackrest")
            .args(options.args())
            .as_user(dbsu(inv))
            .run()
            .map_err(recode(CODE_PB_RESTORE_FAILED))
    })
}

fn check(inv: &Invocation<'_>) -> anyhow::Result<()> {
    bridged(inv, Module::Pb, Default::default(), || {
        precheck()?;
        pgbackrest(inv, &resolve_stanza(inv)?).arg("check").run()
    })
}

/// create, upgrade and delete map to the stanza-* commands
fn stanza(inv: &Invocation<'_>) -> anyhow::Result<()> {
    let verb = inv.path.rsplit(' ').next().unwrap_or_default().to_string();
    if verb == "delete" {
        require_force(inv, CODE_PB_STANZA_DELETE_REQUIRES_FORCE)?;
    }
    bridged(inv, Module::Pb, params([("action", json!(verb))]), || {
        precheck()?;
        let mut cmd = pgbackrest(inv, &resolve_stanza(inv)?).arg(format!("stanza-{}", verb));
        if verb == "delete" {
            cmd = cmd.arg("--force");
        }
        cmd.run()
    })
}

fn log(inv: &Invocation<'_>) -> anyhow::Result<()> {
    let file = inv.value("file");
    let lines = inv.int("lines").unwrap_or(50);
    let p = params([("file", json!(file)), ("lines", json!(lines))]);
    bridged(inv, Module::Pb, p, || {
        let path = pg::resolve_log_file(Path::new(LOG_DIR), file.as_deref())?;
        Cmd::new("tail")
            .args(["-n".to_string(), lines.to_string(), path.display().to_string()])
            .as_user(dbsu(inv))
            .run()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::tree::chain_path;
    use crate::config::Config;
    use pretty_assertions::assert_eq;

    fn with_restore<F: FnOnce(&Invocation<'_>)>(argv: &[&str], f: F) {
        let root = crate::commands::root();
        let matches = root
            .to_clap()
            .try_get_matches_from(std::iter::once("pig").chain(argv.iter().copied()))
            .unwrap();
        let (chain, leaf) = root.resolve(&matches);
        let config = Config::default();
        let inv = Invocation::new(chain_path(&chain), &[], leaf, &config);
        f(&inv)
    }

    #[test]
    fn test_recovery_target_selection() {
        with_restore(&["pb", "restore", "-d"], |inv| {
            assert_eq!(RecoveryTarget::from_invocation(inv), Ok(RecoveryTarget::Latest));
        });
        with_restore(&["pb", "restore", "-t", "2025-01-01"], |inv| {
            assert_eq!(
                RecoveryTarget::from_invocation(inv),
                Ok(RecoveryTarget::Time("2025-01-01 00:00:00".into()))
            );
        });
        with_restore(&["pb", "restore"], |inv| {
            assert!(RecoveryTarget::from_invocation(inv).unwrap_err().starts_with("no recovery target"));
        });
        with_restore(&["pb", "restore", "-d", "-I"], |inv| {
            assert_eq!(
                RecoveryTarget::from_invocation(inv).unwrap_err(),
                "2 recovery targets given, only one is allowed"
            );
        });
    }

    #[test]
    fn test_restore_args() {
        let options = RestoreOptions {
            stanza: "pg-meta".into(),
            target: RecoveryTarget::Lsn("0/7000000".into()),
            data_dir: PathBuf::from("/pg/data"),
            set: Some("20250101-120000F".into()),
            repo: None,
            exclusive: true,
            promote: true,
        };
        assert_eq!(
            options.args(),
            vec![
                "--stanza=pg-meta",
                "--pg1-path=/pg/data",
                "--delta",
                "--type=lsn",
                "--target=0/7000000",
                "--set=20250101-120000F",
                "--target-exclusive",
                "--target-action=promote",
                "restore",
            ]
        );
    }

    #[test]
    fn test_normalize_time() {
        assert_eq!(normalize_time("2025-01-01"), "2025-01-01 00:00:00");
        assert_eq!(normalize_time(" 2025-01-01 12:00:00+08 "), "2025-01-01 12:00:00+08");
        assert_eq!(normalize_time("12:00:00"), "12:00:00");
    }

    #[test]
    fn test_stanza_from_conf() {
        let conf = "[global]\nrepo1-path=/pg/backup\n\n[global:archive-push]\ncompress-level=3\n\n[pg-meta]\npg1-path=/pg/data\n";
        assert_eq!(stanza_from_conf(conf).as_deref(), Some("pg-meta"));
        assert_eq!(stanza_from_conf("[global]\n"), None);
    }

    #[test]
    fn test_restore_plan() {
        let options = RestoreOptions {
            stanza: "pg-meta".into(),
            target: RecoveryTarget::Latest,
            data_dir: PathBuf::from("/pg/data"),
            set: None,
            repo: None,
            exclusive: false,
            promote: false,
        };
        let stopped = ServerState {
            data_dir: PathBuf::from("/pg/data"),
            pid: None,
            running: false,
        };
        let plan = build_restore_plan(&options, &stopped);
        assert_eq!(plan.actions[0].description, "Restore stanza pg-meta to end of WAL stream (latest)");
        assert_eq!(plan.risks, vec!["Changes made after the recovery target are discarded".to_string()]);

        let running = ServerState { running: true, pid: Some(7), ..stopped };
        assert_eq!(build_restore_plan(&options, &running).risks.len(), 2);
    }
}
