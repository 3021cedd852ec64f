//! @acp:module "PostgreSQL Commands"
//! @acp:summary "Local PostgreSQL server control through pg_ctl, with plans for stop/restart"
//! @acp:domain cli
//! @acp:layer handler
//!
//! Server state is observed from `postmaster.pid` in the data directory: its
//! first line is the postmaster PID, and the server counts as running while
//! that process exists.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::json;

use super::{bridged, force_flag, group, reject, require_force};
use crate::bridge::params;
use crate::capability::ann;
use crate::cli::tree::{CommandSpec, FlagSpec, Invocation};
use crate::config::Config;
use crate::error::{carried_code, ExitCodeError};
use crate::exec::Cmd;
use crate::output::code::{
    CODE_PG_ALREADY_INITIALIZED, CODE_PG_INVALID_ARGS, CODE_PG_PROMOTE_NEED_FORCE,
    CODE_PG_STATUS_DATA_DIR_NOT_FOUND, CODE_PG_STATUS_NOT_RUNNING,
};
use crate::output::{self, CommandResult, Module, Plan, Resource};
use crate::outln;

/// Shutdown modes accepted by pg_ctl
pub const SHUTDOWN_MODES: [&str; 3] = ["smart", "fast", "immediate"];

const DEFAULT_LOG_DIR: &str = "/pg/log/postgres";
const SERVICE_UNIT: &str = "postgres";

pub fn command() -> CommandSpec {
    CommandSpec::new("pg", "Manage local PostgreSQL server")
        .alias("postgres")
        .long(
            "pig pg - control the local PostgreSQL server

Commands run pg_ctl, psql and friends as the database superuser. The data
directory defaults to the configured pg_data (/pg/data).",
        )
        .example(
            "  pig pg status                # show server state
  pig pg stop --plan           # preview a fast shutdown
  pig pg restart -m immediate  # restart without waiting
  pig pg log tail -n 100       # last lines of the newest log",
        )
        .ann(group("pig pg"))
        .flag(FlagSpec::string("data", "data directory (default from config)").short('D').global())
        .children(vec![
            CommandSpec::new("init", "Initialize a new data directory")
                .alias("initdb")
                .alias("i")
                .ann(ann("pig pg init", "action", "volatile", "unsafe", false, "high", "recommended", "dbsu", 30000))
                .flag(FlagSpec::string("encoding", "database encoding").short('E').default("UTF8"))
                .flag(FlagSpec::string("locale", "database locale").default("C"))
                .flag(force_flag())
                .run(init),
            CommandSpec::new("start", "Start the server")
                .alias("boot")
                .alias("up")
                .ann(ann("pig pg start", "action", "volatile", "unsafe", true, "medium", "none", "dbsu", 10000))
                .run(start),
            CommandSpec::new("stop", "Stop the server")
                .alias("halt")
                .alias("down")
                .ann(ann("pig pg stop", "action", "volatile", "unsafe", true, "high", "recommended", "dbsu", 10000))
                .flag(mode_flag())
                .flag(plan_flag())
                .run(stop),
            CommandSpec::new("restart", "Restart the server")
                .alias("reboot")
                .ann(ann("pig pg restart", "action", "volatile", "unsafe", false, "high", "recommended", "dbsu", 30000))
                .flag(mode_flag())
                .flag(plan_flag())
                .run(restart),
            CommandSpec::new("reload", "Reload server configuration")
                .alias("hup")
                .ann(ann("pig pg reload", "action", "volatile", "restricted", true, "low", "none", "dbsu", 1000))
                .run(reload),
            CommandSpec::new("status", "Show server state")
                .alias("st")
                .alias("stat")
                .ann(ann("pig pg status", "query", "volatile", "safe", true, "safe", "none", "dbsu", 500))
                .run(status),
            CommandSpec::new("promote", "Promote a standby to primary")
                .alias("pro")
                .ann(ann("pig pg promote", "action", "volatile", "unsafe", false, "critical", "required", "dbsu", 10000))
                .flag(force_flag())
                .run(promote),
            CommandSpec::new("psql [dbname]", "Run psql as the database superuser")
                .alias("sql")
                .ann(ann("pig pg psql", "action", "volatile", "unsafe", false, "medium", "none", "dbsu", 1000))
                .arg_help("dbname", "database to connect to")
                .flag(FlagSpec::string("command", "run a single command and exit").short('c'))
                .run(psql),
            CommandSpec::new("ps", "Show server processes")
                .ann(ann("pig pg ps", "query", "volatile", "safe", true, "safe", "none", "dbsu", 500))
                .run(ps),
            log_command(),
            service_command(),
        ])
}

fn mode_flag() -> FlagSpec {
    FlagSpec::string("mode", "shutdown mode: smart, fast, immediate")
        .short('m')
        .default("fast")
        .choices(&SHUTDOWN_MODES)
}

fn plan_flag() -> FlagSpec {
    FlagSpec::bool("plan", "show the execution plan without running it").alias("dry-run")
}

fn log_command() -> CommandSpec {
    CommandSpec::new("log", "Inspect server logs")
        .alias("l")
        .ann(group("pig pg log"))
        .flag(FlagSpec::string("log-dir", "log directory").default(DEFAULT_LOG_DIR).global())
        .children(vec![
            CommandSpec::new("list", "List log files")
                .alias("ls")
                .ann(ann("pig pg log list", "query", "volatile", "safe", true, "safe", "none", "dbsu", 100))
                .run(log_list),
            CommandSpec::new("tail [file]", "Show the last lines of a log file")
                .ann(ann("pig pg log tail", "query", "volatile", "safe", true, "safe", "none", "dbsu", 200))
                .arg_help("file", "log file name (default: newest)")
                .flag(FlagSpec::int("lines", "number of lines").short('n').default("50"))
                .run(log_tail),
            CommandSpec::new("cat [file]", "Print a log file")
                .ann(ann("pig pg log cat", "query", "volatile", "safe", true, "safe", "none", "dbsu", 500))
                .arg_help("file", "log file name (default: newest)")
                .run(log_cat),
            CommandSpec::new("grep <pattern> [file]", "Search a log file")
                .ann(ann("pig pg log grep", "query", "volatile", "safe", true, "safe", "none", "dbsu", 1000))
                .arg_help("pattern", "regular expression to search for")
                .arg_help("file", "log file name (default: newest)")
                .run(log_grep),
        ])
}

fn service_command() -> CommandSpec {
    CommandSpec::new("svc", "Control the postgres systemd service")
        .alias("s")
        .alias("service")
        .ann(ann("pig pg svc", "query", "stable", "safe", true, "safe", "none", "root", 100))
        .children(vec![
            CommandSpec::new("start", "Start the service")
                .ann(ann("pig pg svc start", "action", "volatile", "unsafe", true, "medium", "none", "root", 10000))
                .run(service),
            CommandSpec::new("stop", "Stop the service")
                .ann(ann("pig pg svc stop", "action", "volatile", "unsafe", true, "high", "recommended", "root", 10000))
                .run(service),
            CommandSpec::new("restart", "Restart the service")
                .ann(ann("pig pg svc restart", "action", "volatile", "unsafe", false, "high", "recommended", "root", 30000))
                .run(service),
            CommandSpec::new("reload", "Reload the service")
                .ann(ann("pig pg svc reload", "action", "volatile", "restricted", true, "low", "none", "root", 1000))
                .run(service),
            CommandSpec::new("status", "Show service status")
                .ann(ann("pig pg svc status", "query", "volatile", "safe", true, "safe", "none", "root", 500))
                .run(service),
        ])
}

/// @acp:summary "Observed state of a data directory"
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerState {
    pub data_dir: PathBuf,
    /// PID recorded in postmaster.pid
    pub pid: Option<u32>,
    pub running: bool,
}

impl ServerState {
    pub fn observe(data_dir: &Path) -> Self {
        let pid = read_postmaster_pid(data_dir);
        Self {
            data_dir: data_dir.to_path_buf(),
            pid,
            running: pid.is_some_and(process_alive),
        }
    }
}

/// First line of `<data_dir>/postmaster.pid`
pub fn read_postmaster_pid(data_dir: &Path) -> Option<u32> {
    let content = fs::read_to_string(data_dir.join("postmaster.pid")).ok()?;
    content.lines().next()?.trim().parse().ok()
}

fn process_alive(pid: u32) -> bool {
    pid > 0 && Path::new("/proc").join(pid.to_string()).exists()
}

/// Major version from `<data_dir>/PG_VERSION`
fn read_pg_version(data_dir: &Path) -> Option<String> {
    fs::read_to_string(data_dir.join("PG_VERSION"))
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// @acp:summary "Plan for `pig pg stop`"
pub fn build_stop_plan(state: &ServerState, mode: &str) -> Plan {
    let data = state.data_dir.display().to_string();
    let mut plan = Plan::new(format!("pig pg stop -m {}", mode));
    if state.running {
        plan = plan.action(format!("Stop PostgreSQL server (mode: {})", mode));
    }
    plan = plan.affects(Resource::new("directory", &data, "stop", "data directory"));
    if !state.running {
        return plan.expected(format!("PostgreSQL already stopped (data_dir: {})", data));
    }

    plan = plan
        .affects(Resource::new("service", "postgresql", "stop", running_detail(state)))
        .affects(Resource::new(
            "connection",
            "active sessions",
            "terminate",
            "all client connections will be disconnected",
        ))
        .expected(format!("PostgreSQL stopped (data_dir: {})", data))
        .risk("All active connections will be terminated")
        .risk("Write operations will become unavailable");
    match mode {
        "smart" => plan.risk("Server waits for clients to disconnect (may take time)"),
        "immediate" => plan.risk("Immediate shutdown may require recovery on next start"),
        _ => plan,
    }
}

/// @acp:summary "Plan for `pig pg restart`"
pub fn build_restart_plan(state: &ServerState, mode: &str) -> Plan {
    let data = state.data_dir.display().to_string();
    let mut plan = Plan::new(format!("pig pg restart -m {}", mode));
    if state.running {
        plan = plan.action(format!("Stop PostgreSQL server (mode: {})", mode));
    }
    plan = plan
        .action("Start PostgreSQL server")
        .affects(Resource::new("directory", &data, "restart", "data directory"));
    if !state.running {
        return plan.expected(format!("PostgreSQL started (data_dir: {})", data));
    }

    plan.affects(Resource::new("service", "postgresql", "restart", running_detail(state)))
        .affects(Resource::new(
            "connection",
            "active sessions",
            "terminate",
            "all client connections will be disconnected",
        ))
        .expected(format!("PostgreSQL restarted (data_dir: {})", data))
        .risk("All active connections will be terminated")
        .risk("In-flight transactions will be rolled back")
        .risk("Write operations will be temporarily unavailable")
}

fn running_detail(state: &ServerState) -> String {
    match state.pid {
        Some(pid) => format!("PID {} will be terminated", pid),
        None => "running server will be terminated".to_string(),
    }
}

fn data_dir(inv: &Invocation<'_>) -> PathBuf {
    inv.value("data")
        .map(PathBuf::from)
        .unwrap_or_else(|| inv.config.pg_data.clone())
}

/// Path of a PostgreSQL binary, honoring the configured bin directory
pub(crate) fn pg_binary(config: &Config, name: &str) -> String {
    match &config.pg_bin {
        Some(dir) => dir.join(name).display().to_string(),
        None => name.to_string(),
    }
}

fn pg_ctl(inv: &Invocation<'_>) -> Cmd {
    Cmd::new(pg_binary(inv.config, "pg_ctl")).as_user(&inv.config.dbsu)
}

/// Validated `--mode`
fn shutdown_mode(inv: &Invocation<'_>) -> anyhow::Result<String> {
    let mode = inv.value("mode").unwrap_or_else(|| "fast".to_string());
    if SHUTDOWN_MODES.contains(&mode.as_str()) {
        return Ok(mode);
    }
    Err(reject(
        inv,
        CODE_PG_INVALID_ARGS,
        "invalid shutdown mode",
        &format!("mode must be one of smart, fast, immediate; got {:?}", mode),
    ))
}

fn init(inv: &Invocation<'_>) -> anyhow::Result<()> {
    let data = data_dir(inv);
    let force = inv.flag("force");
    if !force && read_pg_version(&data).is_some() {
        return Err(reject(
            inv,
            CODE_PG_ALREADY_INITIALIZED,
            "data directory already initialized",
            &format!("{} already holds a cluster; use --force to overwrite", data.display()),
        ));
    }
    let encoding = inv.value("encoding").unwrap_or_else(|| "UTF8".to_string());
    let locale = inv.value("locale").unwrap_or_else(|| "C".to_string());
    let p = params([
        ("data_dir", json!(data)),
        ("encoding", json!(encoding)),
        ("locale", json!(locale)),
        ("force", json!(force)),
    ]);
    bridged(inv, Module::Pg, p, || {
        if force && data.exists() {
            tracing::warn!("removing existing data directory {}", data.display());
            Cmd::new("rm")
                .args(["-rf".to_string(), data.display().to_string()])
                .as_user(&inv.config.dbsu)
                .run()?;
        }
        Cmd::new(pg_binary(inv.config, "initdb"))
            .args(["-D".to_string(), data.display().to_string()])
            .args(["-E", encoding.as_str(), "--locale", locale.as_str()])
            .as_user(&inv.config.dbsu)
            .run()
    })
}

fn start(inv: &Invocation<'_>) -> anyhow::Result<()> {
    let data = data_dir(inv);
    bridged(inv, Module::Pg, params([("data_dir", json!(data))]), || {
        let state = ServerState::observe(&data);
        if state.running {
            outln!("PostgreSQL already running (PID {})", state.pid.unwrap_or_default());
            return Ok(());
        }
        // the server's own stdout must not hold the capture pipe open
        let log = data.join("pg_ctl.log");
        pg_ctl(inv)
            .args(["start", "-w", "-D"])
            .arg(data.display().to_string())
            .args(["-l".to_string(), log.display().to_string()])
            .run()
    })
}

fn stop(inv: &Invocation<'_>) -> anyhow::Result<()> {
    let data = data_dir(inv);
    let mode = shutdown_mode(inv)?;
    if inv.flag("plan") {
        return output::handle_plan(&build_stop_plan(&ServerState::observe(&data), &mode));
    }
    let p = params([("data_dir", json!(data)), ("mode", json!(mode))]);
    bridged(inv, Module::Pg, p, || {
        if !ServerState::observe(&data).running {
            outln!("PostgreSQL already stopped (data_dir: {})", data.display());
            return Ok(());
        }
        pg_ctl(inv)
            .args(["stop", "-w", "-D"])
            .arg(data.display().to_string())
            .args(["-m", mode.as_str()])
            .run()
    })
}

fn restart(inv: &Invocation<'_>) -> anyhow::Result<()> {
    let data = data_dir(inv);
    let mode = shutdown_mode(inv)?;
    if inv.flag("plan") {
        return output::handle_plan(&build_restart_plan(&ServerState::observe(&data), &mode));
    }
    let p = params([("data_dir", json!(data)), ("mode", json!(mode))]);
    bridged(inv, Module::Pg, p, || {
        let log = data.join("pg_ctl.log");
        pg_ctl(inv)
            .args(["restart", "-w", "-D"])
            .arg(data.display().to_string())
            .args(["-m", mode.as_str()])
            .args(["-l".to_string(), log.display().to_string()])
            .run()
    })
}

fn reload(inv: &Invocation<'_>) -> anyhow::Result<()> {
    let data = data_dir(inv);
    bridged(inv, Module::Pg, params([("data_dir", json!(data))]), || {
        pg_ctl(inv)
            .args(["reload", "-D"])
            .arg(data.display().to_string())
            .run()
    })
}

/// Payload of `pig pg status`
#[derive(Debug, Clone, Serialize)]
struct StatusData {
    data_dir: String,
    running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<String>,
}

fn status(inv: &Invocation<'_>) -> anyhow::Result<()> {
    let data = data_dir(inv);
    if !data.is_dir() {
        return output::handle_result(
            CommandResult::fail(CODE_PG_STATUS_DATA_DIR_NOT_FOUND, "data directory not found")
                .with_detail(data.display().to_string()),
        );
    }
    let state = ServerState::observe(&data);
    let payload = StatusData {
        data_dir: data.display().to_string(),
        running: state.running,
        pid: state.pid.filter(|_| state.running),
        version: read_pg_version(&data),
    };
    let detail = format!(
        "data_dir: {}, version: {}",
        payload.data_dir,
        payload.version.as_deref().unwrap_or("unknown")
    );
    let result = match payload.pid {
        Some(pid) => CommandResult::ok(format!("PostgreSQL is running (PID {})", pid)),
        None => CommandResult::fail(CODE_PG_STATUS_NOT_RUNNING, "PostgreSQL is not running"),
    };
    output::handle_result(result.with_detail(detail).with_data(payload))
}

fn promote(inv: &Invocation<'_>) -> anyhow::Result<()> {
    require_force(inv, CODE_PG_PROMOTE_NEED_FORCE)?;
    let data = data_dir(inv);
    bridged(inv, Module::Pg, params([("data_dir", json!(data))]), || {
        if !ServerState::observe(&data).running {
            return Err(ExitCodeError::from_code(
                CODE_PG_STATUS_NOT_RUNNING,
                format!("PostgreSQL is not running (data_dir: {})", data.display()),
            )
            .into());
        }
        pg_ctl(inv)
            .args(["promote", "-w", "-D"])
            .arg(data.display().to_string())
            .run()
    })
}

fn psql(inv: &Invocation<'_>) -> anyhow::Result<()> {
    let dbname = inv.value("dbname");
    let command = inv.value("command");
    let p = params([("dbname", json!(dbname)), ("command", json!(command))]);
    bridged(inv, Module::Pg, p, || {
        let mut cmd = Cmd::new(pg_binary(inv.config, "psql")).as_user(&inv.config.dbsu);
        if let Some(db) = &dbname {
            cmd = cmd.arg(db.as_str());
        }
        if let Some(sql) = &command {
            cmd = cmd.args(["-c", sql.as_str()]);
        }
        cmd.run()
    })
}

fn ps(inv: &Invocation<'_>) -> anyhow::Result<()> {
    bridged(inv, Module::Pg, params([("dbsu", json!(inv.config.dbsu))]), || {
        Cmd::new("ps")
            .args(["-u", inv.config.dbsu.as_str(), "-o", "pid,ppid,etime,args"])
            .run()
    })
}

fn log_dir(inv: &Invocation<'_>) -> PathBuf {
    PathBuf::from(inv.value("log-dir").unwrap_or_else(|| DEFAULT_LOG_DIR.to_string()))
}

/// Log files in `dir`, oldest first
pub fn list_log_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files: Vec<(std::time::SystemTime, PathBuf)> = fs::read_dir(dir)
        .map_err(|e| anyhow::anyhow!("cannot read log directory {}: {}", dir.display(), e))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
        .filter_map(|entry| {
            let modified = entry.metadata().and_then(|m| m.modified()).ok()?;
            Some((modified, entry.path()))
        })
        .collect();
    files.sort();
    Ok(files.into_iter().map(|(_, path)| path).collect())
}

/// Named file under `dir`, or the newest one
pub fn resolve_log_file(dir: &Path, file: Option<&str>) -> anyhow::Result<PathBuf> {
    if let Some(name) = file {
        let path = Path::new(name);
        return Ok(if path.is_absolute() {
            path.to_path_buf()
        } else {
            dir.join(path)
        });
    }
    list_log_files(dir)?
        .pop()
        .ok_or_else(|| anyhow::anyhow!("no log files in {}", dir.display()))
}

fn log_list(inv: &Invocation<'_>) -> anyhow::Result<()> {
    let dir = log_dir(inv);
    bridged(inv, Module::Pg, params([("log_dir", json!(dir))]), || {
        for path in list_log_files(&dir)? {
            let size = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
            outln!("{:>12}  {}", size, name);
        }
        Ok(())
    })
}

fn log_tail(inv: &Invocation<'_>) -> anyhow::Result<()> {
    let dir = log_dir(inv);
    let file = inv.value("file");
    let lines = inv.int("lines").unwrap_or(50);
    let p = params([("log_dir", json!(dir)), ("file", json!(file)), ("lines", json!(lines))]);
    bridged(inv, Module::Pg, p, || {
        let path = resolve_log_file(&dir, file.as_deref())?;
        Cmd::new("tail")
            .args(["-n".to_string(), lines.to_string(), path.display().to_string()])
            .as_user(&inv.config.dbsu)
            .run()
    })
}

fn log_cat(inv: &Invocation<'_>) -> anyhow::Result<()> {
    let dir = log_dir(inv);
    let file = inv.value("file");
    let p = params([("log_dir", json!(dir)), ("file", json!(file))]);
    bridged(inv, Module::Pg, p, || {
        let path = resolve_log_file(&dir, file.as_deref())?;
        Cmd::new("cat")
            .arg(path.display().to_string())
            .as_user(&inv.config.dbsu)
            .run()
    })
}

fn log_grep(inv: &Invocation<'_>) -> anyhow::Result<()> {
    let dir = log_dir(inv);
    let pattern = inv.value("pattern").unwrap_or_default();
    let file = inv.value("file");
    let p = params([("log_dir", json!(dir)), ("pattern", json!(pattern)), ("file", json!(file))]);
    bridged(inv, Module::Pg, p, || {
        let path = resolve_log_file(&dir, file.as_deref())?;
        let result = Cmd::new("grep")
            .args(["-nE".to_string(), pattern.clone(), path.display().to_string()])
            .as_user(&inv.config.dbsu)
            .run();
        match result {
            // grep exits 1 when nothing matched
            Err(err) if carried_code(&err).is_some_and(|e| e.exit == 1) => {
                outln!("no lines match {:?}", pattern);
                Ok(())
            }
            other => other,
        }
    })
}

fn service(inv: &Invocation<'_>) -> anyhow::Result<()> {
    let action = inv.path.rsplit(' ').next().unwrap_or("status").to_string();
    let p = params([("unit", json!(SERVICE_UNIT)), ("action", json!(action))]);
    bridged(inv, Module::Pg, p, || {
        let mut cmd = Cmd::new("systemctl").args([action.as_str(), SERVICE_UNIT]);
        if action == "status" {
            cmd = cmd.arg("--no-pager");
        }
        cmd.run()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn running_state() -> ServerState {
        ServerState {
            data_dir: PathBuf::from("/pg/data"),
            pid: Some(4242),
            running: true,
        }
    }

    fn stopped_state() -> ServerState {
        ServerState {
            data_dir: PathBuf::from("/pg/data"),
            pid: None,
            running: false,
        }
    }

    #[test]
    fn test_stop_plan_running() {
        let plan = build_stop_plan(&running_state(), "fast");
        assert_eq!(plan.command, "pig pg stop -m fast");
        assert_eq!(plan.actions.len(), 1);
        assert_eq!(plan.actions[0].description, "Stop PostgreSQL server (mode: fast)");
        let kinds: Vec<&str> = plan.affects.iter().map(|r| r.kind.as_str()).collect();
        assert_eq!(kinds, vec!["directory", "service", "connection"]);
        assert_eq!(plan.affects[1].detail, "PID 4242 will be terminated");
        assert_eq!(plan.expected, "PostgreSQL stopped (data_dir: /pg/data)");
        assert_eq!(plan.risks.len(), 2);
    }

    #[test]
    fn test_stop_plan_mode_risks() {
        let smart = build_stop_plan(&running_state(), "smart");
        assert_eq!(smart.risks[2], "Server waits for clients to disconnect (may take time)");
        let immediate = build_stop_plan(&running_state(), "immediate");
        assert_eq!(immediate.risks[2], "Immediate shutdown may require recovery on next start");
    }

    #[test]
    fn test_stop_plan_already_stopped() {
        let plan = build_stop_plan(&stopped_state(), "fast");
        assert!(plan.actions.is_empty());
        assert_eq!(plan.affects.len(), 1);
        assert!(plan.risks.is_empty());
        assert_eq!(plan.expected, "PostgreSQL already stopped (data_dir: /pg/data)");
    }

    #[test]
    fn test_restart_plan() {
        let plan = build_restart_plan(&running_state(), "fast");
        let steps: Vec<(i32, &str)> = plan
            .actions
            .iter()
            .map(|a| (a.step, a.description.as_str()))
            .collect();
        assert_eq!(
            steps,
            vec![(1, "Stop PostgreSQL server (mode: fast)"), (2, "Start PostgreSQL server")]
        );
        assert_eq!(plan.affects[1].impact, "restart");
        assert_eq!(plan.risks.len(), 3);

        let plan = build_restart_plan(&stopped_state(), "fast");
        assert_eq!(plan.actions.len(), 1);
        assert_eq!(plan.expected, "PostgreSQL started (data_dir: /pg/data)");
    }

    #[test]
    fn test_observe_from_postmaster_pid() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(ServerState::observe(dir.path()).pid, None);

        let pid = std::process::id();
        fs::write(dir.path().join("postmaster.pid"), format!("{}\n/pg/data\n", pid)).unwrap();
        let state = ServerState::observe(dir.path());
        assert_eq!(state.pid, Some(pid));
        assert!(state.running);

        fs::write(dir.path().join("postmaster.pid"), "999999999\n").unwrap();
        assert!(!ServerState::observe(dir.path()).running);

        fs::write(dir.path().join("postmaster.pid"), "garbage\n").unwrap();
        assert_eq!(read_postmaster_pid(dir.path()), None);
    }

    #[test]
    fn test_resolve_log_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(resolve_log_file(dir.path(), None).is_err());

        fs::write(dir.path().join("postgresql-Mon.csv"), "a").unwrap();
        assert_eq!(
            resolve_log_file(dir.path(), None).unwrap(),
            dir.path().join("postgresql-Mon.csv")
        );
        assert_eq!(
            resolve_log_file(dir.path(), Some("other.log")).unwrap(),
            dir.path().join("other.log")
        );
        assert_eq!(
            resolve_log_file(dir.path(), Some("/var/log/x.log")).unwrap(),
            PathBuf::from("/var/log/x.log")
        );
    }

    #[test]
    fn test_pg_binary() {
        let mut config = Config::default();
        assert_eq!(pg_binary(&config, "pg_ctl"), "pg_ctl");
        config.pg_bin = Some(PathBuf::from("/usr/pgsql/bin"));
        assert_eq!(pg_binary(&config, "pg_ctl"), "/usr/pgsql/bin/pg_ctl");
    }
}
