//! @acp:module "PITR Command"
//! @acp:summary "Point-in-time recovery with Patroni and PostgreSQL lifecycle handling"
//! @acp:domain cli
//! @acp:layer handler
//!
//! The workflow runs in a fixed order: stop Patroni, make sure PostgreSQL
//! is down, run `pgbackrest restore`, start PostgreSQL, print guidance. The
//! plan rendered by `--plan` lists the same steps the run would take.

use std::path::Path;
use std::thread;
use std::time::Duration;

use serde_json::json;

use super::patroni;
use super::pg::{self, ServerState};
use super::pgbackrest::{self, RecoveryTarget, RestoreOptions};
use super::{bridged, force_flag, reject, require_force};
use crate::bridge::params;
use crate::capability::ann;
use crate::cli::tree::{CommandSpec, FlagSpec, Invocation};
use crate::error::ExitCodeError;
use crate::exec::Cmd;
use crate::output::code::{
    CODE_PITR_INVALID_ARGS, CODE_PITR_NEED_FORCE, CODE_PITR_NO_BACKUP, CODE_PITR_PG_RUNNING,
    CODE_PITR_RESTORE_FAILED, CODE_PITR_START_FAILED, CODE_PITR_STOP_FAILED,
};
use crate::output::{self, Module, Plan, Resource};
use crate::{out, outln};

const PG_STOP_CHECKS: u32 = 6;
const PG_STOP_WAIT: Duration = Duration::from_secs(5);

pub fn command() -> CommandSpec {
    CommandSpec::new("pitr", "Point-in-time recovery with cluster orchestration")
        .long(
            "Perform PITR with automatic Patroni/PostgreSQL lifecycle management:

  1. Stop the Patroni service (if running)
  2. Ensure PostgreSQL is stopped
  3. Run pgbackrest restore
  4. Start PostgreSQL
  5. Print post-restore guidance

Exactly one recovery target is required. A date-only --time means
00:00:00 of that day.",
        )
        .example(
            "  pig pitr -d                       # recover to latest
  pig pitr -t \"2025-01-01 12:00:00+08\"
  pig pitr -I --plan                # show the plan only
  pig pitr -d --skip-patroni        # standalone PostgreSQL",
        )
        .ann(ann("pig pitr", "action", "volatile", "unsafe", false, "critical", "required", "dbsu", 900000))
        .flags(pgbackrest::recovery_flags())
        .flag(FlagSpec::string("stanza", "pgBackRest stanza name").short('s'))
        .flag(FlagSpec::string("repo", "repository number").short('r'))
        .flag(FlagSpec::bool("skip-patroni", "do not stop Patroni").short('S'))
        .flag(FlagSpec::bool("no-restart", "leave PostgreSQL stopped after restore").short('N'))
        .flag(FlagSpec::bool("plan", "show the execution plan without running it").alias("dry-run"))
        .flag(force_flag().alias("yes"))
        .run(run)
}

/// @acp:summary "Resolved PITR options"
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PitrOptions {
    pub restore: RestoreOptions,
    pub skip_patroni: bool,
    pub no_restart: bool,
}

/// Services observed before recovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemState {
    pub patroni_active: bool,
    pub pg: ServerState,
}

impl SystemState {
    pub fn observe(data_dir: &Path) -> Self {
        Self {
            patroni_active: patroni::service_active(),
            pg: ServerState::observe(data_dir),
        }
    }

    fn stops_patroni(&self, opts: &PitrOptions) -> bool {
        self.patroni_active && !opts.skip_patroni
    }

    fn stops_postgres(&self) -> bool {
        self.pg.running || self.patroni_active
    }
}

/// Equivalent command line for the plan header
fn command_line(opts: &PitrOptions) -> String {
    let mut parts = vec!["pig".to_string(), "pitr".to_string()];
    let quote = |v: &str| {
        if v.contains(' ') {
            format!("\"{}\"", v)
        } else {
            v.to_string()
        }
    };
    match &opts.restore.target {
        RecoveryTarget::Latest => parts.push("-d".into()),
        RecoveryTarget::Immediate => parts.push("-I".into()),
        RecoveryTarget::Time(t) => parts.extend(["-t".into(), quote(t)]),
        RecoveryTarget::Name(n) => parts.extend(["-n".into(), quote(n)]),
        RecoveryTarget::Lsn(l) => parts.extend(["-l".into(), l.clone()]),
        RecoveryTarget::Xid(x) => parts.extend(["-x".into(), x.clone()]),
    }
    if let Some(set) = &opts.restore.set {
        parts.extend(["-b".into(), set.clone()]);
    }
    if opts.skip_patroni {
        parts.push("-S".into());
    }
    if opts.no_restart {
        parts.push("-N".into());
    }
    if opts.restore.exclusive {
        parts.push("-X".into());
    }
    if opts.restore.promote {
        parts.push("-P".into());
    }
    parts.join(" ")
}

/// @acp:summary "Plan listing the steps a PITR run would take"
pub fn build_pitr_plan(state: &SystemState, opts: &PitrOptions) -> Plan {
    let target = opts.restore.target.describe();
    let data = opts.restore.data_dir.display().to_string();
    let mut plan = Plan::new(command_line(opts));

    if state.stops_patroni(opts) {
        plan = plan
            .action("Stop Patroni service")
            .affects(Resource::new("service", "patroni", "stop", "cluster management paused"));
    }
    if state.stops_postgres() {
        plan = plan
            .action("Ensure PostgreSQL is stopped")
            .affects(Resource::new("service", "postgresql", "stop", ""));
    }
    plan = plan.action("Execute pgBackRest restore");
    if !opts.no_restart {
        plan = plan.action("Start PostgreSQL");
    }
    plan = plan
        .action("Print post-restore guidance")
        .affects(Resource::new(
            "backup",
            opts.restore.set.clone().unwrap_or_else(|| "latest".to_string()),
            "restore",
            "pgBackRest",
        ))
        .affects(Resource::new("target", target.as_str(), "recovery", ""))
        .affects(Resource::new("data", data.as_str(), "overwrite", "data directory restored"));

    let mut expected = format!("PostgreSQL restored to {} (data dir: {})", target, data);
    if opts.no_restart {
        expected.push_str("; PostgreSQL remains stopped");
    }
    if opts.restore.promote {
        expected.push_str("; auto-promote enabled");
    }
    plan = plan.expected(expected).risk("Current data directory will be overwritten");

    if state.stops_patroni(opts) {
        plan = plan.risk("Patroni will be stopped; HA management suspended");
    }
    if opts.skip_patroni {
        plan = plan.risk("Patroni is not stopped; ensure cluster safety before restoring");
    }
    if opts.no_restart {
        plan = plan.risk("PostgreSQL will remain stopped after restore");
    }
    if opts.restore.exclusive {
        plan = plan.risk("Exclusive recovery stops before target; data beyond target not applied");
    }
    plan
}

/// True when pgbackrest output says the requested backup does not exist
pub fn is_no_backup_error(message: &str) -> bool {
    let msg = message.to_lowercase();
    let missing = msg.contains("not found") || msg.contains("does not exist");
    msg.contains("no prior backup exists")
        || msg.contains("unable to find backup")
        || msg.contains("no backup set")
        || (msg.contains("backup") && missing)
}

fn failed(code: i32, message: String) -> anyhow::Error {
    ExitCodeError::from_code(code, message).into()
}

fn stop_patroni() -> anyhow::Result<()> {
    outln!("=== Stopping Patroni service ===");
    Cmd::new("systemctl")
        .args(["stop", "patroni"])
        .run()
        .map_err(|e| failed(CODE_PITR_STOP_FAILED, format!("failed to stop patroni service: {:#}", e)))?;
    outln!("Patroni service stopped.");
    Ok(())
}

fn ensure_postgres_stopped(inv: &Invocation<'_>, data: &Path, patroni_stopped: bool) -> anyhow::Result<()> {
    outln!("=== Ensuring PostgreSQL is stopped ===");
    if patroni_stopped {
        for i in 1..=PG_STOP_CHECKS {
            thread::sleep(PG_STOP_WAIT);
            if !ServerState::observe(data).running {
                outln!("PostgreSQL stopped with Patroni.");
                return Ok(());
            }
            outln!("  still running, waiting ({}/{})", i, PG_STOP_CHECKS);
        }
    }
    if !ServerState::observe(data).running {
        outln!("PostgreSQL is not running.");
        return Ok(());
    }
    for mode in ["fast", "immediate"] {
        let stopped = Cmd::new(pg::pg_binary(inv.config, "pg_ctl"))
            .args(["stop", "-w", "-m", mode, "-D"])
            .arg(data.display().to_string())
            .as_user(&inv.config.dbsu)
            .run();
        if let Err(e) = stopped {
            tracing::warn!("pg_ctl stop -m {} failed: {:#}", mode, e);
        }
        if !ServerState::observe(data).running {
            outln!("PostgreSQL stopped ({} mode).", mode);
            return Ok(());
        }
    }
    Err(failed(
        CODE_PITR_PG_RUNNING,
        format!("PostgreSQL on {} could not be stopped", data.display()),
    ))
}

fn execute_restore(inv: &Invocation<'_>, options: &RestoreOptions) -> anyhow::Result<()> {
    outln!("=== Restoring to {} ===", options.target.describe());
    match Cmd::new("pgbackrest").args(options.args()).as_user(&inv.config.dbsu).read() {
        Ok(stdout) => {
            out!("{}", stdout);
            Ok(())
        }
        Err(e) => {
            let message = format!("{:#}", e);
            let code = if is_no_backup_error(&message) {
                CODE_PITR_NO_BACKUP
            } else {
                CODE_PITR_RESTORE_FAILED
            };
            Err(failed(code, format!("pgbackrest restore failed: {}", message)))
        }
    }
}

fn start_postgres(inv: &Invocation<'_>, data: &Path) -> anyhow::Result<()> {
    outln!("=== Starting PostgreSQL ===");
    Cmd::new(pg::pg_binary(inv.config, "pg_ctl"))
        .args(["start", "-w", "-D"])
        .arg(data.display().to_string())
        .args(["-l".to_string(), data.join("pg_ctl.log").display().to_string()])
        .as_user(&inv.config.dbsu)
        .run()
        .map_err(|e| failed(CODE_PITR_START_FAILED, format!("failed to start PostgreSQL: {:#}", e)))
}

fn print_guidance(opts: &PitrOptions, patroni_stopped: bool) {
    let data = opts.restore.data_dir.display();
    outln!();
    outln!("=== Next steps ===");
    if opts.no_restart {
        outln!("  start PostgreSQL:  pg_ctl start -D {}", data);
    }
    outln!("  verify the recovered data:  psql -c 'SELECT pg_is_in_recovery()'");
    if !opts.restore.promote {
        outln!("  promote if satisfied:  pig pg promote -f");
    }
    if patroni_stopped {
        outln!("  resume cluster management:  pig pg stop && systemctl start patroni");
    }
}

fn execute(inv: &Invocation<'_>, opts: &PitrOptions) -> anyhow::Result<()> {
    pgbackrest::precheck()?;
    let data = opts.restore.data_dir.as_path();
    let state = SystemState::observe(data);

    let patroni_stopped = state.stops_patroni(opts);
    if patroni_stopped {
        stop_patroni()?;
    }
    if state.stops_postgres() {
        ensure_postgres_stopped(inv, data, patroni_stopped)?;
    }
    execute_restore(inv, &opts.restore)?;
    if !opts.no_restart {
        start_postgres(inv, data)?;
    }
    print_guidance(opts, patroni_stopped);
    Ok(())
}

fn options(inv: &Invocation<'_>) -> anyhow::Result<PitrOptions> {
    let stanza = inv.value("stanza").unwrap_or_default();
    let restore = pgbackrest::restore_options(inv, stanza)
        .map_err(|detail| reject(inv, CODE_PITR_INVALID_ARGS, "invalid recovery target", &detail))?;
    Ok(PitrOptions {
        restore,
        skip_patroni: inv.flag("skip-patroni"),
        no_restart: inv.flag("no-restart"),
    })
}

fn run(inv: &Invocation<'_>) -> anyhow::Result<()> {
    let mut opts = options(inv)?;
    if inv.flag("plan") {
        if opts.restore.stanza.is_empty() {
            opts.restore.stanza = pgbackrest::resolve_stanza(inv).unwrap_or_default();
        }
        let state = SystemState::observe(&opts.restore.data_dir);
        return output::handle_plan(&build_pitr_plan(&state, &opts));
    }
    require_force(inv, CODE_PITR_NEED_FORCE)?;

    let p = params([
        ("target", json!(opts.restore.target.describe())),
        ("data_dir", json!(opts.restore.data_dir)),
        ("set", json!(opts.restore.set)),
        ("skip_patroni", json!(opts.skip_patroni)),
        ("no_restart", json!(opts.no_restart)),
    ]);
    bridged(inv, Module::Pitr, p, || {
        if opts.restore.stanza.is_empty() {
            opts.restore.stanza = pgbackrest::resolve_stanza(inv)?;
        }
        execute(inv, &opts)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn opts(target: RecoveryTarget) -> PitrOptions {
        PitrOptions {
            restore: RestoreOptions {
                stanza: "pg-meta".into(),
                target,
                data_dir: PathBuf::from("/pg/data"),
                set: None,
                repo: None,
                exclusive: false,
                promote: false,
            },
            skip_patroni: false,
            no_restart: false,
        }
    }

    fn state(patroni_active: bool, running: bool) -> SystemState {
        SystemState {
            patroni_active,
            pg: ServerState {
                data_dir: PathBuf::from("/pg/data"),
                pid: running.then_some(42),
                running,
            },
        }
    }

    fn steps(plan: &Plan) -> Vec<&str> {
        plan.actions.iter().map(|a| a.description.as_str()).collect()
    }

    #[test]
    fn test_plan_with_patroni() {
        let plan = build_pitr_plan(&state(true, true), &opts(RecoveryTarget::Latest));
        assert_eq!(plan.command, "pig pitr -d");
        assert_eq!(
            steps(&plan),
            vec![
                "Stop Patroni service",
                "Ensure PostgreSQL is stopped",
                "Execute pgBackRest restore",
                "Start PostgreSQL",
                "Print post-restore guidance",
            ]
        );
        assert_eq!(plan.actions.last().map(|a| a.step), Some(5));
        assert_eq!(
            plan.expected,
            "PostgreSQL restored to end of WAL stream (latest) (data dir: /pg/data)"
        );
        assert!(plan.risks.contains(&"Patroni will be stopped; HA management suspended".to_string()));
    }

    #[test]
    fn test_plan_standalone_without_restart() {
        let mut o = opts(RecoveryTarget::Time("2025-01-01 00:00:00".into()));
        o.skip_patroni = true;
        o.no_restart = true;
        let plan = build_pitr_plan(&state(false, false), &o);
        assert_eq!(plan.command, "pig pitr -t \"2025-01-01 00:00:00\" -S -N");
        assert_eq!(steps(&plan), vec!["Execute pgBackRest restore", "Print post-restore guidance"]);
        assert!(plan.expected.ends_with("; PostgreSQL remains stopped"));
        assert_eq!(
            plan.risks,
            vec![
                "Current data directory will be overwritten".to_string(),
                "Patroni is not stopped; ensure cluster safety before restoring".to_string(),
                "PostgreSQL will remain stopped after restore".to_string(),
            ]
        );
    }

    #[test]
    fn test_no_backup_detection() {
        assert!(is_no_backup_error("ERROR: [075]: no prior backup exists"));
        assert!(is_no_backup_error("backup set 20250101-000000F does not exist"));
        assert!(!is_no_backup_error("unable to connect to host"));
    }
}
