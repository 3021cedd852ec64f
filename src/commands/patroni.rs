//! @acp:module "Patroni Commands"
//! @acp:summary "Patroni cluster management through patronictl and systemd"
//! @acp:domain cli
//! @acp:layer handler
//!
//! `list`, `status` and `config show` answer natively in structured mode by
//! parsing patronictl's JSON/YAML output; everything else is a bridged
//! delegation. Switchover, failover and reinit need `--force` in structured
//! mode and accept `--plan` (switchover/failover) to preview the change.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{bridged, force_flag, group, reject, require_force, require_tool};
use crate::bridge::params;
use crate::capability::ann;
use crate::cli::tree::{CommandSpec, FlagSpec, Invocation};
use crate::config;
use crate::error::ExitCodeError;
use crate::exec::Cmd;
use crate::output::code::{
    CODE_PT_COMMAND_FAILED, CODE_PT_CONFIG_NOT_FOUND, CODE_PT_FAILOVER_NEED_FORCE,
    CODE_PT_INVALID_CONFIG_ACTION, CODE_PT_NOT_FOUND, CODE_PT_NOT_RUNNING, CODE_PT_PARSE_FAILED,
    CODE_PT_REINIT_NEED_FORCE, CODE_PT_SWITCHOVER_NEED_FORCE,
};
use crate::output::{self, CommandResult, Module, Plan, Resource};

/// Patroni configuration on a pgsql node
pub const CONFIG_PATH: &str = "/etc/patroni/patroni.yml";

const LOG_FILE: &str = "/pg/log/patroni/patroni.log";
const SERVICE_UNIT: &str = "patroni";
const CONFIG_ACTIONS: [&str; 4] = ["show", "edit", "set", "pg"];

pub fn command() -> CommandSpec {
    CommandSpec::new("patroni", "Manage Patroni HA clusters")
        .alias("pt")
        .long(
            "pig patroni - manage the Patroni cluster of this node

Cluster commands run patronictl as the database superuser with the node's
patroni.yml. Service commands control the patroni systemd unit.",
        )
        .example(
            "  pig pt list                    # cluster members
  pig pt switchover --plan       # preview a switchover
  pig pt config set ttl=60       # change patroni config
  pig pt failover -c pg-test-2 -f -o json",
        )
        .ann(group("pig patroni"))
        .flag(FlagSpec::string("dbsu", "database superuser (default from config)").short('U').global())
        .children(vec![
            CommandSpec::new("list [cluster]", "List cluster members")
                .alias("ls")
                .ann(ann("pig patroni list", "query", "stable", "safe", true, "safe", "none", "dbsu", 2000))
                .arg_help("cluster", "cluster name (default: this node's scope)")
                .run(list),
            CommandSpec::new("restart [member]", "Restart PostgreSQL through Patroni")
                .alias("reboot")
                .alias("rt")
                .ann(ann("pig patroni restart", "action", "volatile", "unsafe", false, "high", "recommended", "dbsu", 30000))
                .arg_help("member", "member to restart (default: all)")
                .flag(force_flag())
                .flag(FlagSpec::bool("pending", "only restart members with pending restart").short('p'))
                .flag(FlagSpec::string("role", "filter by role: leader, replica, any").short('r'))
                .run(restart),
            CommandSpec::new("reload", "Reload cluster configuration")
                .alias("rl")
                .alias("hup")
                .ann(ann("pig patroni reload", "action", "volatile", "restricted", true, "low", "none", "dbsu", 5000))
                .run(reload),
            CommandSpec::new("reinit <member>", "Reinitialize a replica from the leader")
                .alias("ri")
                .ann(ann("pig patroni reinit", "action", "volatile", "unsafe", false, "critical", "required", "dbsu", 300000))
                .arg_help("member", "member to rebuild")
                .flag(force_flag())
                .flag(FlagSpec::bool("wait", "wait for reinit to complete").short('w'))
                .run(reinit),
            CommandSpec::new("switchover", "Planned leader switchover")
                .alias("sw")
                .ann(ann("pig patroni switchover", "action", "volatile", "unsafe", false, "high", "required", "dbsu", 300000))
                .flag(FlagSpec::string("leader", "current leader name").short('l'))
                .flag(FlagSpec::string("candidate", "candidate to promote").short('c'))
                .flag(FlagSpec::string("scheduled", "scheduled time for the switchover").short('s'))
                .flag(force_flag())
                .flag(plan_flag())
                .run(switchover),
            CommandSpec::new("failover", "Manual failover to a replica")
                .alias("fo")
                .ann(ann("pig patroni failover", "action", "volatile", "unsafe", false, "critical", "required", "dbsu", 300000))
                .flag(FlagSpec::string("candidate", "candidate to promote").short('c'))
                .flag(force_flag())
                .flag(plan_flag())
                .run(failover),
            CommandSpec::new("pause", "Enter maintenance mode")
                .alias("p")
                .ann(ann("pig patroni pause", "action", "volatile", "restricted", true, "medium", "recommended", "dbsu", 5000))
                .flag(FlagSpec::bool("wait", "wait for all members to confirm").short('w'))
                .run(pause),
            CommandSpec::new("resume", "Leave maintenance mode")
                .alias("r")
                .ann(ann("pig patroni resume", "action", "volatile", "restricted", true, "low", "none", "dbsu", 5000))
                .flag(FlagSpec::bool("wait", "wait for all members to confirm").short('w'))
                .run(resume),
            CommandSpec::new("config [action] [pairs...]", "Show or edit cluster config")
                .alias("cfg")
                .alias("c")
                .long(
                    "Manage Patroni cluster configuration.

Actions:
  show              display current configuration
  edit              interactive config editor (text mode only)
  set  key=value    set Patroni config (ttl, loop_wait, ...)
  pg   key=value    set PostgreSQL parameters (max_connections, ...)",
                )
                .ann(ann("pig patroni config", "action", "volatile", "restricted", false, "medium", "recommended", "dbsu", 3000))
                .arg_help("action", "show, edit, set or pg")
                .arg_help("pairs", "key=value settings for set and pg")
                .run(config_cmd),
            CommandSpec::new("log", "Show the Patroni log")
                .alias("lg")
                .ann(ann("pig patroni log", "query", "volatile", "safe", true, "safe", "none", "dbsu", 500))
                .flag(FlagSpec::int("lines", "number of lines").short('n').default("50"))
                .run(log),
            CommandSpec::new("status", "Show service and cluster status")
                .alias("st")
                .alias("stat")
                .ann(ann("pig patroni status", "query", "stable", "safe", true, "safe", "none", "dbsu", 3000))
                .run(status),
            service_command(),
        ])
}

fn plan_flag() -> FlagSpec {
    FlagSpec::bool("plan", "show the execution plan without running it").alias("dry-run")
}

fn service_command() -> CommandSpec {
    CommandSpec::new("svc", "Control the patroni systemd service")
        .alias("s")
        .alias("service")
        .ann(ann("pig patroni svc", "query", "stable", "safe", true, "safe", "none", "root", 100))
        .children(vec![
            CommandSpec::new("start", "Start the service")
                .alias("boot")
                .alias("up")
                .ann(ann("pig patroni svc start", "action", "volatile", "unsafe", true, "medium", "none", "root", 10000))
                .run(service),
            CommandSpec::new("stop", "Stop the service")
                .alias("halt")
                .alias("down")
                .ann(ann("pig patroni svc stop", "action", "volatile", "unsafe", true, "high", "recommended", "root", 10000))
                .run(service),
            CommandSpec::new("restart", "Restart the service")
                .alias("reboot")
                .ann(ann("pig patroni svc restart", "action", "volatile", "unsafe", false, "high", "recommended", "root", 30000))
                .run(service),
            CommandSpec::new("reload", "Reload the service")
                .alias("hup")
                .ann(ann("pig patroni svc reload", "action", "volatile", "restricted", true, "low", "none", "root", 1000))
                .run(service),
            CommandSpec::new("status", "Show service status")
                .alias("st")
                .ann(ann("pig patroni svc status", "query", "volatile", "safe", true, "safe", "none", "root", 500))
                .run(service),
        ])
}

/// One row of `patronictl list -f json`
#[derive(Debug, Clone, Deserialize)]
struct ListEntry {
    #[serde(rename = "Member", default)]
    member: String,
    #[serde(rename = "Host", default)]
    host: String,
    #[serde(rename = "Role", default)]
    role: String,
    #[serde(rename = "State", default)]
    state: String,
    #[serde(rename = "TL", default)]
    tl: Option<i64>,
    #[serde(rename = "Lag in MB", default)]
    lag_mb: Option<i64>,
}

/// @acp:summary "Cluster member in structured output"
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Member {
    pub member: String,
    pub host: String,
    pub role: String,
    pub state: String,
    pub tl: i64,
    /// Replication lag in MB, null for the leader
    pub lag: Option<i64>,
}

/// Payload of `pig patroni list`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterMembers {
    pub cluster: String,
    pub members: Vec<Member>,
}

/// Lowercase role with spaces as underscores, e.g. "sync_standby"
pub fn normalize_role(role: &str) -> String {
    role.trim().to_lowercase().replace([' ', '-'], "_")
}

/// @acp:summary "Parse `patronictl list -f json` output"
pub fn parse_member_list(raw: &str) -> anyhow::Result<Vec<Member>> {
    let entries: Vec<ListEntry> = serde_json::from_str(raw.trim())
        .map_err(|e| anyhow::anyhow!("failed to parse patronictl list JSON: {}", e))?;
    Ok(entries
        .into_iter()
        .map(|e| Member {
            member: e.member,
            host: e.host,
            role: normalize_role(&e.role),
            state: e.state,
            tl: e.tl.unwrap_or_default(),
            lag: e.lag_mb,
        })
        .collect())
}

/// Cluster name (`scope`) from a patroni.yml document
pub fn cluster_name_from_yaml(content: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct Scope {
        scope: Option<String>,
    }
    serde_yaml::from_str::<Scope>(content)
        .ok()?
        .scope
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn dbsu(inv: &Invocation<'_>) -> String {
    inv.value("dbsu")
        .filter(|u| !u.trim().is_empty())
        .unwrap_or_else(|| inv.config.dbsu.clone())
}

fn patronictl(inv: &Invocation<'_>) -> Cmd {
    Cmd::new("patronictl").args(["-c", CONFIG_PATH]).as_user(&dbsu(inv))
}

/// Tool and config presence, as the failure it would cause
fn precheck() -> Result<(), CommandResult> {
    if require_tool("patronictl", CODE_PT_NOT_FOUND).is_err() {
        return Err(CommandResult::fail(CODE_PT_NOT_FOUND, "patronictl not found in PATH"));
    }
    if !Path::new(CONFIG_PATH).exists() {
        return Err(CommandResult::fail(
            CODE_PT_CONFIG_NOT_FOUND,
            format!("Patroni config not found: {}", CONFIG_PATH),
        ));
    }
    Ok(())
}

fn checked() -> anyhow::Result<()> {
    precheck().map_err(|r| ExitCodeError::from_code(r.code, r.message).into())
}

/// Cluster name from the local config, read as the dbsu when needed
fn cluster_name(inv: &Invocation<'_>) -> Option<String> {
    let content = std::fs::read_to_string(CONFIG_PATH)
        .ok()
        .or_else(|| Cmd::new("cat").arg(CONFIG_PATH).as_user(&dbsu(inv)).read().ok())?;
    cluster_name_from_yaml(&content)
}

fn require_cluster(inv: &Invocation<'_>) -> anyhow::Result<String> {
    cluster_name(inv).ok_or_else(|| {
        ExitCodeError::from_code(
            CODE_PT_CONFIG_NOT_FOUND,
            format!("cannot determine cluster name from {}", CONFIG_PATH),
        )
        .into()
    })
}

pub(crate) fn service_active() -> bool {
    Cmd::new("systemctl")
        .args(["is-active", "--quiet", SERVICE_UNIT])
        .read()
        .is_ok()
}

/// Members via `patronictl list -f json`, failures as results
fn fetch_members(inv: &Invocation<'_>) -> Result<ClusterMembers, CommandResult> {
    precheck()?;
    let raw = patronictl(inv).args(["list", "-f", "json"]).read().map_err(|err| {
        let result = if service_active() {
            CommandResult::fail(CODE_PT_COMMAND_FAILED, "failed to execute patronictl list")
        } else {
            CommandResult::fail(CODE_PT_NOT_RUNNING, "Patroni service is not running")
        };
        result.with_detail(format!("{:#}", err))
    })?;
    let members = parse_member_list(&raw).map_err(|e| {
        CommandResult::fail(CODE_PT_PARSE_FAILED, "failed to parse patronictl list output")
            .with_detail(e.to_string())
    })?;
    Ok(ClusterMembers {
        cluster: cluster_name(inv).unwrap_or_default(),
        members,
    })
}

fn list(inv: &Invocation<'_>) -> anyhow::Result<()> {
    let cluster = inv.value("cluster");
    if config::is_structured_output() {
        return match fetch_members(inv) {
            Ok(data) => output::print_data(data, "Patroni cluster members retrieved"),
            Err(result) => output::handle_result(result),
        };
    }
    bridged(inv, Module::Pt, params([("cluster", json!(cluster))]), || {
        checked()?;
        let mut cmd = patronictl(inv).arg("list");
        if let Some(name) = &cluster {
            cmd = cmd.arg(name.as_str());
        }
        cmd.run()
    })
}

fn restart(inv: &Invocation<'_>) -> anyhow::Result<()> {
    let member = inv.value("member");
    let role = inv.value("role");
    let p = params([
        ("member", json!(member)),
        ("role", json!(role)),
        ("pending", json!(inv.flag("pending"))),
    ]);
    bridged(inv, Module::Pt, p, || {
        checked()?;
        let mut cmd = patronictl(inv).arg("restart").arg(require_cluster(inv)?);
        if let Some(m) = &member {
            cmd = cmd.arg(m.as_str());
        }
        if let Some(r) = &role {
            cmd = cmd.args(["--role", r.as_str()]);
        }
        if inv.flag("pending") {
            cmd = cmd.arg("--pending");
        }
        if inv.flag("force") {
            cmd = cmd.arg("--force");
        }
        cmd.run()
    })
}

fn reload(inv: &Invocation<'_>) -> anyhow::Result<()> {
    bridged(inv, Module::Pt, Default::default(), || {
        checked()?;
        patronictl(inv)
            .arg("reload")
            .arg(require_cluster(inv)?)
            .arg("--force")
            .run()
    })
}

fn reinit(inv: &Invocation<'_>) -> anyhow::Result<()> {
    require_force(inv, CODE_PT_REINIT_NEED_FORCE)?;
    let member = inv.value("member").unwrap_or_default();
    bridged(inv, Module::Pt, params([("member", json!(member))]), || {
        checked()?;
        let mut cmd = patronictl(inv)
            .arg("reinit")
            .arg(require_cluster(inv)?)
            .arg(member.as_str());
        if inv.flag("force") {
            cmd = cmd.arg("--force");
        }
        if inv.flag("wait") {
            cmd = cmd.arg("--wait");
        }
        cmd.run()
    })
}

/// @acp:summary "Plan for a switchover or failover"
pub fn build_handover_plan(kind: &str, cluster: &str, leader: Option<&str>, candidate: Option<&str>) -> Plan {
    let mut command = format!("pig patroni {}", kind);
    if let Some(l) = leader {
        command.push_str(&format!(" --leader {}", l));
    }
    if let Some(c) = candidate {
        command.push_str(&format!(" --candidate {}", c));
    }
    let target = candidate.unwrap_or("the healthiest replica");
    let cluster = if cluster.is_empty() { "patroni cluster" } else { cluster };

    let mut plan = Plan::new(command);
    plan = if kind == "failover" {
        plan.action(format!("Promote {} without waiting for the leader", target))
    } else {
        plan.action(format!("Demote current leader {}", leader.unwrap_or("(from DCS)")))
            .action(format!("Promote {} to leader", target))
    };
    plan = plan
        .action("Reconfigure remaining members to follow the new leader")
        .affects(Resource::new("cluster", cluster, kind, "leader role moves to another member"))
        .affects(Resource::new(
            "connection",
            "primary sessions",
            "terminate",
            "sessions on the old leader will be disconnected",
        ))
        .expected(format!("{} is the new leader of {}", target, cluster))
        .risk("Writes are unavailable until the new leader is promoted")
        .risk("Connections to the old leader will be terminated");
    if kind == "failover" {
        plan = plan.risk("Transactions not yet replicated to the candidate may be lost");
    }
    plan
}

fn switchover(inv: &Invocation<'_>) -> anyhow::Result<()> {
    let leader = inv.value("leader");
    let candidate = inv.value("candidate");
    let scheduled = inv.value("scheduled");
    if inv.flag("plan") {
        let cluster = cluster_name(inv).unwrap_or_default();
        return output::handle_plan(&build_handover_plan(
            "switchover",
            &cluster,
            leader.as_deref(),
            candidate.as_deref(),
        ));
    }
    require_force(inv, CODE_PT_SWITCHOVER_NEED_FORCE)?;
    let p = params([
        ("leader", json!(leader)),
        ("candidate", json!(candidate)),
        ("scheduled", json!(scheduled)),
    ]);
    bridged(inv, Module::Pt, p, || {
        checked()?;
        let mut cmd = patronictl(inv).arg("switchover");
        if inv.flag("force") {
            cmd = cmd.arg("--force");
        }
        for (flag, value) in [("--leader", &leader), ("--candidate", &candidate), ("--scheduled", &scheduled)] {
            if let Some(v) = value {
                cmd = cmd.args([flag, v.as_str()]);
            }
        }
        cmd.run()
    })
}

fn failover(inv: &Invocation<'_>) -> anyhow::Result<()> {
    let candidate = inv.value("candidate");
    if inv.flag("plan") {
        let cluster = cluster_name(inv).unwrap_or_default();
        return output::handle_plan(&build_handover_plan("failover", &cluster, None, candidate.as_deref()));
    }
    require_force(inv, CODE_PT_FAILOVER_NEED_FORCE)?;
    bridged(inv, Module::Pt, params([("candidate", json!(candidate))]), || {
        checked()?;
        let mut cmd = patronictl(inv).arg("failover");
        if inv.flag("force") {
            cmd = cmd.arg("--force");
        }
        if let Some(c) = &candidate {
            cmd = cmd.args(["--candidate", c.as_str()]);
        }
        cmd.run()
    })
}

fn pause(inv: &Invocation<'_>) -> anyhow::Result<()> {
    toggle_maintenance(inv, "pause")
}

fn resume(inv: &Invocation<'_>) -> anyhow::Result<()> {
    toggle_maintenance(inv, "resume")
}

fn toggle_maintenance(inv: &Invocation<'_>, verb: &str) -> anyhow::Result<()> {
    let wait = inv.flag("wait");
    bridged(inv, Module::Pt, params([("wait", json!(wait))]), || {
        checked()?;
        let mut cmd = patronictl(inv).arg(verb);
        if wait {
            cmd = cmd.arg("--wait");
        }
        cmd.run()
    })
}

/// Keep only `key=value` tokens
fn kv_pairs(values: &[String]) -> Vec<String> {
    values.iter().filter(|v| v.contains('=')).cloned().collect()
}

fn config_cmd(inv: &Invocation<'_>) -> anyhow::Result<()> {
    let structured = config::is_structured_output();
    let action = match inv.value("action") {
        Some(action) => action,
        None if structured => "show".to_string(),
        None => {
            return Err(reject(
                inv,
                CODE_PT_INVALID_CONFIG_ACTION,
                "missing config action",
                "expected one of: show, edit, set, pg",
            ))
        }
    };
    if !CONFIG_ACTIONS.contains(&action.as_str()) {
        let detail = format!("unknown action: {} (valid: show, edit, set, pg)", action);
        return Err(reject(inv, CODE_PT_INVALID_CONFIG_ACTION, "invalid config action", &detail));
    }

    let pairs = kv_pairs(&inv.values("pairs"));
    match action.as_str() {
        "show" if structured => show_config(inv),
        "edit" if structured => Err(reject(
            inv,
            CODE_PT_INVALID_CONFIG_ACTION,
            "interactive config edit is not supported in structured output",
            "use 'pig pt config show -o json' for read-only structured output",
        )),
        "set" | "pg" if pairs.is_empty() => Err(reject(
            inv,
            CODE_PT_INVALID_CONFIG_ACTION,
            "no key=value pairs given",
            &format!("usage: pig pt config {} key=value ...", action),
        )),
        _ => {
            let p = params([("action", json!(action)), ("pairs", json!(pairs))]);
            bridged(inv, Module::Pt, p, || {
                checked()?;
                let cmd = patronictl(inv);
                let cmd = match action.as_str() {
                    "show" => cmd.arg("show-config"),
                    "edit" => cmd.arg("edit-config"),
                    other => {
                        let switch = if other == "set" { "-s" } else { "-p" };
                        let mut cmd = cmd.args(["edit-config", "--force"]);
                        for pair in &pairs {
                            cmd = cmd.args([switch, pair.as_str()]);
                        }
                        cmd
                    }
                };
                cmd.run()
            })
        }
    }
}

/// `show-config` parsed into the result payload
fn show_config(inv: &Invocation<'_>) -> anyhow::Result<()> {
    if let Err(result) = precheck() {
        return output::handle_result(result);
    }
    let raw = match patronictl(inv).arg("show-config").read() {
        Ok(raw) => raw,
        Err(err) => {
            return output::handle_result(
                CommandResult::fail(CODE_PT_COMMAND_FAILED, "failed to execute patronictl show-config")
                    .with_detail(format!("{:#}", err)),
            )
        }
    };
    match serde_yaml::from_str::<serde_json::Value>(&raw) {
        Ok(doc) => output::print_data(doc, "Patroni cluster config retrieved"),
        Err(e) => output::handle_result(
            CommandResult::fail(CODE_PT_PARSE_FAILED, "failed to parse patroni config")
                .with_detail(e.to_string()),
        ),
    }
}

fn log(inv: &Invocation<'_>) -> anyhow::Result<()> {
    let lines = inv.int("lines").unwrap_or(50);
    bridged(inv, Module::Pt, params([("lines", json!(lines))]), || {
        Cmd::new("tail")
            .args(["-n".to_string(), lines.to_string(), LOG_FILE.to_string()])
            .as_user(&dbsu(inv))
            .run()
    })
}

/// Payload of `pig patroni status`
#[derive(Debug, Clone, Serialize)]
struct StatusData {
    service_active: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    cluster: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    leader: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timeline: Option<i64>,
    members: Vec<Member>,
}

fn status(inv: &Invocation<'_>) -> anyhow::Result<()> {
    if !config::is_structured_output() {
        return bridged(inv, Module::Pt, Default::default(), || {
            Cmd::new("systemctl")
                .args(["status", SERVICE_UNIT, "--no-pager"])
                .run()
        });
    }
    let active = service_active();
    let listed = fetch_members(inv).ok();
    let leader = listed
        .as_ref()
        .and_then(|l| l.members.iter().find(|m| m.role == "leader"));
    let data = StatusData {
        service_active: active,
        cluster: listed.as_ref().map(|l| l.cluster.clone()).unwrap_or_default(),
        leader: leader.map(|m| m.member.clone()),
        timeline: leader.map(|m| m.tl),
        members: listed.as_ref().map(|l| l.members.clone()).unwrap_or_default(),
    };
    if !active {
        return output::handle_result(
            CommandResult::fail(CODE_PT_NOT_RUNNING, "Patroni service is not running").with_data(data),
        );
    }
    output::print_data(data, "Patroni status retrieved")
}

fn service(inv: &Invocation<'_>) -> anyhow::Result<()> {
    let action = inv.path.rsplit(' ').next().unwrap_or("status").to_string();
    let p = params([("unit", json!(SERVICE_UNIT)), ("action", json!(action))]);
    bridged(inv, Module::Pt, p, || {
        let mut cmd = Cmd::new("systemctl").args([action.as_str(), SERVICE_UNIT]);
        if action == "status" {
            cmd = cmd.arg("--no-pager");
        }
        cmd.run()
    })
}
