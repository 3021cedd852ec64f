//! @acp:module "Pigsty Commands"
//! @acp:summary "Bootstrap, configure and deploy a Pigsty home"
//! @acp:domain cli
//! @acp:layer handler

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::json;

use super::{bridged, force_flag, group, require_force};
use crate::bridge::{self, params, Params};
use crate::capability::ann;
use crate::cli::tree::{CommandSpec, FlagSpec, Invocation};
use crate::config;
use crate::error::ExitCodeError;
use crate::exec::{self, Cmd};
use crate::output::code::{CODE_STY_DEPLOY_NEED_FORCE, CODE_STY_HOME_NOT_FOUND};
use crate::output::{self, Module};
use crate::outln;

pub fn command() -> CommandSpec {
    CommandSpec::new("sty", "Manage a Pigsty installation")
        .alias("s")
        .long(
            "pig sty - bootstrap, configure and deploy Pigsty

The Pigsty home comes from -H/--home, PIGSTY_HOME or the config file.",
        )
        .example(
            "  pig sty boot -r china     # install ansible and the local repo
  pig sty conf -c ha/full   # generate pigsty.yml from a template
  pig sty deploy -f         # run deploy.yml",
        )
        .ann(group("pig sty"))
        .children(vec![
            CommandSpec::new("boot", "Bootstrap Pigsty")
                .alias("b")
                .alias("bootstrap")
                .ann(ann("pig sty boot", "action", "volatile", "unsafe", true, "low", "none", "root", 60000))
                .flag(FlagSpec::string("region", "upstream region: default, china, europe").short('r'))
                .flag(FlagSpec::string("path", "offline package path").short('p'))
                .flag(FlagSpec::bool("keep", "keep existing upstream repo").short('k'))
                .run(boot),
            CommandSpec::new("conf", "Configure Pigsty")
                .alias("c")
                .alias("configure")
                .ann(ann("pig sty conf", "action", "volatile", "safe", true, "medium", "recommended", "root", 10000))
                .flag(FlagSpec::string("conf", "config template name").short('c'))
                .flag(FlagSpec::string("ip", "primary ip address"))
                .flag(FlagSpec::string("version", "postgres major version").short('v'))
                .flag(FlagSpec::string("region", "upstream repo region").short('r'))
                .flag(FlagSpec::string("output-file", "output config file path").short('O'))
                .flag(FlagSpec::bool("skip", "skip ip probe").short('s'))
                .flag(FlagSpec::bool("proxy", "write proxy env from environment").short('x'))
                .flag(FlagSpec::bool("non-interactive", "non-interactive mode").short('n'))
                .flag(FlagSpec::string("port", "SSH port").short('p'))
                .flag(FlagSpec::bool("generate", "generate random passwords").short('g'))
                .run(conf),
            CommandSpec::new("deploy", "Run the deploy.yml playbook")
                .alias("d")
                .alias("de")
                .alias("install")
                .alias("ins")
                .long(
                    "Run deploy.yml from the Pigsty home, or install.yml when deploy.yml
does not exist. This changes the whole system: do not run it on an
installed environment.",
                )
                .ann(ann("pig sty deploy", "action", "volatile", "unsafe", false, "high", "required", "root", 600000))
                .flag(force_flag())
                .run(deploy),
            CommandSpec::new("list", "List configuration templates")
                .alias("l")
                .alias("ls")
                .ann(ann("pig sty list", "query", "volatile", "safe", true, "safe", "none", "current", 5000))
                .run(list),
        ])
}

/// Configured Pigsty home, when it exists
fn home(inv: &Invocation<'_>) -> anyhow::Result<PathBuf> {
    match &inv.config.home {
        Some(home) if home.is_dir() => Ok(home.clone()),
        Some(home) => Err(ExitCodeError::from_code(
            CODE_STY_HOME_NOT_FOUND,
            format!("pigsty home {} not found", home.display()),
        )
        .into()),
        None => Err(ExitCodeError::from_code(
            CODE_STY_HOME_NOT_FOUND,
            "pigsty home not found, specify it with -H or PIGSTY_HOME",
        )
        .into()),
    }
}

/// A script shipped in the Pigsty home
fn script(home: &Path, name: &str) -> anyhow::Result<PathBuf> {
    let path = home.join(name);
    if !path.is_file() {
        anyhow::bail!("{} script not found: {}", name, path.display());
    }
    Ok(path)
}

fn boot(inv: &Invocation<'_>) -> anyhow::Result<()> {
    let region = inv.value("region");
    let path = inv.value("path");
    let keep = inv.flag("keep");
    let p = params([("region", json!(region)), ("path", json!(path)), ("keep", json!(keep))]);
    bridged(inv, Module::Sty, p, || {
        let home = home(inv)?;
        let mut cmd = Cmd::new(script(&home, "bootstrap")?.display().to_string()).current_dir(&home);
        if let Some(r) = &region {
            cmd = cmd.args(["-r", r.as_str()]);
        }
        if let Some(p) = &path {
            cmd = cmd.args(["-p", p.as_str()]);
        }
        if keep {
            cmd = cmd.arg("-k");
        }
        tracing::info!("bootstrap with: {}", cmd.display());
        cmd.run()
    })
}

/// `configure` options, translated one to one into script flags
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigureOptions {
    pub conf: Option<String>,
    pub ip: Option<String>,
    pub version: Option<String>,
    pub region: Option<String>,
    pub output_file: Option<String>,
    pub port: Option<String>,
    pub skip: bool,
    pub proxy: bool,
    pub non_interactive: bool,
    pub generate: bool,
}

impl ConfigureOptions {
    fn from_invocation(inv: &Invocation<'_>) -> Self {
        Self {
            conf: inv.value("conf"),
            ip: inv.value("ip"),
            version: inv.value("version"),
            region: inv.value("region"),
            output_file: inv.value("output-file"),
            port: inv.value("port"),
            skip: inv.flag("skip"),
            proxy: inv.flag("proxy"),
            non_interactive: inv.flag("non-interactive"),
            generate: inv.flag("generate"),
        }
    }

    /// First invalid value, described for the user
    pub fn validate(&self) -> Result<(), String> {
        if let Some(ip) = &self.ip {
            if ip.parse::<Ipv4Addr>().is_err() {
                return Err(format!("invalid ip address: {}", ip));
            }
        }
        if let Some(v) = &self.version {
            if v.is_empty() || !v.chars().all(|c| c.is_ascii_digit()) {
                return Err(format!("invalid postgres major version: {}", v));
            }
        }
        if let Some(port) = &self.port {
            if port.parse::<u16>().map_or(true, |p| p == 0) {
                return Err(format!("invalid ssh port: {}", port));
            }
        }
        Ok(())
    }

    /// Arguments for the `configure` script
    pub fn script_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        let valued = [
            ("-c", &self.conf),
            ("-i", &self.ip),
            ("-v", &self.version),
            ("-r", &self.region),
            ("-o", &self.output_file),
        ];
        for (flag, value) in valued {
            if let Some(v) = value {
                args.extend([flag.to_string(), v.clone()]);
            }
        }
        for (flag, on) in [("-s", self.skip), ("-x", self.proxy), ("-n", self.non_interactive)] {
            if on {
                args.push(flag.to_string());
            }
        }
        if let Some(port) = &self.port {
            args.extend(["-p".to_string(), port.clone()]);
        }
        if self.generate {
            args.push("-g".to_string());
        }
        args
    }

    fn params(&self) -> Params {
        params([
            ("conf", json!(self.conf)),
            ("ip", json!(self.ip)),
            ("version", json!(self.version)),
            ("region", json!(self.region)),
            ("output_file", json!(self.output_file)),
            ("port", json!(self.port)),
            ("skip", json!(self.skip)),
            ("proxy", json!(self.proxy)),
            ("non_interactive", json!(self.non_interactive)),
            ("generate", json!(self.generate)),
        ])
    }
}

fn conf(inv: &Invocation<'_>) -> anyhow::Result<()> {
    let opts = ConfigureOptions::from_invocation(inv);
    if let Err(detail) = opts.validate() {
        return Err(bridge::structured_param_error(
            Module::Sty,
            &inv.path,
            "invalid arguments",
            &detail,
            inv.args,
            opts.params(),
        ));
    }
    bridged(inv, Module::Sty, opts.params(), || {
        let home = home(inv)?;
        let cmd = Cmd::new(script(&home, "configure")?.display().to_string())
            .args(opts.script_args())
            .current_dir(&home);
        tracing::info!("configure with: {}", cmd.display());
        cmd.run()
    })
}

/// deploy.yml, else install.yml for older Pigsty releases
pub fn deploy_playbook(home: &Path) -> Option<&'static str> {
    ["deploy.yml", "install.yml"]
        .into_iter()
        .find(|name| home.join(name).is_file())
}

fn deploy(inv: &Invocation<'_>) -> anyhow::Result<()> {
    require_force(inv, CODE_STY_DEPLOY_NEED_FORCE)?;
    bridged(inv, Module::Sty, Params::new(), || {
        if !exec::available("ansible-playbook") {
            anyhow::bail!("ansible-playbook not found, run pig sty boot first");
        }
        let home = home(inv)?;
        if inv.config.inventory_path().is_none() {
            anyhow::bail!("pigsty inventory not found, run pig sty conf first");
        }
        let playbook = deploy_playbook(&home)
            .ok_or_else(|| anyhow::anyhow!("neither deploy.yml nor install.yml exists in {}", home.display()))?;
        if playbook == "install.yml" {
            tracing::warn!("deploy.yml not found, falling back to install.yml");
        }
        tracing::warn!("running {} changes the whole system", playbook);
        Cmd::new("ansible-playbook").arg(playbook).current_dir(&home).run()
    })
}

/// One configuration template
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Template {
    /// Name as passed to `conf -c`, e.g. "ha/full"
    pub name: String,
    pub path: PathBuf,
}

/// Templates under `<home>/conf`, sorted by name
pub fn list_templates(home: &Path) -> anyhow::Result<Vec<Template>> {
    let root = home.join("conf");
    let mut templates = Vec::new();
    let mut pending = vec![root.clone()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some("yml") {
                continue;
            }
            let Ok(rel) = path.strip_prefix(&root) else { continue };
            let name = rel.with_extension("").to_string_lossy().replace('\\', "/");
            templates.push(Template { name, path });
        }
    }
    templates.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(templates)
}

fn list(inv: &Invocation<'_>) -> anyhow::Result<()> {
    let templates = home(inv).and_then(|h| list_templates(&h));
    if config::is_structured_output() {
        return match templates {
            Ok(t) => output::print_data(&t, &format!("{} templates found", t.len())),
            Err(err) => {
                let code = crate::error::carried_code(&err)
                    .map(|e| e.code)
                    .unwrap_or_else(|| bridge::failure_code(Module::Sty, &err));
                output::print_error(code, &format!("{:#}", err))
            }
        };
    }
    for t in templates? {
        outln!("{}", t.name);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_configure_args() {
        let opts = ConfigureOptions {
            conf: Some("ha/full".into()),
            ip: Some("10.10.10.10".into()),
            version: Some("17".into()),
            skip: true,
            non_interactive: true,
            ..Default::default()
        };
        assert_eq!(opts.validate(), Ok(()));
        assert_eq!(
            opts.script_args(),
            vec!["-c", "ha/full", "-i", "10.10.10.10", "-v", "17", "-s", "-n"]
        );
    }

    #[test]
    fn test_configure_validation() {
        let bad_ip = ConfigureOptions {
            ip: Some("10.10.10".into()),
            ..Default::default()
        };
        assert_eq!(bad_ip.validate(), Err("invalid ip address: 10.10.10".to_string()));

        let bad_port = ConfigureOptions {
            port: Some("0".into()),
            ..Default::default()
        };
        assert!(bad_port.validate().is_err());
    }

    #[test]
    fn test_templates_and_playbook() {
        let dir = tempfile::tempdir().unwrap();
        let home = dir.path();
        std::fs::create_dir_all(home.join("conf/ha")).unwrap();
        std::fs::write(home.join("conf/meta.yml"), "all: {}\n").unwrap();
        std::fs::write(home.join("conf/ha/full.yml"), "all: {}\n").unwrap();
        std::fs::write(home.join("conf/README.md"), "").unwrap();

        let names: Vec<String> = list_templates(home).unwrap().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["ha/full", "meta"]);

        assert_eq!(deploy_playbook(home), None);
        std::fs::write(home.join("install.yml"), "").unwrap();
        assert_eq!(deploy_playbook(home), Some("install.yml"));
        std::fs::write(home.join("deploy.yml"), "").unwrap();
        assert_eq!(deploy_playbook(home), Some("deploy.yml"));
    }
}
