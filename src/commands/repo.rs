//! @acp:module "Repository Commands"
//! @acp:summary "Inspect and refresh yum/apt repositories"
//! @acp:domain cli
//! @acp:layer handler

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::json;

use super::{bridged, group, reject};
use crate::bridge::params;
use crate::capability::ann;
use crate::cli::tree::{CommandSpec, Invocation};
use crate::config;
use crate::error::ExitCodeError;
use crate::exec::{self, Cmd};
use crate::output::code::{CODE_REPO_INVALID_ARGS, CODE_REPO_NOT_FOUND, CODE_REPO_UPDATE_FAILED};
use crate::output::table::render_table;
use crate::output::{self, Module};
use crate::outln;

/// @acp:summary "Package system family of the host"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Distro {
    /// dnf/yum, `/etc/yum.repos.d/*.repo`
    El,
    /// apt, `/etc/apt/sources.list.d/*.list|*.sources`
    Deb,
}

impl Distro {
    pub fn detect() -> Option<Self> {
        if Path::new("/etc/yum.repos.d").is_dir() && (exec::available("dnf") || exec::available("yum")) {
            Some(Self::El)
        } else if Path::new("/etc/apt/sources.list.d").is_dir() {
            Some(Self::Deb)
        } else {
            None
        }
    }

    pub fn repo_dir(&self) -> &'static Path {
        match self {
            Self::El => Path::new("/etc/yum.repos.d"),
            Self::Deb => Path::new("/etc/apt/sources.list.d"),
        }
    }

    fn extensions(&self) -> &'static [&'static str] {
        match self {
            Self::El => &["repo"],
            Self::Deb => &["list", "sources"],
        }
    }

    /// Cache refresh command, run as root
    fn refresh(&self) -> Cmd {
        let base = match self {
            Self::El if exec::available("dnf") => Cmd::new("dnf").arg("makecache"),
            Self::El => Cmd::new("yum").arg("makecache"),
            Self::Deb => Cmd::new("apt-get").arg("update"),
        };
        base.as_user("root")
    }
}

pub fn command() -> CommandSpec {
    CommandSpec::new("repo", "Manage yum/apt repositories")
        .alias("r")
        .ann(group("pig repo"))
        .children(vec![
            CommandSpec::new("list", "List repository files")
                .alias("l")
                .alias("ls")
                .ann(ann("pig repo list", "query", "stable", "safe", true, "safe", "none", "current", 100))
                .run(list),
            CommandSpec::new("rm <name...>", "Remove repository files")
                .alias("remove")
                .ann(ann("pig repo rm", "action", "volatile", "unsafe", true, "medium", "recommended", "root", 1000))
                .arg_help("name", "repository file name without extension")
                .run(remove),
            CommandSpec::new("update", "Refresh the package cache")
                .alias("u")
                .alias("cache")
                .ann(ann("pig repo update", "action", "volatile", "unsafe", true, "low", "none", "root", 30000))
                .run(update),
        ])
}

/// One repository definition file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepoFile {
    pub name: String,
    pub path: PathBuf,
}

/// Repository files in `dir` matching `extensions`, sorted by name
pub fn list_repo_files(dir: &Path, extensions: &[&str]) -> anyhow::Result<Vec<RepoFile>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let matched = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| extensions.contains(&e));
        if !matched || !path.is_file() {
            continue;
        }
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        files.push(RepoFile { name, path });
    }
    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}

fn detect() -> anyhow::Result<Distro> {
    Distro::detect().ok_or_else(|| anyhow::anyhow!("unsupported OS: neither yum nor apt repositories found"))
}

fn list(_inv: &Invocation<'_>) -> anyhow::Result<()> {
    let files = detect().and_then(|d| list_repo_files(d.repo_dir(), d.extensions()));
    if config::is_structured_output() {
        return match files {
            Ok(f) => output::print_data(&f, &format!("{} repository files", f.len())),
            Err(err) => output::print_error(
                crate::bridge::failure_code(Module::Repo, &err),
                &format!("{:#}", err),
            ),
        };
    }
    let rows: Vec<Vec<String>> = files?
        .into_iter()
        .map(|f| vec![f.name, f.path.display().to_string()])
        .collect();
    outln!("{}", render_table(&["Name", "Path"], &rows).trim_end());
    Ok(())
}

fn remove(inv: &Invocation<'_>) -> anyhow::Result<()> {
    let names = inv.values("name");
    if let Some(bad) = names.iter().find(|n| n.contains('/') || n.starts_with('.')) {
        return Err(reject(
            inv,
            CODE_REPO_INVALID_ARGS,
            "invalid repository name",
            &format!("invalid repository name: {:?}", bad),
        ));
    }
    bridged(inv, Module::Repo, params([("names", json!(names))]), || {
        let distro = detect()?;
        let files = list_repo_files(distro.repo_dir(), distro.extensions())?;
        for name in &names {
            let Some(file) = files.iter().find(|f| &f.name == name) else {
                return Err(ExitCodeError::from_code(
                    CODE_REPO_NOT_FOUND,
                    format!("repository {} not found in {}", name, distro.repo_dir().display()),
                )
                .into());
            };
            Cmd::new("rm").arg("-f").arg(file.path.display().to_string()).as_user("root").run()?;
            outln!("removed {}", file.path.display());
        }
        Ok(())
    })
}

fn update(inv: &Invocation<'_>) -> anyhow::Result<()> {
    bridged(inv, Module::Repo, Default::default(), || {
        detect()?
            .refresh()
            .run()
            .map_err(|e| ExitCodeError::from_code(CODE_REPO_UPDATE_FAILED, format!("cache refresh failed: {:#}", e)).into())
    })
}
