//! @acp:module "Update Command"
//! @acp:summary "Upgrade pig itself from the Pigsty package repository"
//! @acp:domain cli
//! @acp:layer handler

use std::sync::LazyLock;

use regex::Regex;
use serde_json::json;

use super::repo::Distro;
use super::{bridged, reject};
use crate::bridge::params;
use crate::capability::ann;
use crate::cli::tree::{CommandSpec, FlagSpec, Invocation};
use crate::error::ExitCodeError;
use crate::exec::Cmd;
use crate::output::code::{CODE_STY_DOWNLOAD_FAILED, CODE_STY_INVALID_VERSION};
use crate::output::Module;
use crate::outln;

const DEFAULT_BASE_URL: &str = "https://repo.pigsty.io";
const CHINA_BASE_URL: &str = "https://repo.pigsty.cc";

/// `1.2.3`, `v1.2.3`, `1.2.3-rc1`
static VERSION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^v?\d+\.\d+\.\d+(?:-(?:a|b|c|alpha|beta|rc)\d+)?$").unwrap());

pub fn command() -> CommandSpec {
    CommandSpec::new("update", "Upgrade pig itself")
        .alias("upd")
        .alias("u")
        .example(
            "  pig update                   # update pig to the latest version
  pig update -v 1.1.1          # update pig to version 1.1.1",
        )
        .ann(ann("pig update", "action", "volatile", "unsafe", true, "medium", "recommended", "root", 30000))
        .flag(FlagSpec::string("version", "pig version to update to (default: latest)").short('v'))
        .flag(FlagSpec::string("region", "download region (default, china)").short('r'))
        .run(run)
}

pub fn valid_version(version: &str) -> bool {
    VERSION_PATTERN.is_match(version)
}

pub fn base_url(region: Option<&str>) -> &'static str {
    match region {
        Some("china") => CHINA_BASE_URL,
        _ => DEFAULT_BASE_URL,
    }
}

/// Package file name for `version` on this distro and CPU architecture
pub fn package_file(distro: Distro, version: &str, arch: &str) -> anyhow::Result<String> {
    match distro {
        Distro::El => {
            let arch = match arch {
                "x86_64" | "amd64" => "x86_64",
                "aarch64" | "arm64" => "aarch64",
                other => anyhow::bail!("unsupported arch: {}", other),
            };
            Ok(format!("pig-{}-1.{}.rpm", version, arch))
        }
        Distro::Deb => {
            let arch = match arch {
                "x86_64" | "amd64" => "amd64",
                "aarch64" | "arm64" => "arm64",
                other => anyhow::bail!("unsupported arch: {}", other),
            };
            Ok(format!("pig_{}_{}.deb", version, arch))
        }
    }
}

fn latest_version(base: &str) -> anyhow::Result<String> {
    let raw = Cmd::new("curl")
        .arg("-fsSL")
        .arg(format!("{}/pkg/pig/latest", base))
        .read()
        .map_err(|e| ExitCodeError::from_code(CODE_STY_DOWNLOAD_FAILED, format!("failed to fetch latest version: {:#}", e)))?;
    let version = raw.trim().trim_start_matches('v').to_string();
    if !valid_version(&version) {
        anyhow::bail!("repository returned an invalid version: {:?}", raw.trim());
    }
    Ok(version)
}

fn run(inv: &Invocation<'_>) -> anyhow::Result<()> {
    let requested = inv.value("version").filter(|v| !v.is_empty());
    let region = inv.value("region").filter(|r| !r.is_empty());
    if let Some(v) = requested.as_deref().filter(|v| !valid_version(v)) {
        return Err(reject(
            inv,
            CODE_STY_INVALID_VERSION,
            "invalid pig version",
            &format!("invalid pig version given: {}", v),
        ));
    }
    let p = params([("version", json!(requested)), ("region", json!(region))]);
    bridged(inv, Module::Sty, p, || {
        let base = base_url(region.as_deref());
        let version = match &requested {
            Some(v) => v.trim_start_matches('v').to_string(),
            None => latest_version(base)?,
        };
        if version == crate::VERSION {
            tracing::info!("pig {} already installed, reinstall", version);
        } else {
            tracing::info!("install pig {}", version);
        }

        let distro = Distro::detect().ok_or_else(|| anyhow::anyhow!("unsupported OS: neither rpm nor deb based"))?;
        let file = package_file(distro, &version, std::env::consts::ARCH)?;
        let url = format!("{}/pkg/pig/v{}/{}", base, version, file);
        let target = std::env::temp_dir().join(&file);
        let target = target.display().to_string();

        outln!("downloading {} to {}", url, target);
        Cmd::new("curl")
            .args(["-fsSL", "-o", target.as_str(), url.as_str()])
            .run()
            .map_err(|e| ExitCodeError::from_code(CODE_STY_DOWNLOAD_FAILED, format!("failed to download package: {:#}", e)))?;

        let (remove, install) = match distro {
            Distro::El => (Cmd::new("yum").args(["remove", "-y", "pig"]), Cmd::new("rpm").args(["-i", target.as_str()])),
            Distro::Deb => (Cmd::new("apt").args(["remove", "-y", "pig"]), Cmd::new("dpkg").args(["-i", target.as_str()])),
        };
        if let Err(err) = remove.as_user("root").run() {
            tracing::warn!("failed to remove current package: {:#}", err);
        }
        install.as_user("root").run()?;
        outln!("pig {} installed", version);
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_valid_version() {
        assert!(valid_version("1.2.3"));
        assert!(valid_version("v0.9.0"));
        assert!(valid_version("1.0.0-rc1"));
        assert!(!valid_version("1.0"));
        assert!(!valid_version("latest"));
    }

    #[test]
    fn test_package_file() {
        assert_eq!(package_file(Distro::El, "1.0.0", "x86_64").unwrap(), "pig-1.0.0-1.x86_64.rpm");
        assert_eq!(package_file(Distro::Deb, "1.0.0", "aarch64").unwrap(), "pig_1.0.0_arm64.deb");
        assert!(package_file(Distro::El, "1.0.0", "riscv64").is_err());
        assert_eq!(base_url(Some("china")), CHINA_BASE_URL);
        assert_eq!(base_url(None), DEFAULT_BASE_URL);
    }
}
