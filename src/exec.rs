//! @acp:module "Process Execution"
//! @acp:summary "Run external tools with their output routed through the output sink"
//! @acp:domain cli
//! @acp:layer utility
//!
//! Delegated subcommands (ansible playbooks, patronictl, pgbackrest, pg_ctl)
//! run through [`run`]. Outside a capture the child inherits the terminal;
//! inside one its stdout and stderr are collected into the sink, so the
//! legacy bridge sees them. A non-zero exit keeps the child's status.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::Context;

use crate::error::ExitCodeError;
use crate::output::sink;

/// @acp:summary "External command about to be run"
#[derive(Debug, Clone)]
pub struct Cmd {
    program: String,
    args: Vec<String>,
    user: Option<String>,
    cwd: Option<PathBuf>,
}

impl Cmd {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            user: None,
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run as `user` through sudo unless that is already the current user
    pub fn as_user(mut self, user: &str) -> Self {
        let user = user.trim();
        if !user.is_empty() && current_user().as_deref() != Some(user) {
            self.user = Some(user.to_string());
        }
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Command line as shown in logs and plans
    pub fn display(&self) -> String {
        let mut parts = Vec::new();
        if let Some(user) = &self.user {
            parts.extend(["sudo".to_string(), "-iu".to_string(), user.clone()]);
        }
        parts.push(self.program.clone());
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }

    fn build(&self) -> Command {
        let mut cmd = match &self.user {
            Some(user) => {
                let mut sudo = Command::new("sudo");
                sudo.args(["-iu", user.as_str(), self.program.as_str()]);
                sudo
            }
            None => Command::new(&self.program),
        };
        cmd.args(&self.args);
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }
        cmd
    }

    /// @acp:summary "Run to completion, output to the active sink"
    pub fn run(&self) -> anyhow::Result<()> {
        tracing::debug!("exec: {}", self.display());
        let mut cmd = self.build();

        let status = if sink::is_capturing() {
            let output = cmd
                .stdin(Stdio::null())
                .output()
                .with_context(|| format!("failed to run {}", self.program))?;
            sink::write_str(&String::from_utf8_lossy(&output.stdout));
            sink::write_str(&String::from_utf8_lossy(&output.stderr));
            output.status
        } else {
            cmd.status()
                .with_context(|| format!("failed to run {}", self.program))?
        };

        if status.success() {
            return Ok(());
        }
        let exit = status.code().unwrap_or(1);
        Err(ExitCodeError::from_status(
            exit,
            format!("{} exited with status {}", self.program, exit),
        )
        .into())
    }

    /// Run and return stdout instead of printing it
    pub fn read(&self) -> anyhow::Result<String> {
        tracing::debug!("exec (read): {}", self.display());
        let output = self
            .build()
            .stdin(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .with_context(|| format!("failed to run {}", self.program))?;
        if !output.status.success() {
            let exit = output.status.code().unwrap_or(1);
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExitCodeError::from_status(
                exit,
                format!("{} exited with status {}: {}", self.program, exit, stderr.trim()),
            )
            .into());
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Login name of the current user
pub fn current_user() -> Option<String> {
    std::env::var("USER")
        .ok()
        .or_else(|| std::env::var("LOGNAME").ok())
        .filter(|u| !u.is_empty())
}

/// Locate `name` in `bin_dir` when given, else search PATH
pub fn find_binary(name: &str, bin_dir: Option<&Path>) -> Option<PathBuf> {
    if let Some(dir) = bin_dir {
        let candidate = dir.join(name);
        return candidate.is_file().then_some(candidate);
    }
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|p| p.is_file())
}

/// True when `program` can be found on PATH
pub fn available<S: AsRef<OsStr>>(program: S) -> bool {
    program
        .as_ref()
        .to_str()
        .is_some_and(|p| find_binary(p, None).is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::carried_code;
    use crate::output::sink::{capture, DEFAULT_CAPTURE_LIMIT};

    #[test]
    fn test_output_is_captured() {
        let (res, out) = capture(DEFAULT_CAPTURE_LIMIT, || {
            Cmd::new("sh").args(["-c", "echo from-child; echo to-stderr >&2"]).run()
        });
        assert!(res.is_ok());
        assert_eq!(out.text, "from-child\nto-stderr\n");
    }

    #[test]
    fn test_exit_status_is_preserved() {
        let (res, _) = capture(DEFAULT_CAPTURE_LIMIT, || Cmd::new("sh").args(["-c", "exit 3"]).run());
        let err = res.unwrap_err();
        let carried = carried_code(&err).unwrap();
        assert_eq!(carried.exit, 3);
        assert_eq!(carried.code, 0);
    }

    #[test]
    fn test_missing_program() {
        let err = Cmd::new("pig-definitely-not-installed").read().unwrap_err();
        assert!(err.to_string().contains("failed to run"));
    }

    #[test]
    fn test_display_with_user() {
        let cmd = Cmd::new("patronictl").arg("list");
        assert_eq!(cmd.display(), "patronictl list");
        let mut cmd = cmd;
        cmd.user = Some("postgres".into());
        assert_eq!(cmd.display(), "sudo -iu postgres patronictl list");
    }

    #[test]
    fn test_read_stdout() {
        assert_eq!(Cmd::new("echo").arg("hello").read().unwrap(), "hello\n");
    }
}
