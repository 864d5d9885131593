//! External program execution for providers.
//!
//! Providers that shell out (package managers, systemctl, psql, exec commands)
//! go through the [`CommandRunner`] trait, so the same provider logic runs
//! against the real system or against a scripted runner in tests.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::debug;

use super::ProviderError;

/// A program invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
  pub program: String,
  pub args: Vec<String>,
  pub env: BTreeMap<String, String>,
  pub cwd: Option<PathBuf>,
}

impl CommandSpec {
  pub fn new(program: impl Into<String>) -> Self {
    Self {
      program: program.into(),
      ..Self::default()
    }
  }

  /// A script run through the platform shell.
  ///
  /// Uses `/bin/sh -c` on Unix and PowerShell on Windows rather than `$SHELL`,
  /// which may source user profiles.
  pub fn shell(script: &str) -> Self {
    #[cfg(unix)]
    {
      Self::new("/bin/sh").arg("-c").arg(script)
    }

    #[cfg(windows)]
    {
      Self::new("powershell.exe")
        .args(["-NoProfile", "-ExecutionPolicy", "Bypass", "-Command"])
        .arg(script)
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

  pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.env.insert(key.into(), value.into());
    self
  }

  pub fn cwd(mut self, dir: impl AsRef<Path>) -> Self {
    self.cwd = Some(dir.as_ref().to_path_buf());
    self
  }
}

impl fmt::Display for CommandSpec {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.program)?;
    for arg in &self.args {
      write!(f, " {}", arg)?;
    }
    Ok(())
  }
}

/// Captured result of a finished program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
  pub code: Option<i32>,
  pub stdout: String,
  pub stderr: String,
}

impl CommandOutput {
  pub fn success(stdout: impl Into<String>) -> Self {
    Self {
      code: Some(0),
      stdout: stdout.into(),
      stderr: String::new(),
    }
  }

  pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
    Self {
      code: Some(code),
      stdout: String::new(),
      stderr: stderr.into(),
    }
  }

  pub fn is_success(&self) -> bool {
    self.code == Some(0)
  }

  /// Turn a non-zero exit into [`ProviderError::CommandFailed`].
  pub fn check(self, spec: &CommandSpec) -> Result<Self, ProviderError> {
    if self.is_success() {
      Ok(self)
    } else {
      Err(ProviderError::CommandFailed {
        cmd: spec.to_string(),
        code: self.code,
        stderr: self.stderr.trim().to_string(),
      })
    }
  }
}

/// Runs external programs.
///
/// A non-zero exit status is not an error at this level; callers decide what
/// a failing program means (`systemctl is-active` exits 3 for a stopped unit).
pub trait CommandRunner: Send + Sync {
  fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ProviderError>;

  /// Run and require success.
  fn run_checked(&self, spec: &CommandSpec) -> Result<CommandOutput, ProviderError> {
    self.run(spec)?.check(spec)
  }
}

/// Runs programs on the local system with `std::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
  fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ProviderError> {
    debug!(cmd = %spec, cwd = ?spec.cwd, "running command");

    let mut command = Command::new(&spec.program);
    command
      .args(&spec.args)
      .envs(&spec.env)
      // Stable, parseable output from system tools
      .env("LC_ALL", "C")
      .stdin(Stdio::null());

    if let Some(cwd) = &spec.cwd {
      command.current_dir(cwd);
    }

    let output = command.output().map_err(|source| ProviderError::Spawn {
      program: spec.program.clone(),
      source,
    })?;

    let result = CommandOutput {
      code: output.status.code(),
      stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
      stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    };

    if !result.stderr.is_empty() {
      debug!(cmd = %spec, stderr = %result.stderr, "command stderr");
    }

    Ok(result)
  }
}
