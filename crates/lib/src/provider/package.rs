//! Debian packages via `dpkg-query` and `apt-get`.
//!
//! Attributes:
//! - `ensure`: `present` (default) or `absent`
//! - `version`: exact version to install; unset accepts any installed version

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info};

use super::{ApplyOutcome, AttributeSchema, CommandOutput, CommandRunner, CommandSpec, Provider, ProviderError, State};
use crate::resource::{Resource, ValueKind};

/// dpkg holds a system-wide lock; concurrent apt invocations from one run
/// would fail rather than wait.
static PACKAGE_MANAGER: Mutex<()> = Mutex::new(());

fn package_manager_lock() -> MutexGuard<'static, ()> {
  PACKAGE_MANAGER.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct PackageProvider {
  runner: Arc<dyn CommandRunner>,
  schema: AttributeSchema,
}

impl PackageProvider {
  pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
    Self {
      runner,
      schema: AttributeSchema::new()
        .one_of("ensure", &["present", "absent"])
        .optional("version", ValueKind::String),
    }
  }

  fn wants_present(resource: &Resource) -> bool {
    resource.attr_str("ensure") != Some("absent")
  }

  fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ProviderError> {
    let _guard = package_manager_lock();
    self.runner.run(spec)
  }

  fn apt_get(&self, args: &[String]) -> Result<CommandOutput, ProviderError> {
    let spec = CommandSpec::new("apt-get")
      .args(args.iter().cloned())
      .env("DEBIAN_FRONTEND", "noninteractive");
    self.run(&spec)?.check(&spec)
  }
}

/// Parse `dpkg-query -f '${Status} ${Version}'` output.
///
/// Only `install ok installed` counts as present; removed packages with
/// leftover config files report `deinstall ok config-files`.
fn parse_status(output: &str) -> Option<(bool, Option<&str>)> {
  let mut parts = output.split_whitespace();
  let _want = parts.next()?;
  let _error = parts.next()?;
  let status = parts.next()?;
  let version = parts.next();
  Some((status == "installed", version))
}

impl Provider for PackageProvider {
  fn schema(&self) -> &AttributeSchema {
    &self.schema
  }

  fn read_current_state(&self, resource: &Resource) -> Result<State, ProviderError> {
    let spec = CommandSpec::new("dpkg-query").args(["-W", "-f=${Status} ${Version}", resource.title()]);
    let output = self.run(&spec)?;

    // dpkg-query exits 1 for packages it has never heard of
    if !output.is_success() {
      debug!(package = resource.title(), "package not known to dpkg");
      return Ok(State::absent());
    }

    let (installed, version) = parse_status(&output.stdout).ok_or_else(|| ProviderError::UnexpectedOutput {
      cmd: spec.to_string(),
      output: output.stdout.clone(),
    })?;

    if !installed {
      return Ok(State::absent());
    }

    let mut state = State::present();
    if let Some(version) = version {
      state = state.with("version", version);
    }
    Ok(state)
  }

  fn is_in_sync(&self, resource: &Resource, state: &State) -> bool {
    if !Self::wants_present(resource) {
      return !state.exists;
    }

    state.exists
      && match resource.attr_str("version") {
        Some(wanted) => state.get_str("version") == Some(wanted),
        None => true,
      }
  }

  fn apply(&self, resource: &Resource) -> Result<ApplyOutcome, ProviderError> {
    let name = resource.title();

    if !Self::wants_present(resource) {
      info!(package = name, "removing package");
      self.apt_get(&["remove".to_string(), "-y".to_string(), name.to_string()])?;
      return Ok(ApplyOutcome::new("removed"));
    }

    let target = match resource.attr_str("version") {
      Some(version) => format!("{}={}", name, version),
      None => name.to_string(),
    };

    info!(package = %target, "installing package");
    self.apt_get(&["install".to_string(), "-y".to_string(), target.clone()])?;
    Ok(ApplyOutcome::new(format!("installed {}", target)))
  }
}
