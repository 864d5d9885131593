//! systemd services via `systemctl`.
//!
//! Attributes:
//! - `ensure`: `running` (default) or `stopped`
//! - `enable`: whether the unit starts at boot; unset leaves it alone
//!
//! A refresh restarts a running service.

use std::sync::Arc;

use tracing::info;

use super::{ApplyOutcome, AttributeSchema, CommandRunner, CommandSpec, Provider, ProviderError, State};
use crate::resource::{Resource, ValueKind};

pub struct ServiceProvider {
  runner: Arc<dyn CommandRunner>,
  schema: AttributeSchema,
}

impl ServiceProvider {
  pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
    Self {
      runner,
      schema: AttributeSchema::new()
        .one_of("ensure", &["running", "stopped"])
        .optional("enable", ValueKind::Bool),
    }
  }

  fn wants_running(resource: &Resource) -> bool {
    resource.attr_str("ensure") != Some("stopped")
  }

  fn systemctl(&self, verb: &str, unit: &str) -> CommandSpec {
    CommandSpec::new("systemctl").args([verb, unit])
  }
}

impl Provider for ServiceProvider {
  fn schema(&self) -> &AttributeSchema {
    &self.schema
  }

  fn read_current_state(&self, resource: &Resource) -> Result<State, ProviderError> {
    let unit = resource.title();

    // Both report through the exit code: is-active exits 3 for inactive units,
    // is-enabled exits 1 for disabled ones.
    let active = self.runner.run(&self.systemctl("is-active", unit))?;
    let enabled = self.runner.run(&self.systemctl("is-enabled", unit))?;

    Ok(
      State::present()
        .with("running", active.is_success())
        .with("enabled", enabled.is_success()),
    )
  }

  fn is_in_sync(&self, resource: &Resource, state: &State) -> bool {
    let running_ok = state.get_bool("running") == Some(Self::wants_running(resource));
    let enable_ok = match resource.attr_bool("enable") {
      Some(wanted) => state.get_bool("enabled") == Some(wanted),
      None => true,
    };
    running_ok && enable_ok
  }

  fn apply(&self, resource: &Resource) -> Result<ApplyOutcome, ProviderError> {
    let unit = resource.title();
    let current = self.read_current_state(resource)?;
    let mut done = Vec::new();

    if let Some(wanted) = resource.attr_bool("enable")
      && current.get_bool("enabled") != Some(wanted)
    {
      let verb = if wanted { "enable" } else { "disable" };
      self.runner.run_checked(&self.systemctl(verb, unit))?;
      done.push(format!("{}d", verb));
    }

    let wanted = Self::wants_running(resource);
    if current.get_bool("running") != Some(wanted) {
      let verb = if wanted { "start" } else { "stop" };
      info!(service = unit, action = verb, "changing service state");
      self.runner.run_checked(&self.systemctl(verb, unit))?;
      done.push(if wanted { "started" } else { "stopped" }.to_string());
    }

    Ok(ApplyOutcome::new(done.join(", ")))
  }

  fn refresh(&self, resource: &Resource) -> Result<bool, ProviderError> {
    if !Self::wants_running(resource) {
      return Ok(false);
    }

    info!(service = resource.title(), "restarting service");
    self.runner.run_checked(&self.systemctl("restart", resource.title()))?;
    Ok(true)
  }
}
