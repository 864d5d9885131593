//! Shell commands with guards.
//!
//! Attributes:
//! - `command` (required): script run through the platform shell
//! - `creates`: path; the command is considered done once it exists
//! - `unless`: guard script; skip the command when it exits 0
//! - `onlyif`: guard script; run the command only when it exits 0
//! - `refreshonly`: run only when refreshed by a `notify`/`subscribe` upstream
//! - `cwd`: working directory for the command and its guards

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use super::{ApplyOutcome, AttributeSchema, CommandRunner, CommandSpec, Provider, ProviderError, State};
use crate::resource::{Resource, ValueKind};

pub struct ExecProvider {
  runner: Arc<dyn CommandRunner>,
  schema: AttributeSchema,
}

impl ExecProvider {
  pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
    Self {
      runner,
      schema: AttributeSchema::new()
        .required("command", ValueKind::String)
        .optional("creates", ValueKind::String)
        .optional("unless", ValueKind::String)
        .optional("onlyif", ValueKind::String)
        .optional("refreshonly", ValueKind::Bool)
        .optional("cwd", ValueKind::String),
    }
  }

  fn shell(resource: &Resource, script: &str) -> CommandSpec {
    let spec = CommandSpec::shell(script);
    match resource.attr_str("cwd") {
      Some(cwd) => spec.cwd(cwd),
      None => spec,
    }
  }

  /// Run a guard script, returning whether it exited 0.
  fn guard(&self, resource: &Resource, script: &str) -> Result<bool, ProviderError> {
    Ok(self.runner.run(&Self::shell(resource, script))?.is_success())
  }

  fn run_command(&self, resource: &Resource) -> Result<(), ProviderError> {
    let command = resource
      .attr_str("command")
      .ok_or_else(|| ProviderError::Invalid(format!("{} has no command", resource.id)))?;

    info!(resource = %resource.id, command, "running exec");
    self.runner.run_checked(&Self::shell(resource, command))?;
    Ok(())
  }
}

impl Provider for ExecProvider {
  fn schema(&self) -> &AttributeSchema {
    &self.schema
  }

  fn read_current_state(&self, resource: &Resource) -> Result<State, ProviderError> {
    let mut state = State::present();

    if let Some(creates) = resource.attr_str("creates") {
      state = state.with("creates_exists", Path::new(creates).exists());
    }
    if let Some(unless) = resource.attr_str("unless") {
      state = state.with("unless_passed", self.guard(resource, unless)?);
    }
    if let Some(onlyif) = resource.attr_str("onlyif") {
      state = state.with("onlyif_passed", self.guard(resource, onlyif)?);
    }

    Ok(state)
  }

  fn is_in_sync(&self, resource: &Resource, state: &State) -> bool {
    resource.attr_bool("refreshonly") == Some(true)
      || state.get_bool("creates_exists") == Some(true)
      || state.get_bool("unless_passed") == Some(true)
      || state.get_bool("onlyif_passed") == Some(false)
  }

  fn apply(&self, resource: &Resource) -> Result<ApplyOutcome, ProviderError> {
    self.run_command(resource)?;
    Ok(ApplyOutcome::new("executed"))
  }

  fn refresh(&self, resource: &Resource) -> Result<bool, ProviderError> {
    if resource.attr_bool("refreshonly") != Some(true) {
      return Ok(false);
    }

    // Guards still apply to refresh-triggered runs
    let state = self.read_current_state(resource)?;
    if state.get_bool("creates_exists") == Some(true)
      || state.get_bool("unless_passed") == Some(true)
      || state.get_bool("onlyif_passed") == Some(false)
    {
      return Ok(false);
    }

    self.run_command(resource)?;
    Ok(true)
  }
}
