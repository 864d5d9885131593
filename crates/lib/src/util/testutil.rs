//! Test utilities for converge-lib.
//!
//! - [`FakeRunner`]: a scripted [`CommandRunner`] that records every invocation
//! - [`FakeSystem`] + [`FakeProvider`]: an in-memory target system whose
//!   behaviour (failures, slow applies) is driven by resource attributes

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::provider::{
  ApplyOutcome, AttributeSchema, CommandOutput, CommandRunner, CommandSpec, Provider, ProviderError, ProviderRegistry,
  State,
};
use crate::resource::{Resource, ResourceId, ValueKind};

/// A command runner answering from prefix rules.
///
/// The most recently added rule whose prefix matches the full command line
/// wins; unmatched commands succeed with empty output.
#[derive(Default)]
pub struct FakeRunner {
  rules: Mutex<Vec<(String, CommandOutput)>>,
  calls: Mutex<Vec<String>>,
}

impl FakeRunner {
  pub fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }

  pub fn respond(&self, prefix: &str, output: CommandOutput) {
    self.rules.lock().unwrap().push((prefix.to_string(), output));
  }

  pub fn calls(&self) -> Vec<String> {
    self.calls.lock().unwrap().clone()
  }

  pub fn called(&self, prefix: &str) -> bool {
    self.calls().iter().any(|c| c.starts_with(prefix))
  }
}

impl CommandRunner for FakeRunner {
  fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ProviderError> {
    let line = spec.to_string();
    self.calls.lock().unwrap().push(line.clone());

    let rules = self.rules.lock().unwrap();
    let output = rules
      .iter()
      .rev()
      .find(|(prefix, _)| line.starts_with(prefix.as_str()))
      .map(|(_, output)| output.clone())
      .unwrap_or_else(|| CommandOutput::success(""));
    Ok(output)
  }
}

/// In-memory target system shared by every [`FakeProvider`].
#[derive(Default)]
pub struct FakeSystem {
  present: Mutex<HashSet<ResourceId>>,
  calls: Mutex<Vec<String>>,
  in_flight: Mutex<HashSet<ResourceId>>,
  overlaps: Mutex<Vec<(ResourceId, ResourceId)>>,
  max_in_flight: AtomicUsize,
}

impl FakeSystem {
  pub fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }

  pub fn install(&self, id: &ResourceId) {
    self.present.lock().unwrap().insert(id.clone());
  }

  pub fn is_present(&self, id: &ResourceId) -> bool {
    self.present.lock().unwrap().contains(id)
  }

  /// Every provider call as `"<verb> <id>"`, in call order.
  pub fn calls(&self) -> Vec<String> {
    self.calls.lock().unwrap().clone()
  }

  /// Ids passed to `verb`, in call order.
  pub fn calls_of(&self, verb: &str) -> Vec<String> {
    let prefix = format!("{} ", verb);
    self
      .calls()
      .into_iter()
      .filter_map(|c| c.strip_prefix(&prefix).map(ToString::to_string))
      .collect()
  }

  pub fn clear_calls(&self) {
    self.calls.lock().unwrap().clear();
  }

  /// Pairs of resources whose `apply` calls overlapped in time.
  pub fn overlaps(&self) -> Vec<(ResourceId, ResourceId)> {
    self.overlaps.lock().unwrap().clone()
  }

  pub fn max_in_flight(&self) -> usize {
    self.max_in_flight.load(Ordering::SeqCst)
  }

  fn record(&self, verb: &str, id: &ResourceId) {
    self.calls.lock().unwrap().push(format!("{} {}", verb, id));
  }

  fn enter(&self, id: &ResourceId) {
    let mut in_flight = self.in_flight.lock().unwrap();
    let mut overlaps = self.overlaps.lock().unwrap();
    for other in in_flight.iter() {
      overlaps.push((other.clone(), id.clone()));
    }
    in_flight.insert(id.clone());
    self.max_in_flight.fetch_max(in_flight.len(), Ordering::SeqCst);
  }

  fn leave(&self, id: &ResourceId) {
    self.in_flight.lock().unwrap().remove(id);
  }
}

/// Provider over a [`FakeSystem`].
///
/// Attributes:
/// - `ensure`: `present` (default) or `absent`
/// - `fail_read`, `fail_apply`, `fail_refresh`: make that call fail
/// - `delay_ms`: sleep inside `apply`
pub struct FakeProvider {
  system: Arc<FakeSystem>,
  schema: AttributeSchema,
}

impl FakeProvider {
  pub fn new(system: Arc<FakeSystem>) -> Self {
    Self {
      system,
      schema: AttributeSchema::new()
        .one_of("ensure", &["present", "absent"])
        .optional("fail_read", ValueKind::Bool)
        .optional("fail_apply", ValueKind::Bool)
        .optional("fail_refresh", ValueKind::Bool)
        .optional("delay_ms", ValueKind::Int),
    }
  }

  fn wants_present(resource: &Resource) -> bool {
    resource.attr_str("ensure") != Some("absent")
  }
}

impl Provider for FakeProvider {
  fn schema(&self) -> &AttributeSchema {
    &self.schema
  }

  fn read_current_state(&self, resource: &Resource) -> Result<State, ProviderError> {
    self.system.record("read", &resource.id);
    if resource.attr_bool("fail_read") == Some(true) {
      return Err(ProviderError::Invalid("simulated read failure".to_string()));
    }

    Ok(if self.system.is_present(&resource.id) {
      State::present()
    } else {
      State::absent()
    })
  }

  fn is_in_sync(&self, resource: &Resource, state: &State) -> bool {
    state.exists == Self::wants_present(resource)
  }

  fn apply(&self, resource: &Resource) -> Result<ApplyOutcome, ProviderError> {
    self.system.record("apply", &resource.id);
    self.system.enter(&resource.id);

    if let Some(ms) = resource.attr("delay_ms").and_then(|v| v.as_int()) {
      std::thread::sleep(Duration::from_millis(ms as u64));
    }

    let result = if resource.attr_bool("fail_apply") == Some(true) {
      Err(ProviderError::CommandFailed {
        cmd: format!("fake apply {}", resource.id),
        code: Some(1),
        stderr: "simulated apply failure".to_string(),
      })
    } else if Self::wants_present(resource) {
      self.system.install(&resource.id);
      Ok(ApplyOutcome::new("created"))
    } else {
      self.system.present.lock().unwrap().remove(&resource.id);
      Ok(ApplyOutcome::new("removed"))
    };

    self.system.leave(&resource.id);
    result
  }

  fn refresh(&self, resource: &Resource) -> Result<bool, ProviderError> {
    self.system.record("refresh", &resource.id);
    if resource.attr_bool("fail_refresh") == Some(true) {
      return Err(ProviderError::Invalid("simulated refresh failure".to_string()));
    }
    Ok(true)
  }
}

/// A registry mapping each of `types` to a [`FakeProvider`] over `system`.
pub fn fake_registry(system: &Arc<FakeSystem>, types: &[&str]) -> ProviderRegistry {
  let mut registry = ProviderRegistry::new();
  for kind in types {
    registry.register(*kind, Arc::new(FakeProvider::new(system.clone())));
  }
  registry
}
