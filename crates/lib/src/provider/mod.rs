//! Resource providers.
//!
//! A provider knows how to observe and change one type of resource on the real
//! system. The engine never touches system state directly; every read and every
//! mutation goes through the [`Provider`] registered for the resource's type.
//!
//! # Lifecycle
//!
//! For each resource the engine calls:
//! - `read_current_state()` - observe the system (no side effects)
//! - `is_in_sync()` - compare the observation with the declaration
//! - `apply()` - only when out of sync, make the system match
//! - `refresh()` - only when a `notify`/`subscribe` upstream changed
//!
//! # Submodules
//!
//! - [`command`] - external program execution shared by providers
//! - [`registry`] - type name to provider lookup
//! - [`schema`] - per-provider attribute validation
//! - [`exec`], [`file`], [`package`], [`role`], [`service`] - built-in providers

pub mod command;
pub mod exec;
pub mod file;
pub mod package;
pub mod registry;
pub mod role;
pub mod schema;
pub mod service;

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::resource::{Resource, Value};

pub use command::{CommandOutput, CommandRunner, CommandSpec, SystemRunner};
pub use registry::{ProviderRegistry, RegistryError};
pub use schema::{AttributeSchema, AttributeSpec, SchemaError};

/// Errors a provider can report while reading or changing the system.
#[derive(Debug, Error)]
pub enum ProviderError {
  /// The external program could not be started.
  #[error("failed to run {program}: {source}")]
  Spawn {
    program: String,
    #[source]
    source: std::io::Error,
  },

  /// The external program ran and reported failure.
  #[error("command `{cmd}` failed with exit code {code:?}: {stderr}")]
  CommandFailed {
    cmd: String,
    code: Option<i32>,
    stderr: String,
  },

  /// The external program produced output the provider does not understand.
  #[error("unexpected output from `{cmd}`: {output}")]
  UnexpectedOutput { cmd: String, output: String },

  /// Filesystem access failed.
  #[error("io error on {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// The declaration cannot be acted on (e.g. a file path with no parent).
  #[error("{0}")]
  Invalid(String),
}

/// Observed state of a resource on the real system.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct State {
  /// Whether the resource exists at all.
  pub exists: bool,
  /// Provider-specific observed properties.
  pub properties: BTreeMap<String, Value>,
}

impl State {
  pub fn absent() -> Self {
    Self::default()
  }

  pub fn present() -> Self {
    Self {
      exists: true,
      properties: BTreeMap::new(),
    }
  }

  pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
    self.properties.insert(name.into(), value.into());
    self
  }

  pub fn get(&self, name: &str) -> Option<&Value> {
    self.properties.get(name)
  }

  pub fn get_str(&self, name: &str) -> Option<&str> {
    self.get(name).and_then(Value::as_str)
  }

  pub fn get_bool(&self, name: &str) -> Option<bool> {
    self.get(name).and_then(Value::as_bool)
  }
}

/// What an `apply` call did, for the run report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOutcome {
  pub detail: String,
}

impl ApplyOutcome {
  pub fn new(detail: impl Into<String>) -> Self {
    Self { detail: detail.into() }
  }
}

/// The capability set every resource type implements.
///
/// Providers are shared across worker threads, so implementations must be
/// `Send + Sync`. Any mutual exclusion a backend needs (a package manager
/// lock, for instance) is the provider's own responsibility.
pub trait Provider: Send + Sync {
  /// Attributes this provider accepts.
  fn schema(&self) -> &AttributeSchema;

  /// Check a resource's attributes before any system access.
  ///
  /// The default checks the attribute schema; providers override this to add
  /// value-level checks.
  fn validate(&self, resource: &Resource) -> Result<(), SchemaError> {
    self.schema().validate(resource)
  }

  /// Observe the resource on the system. Must not change anything.
  fn read_current_state(&self, resource: &Resource) -> Result<State, ProviderError>;

  /// Whether the observed state already matches the declaration.
  fn is_in_sync(&self, resource: &Resource, state: &State) -> bool;

  /// Change the system so the resource matches its declaration.
  fn apply(&self, resource: &Resource) -> Result<ApplyOutcome, ProviderError>;

  /// React to a change in a `notify`/`subscribe` upstream.
  ///
  /// Returns whether anything was done. The default does nothing.
  fn refresh(&self, _resource: &Resource) -> Result<bool, ProviderError> {
    Ok(false)
  }
}
