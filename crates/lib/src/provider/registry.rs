//! Resource type name to provider lookup.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use super::command::{CommandRunner, SystemRunner};
use super::exec::ExecProvider;
use super::file::FileProvider;
use super::package::PackageProvider;
use super::role::RoleProvider;
use super::service::ServiceProvider;
use super::Provider;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
  #[error("no provider registered for resource type '{0}'")]
  NotFound(String),
}

/// Maps resource type names to providers.
///
/// Type names are case-insensitive, matching [`ResourceId`](crate::resource::ResourceId).
#[derive(Default, Clone)]
pub struct ProviderRegistry {
  providers: HashMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
  /// An empty registry.
  pub fn new() -> Self {
    Self::default()
  }

  /// A registry with the built-in providers running real system commands.
  pub fn with_builtin() -> Self {
    Self::with_runner(Arc::new(SystemRunner))
  }

  /// A registry with the built-in providers, running commands through `runner`.
  pub fn with_runner(runner: Arc<dyn CommandRunner>) -> Self {
    let mut registry = Self::new();
    registry.register("package", Arc::new(PackageProvider::new(runner.clone())));
    registry.register("service", Arc::new(ServiceProvider::new(runner.clone())));
    registry.register("exec", Arc::new(ExecProvider::new(runner.clone())));
    registry.register("role", Arc::new(RoleProvider::new(runner)));
    registry.register("file", Arc::new(FileProvider::new()));
    registry
  }

  /// Register `provider` for `type_name`, returning the provider it replaced.
  pub fn register(&mut self, type_name: &str, provider: Arc<dyn Provider>) -> Option<Arc<dyn Provider>> {
    self.providers.insert(type_name.trim().to_lowercase(), provider)
  }

  pub fn lookup(&self, type_name: &str) -> Result<Arc<dyn Provider>, RegistryError> {
    self
      .providers
      .get(&type_name.trim().to_lowercase())
      .cloned()
      .ok_or_else(|| RegistryError::NotFound(type_name.to_string()))
  }

  pub fn contains(&self, type_name: &str) -> bool {
    self.providers.contains_key(&type_name.trim().to_lowercase())
  }

  /// Registered type names, sorted.
  pub fn types(&self) -> Vec<&str> {
    let mut types: Vec<&str> = self.providers.keys().map(String::as_str).collect();
    types.sort_unstable();
    types
  }
}

impl fmt::Debug for ProviderRegistry {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ProviderRegistry").field("types", &self.types()).finish()
  }
}
