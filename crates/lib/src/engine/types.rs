//! Types for convergence runs.

use std::time::Duration;

use thiserror::Error;

use crate::consts::TIMEOUT_DETAIL;
use crate::provider::ProviderError;
use crate::resource::ResourceId;

/// Run configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
  /// Maximum number of resources converging at once. `1` walks the catalog
  /// strictly in topological order.
  pub concurrency: usize,

  /// Observe and compare only; never call `apply` or `refresh`.
  pub dry_run: bool,

  /// Once elapsed, no further resource is started.
  pub timeout: Option<Duration>,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      concurrency: 1,
      dry_run: false,
      timeout: None,
    }
  }
}

impl EngineConfig {
  pub fn with_concurrency(mut self, concurrency: usize) -> Self {
    self.concurrency = concurrency;
    self
  }

  pub fn with_dry_run(mut self, dry_run: bool) -> Self {
    self.dry_run = dry_run;
    self
  }

  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = Some(timeout);
    self
  }

  /// Worker pool size; zero is treated as one.
  pub(crate) fn workers(&self) -> usize {
    self.concurrency.max(1)
  }
}

/// A provider call failure, recorded against the resource as `failed`.
#[derive(Debug, Error)]
pub enum ResourceError {
  #[error("read failed: {0}")]
  Read(#[source] ProviderError),

  #[error("apply failed: {0}")]
  Apply(#[source] ProviderError),

  #[error("refresh failed: {0}")]
  Refresh(#[source] ProviderError),

  #[error("provider panicked: {0}")]
  Panicked(String),
}

/// Why a resource was not attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
  /// An upstream resource failed.
  FailedDependency(ResourceId),
  /// An upstream resource was itself skipped.
  SkippedDependency(ResourceId),
  /// The run deadline passed before the resource could start.
  Timeout,
}

impl std::fmt::Display for SkipReason {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      SkipReason::FailedDependency(id) => write!(f, "dependency {} failed", id),
      SkipReason::SkippedDependency(id) => write!(f, "dependency {} was skipped", id),
      SkipReason::Timeout => f.write_str(TIMEOUT_DETAIL),
    }
  }
}
