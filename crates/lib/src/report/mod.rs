//! Run reports.
//!
//! A [`RunReport`] lists every catalog resource exactly once, in convergence
//! order, with its terminal [`Outcome`]. It serializes to JSON for automation
//! and is persisted as the last run's report in the state directory.

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::resource::ResourceId;

/// Terminal state of one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
  /// Already in sync; no side effect.
  Unchanged,
  /// Applied or refreshed (or would be, in a dry run).
  Changed,
  /// A provider call failed.
  Failed,
  /// Not attempted: an upstream failed or was skipped, or the run timed out.
  Skipped,
}

impl fmt::Display for Outcome {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Outcome::Unchanged => "unchanged",
      Outcome::Changed => "changed",
      Outcome::Failed => "failed",
      Outcome::Skipped => "skipped",
    };
    f.write_str(name)
  }
}

mod duration_secs {
  use super::*;

  pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let secs = f64::deserialize(deserializer)?;
    Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
  }
}

/// One resource's line in the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
  pub resource_id: ResourceId,
  pub outcome: Outcome,
  pub detail: String,
  /// Time spent in provider calls, in seconds.
  #[serde(with = "duration_secs")]
  pub duration: Duration,
}

impl ReportEntry {
  pub fn new(resource_id: ResourceId, outcome: Outcome, detail: impl Into<String>, duration: Duration) -> Self {
    Self {
      resource_id,
      outcome,
      detail: detail.into(),
      duration,
    }
  }
}

/// Count of entries per outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
  pub total: usize,
  pub unchanged: usize,
  pub changed: usize,
  pub failed: usize,
  pub skipped: usize,
}

impl Summary {
  fn of(entries: &[ReportEntry]) -> Self {
    let mut summary = Summary {
      total: entries.len(),
      ..Summary::default()
    };
    for entry in entries {
      match entry.outcome {
        Outcome::Unchanged => summary.unchanged += 1,
        Outcome::Changed => summary.changed += 1,
        Outcome::Failed => summary.failed += 1,
        Outcome::Skipped => summary.skipped += 1,
      }
    }
    summary
  }
}

/// Outcome of a whole convergence run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
  pub dry_run: bool,
  #[serde(with = "duration_secs")]
  pub duration: Duration,
  pub summary: Summary,
  pub entries: Vec<ReportEntry>,
}

impl RunReport {
  pub fn new(entries: Vec<ReportEntry>, dry_run: bool, duration: Duration) -> Self {
    Self {
      dry_run,
      duration,
      summary: Summary::of(&entries),
      entries,
    }
  }

  /// A report for a run that converged nothing.
  pub fn empty() -> Self {
    Self::new(Vec::new(), false, Duration::ZERO)
  }

  /// True when no resource failed.
  pub fn is_success(&self) -> bool {
    self.summary.failed == 0
  }

  /// Process exit status: 0 when no resource failed, 1 otherwise.
  pub fn exit_code(&self) -> i32 {
    if self.is_success() { 0 } else { 1 }
  }

  pub fn entry(&self, id: &ResourceId) -> Option<&ReportEntry> {
    self.entries.iter().find(|e| &e.resource_id == id)
  }

  pub fn outcome(&self, id: &ResourceId) -> Option<Outcome> {
    self.entry(id).map(|e| e.outcome)
  }

  pub fn to_json(&self) -> serde_json::Result<String> {
    serde_json::to_string_pretty(self)
  }

  /// Write the report as JSON, creating parent directories.
  pub fn save(&self, path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent)?;
    }
    let json = self.to_json().map_err(io::Error::other)?;
    fs::write(path, json)
  }

  pub fn load(path: &Path) -> io::Result<Self> {
    let contents = fs::read_to_string(path)?;
    serde_json::from_str(&contents).map_err(io::Error::other)
  }
}
