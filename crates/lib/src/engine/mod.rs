//! Convergence engine.
//!
//! Walks a compiled [`Catalog`] in dependency order and drives each resource
//! to a terminal [`Outcome`]:
//!
//! 1. `read_current_state` (error: `failed`)
//! 2. `is_in_sync`: yes means `unchanged`
//! 3. otherwise `apply` (success: `changed`, error: `failed`)
//! 4. when a `notify`/`subscribe` upstream changed, `refresh`
//!
//! A resource whose upstream failed or was skipped is `skipped` without any
//! provider call. Failures never abort the run; unrelated branches still
//! converge.
//!
//! Resources are dispatched only once every upstream reached a terminal state,
//! so related resources never run at the same time. Up to
//! [`EngineConfig::concurrency`] independent resources run concurrently on the
//! blocking thread pool; among ready resources the earliest in topological
//! order goes first.

pub mod types;

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::catalog::{Catalog, CatalogEntry};
use crate::report::{Outcome, ReportEntry, RunReport};

pub use types::{EngineConfig, ResourceError, SkipReason};

const IN_SYNC: &str = "in sync";
const REFRESHED: &str = "refreshed";
const DRY_RUN_CHANGE: &str = "would change (dry run)";
const DRY_RUN_REFRESH: &str = "would refresh (dry run)";

/// Terminal result for one resource.
#[derive(Debug, Clone)]
struct Finished {
  outcome: Outcome,
  detail: String,
  duration: Duration,
}

impl Finished {
  fn new(outcome: Outcome, detail: impl Into<String>, duration: Duration) -> Self {
    Self {
      outcome,
      detail: detail.into(),
      duration,
    }
  }

  fn failed(err: ResourceError, duration: Duration) -> Self {
    Self::new(Outcome::Failed, err.to_string(), duration)
  }

  fn skipped(reason: &SkipReason) -> Self {
    Self::new(Outcome::Skipped, reason.to_string(), Duration::ZERO)
  }
}

/// Run one resource through read, compare, apply and refresh.
fn converge_resource(entry: &CatalogEntry, refresh: bool, dry_run: bool) -> Finished {
  let started = Instant::now();
  let resource = &entry.resource;
  let provider = &entry.provider;
  let finish = |outcome: Outcome, detail: String| Finished::new(outcome, detail, started.elapsed());

  debug!(resource = %resource.id, "reading current state");
  let state = match provider.read_current_state(resource) {
    Ok(state) => state,
    Err(e) => return Finished::failed(ResourceError::Read(e), started.elapsed()),
  };

  if provider.is_in_sync(resource, &state) {
    if !refresh {
      return finish(Outcome::Unchanged, IN_SYNC.to_string());
    }
    if dry_run {
      return finish(Outcome::Changed, DRY_RUN_REFRESH.to_string());
    }

    debug!(resource = %resource.id, "refreshing");
    return match provider.refresh(resource) {
      Ok(true) => finish(Outcome::Changed, REFRESHED.to_string()),
      Ok(false) => finish(Outcome::Unchanged, IN_SYNC.to_string()),
      Err(e) => Finished::failed(ResourceError::Refresh(e), started.elapsed()),
    };
  }

  if dry_run {
    return finish(Outcome::Changed, DRY_RUN_CHANGE.to_string());
  }

  debug!(resource = %resource.id, state = ?state.properties, exists = state.exists, "out of sync, applying");
  let applied = match provider.apply(resource) {
    Ok(applied) => applied,
    Err(e) => return Finished::failed(ResourceError::Apply(e), started.elapsed()),
  };

  let mut detail = if applied.detail.is_empty() {
    "applied".to_string()
  } else {
    applied.detail
  };

  if refresh {
    debug!(resource = %resource.id, "refreshing after apply");
    match provider.refresh(resource) {
      Ok(true) => detail.push_str(", refreshed"),
      Ok(false) => {}
      Err(e) => return Finished::failed(ResourceError::Refresh(e), started.elapsed()),
    }
  }

  finish(Outcome::Changed, detail)
}

/// [`converge_resource`] with provider panics turned into failures.
fn converge_guarded(entry: &CatalogEntry, refresh: bool, dry_run: bool) -> Finished {
  let started = Instant::now();
  catch_unwind(AssertUnwindSafe(|| converge_resource(entry, refresh, dry_run))).unwrap_or_else(|payload| {
    let message = payload
      .downcast_ref::<&str>()
      .map(ToString::to_string)
      .or_else(|| payload.downcast_ref::<String>().cloned())
      .unwrap_or_else(|| "unknown panic".to_string());
    Finished::failed(ResourceError::Panicked(message), started.elapsed())
  })
}

/// Scheduling state for one run.
struct Run<'a> {
  catalog: &'a Catalog,
  finished: Vec<Option<Finished>>,
  /// Upstreams of each resource not yet terminal.
  waiting_on: Vec<usize>,
  /// Resources whose upstreams are all terminal, keyed by topological position.
  ready: BinaryHeap<Reverse<(usize, usize)>>,
  /// Dispatched resources without a result yet.
  in_flight: BTreeSet<usize>,
}

impl<'a> Run<'a> {
  fn new(catalog: &'a Catalog) -> Self {
    let graph = catalog.graph();
    let waiting_on: Vec<usize> = (0..catalog.len()).map(|i| graph.upstream(i).len()).collect();
    let ready = (0..catalog.len())
      .filter(|&i| waiting_on[i] == 0)
      .map(|i| Reverse((graph.position(i), i)))
      .collect();

    Self {
      catalog,
      finished: vec![None; catalog.len()],
      waiting_on,
      ready,
      in_flight: BTreeSet::new(),
    }
  }

  fn outcome(&self, idx: usize) -> Option<Outcome> {
    self.finished[idx].as_ref().map(|f| f.outcome)
  }

  /// Why `idx` must not run, if an upstream failed or was skipped.
  fn blocked_by(&self, idx: usize) -> Option<SkipReason> {
    let upstream = self.catalog.graph().upstream(idx);
    let id = |u: usize| self.catalog.entry(u).resource.id.clone();

    upstream
      .iter()
      .find(|&&u| self.outcome(u) == Some(Outcome::Failed))
      .map(|&u| SkipReason::FailedDependency(id(u)))
      .or_else(|| {
        upstream
          .iter()
          .find(|&&u| self.outcome(u) == Some(Outcome::Skipped))
          .map(|&u| SkipReason::SkippedDependency(id(u)))
      })
  }

  /// Whether a refresh upstream of `idx` changed.
  fn needs_refresh(&self, idx: usize) -> bool {
    self
      .catalog
      .graph()
      .refresh_sources(idx)
      .into_iter()
      .any(|u| self.outcome(u) == Some(Outcome::Changed))
  }

  /// Take the next ready resource off the queue and mark it dispatched.
  fn dispatch(&mut self) -> Option<usize> {
    let Reverse((_, idx)) = self.ready.pop()?;
    self.in_flight.insert(idx);
    Some(idx)
  }

  /// Fail every dispatched resource that never reported back, so its
  /// dependents are skipped instead of left pending. Returns whether any were
  /// outstanding.
  fn abandon_in_flight(&mut self) -> bool {
    let lost = std::mem::take(&mut self.in_flight);
    for &idx in &lost {
      let err = ResourceError::Panicked("task did not complete".to_string());
      self.finish(idx, Finished::failed(err, Duration::ZERO));
    }
    !lost.is_empty()
  }

  fn skip(&mut self, idx: usize, reason: SkipReason) {
    warn!(resource = %self.catalog.entry(idx).resource.id, reason = %reason, "skipping resource");
    self.finish(idx, Finished::skipped(&reason));
  }

  fn finish(&mut self, idx: usize, result: Finished) {
    let id = &self.catalog.entry(idx).resource.id;
    match result.outcome {
      Outcome::Failed => error!(resource = %id, error = %result.detail, "resource failed"),
      Outcome::Changed => info!(resource = %id, detail = %result.detail, "resource changed"),
      Outcome::Unchanged => debug!(resource = %id, "resource unchanged"),
      Outcome::Skipped => {}
    }

    self.in_flight.remove(&idx);
    self.finished[idx] = Some(result);

    let graph = self.catalog.graph();
    for &next in graph.downstream(idx) {
      self.waiting_on[next] -= 1;
      if self.waiting_on[next] == 0 {
        self.ready.push(Reverse((graph.position(next), next)));
      }
    }
  }

  fn into_report(self, dry_run: bool, duration: Duration) -> RunReport {
    let mut finished = self.finished;
    let entries = self
      .catalog
      .graph()
      .order()
      .iter()
      .map(|&idx| {
        let result = finished[idx].take().unwrap_or_else(|| {
          Finished::failed(ResourceError::Panicked("task did not complete".to_string()), Duration::ZERO)
        });
        ReportEntry::new(
          self.catalog.entry(idx).resource.id.clone(),
          result.outcome,
          result.detail,
          result.duration,
        )
      })
      .collect();

    RunReport::new(entries, dry_run, duration)
  }
}

/// Converge every resource in `catalog`.
///
/// Never fails as a whole: provider errors are recorded per resource and the
/// report lists every resource exactly once, in convergence order.
pub async fn converge(catalog: Arc<Catalog>, config: &EngineConfig) -> RunReport {
  let started = Instant::now();
  let deadline = config.timeout.map(|timeout| started + timeout);

  info!(
    resources = catalog.len(),
    concurrency = config.workers(),
    dry_run = config.dry_run,
    "starting convergence"
  );

  let mut run = Run::new(&catalog);
  let semaphore = Arc::new(Semaphore::new(config.workers()));
  let mut tasks: JoinSet<(usize, Finished)> = JoinSet::new();

  loop {
    while let Some(&Reverse((_, idx))) = run.ready.peek() {
      if let Some(reason) = run.blocked_by(idx) {
        run.ready.pop();
        run.skip(idx, reason);
        continue;
      }

      if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
        run.ready.pop();
        run.skip(idx, SkipReason::Timeout);
        continue;
      }

      let Ok(permit) = semaphore.clone().try_acquire_owned() else {
        break;
      };
      let Some(idx) = run.dispatch() else {
        break;
      };

      let refresh = run.needs_refresh(idx);
      let dry_run = config.dry_run;
      let task_catalog = catalog.clone();
      debug!(resource = %catalog.entry(idx).resource.id, refresh, "dispatching");

      tasks.spawn_blocking(move || {
        let _permit = permit;
        (idx, converge_guarded(task_catalog.entry(idx), refresh, dry_run))
      });
    }

    let Some(joined) = tasks.join_next().await else {
      if run.abandon_in_flight() {
        continue;
      }
      break;
    };

    match joined {
      Ok((idx, result)) => run.finish(idx, result),
      Err(e) => error!(error = %e, "convergence task did not complete"),
    }
  }

  let report = run.into_report(config.dry_run, started.elapsed());

  info!(
    changed = report.summary.changed,
    unchanged = report.summary.unchanged,
    failed = report.summary.failed,
    skipped = report.summary.skipped,
    duration = ?report.duration,
    "convergence complete"
  );

  report
}
