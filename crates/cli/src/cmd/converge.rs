//! The convergence run: load, compile, lock, converge, report.
//!
//! Exit status is the single signal for automation:
//! - `0`: every resource is unchanged or changed
//! - `1`: at least one resource failed
//! - `2`: the run never started (unreadable file, compile error, lock held)

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use converge_lib::platform::{is_elevated, paths};
use converge_lib::report::ReportEntry;
use converge_lib::run_lock::RunLock;
use converge_lib::{Catalog, Declarations, EngineConfig, Outcome, ProviderRegistry, RunReport, converge};

use crate::Cli;
use crate::output::{
  format_duration, print_error, print_json, print_outcome, print_stat, print_success, print_warning,
};

pub const EXIT_ERROR: u8 = 2;

/// Resource types whose providers need root to change anything.
const PRIVILEGED_TYPES: &[&str] = &["package", "service", "role"];

pub fn cmd_converge(cli: &Cli) -> Result<ExitCode> {
  let catalog = not_started(cli, load_catalog(&cli.file))?;

  if !cli.dry_run && !is_elevated() {
    warn_unprivileged(&catalog);
  }

  let command = std::env::args().collect::<Vec<_>>().join(" ");
  let lock = not_started(cli, RunLock::acquire(&command).context("Failed to lock the state directory"))?;
  info!(lock = %lock.lock_path().display(), "holding run lock");

  let mut config = EngineConfig::default()
    .with_concurrency(usize::from(cli.concurrency))
    .with_dry_run(cli.dry_run);
  if let Some(timeout) = cli.timeout {
    config = config.with_timeout(timeout);
  }

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let report = rt.block_on(converge(Arc::new(catalog), &config));

  save_reports(&report, cli);
  drop(lock);

  if cli.output.is_json() {
    print_json(&report)?;
  } else {
    print_report(&report, cli.verbose);
  }

  Ok(ExitCode::from(report.exit_code() as u8))
}

fn load_catalog(file: &Path) -> Result<Catalog> {
  let path = dunce::canonicalize(file)
    .with_context(|| format!("Failed to read declaration file {}", file.display()))?;
  let declarations =
    Declarations::load(&path).with_context(|| format!("Failed to load declarations from {}", path.display()))?;
  Catalog::compile(declarations, &ProviderRegistry::with_builtin()).context("Failed to compile catalog")
}

/// Passes `result` through, emitting an empty report first when it failed so
/// a run that never started still hands automation a parseable report.
fn not_started<T>(cli: &Cli, result: Result<T>) -> Result<T> {
  if result.is_err() {
    emit_empty_report(cli)?;
  }
  result
}

fn emit_empty_report(cli: &Cli) -> Result<()> {
  let report = RunReport::new(Vec::new(), cli.dry_run, Duration::ZERO);
  if let Some(path) = &cli.report_file
    && let Err(e) = report.save(path)
  {
    print_error(&format!("Failed to write report file {}: {}", path.display(), e));
  }
  if cli.output.is_json() {
    print_json(&report)?;
  }
  Ok(())
}

fn warn_unprivileged(catalog: &Catalog) {
  let mut types: Vec<&str> = catalog
    .entries()
    .iter()
    .map(|e| e.resource.id.kind.as_str())
    .filter(|kind| PRIVILEGED_TYPES.contains(kind))
    .collect();
  types.sort_unstable();
  types.dedup();

  if !types.is_empty() {
    print_warning(&format!(
      "Not running as root; {} resources will likely fail to apply",
      types.join(", ")
    ));
  }
}

/// Persist the report. Failures here never change the exit status.
fn save_reports(report: &RunReport, cli: &Cli) {
  if !report.dry_run {
    let last = paths::last_report_path();
    match report.save(&last) {
      Ok(()) => info!(path = %last.display(), "run report saved"),
      Err(e) => print_warning(&format!("Failed to save run report to {}: {}", last.display(), e)),
    }
  }

  if let Some(path) = &cli.report_file
    && let Err(e) = report.save(path)
  {
    print_error(&format!("Failed to write report file {}: {}", path.display(), e));
  }
}

fn print_report(report: &RunReport, verbose: bool) {
  let shown: Vec<&ReportEntry> = report
    .entries
    .iter()
    .filter(|e| verbose || e.outcome != Outcome::Unchanged)
    .collect();

  for entry in &shown {
    print_outcome(entry.outcome, &entry.resource_id.to_string(), &entry.detail);
  }
  if !shown.is_empty() {
    println!();
  }

  let summary = &report.summary;
  let headline = match (report.dry_run, report.is_success()) {
    (true, _) => format!("Dry run complete: {} of {} resources would change", summary.changed, summary.total),
    (false, true) => format!("Converged {} resources", summary.total),
    (false, false) => format!("Convergence finished with {} failed", summary.failed),
  };

  if report.is_success() {
    print_success(&headline);
  } else {
    print_error(&headline);
  }

  print_stat("Changed", &summary.changed.to_string());
  print_stat("Unchanged", &summary.unchanged.to_string());
  print_stat("Failed", &summary.failed.to_string());
  print_stat("Skipped", &summary.skipped.to_string());
  print_stat("Duration", &format_duration(report.duration));
}
