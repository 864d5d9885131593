//! CLI output formatting utilities.
//!
//! Provides consistent formatting for terminal output including colored status
//! messages, per-resource outcome lines and human-readable durations.

use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream};

use converge_lib::Outcome;

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const WARNING: &str = "⚠";
  pub const INFO: &str = "•";
  pub const MODIFY: &str = "~";
  pub const SKIP: &str = "-";
}

pub fn format_duration(duration: Duration) -> String {
  let secs = duration.as_secs();
  let millis = duration.subsec_millis();

  if secs >= 60 {
    let mins = secs / 60;
    let remaining_secs = secs % 60;
    format!("{}m {}s", mins, remaining_secs)
  } else if secs > 0 {
    format!("{}.{:02}s", secs, millis / 10)
  } else {
    format!("{}ms", millis)
  }
}

pub fn outcome_symbol(outcome: Outcome) -> &'static str {
  match outcome {
    Outcome::Unchanged => symbols::INFO,
    Outcome::Changed => symbols::MODIFY,
    Outcome::Failed => symbols::ERROR,
    Outcome::Skipped => symbols::SKIP,
  }
}

/// One resource line: symbol, id, detail.
pub fn print_outcome(outcome: Outcome, resource: &str, detail: &str) {
  let symbol = outcome_symbol(outcome);
  let symbol = match outcome {
    Outcome::Unchanged => symbol.if_supports_color(Stream::Stdout, |s| s.dimmed()).to_string(),
    Outcome::Changed => symbol.if_supports_color(Stream::Stdout, |s| s.yellow()).to_string(),
    Outcome::Failed => symbol.if_supports_color(Stream::Stdout, |s| s.red()).to_string(),
    Outcome::Skipped => symbol.if_supports_color(Stream::Stdout, |s| s.magenta()).to_string(),
  };

  println!(
    "  {} {} {}",
    symbol,
    resource,
    detail.if_supports_color(Stream::Stdout, |s| s.dimmed())
  );
}

pub fn print_success(message: &str) {
  println!(
    "{} {}",
    symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
    message
  );
}

pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

pub fn print_warning(message: &str) {
  eprintln!(
    "{} {}",
    symbols::WARNING.if_supports_color(Stream::Stderr, |s| s.yellow()),
    message.if_supports_color(Stream::Stderr, |s| s.yellow())
  );
}

pub fn print_stat(label: &str, value: &str) {
  println!(
    "  {}: {}",
    label.if_supports_color(Stream::Stdout, |s| s.dimmed()),
    value
  );
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}
