mod cmd;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use output::{OutputFormat, print_error};

/// Converge this host to the state declared in a file
#[derive(Parser, Debug)]
#[command(name = "converge")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
  /// Declaration file (.yaml, .yml or .json)
  pub file: PathBuf,

  /// Maximum number of independent resources converging at once
  #[arg(short = 'j', long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..))]
  pub concurrency: u16,

  /// Compare only: report what would change without changing anything
  #[arg(long)]
  pub dry_run: bool,

  /// Stop starting new resources after this long (e.g., "90s", "10m")
  #[arg(long, value_parser = humantime::parse_duration)]
  pub timeout: Option<Duration>,

  /// Output format
  #[arg(short = 'o', long, value_enum, default_value = "text")]
  pub output: OutputFormat,

  /// Also write the JSON run report to this path
  #[arg(long)]
  pub report_file: Option<PathBuf>,

  /// Log resource progress and list unchanged resources
  #[arg(short, long)]
  pub verbose: bool,
}

fn init_tracing(verbose: bool) {
  let default = if verbose {
    "warn,converge_lib=info,converge=info"
  } else {
    "warn"
  };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();
}

fn main() -> ExitCode {
  let cli = Cli::parse();
  init_tracing(cli.verbose);

  match cmd::cmd_converge(&cli) {
    Ok(code) => code,
    Err(err) => {
      print_error(&format!("{:#}", err));
      ExitCode::from(cmd::EXIT_ERROR)
    }
  }
}
