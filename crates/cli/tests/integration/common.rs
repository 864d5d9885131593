//! Shared test helpers for CLI integration tests.

use std::path::PathBuf;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// Get path to a fixture file.
pub fn fixture_path(name: &str) -> PathBuf {
  PathBuf::from(env!("CARGO_MANIFEST_DIR"))
    .join("tests")
    .join("fixtures")
    .join(name)
}

/// Read fixture content.
pub fn fixture_content(name: &str) -> String {
  std::fs::read_to_string(fixture_path(name)).unwrap_or_else(|e| panic!("Failed to load fixture {}: {}", name, e))
}

/// Isolated test environment.
///
/// Each test gets its own temporary directory holding the declaration file,
/// the managed files and the state directory.
pub struct TestEnv {
  pub temp: TempDir,
  pub config_path: PathBuf,
}

impl TestEnv {
  /// Create from a fixture file.
  ///
  /// Copies the fixture to `site.yaml` with `{dir}` replaced by the managed
  /// directory.
  pub fn from_fixture(name: &str) -> Self {
    let env = Self::empty();
    let content = fixture_content(name).replace("{dir}", &env.managed_dir());
    std::fs::write(&env.config_path, content).unwrap();
    env
  }

  /// Create an environment without a declaration file.
  pub fn empty() -> Self {
    let temp = TempDir::new().unwrap();
    let config_path = temp.path().join("site.yaml");
    let env = Self { temp, config_path };
    std::fs::create_dir_all(env.managed_path("")).unwrap();
    env
  }

  /// Directory the declarations manage, with forward slashes.
  pub fn managed_dir(&self) -> String {
    self.temp.path().join("managed").to_string_lossy().replace('\\', "/")
  }

  pub fn managed_path(&self, relative: &str) -> PathBuf {
    self.temp.path().join("managed").join(relative)
  }

  pub fn read_managed(&self, relative: &str) -> String {
    std::fs::read_to_string(self.managed_path(relative)).unwrap()
  }

  /// State directory (isolated per test).
  pub fn state_path(&self) -> PathBuf {
    self.temp.path().join("state")
  }

  /// Get a pre-configured Command for the converge binary.
  ///
  /// Points `CONVERGE_STATE_DIR` at the isolated state path and disables
  /// colored output.
  pub fn converge_cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("converge");
    cmd.env("CONVERGE_STATE_DIR", self.state_path());
    cmd.env("NO_COLOR", "1");
    cmd
  }
}
