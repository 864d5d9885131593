//! Convergence run integration tests.

use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn converge_creates_declared_files() {
  let env = TestEnv::from_fixture("files.yaml");

  env
    .converge_cmd()
    .arg(&env.config_path)
    .assert()
    .success()
    .stdout(predicate::str::contains("Converged 2 resources"))
    .stdout(predicate::str::contains("Changed: 2"));

  assert_eq!(env.read_managed("etc/app.conf"), "listen=8080\n");
}

#[test]
fn converge_is_idempotent() {
  let env = TestEnv::from_fixture("files.yaml");

  env.converge_cmd().arg(&env.config_path).assert().success();

  env
    .converge_cmd()
    .arg(&env.config_path)
    .assert()
    .success()
    .stdout(predicate::str::contains("Changed: 0"))
    .stdout(predicate::str::contains("Unchanged: 2"));
}

#[test]
fn verbose_lists_unchanged_resources() {
  let env = TestEnv::from_fixture("files.yaml");
  env.converge_cmd().arg(&env.config_path).assert().success();

  env
    .converge_cmd()
    .arg(&env.config_path)
    .arg("--verbose")
    .assert()
    .success()
    .stdout(predicate::str::contains("app.conf] in sync"));
}

#[test]
fn dry_run_changes_nothing() {
  let env = TestEnv::from_fixture("files.yaml");

  env
    .converge_cmd()
    .arg(&env.config_path)
    .arg("--dry-run")
    .assert()
    .success()
    .stdout(predicate::str::contains("would change (dry run)"))
    .stdout(predicate::str::contains("2 of 2 resources would change"));

  assert!(!env.managed_path("etc").exists());
}

#[test]
fn cycle_exits_with_load_error() {
  let env = TestEnv::from_fixture("cycle.yaml");

  env
    .converge_cmd()
    .arg(&env.config_path)
    .assert()
    .code(2)
    .stderr(predicate::str::contains("cycle"));

  assert!(!env.managed_path("a").exists());
  assert!(!env.managed_path("b").exists());
}

#[test]
fn missing_file_exits_with_load_error() {
  let env = TestEnv::empty();

  env
    .converge_cmd()
    .arg(env.temp.path().join("absent.yaml"))
    .assert()
    .code(2)
    .stderr(predicate::str::contains("Failed to read declaration file"));
}

#[test]
fn unknown_type_exits_with_load_error() {
  let env = TestEnv::empty();
  std::fs::write(&env.config_path, "- type: mailbox\n  title: root\n").unwrap();

  env
    .converge_cmd()
    .arg(&env.config_path)
    .assert()
    .code(2)
    .stderr(predicate::str::contains("mailbox"));
}

#[cfg(unix)]
#[test]
fn failure_exits_one_and_skips_dependents() {
  let env = TestEnv::from_fixture("failing.yaml");

  env
    .converge_cmd()
    .arg(&env.config_path)
    .assert()
    .code(1)
    .stdout(predicate::str::contains("Failed: 1"))
    .stdout(predicate::str::contains("Skipped: 1"))
    .stdout(predicate::str::contains("dependency exec[broken] failed"));

  assert!(!env.managed_path("after-broken").exists());
  assert_eq!(env.read_managed("independent"), "y");
}

#[cfg(unix)]
#[test]
fn notify_refreshes_only_on_change() {
  let env = TestEnv::from_fixture("notify.yaml");

  env.converge_cmd().arg(&env.config_path).assert().success();
  assert_eq!(env.read_managed("reloads"), "reloaded\n");

  env.converge_cmd().arg(&env.config_path).assert().success();
  assert_eq!(env.read_managed("reloads"), "reloaded\n");
}

#[test]
fn concurrency_flag_converges_everything() {
  let env = TestEnv::from_fixture("files.yaml");

  env
    .converge_cmd()
    .arg(&env.config_path)
    .args(["--concurrency", "4"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Changed: 2"));
}

#[test]
fn held_lock_refuses_to_run() {
  let env = TestEnv::from_fixture("files.yaml");
  let _held = converge_lib::run_lock::RunLock::acquire_in(&env.state_path(), "converge other.yaml").unwrap();

  env
    .converge_cmd()
    .arg(&env.config_path)
    .assert()
    .code(2)
    .stderr(predicate::str::contains("another convergence run holds the lock"));

  assert!(!env.managed_path("etc").exists());
}

#[test]
fn verbose_logs_cli_progress() {
  let env = TestEnv::from_fixture("files.yaml");

  env
    .converge_cmd()
    .arg(&env.config_path)
    .arg("-v")
    .env_remove("RUST_LOG")
    .assert()
    .success()
    .stderr(predicate::str::contains("holding run lock"))
    .stderr(predicate::str::contains("run report saved"));
}

#[test]
fn lock_released_once_report_saved() {
  let env = TestEnv::from_fixture("files.yaml");
  env.converge_cmd().arg(&env.config_path).assert().success();

  assert!(env.state_path().join("last-run.json").exists());
  assert!(converge_lib::run_lock::RunLock::acquire_in(&env.state_path(), "converge next.yaml").is_ok());
}
