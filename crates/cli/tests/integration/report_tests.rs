//! Run report integration tests.

use predicates::prelude::*;
use serde_json::Value;

use super::common::TestEnv;

fn parse(bytes: &[u8]) -> Value {
  serde_json::from_slice(bytes).unwrap()
}

#[test]
fn json_output_lists_every_resource() {
  let env = TestEnv::from_fixture("files.yaml");

  let output = env
    .converge_cmd()
    .arg(&env.config_path)
    .args(["-o", "json"])
    .output()
    .unwrap();
  assert!(output.status.success());

  let report = parse(&output.stdout);
  assert_eq!(report["dry_run"], false);
  assert_eq!(report["summary"]["total"], 2);
  let entries = report["entries"].as_array().unwrap();
  assert_eq!(entries.len(), 2);
  assert_eq!(entries[0]["resource_id"], format!("file[{}/etc]", env.managed_dir()));
  assert_eq!(entries[0]["outcome"], "changed");
}

#[test]
fn last_run_report_saved_in_state_dir() {
  let env = TestEnv::from_fixture("files.yaml");
  env.converge_cmd().arg(&env.config_path).assert().success();

  let saved = std::fs::read(env.state_path().join("last-run.json")).unwrap();
  assert_eq!(parse(&saved)["summary"]["changed"], 2);
}

#[test]
fn dry_run_does_not_replace_last_run_report() {
  let env = TestEnv::from_fixture("files.yaml");
  env
    .converge_cmd()
    .arg(&env.config_path)
    .arg("--dry-run")
    .assert()
    .success();

  assert!(!env.state_path().join("last-run.json").exists());
}

#[test]
fn report_file_written_on_request() {
  let env = TestEnv::from_fixture("files.yaml");
  let report_path = env.temp.path().join("out").join("report.json");

  env
    .converge_cmd()
    .arg(&env.config_path)
    .arg("--report-file")
    .arg(&report_path)
    .assert()
    .success()
    .stdout(predicate::str::contains("Converged"));

  let report = parse(&std::fs::read(&report_path).unwrap());
  assert_eq!(report["summary"]["total"], 2);
}

#[test]
fn compile_error_still_emits_empty_json_report() {
  let env = TestEnv::from_fixture("cycle.yaml");
  let report_path = env.temp.path().join("report.json");

  let output = env
    .converge_cmd()
    .arg(&env.config_path)
    .args(["-o", "json"])
    .arg("--report-file")
    .arg(&report_path)
    .output()
    .unwrap();
  assert_eq!(output.status.code(), Some(2));

  let report = parse(&output.stdout);
  assert_eq!(report["summary"]["total"], 0);
  assert_eq!(report["entries"].as_array().unwrap().len(), 0);

  let saved = parse(&std::fs::read(&report_path).unwrap());
  assert_eq!(saved["summary"]["total"], 0);
}

#[test]
fn missing_file_text_output_has_no_report() {
  let env = TestEnv::empty();

  env
    .converge_cmd()
    .arg(env.temp.path().join("absent.yaml"))
    .assert()
    .code(2)
    .stdout(predicate::str::is_empty());
}
