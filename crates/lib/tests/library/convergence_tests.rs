use converge_lib::{EngineConfig, Outcome, ResourceId};

use super::common::{Sandbox, compile, run};

fn file_id(sandbox: &Sandbox, relative: &str) -> ResourceId {
  format!("file[{}]", sandbox.declared(relative)).parse().unwrap()
}

#[test]
fn files_converge_then_stay_unchanged() {
  let sandbox = Sandbox::new();
  let catalog = compile(sandbox.declarations(
    r#"
resources:
  - type: file
    title: "{dir}/etc"
    attributes: { ensure: directory }
  - type: file
    title: "{dir}/etc/app.conf"
    attributes: { content: "db=medline\n" }
    relationships: { require: "file[{dir}/etc]" }
"#,
  ));

  let first = run(&catalog, &EngineConfig::default());
  assert!(first.is_success());
  assert_eq!(first.summary.changed, 2);
  assert_eq!(sandbox.read("etc/app.conf"), "db=medline\n");

  let second = run(&catalog, &EngineConfig::default());
  assert_eq!(second.summary.unchanged, 2);
  assert_eq!(second.exit_code(), 0);
}

#[test]
fn drift_is_repaired() {
  let sandbox = Sandbox::new();
  let catalog = compile(sandbox.declarations(
    "- type: file\n  title: \"{dir}/motd\"\n  attributes: { content: \"welcome\\n\" }\n",
  ));

  run(&catalog, &EngineConfig::default());
  std::fs::write(sandbox.path("motd"), "tampered").unwrap();

  let report = run(&catalog, &EngineConfig::default());
  let entry = report.entry(&file_id(&sandbox, "motd")).unwrap();
  assert_eq!(entry.outcome, Outcome::Changed);
  assert_eq!(entry.detail, "content updated");
  assert_eq!(sandbox.read("motd"), "welcome\n");
}

#[test]
fn dry_run_leaves_system_untouched() {
  let sandbox = Sandbox::new();
  let catalog = compile(sandbox.declarations(
    "- type: file\n  title: \"{dir}/new\"\n  attributes: { content: \"x\" }\n",
  ));

  let report = run(&catalog, &EngineConfig::default().with_dry_run(true));
  assert_eq!(report.summary.changed, 1);
  assert_eq!(report.entries[0].detail, "would change (dry run)");
  assert!(!sandbox.exists("new"));
}

#[cfg(unix)]
#[test]
fn failing_exec_skips_dependents_only() {
  let sandbox = Sandbox::new();
  let catalog = compile(sandbox.declarations(
    r#"
resources:
  - type: exec
    title: broken
    attributes: { command: "exit 7" }
  - type: file
    title: "{dir}/needs-broken"
    attributes: { content: "x" }
    relationships: { require: "exec[broken]" }
  - type: file
    title: "{dir}/independent"
    attributes: { content: "y" }
"#,
  ));

  let report = run(&catalog, &EngineConfig::default().with_concurrency(2));
  let broken: ResourceId = "exec[broken]".parse().unwrap();

  assert_eq!(report.outcome(&broken), Some(Outcome::Failed));
  assert_eq!(
    report.outcome(&file_id(&sandbox, "needs-broken")),
    Some(Outcome::Skipped)
  );
  assert_eq!(
    report.outcome(&file_id(&sandbox, "independent")),
    Some(Outcome::Changed)
  );
  assert!(!sandbox.exists("needs-broken"));
  assert!(sandbox.exists("independent"));
  assert_eq!(report.exit_code(), 1);
}

#[cfg(unix)]
#[test]
fn config_change_notifies_refreshonly_exec() {
  let sandbox = Sandbox::new();
  let yaml = r#"
resources:
  - type: file
    title: "{dir}/app.conf"
    attributes: { content: "v1" }
    relationships: { notify: "exec[reload]" }
  - type: exec
    title: reload
    attributes:
      command: "echo reloaded >> {dir}/reloads.log"
      refreshonly: true
"#;

  let catalog = compile(sandbox.declarations(yaml));
  let first = run(&catalog, &EngineConfig::default());
  assert_eq!(
    first.entry(&"exec[reload]".parse().unwrap()).unwrap().detail,
    "refreshed"
  );
  assert_eq!(sandbox.read("reloads.log"), "reloaded\n");

  // Unchanged config: no reload
  let second = run(&catalog, &EngineConfig::default());
  assert_eq!(second.outcome(&"exec[reload]".parse().unwrap()), Some(Outcome::Unchanged));
  assert_eq!(sandbox.read("reloads.log"), "reloaded\n");
}

#[cfg(unix)]
#[test]
fn exec_creates_guard_makes_it_idempotent() {
  let sandbox = Sandbox::new();
  let catalog = compile(sandbox.declarations(
    r#"
- type: exec
  title: init
  attributes:
    command: "echo run >> {dir}/runs.log && touch {dir}/initialized"
    creates: "{dir}/initialized"
"#,
  ));

  assert_eq!(run(&catalog, &EngineConfig::default()).summary.changed, 1);
  assert_eq!(run(&catalog, &EngineConfig::default()).summary.unchanged, 1);
  assert_eq!(sandbox.read("runs.log"), "run\n");
}
