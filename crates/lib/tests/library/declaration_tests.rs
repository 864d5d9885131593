use converge_lib::catalog::CatalogCompileError;
use converge_lib::{Catalog, ProviderRegistry, ResourceId};

use super::common::Sandbox;

#[test]
fn builtin_schemas_reject_bad_attributes() {
  let sandbox = Sandbox::new();
  let decls = sandbox.declarations(
    r#"
resources:
  - type: service
    title: nginx
    attributes: { ensure: running, enable: "yes" }
"#,
  );

  let err = Catalog::compile(decls, &ProviderRegistry::with_builtin()).unwrap_err();
  assert_eq!(
    err.to_string(),
    "service[nginx]: attribute 'enable' must be a bool, got string"
  );
}

#[test]
fn exec_requires_command() {
  let sandbox = Sandbox::new();
  let decls = sandbox.declarations("- type: exec\n  title: migrate\n");

  let err = Catalog::compile(decls, &ProviderRegistry::with_builtin()).unwrap_err();
  assert!(matches!(err, CatalogCompileError::InvalidAttribute { .. }));
  assert!(err.to_string().contains("missing required attribute 'command'"));
}

#[test]
fn chained_cycle_fails_before_any_change() {
  let sandbox = Sandbox::new();
  let decls = sandbox.declarations(
    r#"
resources:
  - type: file
    title: "{dir}/a"
    attributes: { content: "a" }
  - type: file
    title: "{dir}/b"
    attributes: { content: "b" }
chains:
  - "file[{dir}/a] -> file[{dir}/b] -> file[{dir}/a]"
"#,
  );

  let err = Catalog::compile(decls, &ProviderRegistry::with_builtin()).unwrap_err();
  let a: ResourceId = format!("file[{}]", sandbox.declared("a")).parse().unwrap();
  let b: ResourceId = format!("file[{}]", sandbox.declared("b")).parse().unwrap();
  assert_eq!(
    err,
    CatalogCompileError::CycleDetected {
      cycle: vec![a.clone(), b, a]
    }
  );
  assert!(!sandbox.exists("a"));
  assert!(!sandbox.exists("b"));
}

#[test]
fn duplicate_declaration_is_an_error() {
  let sandbox = Sandbox::new();
  let decls = sandbox.declarations(
    r#"
- type: file
  title: "{dir}/app.conf"
  attributes: { content: "one" }
- type: file
  title: "{dir}/app.conf"
  attributes: { content: "two" }
"#,
  );

  assert!(matches!(
    Catalog::compile(decls, &ProviderRegistry::with_builtin()),
    Err(CatalogCompileError::DuplicateResource { first: 0, second: 1, .. })
  ));
}
