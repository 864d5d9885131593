//! Shared helpers for library integration tests.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use converge_lib::{Catalog, Declarations, EngineConfig, ProviderRegistry, RunReport, converge};
use tempfile::TempDir;

/// A temp directory the declarations write into.
pub struct Sandbox {
  pub temp: TempDir,
}

impl Sandbox {
  pub fn new() -> Self {
    Self {
      temp: TempDir::new().unwrap(),
    }
  }

  pub fn path(&self, relative: &str) -> PathBuf {
    self.temp.path().join(relative)
  }

  /// The sandbox directory as written in declarations, with forward slashes.
  pub fn dir(&self) -> String {
    self.temp.path().to_string_lossy().replace('\\', "/")
  }

  /// `relative` inside the sandbox, as written in declarations.
  pub fn declared(&self, relative: &str) -> String {
    format!("{}/{}", self.dir(), relative)
  }

  /// Write `yaml` with `{dir}` replaced by the sandbox path and load it.
  pub fn declarations(&self, yaml: &str) -> Declarations {
    let file = self.path("site.yaml");
    std::fs::write(&file, yaml.replace("{dir}", &self.dir())).unwrap();
    Declarations::load(&file).unwrap()
  }

  pub fn read(&self, relative: &str) -> String {
    std::fs::read_to_string(self.path(relative)).unwrap()
  }

  pub fn exists(&self, relative: &str) -> bool {
    Path::new(&self.path(relative)).exists()
  }
}

pub fn compile(decls: Declarations) -> Arc<Catalog> {
  Arc::new(Catalog::compile(decls, &ProviderRegistry::with_builtin()).unwrap())
}

pub fn run(catalog: &Arc<Catalog>, config: &EngineConfig) -> RunReport {
  tokio::runtime::Builder::new_multi_thread()
    .enable_all()
    .build()
    .unwrap()
    .block_on(converge(catalog.clone(), config))
}
