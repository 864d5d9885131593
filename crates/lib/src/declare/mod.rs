//! Declaration loading.
//!
//! A declaration file lists resources and optional chaining arrows. JSON is
//! used for `.json` files, YAML for everything else:
//!
//! ```yaml
//! resources:
//!   - type: package
//!     title: postgresql
//!     attributes: { ensure: present }
//!   - type: service
//!     title: postgresql
//!     relationships: { require: "package[postgresql]" }
//! chains:
//!   - "file[/etc/app.conf] ~> service[app]"
//! ```
//!
//! A top-level list of resources (no `chains`) is accepted as well.
//!
//! References are only parsed here; whether they name declared resources is
//! checked when the catalog is compiled.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::graph::EdgeKind;
use crate::resource::{Relationships, Resource, ResourceId, ResourceIdError, Value};

#[derive(Debug, Error)]
pub enum DeclarationError {
  #[error("failed to read {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("invalid JSON: {0}")]
  Json(#[from] serde_json::Error),

  #[error("invalid YAML: {0}")]
  Yaml(#[from] serde_yaml::Error),

  #[error("resource #{index}: {message}")]
  InvalidResource { index: usize, message: String },

  #[error("invalid chain '{chain}': {message}")]
  InvalidChain { chain: String, message: String },
}

/// One resource as written in a declaration file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct ResourceDecl {
  #[serde(rename = "type")]
  kind: String,
  title: String,
  #[serde(default)]
  attributes: BTreeMap<String, Value>,
  #[serde(default)]
  relationships: Relationships,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Document {
  #[serde(default)]
  resources: Vec<ResourceDecl>,
  #[serde(default)]
  chains: Vec<String>,
}

/// An ordering edge written with chaining syntax.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainEdge {
  pub upstream: ResourceId,
  pub downstream: ResourceId,
  pub kind: EdgeKind,
}

/// Declared resources and chaining edges, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Declarations {
  pub resources: Vec<Resource>,
  pub chains: Vec<ChainEdge>,
}

impl Declarations {
  pub fn new() -> Self {
    Self::default()
  }

  /// Append a resource.
  pub fn resource(mut self, resource: Resource) -> Self {
    self.resources.push(resource);
    self
  }

  /// Append a chaining edge.
  pub fn chain(mut self, upstream: ResourceId, downstream: ResourceId, kind: EdgeKind) -> Self {
    self.chains.push(ChainEdge {
      upstream,
      downstream,
      kind,
    });
    self
  }

  /// Load a declaration file, choosing the format by extension.
  pub fn load(path: &Path) -> Result<Self, DeclarationError> {
    let source = std::fs::read_to_string(path).map_err(|source| DeclarationError::Io {
      path: path.to_path_buf(),
      source,
    })?;

    let is_json = path
      .extension()
      .and_then(|ext| ext.to_str())
      .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let declarations = if is_json {
      Self::from_json_str(&source)?
    } else {
      Self::from_yaml_str(&source)?
    };

    debug!(
      path = %path.display(),
      resources = declarations.resources.len(),
      chains = declarations.chains.len(),
      "loaded declarations"
    );
    Ok(declarations)
  }

  pub fn from_json_str(source: &str) -> Result<Self, DeclarationError> {
    let value: serde_json::Value = serde_json::from_str(source)?;
    let document = if value.is_array() {
      Document {
        resources: serde_json::from_value(value)?,
        chains: Vec::new(),
      }
    } else {
      serde_json::from_value(value)?
    };
    Self::from_document(document)
  }

  pub fn from_yaml_str(source: &str) -> Result<Self, DeclarationError> {
    let value: serde_yaml::Value = serde_yaml::from_str(source)?;
    let document = match value {
      // An empty file declares nothing
      serde_yaml::Value::Null => Document {
        resources: Vec::new(),
        chains: Vec::new(),
      },
      serde_yaml::Value::Sequence(_) => Document {
        resources: serde_yaml::from_value(value)?,
        chains: Vec::new(),
      },
      _ => serde_yaml::from_value(value)?,
    };
    Self::from_document(document)
  }

  fn from_document(document: Document) -> Result<Self, DeclarationError> {
    let resources = document
      .resources
      .into_iter()
      .enumerate()
      .map(|(index, decl)| {
        if decl.kind.trim().is_empty() {
          return Err(DeclarationError::InvalidResource {
            index,
            message: "type must not be empty".to_string(),
          });
        }
        if decl.title.is_empty() {
          return Err(DeclarationError::InvalidResource {
            index,
            message: format!("{} title must not be empty", decl.kind),
          });
        }
        Ok(Resource {
          id: ResourceId::new(&decl.kind, decl.title),
          attributes: decl.attributes,
          relationships: decl.relationships,
        })
      })
      .collect::<Result<Vec<_>, _>>()?;

    let mut chains = Vec::new();
    for chain in &document.chains {
      chains.extend(parse_chain(chain)?);
    }

    Ok(Self { resources, chains })
  }
}

/// Parse `a -> b ~> c` into one edge per arrow.
///
/// Arrows inside `[...]` belong to a title and do not split.
pub fn parse_chain(chain: &str) -> Result<Vec<ChainEdge>, DeclarationError> {
  let invalid = |message: String| DeclarationError::InvalidChain {
    chain: chain.to_string(),
    message,
  };

  let mut segments = Vec::new();
  let mut arrows = Vec::new();
  let mut depth = 0usize;
  let mut start = 0;
  let bytes = chain.as_bytes();
  let mut i = 0;

  while i < bytes.len() {
    match bytes[i] {
      b'[' => depth += 1,
      b']' => depth = depth.saturating_sub(1),
      b'-' | b'~' if depth == 0 && bytes.get(i + 1) == Some(&b'>') => {
        segments.push(&chain[start..i]);
        arrows.push(if bytes[i] == b'~' { EdgeKind::Refresh } else { EdgeKind::Order });
        i += 2;
        start = i;
        continue;
      }
      _ => {}
    }
    i += 1;
  }
  segments.push(&chain[start..]);

  if arrows.is_empty() {
    return Err(invalid("expected at least one '->' or '~>'".to_string()));
  }

  let ids = segments
    .iter()
    .map(|segment| segment.parse::<ResourceId>())
    .collect::<Result<Vec<_>, ResourceIdError>>()
    .map_err(|e| invalid(e.to_string()))?;

  Ok(
    arrows
      .into_iter()
      .enumerate()
      .map(|(i, kind)| ChainEdge {
        upstream: ids[i].clone(),
        downstream: ids[i + 1].clone(),
        kind,
      })
      .collect(),
  )
}
