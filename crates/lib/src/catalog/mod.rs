//! Catalog compilation.
//!
//! A [`Catalog`] is the validated, immutable snapshot of one run: every
//! declared resource bound to its provider, plus the dependency graph and
//! convergence order. Compilation never reads or changes system state, so a
//! catalog that fails to compile has touched nothing.
//!
//! Checks run in this order, stopping at the first error:
//! 1. duplicate `type[title]`
//! 2. provider lookup for each type
//! 3. attribute validation by the provider
//! 4. relationship and chain resolution
//! 5. cycle detection

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::declare::Declarations;
use crate::graph::{DependencyGraph, GraphBuilder, GraphError, format_cycle};
use crate::provider::{Provider, ProviderRegistry, SchemaError};
use crate::resource::{Resource, ResourceId};

/// Why a set of declarations could not become a catalog.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogCompileError {
  #[error("duplicate resource {id}: declared at #{first} and #{second}")]
  DuplicateResource { id: ResourceId, first: usize, second: usize },

  #[error("unknown resource type '{kind}' for {id}")]
  UnknownResourceType { kind: String, id: ResourceId },

  #[error("{id}: {source}")]
  InvalidAttribute {
    id: ResourceId,
    #[source]
    source: SchemaError,
  },

  #[error("{origin} references undeclared resource {target}")]
  UnresolvedReference { origin: String, target: ResourceId },

  #[error("dependency cycle detected: {}", format_cycle(cycle))]
  CycleDetected { cycle: Vec<ResourceId> },
}

impl From<GraphError> for CatalogCompileError {
  fn from(err: GraphError) -> Self {
    match err {
      GraphError::UnresolvedReference { origin, target } => CatalogCompileError::UnresolvedReference { origin, target },
      GraphError::CycleDetected { cycle } => CatalogCompileError::CycleDetected { cycle },
    }
  }
}

/// A resource bound to the provider that manages it.
#[derive(Clone)]
pub struct CatalogEntry {
  pub resource: Resource,
  pub provider: Arc<dyn Provider>,
}

/// The compiled resource set and dependency graph for one run.
pub struct Catalog {
  entries: Vec<CatalogEntry>,
  graph: DependencyGraph,
}

impl Catalog {
  /// Validate `declarations` against `registry` and freeze the result.
  pub fn compile(declarations: Declarations, registry: &ProviderRegistry) -> Result<Self, CatalogCompileError> {
    let Declarations { resources, chains } = declarations;

    let mut seen: HashMap<&ResourceId, usize> = HashMap::with_capacity(resources.len());
    for (i, resource) in resources.iter().enumerate() {
      if let Some(&first) = seen.get(&resource.id) {
        return Err(CatalogCompileError::DuplicateResource {
          id: resource.id.clone(),
          first,
          second: i,
        });
      }
      seen.insert(&resource.id, i);
    }

    let mut providers = Vec::with_capacity(resources.len());
    for resource in &resources {
      let provider = registry
        .lookup(&resource.id.kind)
        .map_err(|_| CatalogCompileError::UnknownResourceType {
          kind: resource.id.kind.clone(),
          id: resource.id.clone(),
        })?;
      providers.push(provider);
    }

    for (resource, provider) in resources.iter().zip(&providers) {
      provider
        .validate(resource)
        .map_err(|source| CatalogCompileError::InvalidAttribute {
          id: resource.id.clone(),
          source,
        })?;
    }

    let ids: Vec<ResourceId> = resources.iter().map(|r| r.id.clone()).collect();
    let mut builder = GraphBuilder::new(&ids);
    for (i, resource) in resources.iter().enumerate() {
      for (relationship, target) in resource.relationships.iter() {
        builder.add_relationship(i, relationship, target)?;
      }
    }
    for chain in &chains {
      builder.add_chain(&chain.upstream, &chain.downstream, chain.kind)?;
    }
    let graph = builder.build()?;

    info!(
      resources = resources.len(),
      edges = graph.edge_count(),
      "catalog compiled"
    );

    let entries: Vec<CatalogEntry> = resources
      .into_iter()
      .zip(providers)
      .map(|(resource, provider)| CatalogEntry { resource, provider })
      .collect();

    for &idx in graph.order() {
      debug!(position = graph.position(idx), resource = %entries[idx].resource.id, "scheduled");
    }

    Ok(Self { entries, graph })
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Entries in declaration order.
  pub fn entries(&self) -> &[CatalogEntry] {
    &self.entries
  }

  pub fn entry(&self, idx: usize) -> &CatalogEntry {
    &self.entries[idx]
  }

  pub fn graph(&self) -> &DependencyGraph {
    &self.graph
  }

  /// Resources in convergence order.
  pub fn ordered(&self) -> impl Iterator<Item = &Resource> {
    self.graph.order().iter().map(|&i| &self.entries[i].resource)
  }

  /// Declaration index of `id`, if declared.
  pub fn index_of(&self, id: &ResourceId) -> Option<usize> {
    self.entries.iter().position(|e| &e.resource.id == id)
  }
}

impl std::fmt::Debug for Catalog {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Catalog")
      .field("resources", &self.entries.iter().map(|e| &e.resource.id).collect::<Vec<_>>())
      .field("order", &self.graph.order())
      .finish()
  }
}
