//! Dependency graph for catalog resources.
//!
//! This module turns declared relationships into a directed acyclic graph and
//! computes the deterministic order in which resources converge.
//!
//! Nodes are identified by their declaration index. An edge `(upstream, downstream)`
//! means the upstream resource must reach a terminal state before the downstream
//! one is attempted.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use thiserror::Error;
use tracing::debug;

use crate::resource::{RelationshipKind, ResourceId};

/// What an edge means beyond ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
  /// Pure ordering (`before`, `require`, `->`).
  Order,
  /// Ordering plus a refresh signal when the upstream changes (`notify`, `subscribe`, `~>`).
  Refresh,
}

/// Errors raised while building the dependency graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
  /// A relationship names a resource that is not declared.
  #[error("{origin} references undeclared resource {target}")]
  UnresolvedReference { origin: String, target: ResourceId },

  /// The relationships form a cycle. The first member is repeated at the end.
  #[error("dependency cycle detected: {}", format_cycle(cycle))]
  CycleDetected { cycle: Vec<ResourceId> },
}

pub(crate) fn format_cycle(cycle: &[ResourceId]) -> String {
  cycle.iter().map(ToString::to_string).collect::<Vec<_>>().join(" -> ")
}

/// Collects resolved edges over a fixed set of resources.
pub struct GraphBuilder<'a> {
  ids: &'a [ResourceId],
  index: HashMap<&'a ResourceId, usize>,
  graph: DiGraph<usize, EdgeKind>,
}

impl<'a> GraphBuilder<'a> {
  /// Start a graph over `ids`, which must already be free of duplicates.
  pub fn new(ids: &'a [ResourceId]) -> Self {
    let mut graph = DiGraph::with_capacity(ids.len(), ids.len());
    let mut index = HashMap::with_capacity(ids.len());

    for (i, id) in ids.iter().enumerate() {
      graph.add_node(i);
      index.insert(id, i);
    }

    Self { ids, index, graph }
  }

  fn resolve(&self, origin: impl FnOnce() -> String, target: &ResourceId) -> Result<usize, GraphError> {
    self
      .index
      .get(target)
      .copied()
      .ok_or_else(|| GraphError::UnresolvedReference {
        origin: origin(),
        target: target.clone(),
      })
  }

  /// Add the edge implied by `relationship: target` declared on resource `from`.
  pub fn add_relationship(
    &mut self,
    from: usize,
    relationship: RelationshipKind,
    target: &ResourceId,
  ) -> Result<(), GraphError> {
    let ids = self.ids;
    let to = self.resolve(|| format!("{} ({})", ids[from], relationship), target)?;

    match relationship {
      RelationshipKind::Before => self.add_edge(from, to, EdgeKind::Order),
      RelationshipKind::Require => self.add_edge(to, from, EdgeKind::Order),
      RelationshipKind::Notify => self.add_edge(from, to, EdgeKind::Refresh),
      RelationshipKind::Subscribe => self.add_edge(to, from, EdgeKind::Refresh),
    }

    Ok(())
  }

  /// Add the edge implied by a chaining arrow `upstream -> downstream`.
  pub fn add_chain(
    &mut self,
    upstream: &ResourceId,
    downstream: &ResourceId,
    kind: EdgeKind,
  ) -> Result<(), GraphError> {
    let origin = || format!("chain {} -> {}", upstream, downstream);
    let from = self.resolve(origin, upstream)?;
    let to = self.resolve(origin, downstream)?;
    self.add_edge(from, to, kind);
    Ok(())
  }

  /// Add an edge between two declaration indexes. Parallel edges merge and
  /// `Refresh` wins over `Order`.
  pub fn add_edge(&mut self, upstream: usize, downstream: usize, kind: EdgeKind) {
    let (a, b) = (NodeIndex::new(upstream), NodeIndex::new(downstream));

    match self.graph.find_edge(a, b) {
      Some(edge) => {
        if kind == EdgeKind::Refresh {
          self.graph[edge] = EdgeKind::Refresh;
        }
      }
      None => {
        self.graph.add_edge(a, b, kind);
      }
    }
  }

  /// Verify acyclicity and compute the convergence order.
  pub fn build(self) -> Result<DependencyGraph, GraphError> {
    let n = self.graph.node_count();

    let sorted_neighbors = |dir: Direction| -> Vec<Vec<usize>> {
      (0..n)
        .map(|i| {
          let mut ns: Vec<usize> = self
            .graph
            .neighbors_directed(NodeIndex::new(i), dir)
            .map(NodeIndex::index)
            .collect();
          ns.sort_unstable();
          ns.dedup();
          ns
        })
        .collect()
    };

    let downstream = sorted_neighbors(Direction::Outgoing);
    let upstream = sorted_neighbors(Direction::Incoming);

    if let Some(cycle) = find_cycle(&downstream) {
      return Err(GraphError::CycleDetected {
        cycle: cycle.into_iter().map(|i| self.ids[i].clone()).collect(),
      });
    }

    let order = topological_order(&upstream, &downstream);
    let mut position = vec![0; n];
    for (pos, &idx) in order.iter().enumerate() {
      position[idx] = pos;
    }

    debug!(nodes = n, edges = self.graph.edge_count(), "dependency graph built");

    Ok(DependencyGraph {
      graph: self.graph,
      upstream,
      downstream,
      order,
      position,
    })
  }
}

/// Depth-first search tracking the in-progress path. Returns the first cycle
/// found, with its first member repeated at the end.
fn find_cycle(downstream: &[Vec<usize>]) -> Option<Vec<usize>> {
  #[derive(Clone, Copy, PartialEq, Eq)]
  enum Mark {
    Unvisited,
    InProgress,
    Done,
  }

  let n = downstream.len();
  let mut marks = vec![Mark::Unvisited; n];

  for root in 0..n {
    if marks[root] != Mark::Unvisited {
      continue;
    }

    // (node, index of next child to visit)
    let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
    marks[root] = Mark::InProgress;

    while let Some(frame) = stack.last_mut() {
      let node = frame.0;
      if let Some(&child) = downstream[node].get(frame.1) {
        frame.1 += 1;
        match marks[child] {
          Mark::Unvisited => {
            marks[child] = Mark::InProgress;
            stack.push((child, 0));
          }
          Mark::InProgress => {
            let start = stack.iter().position(|&(n, _)| n == child).unwrap_or(0);
            let mut cycle: Vec<usize> = stack[start..].iter().map(|&(n, _)| n).collect();
            cycle.push(child);
            return Some(cycle);
          }
          Mark::Done => {}
        }
      } else {
        marks[node] = Mark::Done;
        stack.pop();
      }
    }
  }

  None
}

/// Kahn's algorithm with ties broken by declaration index.
fn topological_order(upstream: &[Vec<usize>], downstream: &[Vec<usize>]) -> Vec<usize> {
  let mut in_degree: Vec<usize> = upstream.iter().map(Vec::len).collect();
  let mut ready: BinaryHeap<Reverse<usize>> = (0..in_degree.len())
    .filter(|&i| in_degree[i] == 0)
    .map(Reverse)
    .collect();

  let mut order = Vec::with_capacity(in_degree.len());
  while let Some(Reverse(idx)) = ready.pop() {
    order.push(idx);
    for &next in &downstream[idx] {
      in_degree[next] -= 1;
      if in_degree[next] == 0 {
        ready.push(Reverse(next));
      }
    }
  }

  order
}

/// An acyclic dependency graph over catalog resources.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
  graph: DiGraph<usize, EdgeKind>,
  upstream: Vec<Vec<usize>>,
  downstream: Vec<Vec<usize>>,
  order: Vec<usize>,
  position: Vec<usize>,
}

impl DependencyGraph {
  /// Declaration indexes in convergence order.
  pub fn order(&self) -> &[usize] {
    &self.order
  }

  /// Position of a resource within [`order`](Self::order).
  pub fn position(&self, idx: usize) -> usize {
    self.position[idx]
  }

  /// Resources that must converge before `idx`.
  pub fn upstream(&self, idx: usize) -> &[usize] {
    &self.upstream[idx]
  }

  /// Resources that wait for `idx`.
  pub fn downstream(&self, idx: usize) -> &[usize] {
    &self.downstream[idx]
  }

  /// Upstream resources whose changes refresh `idx`.
  pub fn refresh_sources(&self, idx: usize) -> Vec<usize> {
    let mut sources: Vec<usize> = self
      .graph
      .edges_directed(NodeIndex::new(idx), Direction::Incoming)
      .filter(|edge| *edge.weight() == EdgeKind::Refresh)
      .map(|edge| edge.source().index())
      .collect();
    sources.sort_unstable();
    sources
  }

  /// The kind of the edge `upstream -> downstream`, if any.
  pub fn edge(&self, upstream: usize, downstream: usize) -> Option<EdgeKind> {
    self
      .graph
      .find_edge(NodeIndex::new(upstream), NodeIndex::new(downstream))
      .map(|e| self.graph[e])
  }

  pub fn node_count(&self) -> usize {
    self.graph.node_count()
  }

  pub fn edge_count(&self) -> usize {
    self.graph.edge_count()
  }

  /// Whether `to` is reachable from `from` along dependency edges.
  pub fn reaches(&self, from: usize, to: usize) -> bool {
    petgraph::algo::has_path_connecting(&self.graph, NodeIndex::new(from), NodeIndex::new(to), None)
  }
}
