//! converge-lib: declarative single-host state convergence.
//!
//! This crate provides the pieces of a convergence run:
//! - `Resource`: a declared unit of desired state, identified by `type[title]`
//! - `ProviderRegistry`: maps resource types to the providers that read and apply them
//! - `Catalog`: the validated, immutable resource set and dependency graph for one run
//! - `engine::converge`: walks the catalog in dependency order and reconciles each resource
//! - `RunReport`: the per-resource outcome of a run

pub mod catalog;
pub mod consts;
pub mod declare;
pub mod engine;
pub mod graph;
pub mod platform;
pub mod provider;
pub mod report;
pub mod resource;
pub mod run_lock;
pub mod util;

pub use catalog::{Catalog, CatalogCompileError};
pub use declare::Declarations;
pub use engine::{EngineConfig, converge};
pub use provider::{Provider, ProviderRegistry};
pub use report::{Outcome, RunReport};
pub use resource::{Resource, ResourceId, Value};
