//! Declared resources.
//!
//! A resource is one unit of desired state: a package that should be installed,
//! a file that should hold some content, a service that should be running.
//! Resources are identified by their `(type, title)` pair, written `type[title]`,
//! and carry two kinds of data:
//!
//! - **Attributes**: provider-specific settings, as tagged [`Value`]s
//! - **Relationships**: `before`/`require`/`notify`/`subscribe` references to
//!   other resources, resolved when the catalog is compiled
//!
//! Resources are inert data. Reading and changing the real system is the job of
//! the provider registered for the resource's type.

mod types;

pub use types::*;
