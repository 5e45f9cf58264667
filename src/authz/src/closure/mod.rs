//! Transitive-closure permission cache
//!
//! - [`computer`]: bounded, cycle-safe traversal
//! - [`cache`]: the materialized `(ancestor, descendant, permission)` relation
//! - [`maintainer`]: per-event incremental rules and full reconcile

pub mod cache;
pub mod computer;
pub mod maintainer;

pub use cache::{CacheDiff, ClosureCache, ClosureEntry};
pub use computer::{ClosureComputer, Direction};
pub use maintainer::{IncrementalMaintainer, MaintenanceReport};
