//! # Hierarchical Authorization Engine
//!
//! Resources and roles each form a directed graph whose edges carry a
//! permission bitmask. The engine keeps a materialized transitive closure of
//! both graphs up to date as nodes and edges change, and answers
//! "may role R exercise capability bit i on resource X" by joining the two
//! closures through the assignment relation.
//!
//! ## Features
//!
//! - **Incremental closure maintenance** per node / edge event, with
//!   suspend / resume windows for bulk loading
//! - **Cycle-safe, depth-bounded traversal** over each hierarchy
//! - **Combined assignment cache** pre-joining assignments with one closure
//! - **Async-first design** using Tokio runtime
//! - **REST surface** and Prometheus metrics
//!
//! ## Example
//!
//! ```rust
//! use hierarch_authz::{AuthzEngine, EngineConfig, GraphMutation, AssignmentMutation, HierarchyKind, NodeId};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = AuthzEngine::new(EngineConfig { bitmap_size: 4, ..Default::default() })?;
//!
//!     engine.apply(HierarchyKind::Resource, GraphMutation::insert_node(1)).await?;
//!     engine.apply(HierarchyKind::Resource, GraphMutation::insert_node(2)).await?;
//!     engine
//!         .apply(HierarchyKind::Resource, GraphMutation::insert_edge(1, 2, engine.parse_permission("1100")?))
//!         .await?;
//!     engine.apply(HierarchyKind::Role, GraphMutation::insert_node(7)).await?;
//!     engine
//!         .apply_assignment(AssignmentMutation::insert(1, 7, engine.parse_permission("1111")?))
//!         .await?;
//!
//!     assert!(engine.authorize(NodeId(7), NodeId(2), 0).await?);
//!     assert!(!engine.authorize(NodeId(7), NodeId(2), 3).await?);
//!     Ok(())
//! }
//! ```

pub mod assignment;
pub mod closure;
pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod hierarchy;
pub mod http;
pub mod snapshot;

// Re-export commonly used types
pub use assignment::{Assignment, AssignmentBridge, AssignmentMutation, CombinedCache};
pub use closure::{ClosureCache, ClosureComputer, ClosureEntry, IncrementalMaintainer};
pub use config::{CombineWith, CombinedRefresh, EngineConfig, Operation};
pub use engine::{AccessDecision, AuthzEngine, MaintenanceTarget, PrincipalResolver};
pub use error::{AuthzError, Result};
pub use graph::{Edge, GraphMutation, GraphStore, MaintenanceEvent};
pub use hierarchy::Hierarchy;
pub use hierarch_core::{Bitmask, BitmaskSize, HierarchyKind, NodeId};
pub use snapshot::GraphSnapshot;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
